//! Playback and Connection State Machines
//!
//! Defines valid playback transitions and the two-layer connection state
//! with its ordering invariants.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::SessionStatus;

/// Observable state of the sequencer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Playing { note_index: usize },
    /// A stop was requested; the active session has not exited yet
    Stopping,
}

impl PlaybackState {
    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackState::Playing { .. })
    }
}

/// Events that can trigger playback transitions
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    /// A session started on a score of `len` notes
    Started { len: usize },
    /// The current note finished
    NoteComplete,
    /// A new request or shutdown wants the active session gone
    StopRequested,
    /// The session left its note loop (output already silenced)
    SessionExited,
}

/// Result of a playback transition attempt
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionResult {
    /// Transition was valid
    Success(PlaybackState),
    /// Transition was invalid from current state
    Invalid { from: PlaybackState, event: PlaybackEvent },
}

/// Playback state machine for one sequencer
#[derive(Debug, Default)]
pub struct PlaybackMachine {
    state: PlaybackState,
    score_len: usize,
}

impl PlaybackMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Process an event and return the transition result
    pub fn process_event(&mut self, event: PlaybackEvent) -> TransitionResult {
        use PlaybackEvent::*;
        use PlaybackState::*;

        let next = match (self.state, &event) {
            (Idle, Started { len }) if *len > 0 => {
                self.score_len = *len;
                Some(Playing { note_index: 0 })
            }

            (Playing { note_index }, NoteComplete) => {
                if note_index + 1 < self.score_len {
                    Some(Playing {
                        note_index: note_index + 1,
                    })
                } else {
                    Some(Idle)
                }
            }

            (Playing { .. } | Stopping, StopRequested) => Some(Stopping),
            (Idle, StopRequested) => Some(Idle),

            (Playing { .. } | Stopping, SessionExited) => Some(Idle),
            (Idle, SessionExited) => Some(Idle),

            _ => None,
        };

        match next {
            Some(state) => {
                if state == Idle {
                    self.score_len = 0;
                }
                self.state = state;
                TransitionResult::Success(state)
            }
            None => TransitionResult::Invalid {
                from: self.state,
                event,
            },
        }
    }
}

/// Link-layer (network) state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    #[default]
    Down,
    Connecting,
    Up,
}

/// Session-layer (pub/sub) state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Violations of the connection ordering invariants
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("Link is {0:?}, session operations require Up")]
    LinkNotUp(LinkState),

    #[error("Session is {0:?}, expected Connecting")]
    NotConnecting(SessionState),
}

/// Combined link and session state
///
/// The session can only be Connecting or Connected while the link is Up, and
/// `subscriptions` is empty unless the session is Connected.
#[derive(Debug, Clone, Default)]
pub struct ConnectionState {
    link: LinkState,
    session: SessionState,
    last_attempt_ms: Option<u64>,
    last_failure: Option<SessionStatus>,
    subscriptions: BTreeSet<String>,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn link(&self) -> LinkState {
        self.link
    }

    pub fn session(&self) -> SessionState {
        self.session
    }

    pub fn last_attempt_ms(&self) -> Option<u64> {
        self.last_attempt_ms
    }

    pub fn last_failure(&self) -> Option<SessionStatus> {
        self.last_failure
    }

    pub fn subscriptions(&self) -> &BTreeSet<String> {
        &self.subscriptions
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.subscriptions.contains(topic)
    }

    pub fn is_connected(&self) -> bool {
        self.link == LinkState::Up && self.session == SessionState::Connected
    }

    pub fn link_connecting(&mut self) {
        self.drop_session();
        self.link = LinkState::Connecting;
    }

    pub fn link_up(&mut self) {
        self.link = LinkState::Up;
    }

    /// Link lost; the session goes with it
    pub fn link_down(&mut self) {
        self.drop_session();
        self.link = LinkState::Down;
    }

    /// Start a session attempt
    pub fn begin_session(&mut self, now_ms: u64) -> Result<(), StateError> {
        if self.link != LinkState::Up {
            return Err(StateError::LinkNotUp(self.link));
        }
        self.subscriptions.clear();
        self.session = SessionState::Connecting;
        self.last_attempt_ms = Some(now_ms);
        Ok(())
    }

    /// The session is up and every given topic has been (re)subscribed
    pub fn session_established<I>(&mut self, topics: I) -> Result<(), StateError>
    where
        I: IntoIterator<Item = String>,
    {
        if self.link != LinkState::Up {
            return Err(StateError::LinkNotUp(self.link));
        }
        if self.session != SessionState::Connecting {
            return Err(StateError::NotConnecting(self.session));
        }
        self.subscriptions = topics.into_iter().collect();
        self.session = SessionState::Connected;
        self.last_failure = None;
        Ok(())
    }

    /// A session attempt failed or an established session dropped
    pub fn session_failed(&mut self, status: SessionStatus) {
        self.drop_session();
        self.last_failure = Some(status);
    }

    fn drop_session(&mut self) {
        self.session = SessionState::Disconnected;
        self.subscriptions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playback_runs_through_score() {
        let mut fsm = PlaybackMachine::new();
        assert_eq!(fsm.state(), PlaybackState::Idle);

        let result = fsm.process_event(PlaybackEvent::Started { len: 2 });
        assert_eq!(result, TransitionResult::Success(PlaybackState::Playing { note_index: 0 }));

        let result = fsm.process_event(PlaybackEvent::NoteComplete);
        assert_eq!(result, TransitionResult::Success(PlaybackState::Playing { note_index: 1 }));

        // natural end
        let result = fsm.process_event(PlaybackEvent::NoteComplete);
        assert_eq!(result, TransitionResult::Success(PlaybackState::Idle));
    }

    #[test]
    fn test_playback_stop_goes_through_stopping() {
        let mut fsm = PlaybackMachine::new();
        fsm.process_event(PlaybackEvent::Started { len: 5 });

        let result = fsm.process_event(PlaybackEvent::StopRequested);
        assert_eq!(result, TransitionResult::Success(PlaybackState::Stopping));

        // no progress while stopping
        assert!(matches!(
            fsm.process_event(PlaybackEvent::NoteComplete),
            TransitionResult::Invalid { from: PlaybackState::Stopping, .. }
        ));

        let result = fsm.process_event(PlaybackEvent::SessionExited);
        assert_eq!(result, TransitionResult::Success(PlaybackState::Idle));

        let result = fsm.process_event(PlaybackEvent::Started { len: 1 });
        assert_eq!(result, TransitionResult::Success(PlaybackState::Playing { note_index: 0 }));
    }

    #[test]
    fn test_playback_cannot_start_twice() {
        let mut fsm = PlaybackMachine::new();
        fsm.process_event(PlaybackEvent::Started { len: 3 });
        assert!(matches!(
            fsm.process_event(PlaybackEvent::Started { len: 3 }),
            TransitionResult::Invalid { .. }
        ));
        assert!(matches!(
            PlaybackMachine::new().process_event(PlaybackEvent::Started { len: 0 }),
            TransitionResult::Invalid { .. }
        ));
    }

    #[test]
    fn test_session_requires_link() {
        let mut state = ConnectionState::new();
        assert_eq!(state.begin_session(1), Err(StateError::LinkNotUp(LinkState::Down)));
        assert_eq!(state.session(), SessionState::Disconnected);

        state.link_connecting();
        assert_eq!(
            state.begin_session(1),
            Err(StateError::LinkNotUp(LinkState::Connecting))
        );

        state.link_up();
        assert!(state.begin_session(2).is_ok());
        assert_eq!(state.session(), SessionState::Connecting);
        assert_eq!(state.last_attempt_ms(), Some(2));
    }

    #[test]
    fn test_subscriptions_cleared_when_session_drops() {
        let mut state = ConnectionState::new();
        state.link_up();
        state.begin_session(1).unwrap();
        state
            .session_established(vec!["a".to_string(), "b".to_string()])
            .unwrap();
        assert!(state.is_connected());
        assert!(state.is_subscribed("a") && state.is_subscribed("b"));

        state.session_failed(SessionStatus::ConnectionLost);
        assert_eq!(state.session(), SessionState::Disconnected);
        assert!(state.subscriptions().is_empty());
        assert_eq!(state.last_failure(), Some(SessionStatus::ConnectionLost));
    }

    #[test]
    fn test_link_down_drops_session() {
        let mut state = ConnectionState::new();
        state.link_up();
        state.begin_session(1).unwrap();
        state.session_established(vec!["a".to_string()]).unwrap();

        state.link_down();
        assert_eq!(state.link(), LinkState::Down);
        assert_eq!(state.session(), SessionState::Disconnected);
        assert!(state.subscriptions().is_empty());
    }

    #[test]
    fn test_established_requires_connecting() {
        let mut state = ConnectionState::new();
        state.link_up();
        assert_eq!(
            state.session_established(Vec::new()),
            Err(StateError::NotConnecting(SessionState::Disconnected))
        );
    }
}
