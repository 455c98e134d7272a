//! Sequencer
//!
//! Owns the tone output and a single long-lived worker task. Requests reach
//! the worker through a watch channel, so only the latest one is ever picked
//! up; each playback session carries its own cancellation token which is
//! cancelled before the next request is published.

use crate::hardware::{HardwareError, ToneOutput};
use actuator_shared::{
    state_machine::{PlaybackEvent, PlaybackMachine, TransitionResult},
    timing, Note, PlaybackState, Score,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, timeout, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Sequencer timing configuration
#[derive(Debug, Clone)]
pub struct SequencerConfig {
    /// Silence after a note that is not tied to the next one
    pub note_gap: Duration,
    /// Glide sampling resolution
    pub tick: Duration,
    /// How long a new request waits for the old session to exit
    pub stop_grace: Duration,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            note_gap: Duration::from_millis(timing::NOTE_GAP_MS),
            tick: Duration::from_millis(timing::TICK_MS),
            stop_grace: Duration::from_millis(timing::STOP_GRACE_MS),
        }
    }
}

/// Immediate writes that bypass the score machinery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToneCommand {
    /// Continuous tone until superseded
    Sustain { freq_hz: u32, amp: u8 },
    /// Generator-timed tone
    Beep { freq_hz: u32, amp: u8, duration: Duration },
    Silence,
}

#[derive(Debug, Clone)]
enum Request {
    Play {
        session: u64,
        score: Arc<Score>,
        token: CancellationToken,
    },
    Direct {
        session: u64,
        command: ToneCommand,
    },
}

/// Plays one score at a time on a background task
pub struct Sequencer {
    config: SequencerConfig,
    request_tx: watch::Sender<Option<Request>>,
    state_rx: watch::Receiver<PlaybackState>,
    /// Token of the most recent session; also serializes requests
    active: Mutex<CancellationToken>,
    next_session: AtomicU64,
    shutdown: CancellationToken,
    worker: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Sequencer {
    /// Configure the output and start the worker task
    pub fn start(
        mut output: Box<dyn ToneOutput>,
        config: SequencerConfig,
    ) -> Result<Self, HardwareError> {
        output.configure()?;
        output.silence();

        let (request_tx, request_rx) = watch::channel(None);
        let (state_tx, state_rx) = watch::channel(PlaybackState::Idle);
        let shutdown = CancellationToken::new();

        let worker = Worker {
            output,
            config: config.clone(),
            machine: PlaybackMachine::new(),
            state_tx,
        };
        let handle = tokio::spawn(worker.run(request_rx, shutdown.clone()));

        Ok(Self {
            config,
            request_tx,
            state_rx,
            active: Mutex::new(CancellationToken::new()),
            next_session: AtomicU64::new(0),
            shutdown,
            worker: std::sync::Mutex::new(Some(handle)),
        })
    }

    /// Current playback state
    pub fn state(&self) -> PlaybackState {
        *self.state_rx.borrow()
    }

    /// Watch playback state changes
    #[cfg(test)]
    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.state_rx.clone()
    }

    /// Start playing `score`, superseding whatever is sounding
    ///
    /// Returns as soon as the request is handed to the worker; the returned
    /// id identifies the session in logs.
    pub async fn play(&self, score: Score) -> u64 {
        let mut active = self.active.lock().await;
        let token = CancellationToken::new();
        self.supersede(&mut active, token.clone()).await;

        let session = self.next_session.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            "[PLAY] session {} queued: {} notes at {} bpm",
            session,
            score.len(),
            score.tempo_bpm()
        );
        self.request_tx.send_replace(Some(Request::Play {
            session,
            score: Arc::new(score),
            token,
        }));
        session
    }

    /// Apply an immediate tone write, superseding any active session
    pub async fn direct(&self, command: ToneCommand) -> u64 {
        let mut active = self.active.lock().await;
        self.supersede(&mut active, CancellationToken::new()).await;

        let session = self.next_session.fetch_add(1, Ordering::SeqCst) + 1;
        self.request_tx
            .send_replace(Some(Request::Direct { session, command }));
        session
    }

    /// Stop playback and silence the output
    pub async fn stop(&self) {
        self.direct(ToneCommand::Silence).await;
    }

    /// Stop playback and terminate the worker
    pub async fn shutdown(&self) {
        self.stop().await;
        self.shutdown.cancel();

        let handle = self.worker.lock().ok().and_then(|mut guard| guard.take());
        if let Some(handle) = handle {
            if timeout(self.config.stop_grace, handle).await.is_err() {
                warn!("[PLAY] worker did not exit within grace interval");
            }
        }
    }

    /// Cancel the active session and give it the grace interval to exit
    async fn supersede(&self, active: &mut CancellationToken, next: CancellationToken) {
        let previous = std::mem::replace(active, next);
        previous.cancel();

        if self.state() == PlaybackState::Idle {
            return;
        }

        let mut state_rx = self.state_rx.clone();
        let exited = timeout(self.config.stop_grace, async move {
            let idle = state_rx.wait_for(|s| *s == PlaybackState::Idle).await.is_ok();
            idle
        })
        .await;

        match exited {
            Ok(true) => debug!("[PLAY] previous session exited"),
            Ok(false) => warn!("[PLAY] worker is gone"),
            Err(_) => warn!(
                "[PLAY] previous session still running after {}ms; request will wait",
                self.config.stop_grace.as_millis()
            ),
        }
    }
}

impl Drop for Sequencer {
    fn drop(&mut self) {
        self.active.get_mut().cancel();
        self.shutdown.cancel();
    }
}

/// Background activity that exclusively drives the tone output
struct Worker {
    output: Box<dyn ToneOutput>,
    config: SequencerConfig,
    machine: PlaybackMachine,
    state_tx: watch::Sender<PlaybackState>,
}

impl Worker {
    async fn run(
        mut self,
        mut request_rx: watch::Receiver<Option<Request>>,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                changed = request_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }

            let request = request_rx.borrow_and_update().clone();
            match request {
                Some(Request::Play {
                    session,
                    score,
                    token,
                }) => self.play_session(session, &score, &token).await,
                Some(Request::Direct { session, command }) => {
                    debug!("[PLAY] session {} direct {:?}", session, command);
                    self.apply(command);
                }
                None => {}
            }
        }

        self.output.silence();
        info!("[PLAY] worker stopped");
    }

    fn apply(&mut self, command: ToneCommand) {
        match command {
            ToneCommand::Sustain { freq_hz, amp } => self.output.tone(freq_hz, amp),
            ToneCommand::Beep {
                freq_hz,
                amp,
                duration,
            } => self.output.tone_for(freq_hz, amp, duration),
            ToneCommand::Silence => self.output.silence(),
        }
    }

    fn transition(&mut self, event: PlaybackEvent) {
        match self.machine.process_event(event) {
            TransitionResult::Success(state) => {
                self.state_tx.send_replace(state);
            }
            TransitionResult::Invalid { from, event } => {
                warn!("[PLAY] ignored {:?} in state {:?}", event, from);
            }
        }
    }

    async fn play_session(&mut self, session: u64, score: &Score, token: &CancellationToken) {
        if token.is_cancelled() {
            debug!("[PLAY] session {} superseded before start", session);
            return;
        }

        info!("[PLAY] session {} started", session);
        self.transition(PlaybackEvent::Started { len: score.len() });

        let tempo = score.tempo_bpm();
        let last = score.len() - 1;

        for (index, note) in score.notes().iter().enumerate() {
            if !self.play_note(note, tempo, token).await {
                self.transition(PlaybackEvent::StopRequested);
                self.output.silence();
                self.transition(PlaybackEvent::SessionExited);
                info!("[PLAY] session {} stopped at note {}", session, index);
                return;
            }

            if index == last {
                self.output.silence();
            }
            self.transition(PlaybackEvent::NoteComplete);
        }

        info!("[PLAY] session {} finished", session);
    }

    /// Play one note including its trailing gap; false if cancelled
    async fn play_note(&mut self, note: &Note, tempo: u32, token: &CancellationToken) -> bool {
        let duration = note.duration(tempo);

        let completed = if note.is_rest() {
            self.output.silence();
            hold(duration, token).await
        } else if note.is_glide() {
            self.glide(note, duration, token).await
        } else {
            self.output.tone(note.freq_start, note.amp);
            hold(duration, token).await
        };

        if !completed {
            return false;
        }

        if note.tie {
            return true;
        }
        self.output.silence();
        hold(self.config.note_gap, token).await
    }

    /// Sweep linearly from `freq_start` to `freq_end`, one sample per tick
    async fn glide(&mut self, note: &Note, duration: Duration, token: &CancellationToken) -> bool {
        let start = Instant::now();
        let mut ticker = interval(self.config.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let elapsed = start.elapsed();
            if elapsed >= duration {
                return true;
            }
            self.output.tone(note.frequency_at(elapsed, duration), note.amp);

            tokio::select! {
                _ = token.cancelled() => return false,
                _ = ticker.tick() => {}
            }
        }
    }
}

async fn hold(duration: Duration, token: &CancellationToken) -> bool {
    tokio::select! {
        _ = token.cancelled() => false,
        _ = sleep(duration) => true,
    }
}
