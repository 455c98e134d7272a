//! Connectivity supervisor
//!
//! Keeps the link and the pub/sub session alive from the main loop. Session
//! work is never attempted on a dead link, every (re)connect resubscribes
//! every registered topic, and failed connects back off exponentially.

use super::backoff::Backoff;
use crate::command::{Ack, Dispatcher};
use crate::transport::{InboundMessage, LinkDriver, SessionCredentials, SessionTransport};
use actuator_shared::{
    now_ms, timing, ConnectionState, FailureClass, LinkState, SessionStatus,
};
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

/// Upper bound on messages dispatched per tick
const MAX_MESSAGES_PER_TICK: usize = 8;

/// Link and session establishment failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    #[error("Link {name} not up after {attempts} attempts")]
    LinkUnavailable { name: String, attempts: u32 },

    #[error("Link is down, session not attempted")]
    LinkDown,

    #[error("Link lost")]
    LinkLost,

    #[error("Session connect failed: {0}")]
    Session(SessionStatus),

    #[error("Subscribe to {topic} failed: {status}")]
    Subscribe { topic: String, status: SessionStatus },

    #[error("Waiting {}ms before the next session attempt", .0.as_millis())]
    BackingOff(Duration),
}

impl ConnectError {
    /// Transport status code this failure maps to
    pub fn status(&self) -> SessionStatus {
        match self {
            ConnectError::LinkUnavailable { .. } => SessionStatus::ConnectFailed,
            ConnectError::LinkDown | ConnectError::BackingOff(_) => SessionStatus::Disconnected,
            ConnectError::LinkLost => SessionStatus::ConnectionLost,
            ConnectError::Session(status) => *status,
            ConnectError::Subscribe { status, .. } => *status,
        }
    }

    pub fn class(&self) -> FailureClass {
        self.status().class()
    }
}

/// Supervisor configuration
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub credentials: SessionCredentials,
    /// Where command acknowledgements are published, if anywhere
    pub status_topic: Option<String>,
    pub link_attempts: u32,
    pub link_attempt_interval: Duration,
    /// How often an established link is re-probed
    pub link_check_interval: Duration,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
    /// Longest a tick waits for inbound traffic
    pub poll_budget: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            credentials: SessionCredentials {
                client_id: "actuator-agent".into(),
                username: None,
                password: None,
                keep_alive_secs: timing::KEEP_ALIVE_SECS,
            },
            status_topic: None,
            link_attempts: timing::LINK_MAX_ATTEMPTS,
            link_attempt_interval: Duration::from_millis(timing::LINK_ATTEMPT_INTERVAL_MS),
            link_check_interval: Duration::from_millis(timing::LINK_CHECK_INTERVAL_MS),
            backoff_initial: Duration::from_millis(timing::BACKOFF_INITIAL_MS),
            backoff_max: Duration::from_millis(timing::BACKOFF_MAX_MS),
            poll_budget: Duration::from_millis(10),
        }
    }
}

/// Owns the connection state and drives link and session from `tick`
pub struct ConnectivitySupervisor<L, S> {
    config: SupervisorConfig,
    state: ConnectionState,
    link: L,
    session: S,
    dispatcher: Dispatcher,
    backoff: Backoff,
    last_link_check: Instant,
}

impl<L: LinkDriver, S: SessionTransport> ConnectivitySupervisor<L, S> {
    pub fn new(config: SupervisorConfig, link: L, session: S, dispatcher: Dispatcher) -> Self {
        let backoff = Backoff::new(config.backoff_initial, config.backoff_max);
        Self {
            config,
            state: ConnectionState::new(),
            link,
            session,
            dispatcher,
            backoff,
            last_link_check: Instant::now(),
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Bring the link up, trying at most `link_attempts` times
    pub async fn ensure_link(&mut self) -> Result<(), ConnectError> {
        if self.state.link() == LinkState::Up {
            return Ok(());
        }

        self.state.link_connecting();
        info!("[LINK] Connecting to {}", self.link.name());

        for attempt in 1..=self.config.link_attempts {
            if self.link.connect().await {
                self.state.link_up();
                self.last_link_check = Instant::now();
                info!("[LINK] {} up after {} attempt(s)", self.link.name(), attempt);
                return Ok(());
            }
            if attempt < self.config.link_attempts {
                sleep(self.config.link_attempt_interval).await;
            }
        }

        self.state.link_down();
        let err = ConnectError::LinkUnavailable {
            name: self.link.name().to_string(),
            attempts: self.config.link_attempts,
        };
        warn!("[LINK] {}", err);
        Err(err)
    }

    /// Open the session and resubscribe every registered topic
    ///
    /// Refuses without touching the transport when the link is not up.
    pub async fn ensure_session(&mut self) -> Result<(), ConnectError> {
        if self.state.link() != LinkState::Up {
            warn!("[SESSION] Link is {:?}, not attempting session", self.state.link());
            return Err(ConnectError::LinkDown);
        }
        if self.state.is_connected() {
            return Ok(());
        }
        if let Some(wait) = self.backoff.remaining() {
            return Err(ConnectError::BackingOff(wait));
        }

        if let Err(e) = self.state.begin_session(now_ms()) {
            warn!("[SESSION] {}", e);
            return Err(ConnectError::LinkDown);
        }
        info!("[SESSION] Connecting as {}", self.config.credentials.client_id);

        if let Err(status) = self.session.connect(&self.config.credentials).await {
            return Err(self.session_failed(ConnectError::Session(status)));
        }

        let topics = self.dispatcher.registry().topics();
        for topic in &topics {
            if let Err(status) = self.session.subscribe(topic).await {
                self.session.disconnect().await;
                return Err(self.session_failed(ConnectError::Subscribe {
                    topic: topic.clone(),
                    status,
                }));
            }
            debug!("[SESSION] Subscribed to {}", topic);
        }

        let count = topics.len();
        if let Err(e) = self.state.session_established(topics) {
            warn!("[SESSION] {}", e);
            return Err(ConnectError::LinkDown);
        }
        self.backoff.reset();
        info!("[SESSION] Connected, {} topic(s) subscribed", count);
        Ok(())
    }

    /// One step of connectivity maintenance
    ///
    /// Link first, then session, then message pumping. Returns the number of
    /// messages dispatched.
    pub async fn tick(&mut self) -> Result<usize, ConnectError> {
        if self.state.link() != LinkState::Up {
            self.ensure_link().await?;
        } else if self.last_link_check.elapsed() >= self.config.link_check_interval {
            self.last_link_check = Instant::now();
            if !self.link.is_up().await {
                warn!("[LINK] {} lost", self.link.name());
                self.session.disconnect().await;
                self.state.link_down();
                return Err(ConnectError::LinkLost);
            }
        }

        if !self.state.is_connected() {
            self.ensure_session().await?;
        }

        self.pump().await
    }

    /// Drain inbound messages into the dispatcher
    async fn pump(&mut self) -> Result<usize, ConnectError> {
        let mut handled = 0;
        let mut budget = self.config.poll_budget;

        while handled < MAX_MESSAGES_PER_TICK {
            match self.session.poll(budget).await {
                Ok(Some(message)) => {
                    self.handle_message(message).await;
                    handled += 1;
                    budget = Duration::ZERO;
                }
                Ok(None) => break,
                Err(status) => return Err(self.session_failed(ConnectError::Session(status))),
            }
        }
        Ok(handled)
    }

    async fn handle_message(&mut self, message: InboundMessage) {
        // failures are logged by the dispatcher and never retried
        if let Ok(ack) = self
            .dispatcher
            .on_message(&message.topic, &message.payload)
            .await
        {
            self.publish_ack(&ack).await;
        }
    }

    async fn publish_ack(&mut self, ack: &Ack) {
        let Some(topic) = self.config.status_topic.clone() else {
            return;
        };
        match ack.to_json() {
            Ok(json) => {
                if let Err(status) = self.session.publish(&topic, json.into()).await {
                    warn!("[SESSION] Failed to publish ack on {}: {}", topic, status);
                }
            }
            Err(e) => warn!("[SESSION] Failed to encode ack: {}", e),
        }
    }

    /// Record a session failure and schedule the next attempt
    fn session_failed(&mut self, err: ConnectError) -> ConnectError {
        self.state.session_failed(err.status());
        let delay = self.backoff.fail();

        match err.class() {
            FailureClass::Transient => warn!(
                "[SESSION] {}; retrying in {}ms",
                err,
                delay.as_millis()
            ),
            FailureClass::Rejected => error!(
                "[SESSION] {}; broker rejected this client, check credentials. Retrying in {}ms",
                err,
                delay.as_millis()
            ),
        }
        err
    }

    /// Close the session politely
    pub async fn shutdown(&mut self) {
        if self.state.is_connected() {
            info!("[SESSION] Disconnecting");
        }
        self.session.disconnect().await;
        self.state.session_failed(SessionStatus::Disconnected);
    }
}
