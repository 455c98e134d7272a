//! MQTT session on rumqttc
//!
//! The rumqttc event loop only makes progress while it is polled, so every
//! call here drives it for a bounded time and the owning loop never blocks
//! for longer than the budget it passes in. A failed event loop is dropped
//! instead of being left to reconnect on its own; reconnecting is the
//! supervisor's job.

use super::traits::{InboundMessage, SessionCredentials, SessionTransport};
use actuator_shared::SessionStatus;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, Incoming, MqttOptions,
    Outgoing, Publish, QoS, StateError, SubscribeReasonCode,
};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

/// Time allowed for CONNACK, SUBACK and the DISCONNECT flush
const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Requests queued between the client handle and its event loop
const REQUEST_CAPACITY: usize = 16;

/// Largest packet accepted from the broker. Command payloads are capped far
/// lower by the dispatcher, so an oversized command still arrives whole and
/// is dropped there while the session stays up.
const MAX_INBOUND_PACKET: usize = 256 * 1024;

/// Largest packet this client sends (acknowledgements only)
const MAX_OUTBOUND_PACKET: usize = 16 * 1024;

struct Live {
    client: AsyncClient,
    eventloop: EventLoop,
}

/// Client half of an MQTT session
pub struct MqttSession {
    host: String,
    port: u16,
    reply_timeout: Duration,
    live: Option<Live>,
    /// Messages that arrived while waiting for a SUBACK
    backlog: VecDeque<InboundMessage>,
}

impl MqttSession {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            live: None,
            backlog: VecDeque::new(),
        }
    }

    pub fn with_reply_timeout(mut self, reply_timeout: Duration) -> Self {
        self.reply_timeout = reply_timeout;
        self
    }

    fn options(&self, credentials: &SessionCredentials) -> Result<MqttOptions> {
        let client_id = &credentials.client_id;
        if client_id.is_empty() || client_id.starts_with(' ') {
            return Err(anyhow!("Invalid client id {:?}", client_id));
        }

        let mut options = MqttOptions::new(client_id.clone(), self.host.clone(), self.port);
        options.set_keep_alive(Duration::from_secs(u64::from(credentials.keep_alive_secs)));
        options.set_clean_session(true);
        options.set_max_packet_size(MAX_INBOUND_PACKET, MAX_OUTBOUND_PACKET);
        if let Some(username) = &credentials.username {
            options.set_credentials(
                username.clone(),
                credentials.password.clone().unwrap_or_default(),
            );
        }
        Ok(options)
    }

    /// Drop the event loop and report why
    fn failed(&mut self, err: ConnectionError) -> SessionStatus {
        match &err {
            ConnectionError::MqttState(StateError::Deserialization(e)) => {
                warn!("[MQTT] Undecodable frame from broker, session dropped: {}", e)
            }
            _ => debug!("[MQTT] Session lost: {}", err),
        }
        self.live = None;
        self.backlog.clear();
        failure_status(&err, false)
    }

    fn lost(&mut self, reason: &str) -> SessionStatus {
        debug!("[MQTT] Session lost: {}", reason);
        self.live = None;
        self.backlog.clear();
        SessionStatus::ConnectionLost
    }

    /// Next event loop event, waiting at most `wait`
    async fn next_event(&mut self, wait: Duration) -> Result<Option<Event>, SessionStatus> {
        let Some(live) = self.live.as_mut() else {
            return Err(SessionStatus::Disconnected);
        };
        let polled = timeout(wait, live.eventloop.poll()).await;
        match polled {
            Ok(Ok(event)) => Ok(Some(event)),
            Ok(Err(e)) => Err(self.failed(e)),
            Err(_) => Ok(None),
        }
    }
}

fn inbound(publish: Publish) -> InboundMessage {
    InboundMessage {
        topic: publish.topic,
        payload: publish.payload,
    }
}

/// Status for a broker refusal
fn refusal_status(code: &ConnectReturnCode) -> SessionStatus {
    match code {
        ConnectReturnCode::Success => SessionStatus::Connected,
        ConnectReturnCode::RefusedProtocolVersion => SessionStatus::BadProtocol,
        ConnectReturnCode::BadClientId => SessionStatus::BadClientId,
        ConnectReturnCode::ServiceUnavailable => SessionStatus::Unavailable,
        ConnectReturnCode::BadUserNamePassword => SessionStatus::BadCredentials,
        ConnectReturnCode::NotAuthorized => SessionStatus::Unauthorized,
    }
}

/// Status for an event loop failure; `connecting` separates a failed open
/// from a dropped session
fn failure_status(err: &ConnectionError, connecting: bool) -> SessionStatus {
    match err {
        ConnectionError::ConnectionRefused(code) => refusal_status(code),
        ConnectionError::NetworkTimeout => SessionStatus::ConnectionTimeout,
        _ if connecting => SessionStatus::ConnectFailed,
        _ => SessionStatus::ConnectionLost,
    }
}

#[async_trait]
impl SessionTransport for MqttSession {
    async fn connect(&mut self, credentials: &SessionCredentials) -> Result<(), SessionStatus> {
        self.live = None;
        self.backlog.clear();

        let options = self.options(credentials).map_err(|e| {
            debug!("[MQTT] {}", e);
            SessionStatus::BadClientId
        })?;
        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);

        let deadline = Instant::now() + self.reply_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let polled = timeout(remaining, eventloop.poll()).await;
            match polled {
                Ok(Ok(Event::Incoming(Incoming::ConnAck(_)))) => break,
                Ok(Ok(event)) => debug!("[MQTT] {:?} before CONNACK", event),
                Ok(Err(e)) => {
                    debug!("[MQTT] Connect to {}:{} failed: {}", self.host, self.port, e);
                    return Err(failure_status(&e, true));
                }
                Err(_) => return Err(SessionStatus::ConnectionTimeout),
            }
        }

        self.live = Some(Live { client, eventloop });
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), SessionStatus> {
        let requested = match self.live.as_ref() {
            Some(live) => live.client.try_subscribe(topic, QoS::AtMostOnce),
            None => return Err(SessionStatus::Disconnected),
        };
        if let Err(e) = requested {
            return Err(self.lost(&format!("subscribe request failed: {}", e)));
        }

        let deadline = Instant::now() + self.reply_timeout;
        let mut packet_id = None;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.next_event(remaining).await? {
                Some(Event::Outgoing(Outgoing::Subscribe(id))) => packet_id = Some(id),
                Some(Event::Incoming(Incoming::SubAck(ack)))
                    if packet_id.map_or(true, |id| id == ack.pkid) =>
                {
                    let refused = ack
                        .return_codes
                        .iter()
                        .any(|rc| matches!(rc, SubscribeReasonCode::Failure));
                    return if refused {
                        debug!("[MQTT] Broker refused subscription to {}", topic);
                        Err(SessionStatus::Unauthorized)
                    } else {
                        Ok(())
                    };
                }
                Some(Event::Incoming(Incoming::Publish(publish))) => {
                    self.backlog.push_back(inbound(publish))
                }
                Some(_) => {}
                None => return Err(self.lost("no SUBACK")),
            }
        }
    }

    async fn publish(&mut self, topic: &str, payload: Bytes) -> Result<(), SessionStatus> {
        let Some(live) = self.live.as_ref() else {
            return Err(SessionStatus::Disconnected);
        };
        // queued here, written by the next poll
        live.client
            .try_publish(topic, QoS::AtMostOnce, false, payload.to_vec())
            .map_err(|e| {
                debug!("[MQTT] Publish on {} not queued: {}", topic, e);
                SessionStatus::ConnectionLost
            })
    }

    async fn poll(&mut self, budget: Duration) -> Result<Option<InboundMessage>, SessionStatus> {
        if self.live.is_none() {
            return Err(SessionStatus::Disconnected);
        }
        if let Some(message) = self.backlog.pop_front() {
            return Ok(Some(message));
        }

        let deadline = Instant::now() + budget;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.next_event(remaining).await? {
                Some(Event::Incoming(Incoming::Publish(publish))) => {
                    return Ok(Some(inbound(publish)))
                }
                Some(_) if remaining.is_zero() => return Ok(None),
                Some(_) => {}
                None => return Ok(None),
            }
        }
    }

    async fn disconnect(&mut self) {
        self.backlog.clear();
        let Some(mut live) = self.live.take() else {
            return;
        };
        if live.client.try_disconnect().is_err() {
            return;
        }

        // the request only reaches the wire once the event loop runs
        let deadline = Instant::now() + self.reply_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let polled = timeout(remaining, live.eventloop.poll()).await;
            match polled {
                Ok(Ok(Event::Outgoing(Outgoing::Disconnect))) => {
                    debug!("[MQTT] DISCONNECT sent");
                    break;
                }
                Ok(Ok(_)) => {}
                Ok(Err(_)) | Err(_) => break,
            }
        }
    }
}
