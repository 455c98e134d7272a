//! Transport trait abstraction for the link and session layers

use actuator_shared::SessionStatus;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

/// The network link underneath the session (radio association, interface)
#[async_trait]
pub trait LinkDriver: Send {
    /// One establishment attempt; true once the link is usable
    async fn connect(&mut self) -> bool;

    /// Whether the link is still usable
    async fn is_up(&mut self) -> bool;

    fn name(&self) -> &str;
}

/// Credentials presented when opening a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCredentials {
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: u16,
}

/// A message delivered on a subscribed topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
}

/// Pub/sub session primitives
///
/// Failures are reported as the transport's status code so the supervisor
/// can classify them.
#[async_trait]
pub trait SessionTransport: Send {
    /// Open a session; replaces any previous one
    async fn connect(&mut self, credentials: &SessionCredentials) -> Result<(), SessionStatus>;

    async fn subscribe(&mut self, topic: &str) -> Result<(), SessionStatus>;

    async fn publish(&mut self, topic: &str, payload: Bytes) -> Result<(), SessionStatus>;

    /// Service the session for at most `budget`, returning the next inbound
    /// message if one arrived. Keep-alive traffic is handled here.
    async fn poll(&mut self, budget: Duration) -> Result<Option<InboundMessage>, SessionStatus>;

    /// Close the session politely
    async fn disconnect(&mut self);
}
