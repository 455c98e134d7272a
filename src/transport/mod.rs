//! Link and session transports

pub mod link;
pub mod mqtt;
pub mod traits;

pub use link::HostLink;
pub use mqtt::MqttSession;
pub use traits::{InboundMessage, LinkDriver, SessionCredentials, SessionTransport};
