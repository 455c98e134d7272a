//! Link driver for hosts where the OS owns the network interface
//!
//! The link counts as up once the broker host resolves; on a board with its
//! own radio this is where association would happen.

use super::traits::LinkDriver;
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::lookup_host;
use tokio::time::timeout;
use tracing::debug;

/// Probe budget for a single resolution
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

pub struct HostLink {
    name: String,
    host: String,
    port: u16,
}

impl HostLink {
    /// `name` is the configured network name, used for diagnostics only
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
        }
    }

    async fn probe(&self) -> bool {
        let resolved = timeout(PROBE_TIMEOUT, lookup_host((self.host.as_str(), self.port))).await;
        match resolved {
            Ok(Ok(mut addrs)) => addrs.next().is_some(),
            Ok(Err(e)) => {
                debug!("[LINK] {}:{} does not resolve: {}", self.host, self.port, e);
                false
            }
            Err(_) => {
                debug!("[LINK] resolving {}:{} timed out", self.host, self.port);
                false
            }
        }
    }
}

#[async_trait]
impl LinkDriver for HostLink {
    async fn connect(&mut self) -> bool {
        self.probe().await
    }

    async fn is_up(&mut self) -> bool {
        self.probe().await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_loopback_is_up() {
        let mut link = HostLink::new("lab", "127.0.0.1", 1883);
        assert!(link.connect().await);
        assert!(link.is_up().await);
        assert_eq!(link.name(), "lab");
    }

    #[tokio::test]
    async fn test_unparseable_host_is_down() {
        let mut link = HostLink::new("lab", "not a host name", 1883);
        assert!(!link.connect().await);
    }
}
