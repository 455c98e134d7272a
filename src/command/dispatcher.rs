//! Dispatcher - turns an inbound (topic, payload) pair into a handler call

use super::handlers::CommandResult;
use super::registry::HandlerRegistry;
use actuator_shared::{CommandDocument, CommandError};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Per-message terminal failures; none of them is retried
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Failed to parse payload: {0}")]
    Parse(#[from] CommandError),

    #[error("No handler for topic: {0}")]
    NoHandler(String),
}

/// Outcome status carried in an acknowledgement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Completed,
    Failed,
    Rejected,
    Pending,
}

/// Acknowledgement for one dispatched command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ack {
    pub topic: String,
    pub command: String,
    pub status: AckStatus,
    pub message: String,
}

impl Ack {
    fn new(topic: &str, command: Option<&str>, result: CommandResult) -> Self {
        let (status, message) = match result {
            CommandResult::Completed { message } => (AckStatus::Completed, message),
            CommandResult::Failed { message } => (AckStatus::Failed, message),
            CommandResult::Rejected { message } => (AckStatus::Rejected, message),
            CommandResult::Pending { message } => (AckStatus::Pending, message),
        };
        Self {
            topic: topic.to_string(),
            command: command.unwrap_or_default().to_ascii_uppercase(),
            status,
            message,
        }
    }

    /// JSON form published on the status topic
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Routes messages to handlers; holds no per-message state
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Parse, resolve and invoke
    ///
    /// A parse failure never reaches a handler. Each failure is logged once.
    pub async fn on_message(&self, topic: &str, payload: &[u8]) -> Result<Ack, DispatchError> {
        let document = match CommandDocument::parse(payload) {
            Ok(document) => document,
            Err(e) => {
                warn!("[DISPATCH] Dropping message on {}: {}", topic, e);
                return Err(e.into());
            }
        };

        let handler = match self.registry.resolve(topic) {
            Ok(handler) => handler,
            Err(_) => {
                warn!("[DISPATCH] No handler for topic {}", topic);
                return Err(DispatchError::NoHandler(topic.to_string()));
            }
        };

        let command = document.command_name().map(str::to_string);
        info!(
            "[DISPATCH] {} -> {}",
            topic,
            command.as_deref().unwrap_or("<none>")
        );

        let result = handler.handle(&document).await;
        match &result {
            CommandResult::Completed { message } => info!("  Command completed: {}", message),
            CommandResult::Pending { message } => info!("  Command running: {}", message),
            CommandResult::Failed { message } => warn!("  Command failed: {}", message),
            CommandResult::Rejected { message } => warn!("  Command rejected: {}", message),
        }

        Ok(Ack::new(topic, command.as_deref(), result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::WarnCounter;
    use crate::command::CommandHandler;
    use crate::hardware::HardwareError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts invocations and echoes the command name
    struct CountingHandler {
        topic: &'static str,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl CommandHandler for CountingHandler {
        fn topic(&self) -> &str {
            self.topic
        }

        async fn initialize(&self) -> Result<(), HardwareError> {
            Ok(())
        }

        async fn handle(&self, document: &CommandDocument) -> CommandResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match document.command_name() {
                Some(name) if name.eq_ignore_ascii_case("on") => CommandResult::Completed {
                    message: "on".into(),
                },
                _ => CommandResult::Rejected {
                    message: "unsupported".into(),
                },
            }
        }
    }

    fn dispatcher() -> (Dispatcher, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = HandlerRegistry::new();
        registry
            .register(Box::new(CountingHandler {
                topic: "device/control/led",
                calls: calls.clone(),
            }))
            .unwrap();
        (Dispatcher::new(Arc::new(registry)), calls)
    }

    #[tokio::test]
    async fn test_malformed_payload_never_reaches_handler() {
        let (dispatcher, calls) = dispatcher();
        let (warnings, _guard) = WarnCounter::install();

        let payloads: [&[u8]; 4] = [b"{not json", b"", b"[1,2,3]", b"\"ON\""];
        for payload in payloads {
            let result = dispatcher.on_message("device/control/led", payload).await;
            assert!(matches!(result, Err(DispatchError::Parse(_))));
            assert_eq!(warnings.take(), 1, "payload {:?}", payload);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_oversized_payload_is_a_parse_failure() {
        let (dispatcher, calls) = dispatcher();
        let (warnings, _guard) = WarnCounter::install();
        let payload = vec![b' '; actuator_shared::limits::MAX_PAYLOAD_BYTES + 1];

        let result = dispatcher.on_message("device/control/led", &payload).await;
        assert!(matches!(
            result,
            Err(DispatchError::Parse(CommandError::PayloadTooLarge(_)))
        ));
        assert_eq!(warnings.take(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_topic() {
        let (dispatcher, calls) = dispatcher();
        let (warnings, _guard) = WarnCounter::install();
        let result = dispatcher
            .on_message("device/control/fan", br#"{"command":"ON"}"#)
            .await;
        assert!(matches!(result, Err(DispatchError::NoHandler(t)) if t == "device/control/fan"));
        assert_eq!(warnings.take(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_resolved_message_produces_ack() {
        let (dispatcher, calls) = dispatcher();

        let (warnings, _guard) = WarnCounter::install();
        let ack = dispatcher
            .on_message("device/control/led", br#"{"command":"on"}"#)
            .await
            .unwrap();
        assert_eq!(warnings.take(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(ack.command, "ON");
        assert_eq!(ack.status, AckStatus::Completed);

        let json: serde_json::Value = serde_json::from_slice(&ack.to_json().unwrap()).unwrap();
        assert_eq!(json["topic"], "device/control/led");
        assert_eq!(json["status"], "completed");
        assert_eq!(json["message"], "on");
    }

    #[tokio::test]
    async fn test_rejection_is_reported_not_raised() {
        let (dispatcher, _) = dispatcher();
        let ack = dispatcher
            .on_message("device/control/led", br#"{"command":"DANCE"}"#)
            .await
            .unwrap();
        assert_eq!(ack.status, AckStatus::Rejected);
    }
}
