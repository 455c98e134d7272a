//! LED command handler

use super::{CommandHandler, CommandResult};
use crate::hardware::{HardwareError, PinOutput};
use actuator_shared::{Command, CommandDocument};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::info;

/// Handles ON / OFF / SET_BRIGHTNESS for a single LED pin
pub struct LedHandler {
    topic: String,
    pin: Mutex<Box<dyn PinOutput>>,
    ready: AtomicBool,
}

impl LedHandler {
    pub fn new(topic: impl Into<String>, pin: Box<dyn PinOutput>) -> Self {
        Self {
            topic: topic.into(),
            pin: Mutex::new(pin),
            ready: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl CommandHandler for LedHandler {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn initialize(&self) -> Result<(), HardwareError> {
        self.pin.lock().await.configure()?;
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn handle(&self, document: &CommandDocument) -> CommandResult {
        let command = match Command::from_document(document) {
            Ok(command) => command,
            Err(e) => {
                return CommandResult::Rejected {
                    message: e.to_string(),
                }
            }
        };

        if !self.ready.load(Ordering::SeqCst) {
            return CommandResult::Failed {
                message: "LED output not initialized".into(),
            };
        }

        let mut pin = self.pin.lock().await;
        match command {
            Command::On => {
                pin.write(true);
                info!("  [LED] on");
                CommandResult::Completed {
                    message: "LED on".into(),
                }
            }
            Command::Off => {
                pin.write(false);
                info!("  [LED] off");
                CommandResult::Completed {
                    message: "LED off".into(),
                }
            }
            Command::SetBrightness { brightness } => {
                pin.write_level(brightness);
                info!("  [LED] brightness {}", brightness);
                CommandResult::Completed {
                    message: format!("LED brightness set to {}", brightness),
                }
            }
            other => CommandResult::Rejected {
                message: format!("{} is not supported by the LED", other.name()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// Pin whose level is observable from the test
    #[derive(Clone, Default)]
    struct SharedPin {
        level: Arc<std::sync::Mutex<Option<u8>>>,
        invalid: bool,
    }

    impl PinOutput for SharedPin {
        fn configure(&mut self) -> Result<(), HardwareError> {
            if self.invalid {
                return Err(HardwareError::InvalidPin(-1));
            }
            *self.level.lock().unwrap() = Some(0);
            Ok(())
        }

        fn write(&mut self, high: bool) {
            self.write_level(if high { 255 } else { 0 });
        }

        fn write_level(&mut self, level: u8) {
            *self.level.lock().unwrap() = Some(level);
        }
    }

    fn doc(json: &str) -> CommandDocument {
        CommandDocument::parse(json.as_bytes()).unwrap()
    }

    async fn ready_handler() -> (LedHandler, SharedPin) {
        let pin = SharedPin::default();
        let handler = LedHandler::new("device/control/led", Box::new(pin.clone()));
        handler.initialize().await.unwrap();
        (handler, pin)
    }

    #[tokio::test]
    async fn test_on_off() {
        let (handler, pin) = ready_handler().await;

        let result = handler.handle(&doc(r#"{"command":"on"}"#)).await;
        assert!(matches!(result, CommandResult::Completed { .. }));
        assert_eq!(*pin.level.lock().unwrap(), Some(255));

        handler.handle(&doc(r#"{"command":"OFF"}"#)).await;
        assert_eq!(*pin.level.lock().unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_brightness_is_clamped() {
        let (handler, pin) = ready_handler().await;

        handler
            .handle(&doc(r#"{"command":"SET_BRIGHTNESS","brightness":300}"#))
            .await;
        assert_eq!(*pin.level.lock().unwrap(), Some(255));

        handler
            .handle(&doc(r#"{"command":"SET_BRIGHTNESS","brightness":-5}"#))
            .await;
        assert_eq!(*pin.level.lock().unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_invalid_commands_leave_pin_untouched() {
        let (handler, pin) = ready_handler().await;
        handler
            .handle(&doc(r#"{"command":"SET_BRIGHTNESS","brightness":90}"#))
            .await;

        for json in [
            r#"{"command":"SET_BRIGHTNESS"}"#,
            r#"{"command":"BLINK"}"#,
            r#"{"command":"BEEP"}"#,
            r#"{"brightness":10}"#,
        ] {
            let result = handler.handle(&doc(json)).await;
            assert!(matches!(result, CommandResult::Rejected { .. }), "{}", json);
        }
        assert_eq!(*pin.level.lock().unwrap(), Some(90));
    }

    #[tokio::test]
    async fn test_uninitialized_handler_fails_gracefully() {
        let pin = SharedPin {
            invalid: true,
            ..Default::default()
        };
        let handler = LedHandler::new("device/control/led", Box::new(pin.clone()));
        assert!(handler.initialize().await.is_err());

        let result = handler.handle(&doc(r#"{"command":"ON"}"#)).await;
        assert!(matches!(result, CommandResult::Failed { .. }));
        assert_eq!(*pin.level.lock().unwrap(), None);
    }
}
