//! Command handlers for the device's actuators

mod buzzer;
mod led;

pub use buzzer::BuzzerHandler;
pub use led::LedHandler;

use crate::hardware::HardwareError;
use actuator_shared::CommandDocument;
use async_trait::async_trait;

/// Result of command execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    /// Command accepted and completed successfully
    Completed { message: String },
    /// Command accepted but execution failed
    Failed { message: String },
    /// Command rejected (unknown, malformed, unsupported)
    Rejected { message: String },
    /// Command accepted and running in the background
    Pending { message: String },
}

impl CommandResult {
    pub fn message(&self) -> &str {
        match self {
            CommandResult::Completed { message }
            | CommandResult::Failed { message }
            | CommandResult::Rejected { message }
            | CommandResult::Pending { message } => message,
        }
    }
}

/// The unit owning one topic: validates its commands and applies their effects
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Topic this handler serves
    fn topic(&self) -> &str;

    /// Prepare the hardware; a failure leaves the handler registered but inert
    async fn initialize(&self) -> Result<(), HardwareError>;

    /// Validate and execute a command. Must not wait on long-running effects.
    async fn handle(&self, document: &CommandDocument) -> CommandResult;

    /// Release hardware before the process exits
    async fn shutdown(&self) {}
}
