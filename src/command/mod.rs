//! Command handling for the agent
//!
//! This module handles:
//! - Mapping topics to the handler that owns them
//! - Parsing inbound payloads and dispatching them to handlers
//! - Producing acknowledgements for the status topic

mod dispatcher;
pub mod handlers;
mod registry;

pub use dispatcher::{Ack, Dispatcher};
pub use handlers::{BuzzerHandler, CommandHandler, CommandResult, LedHandler};
pub use registry::HandlerRegistry;
