//! Connectivity for the agent
//!
//! This module handles:
//! - Bringing the network link up within a bounded attempt budget
//! - Opening the pub/sub session and resubscribing every handler topic
//! - Exponential backoff between failed session attempts
//! - Pumping inbound messages into the dispatcher

mod backoff;
mod supervisor;

pub use supervisor::{ConnectError, ConnectivitySupervisor, SupervisorConfig};
