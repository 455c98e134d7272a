//! Actuator outputs
//!
//! Handlers and the sequencer drive hardware only through these traits, so
//! board support and the simulated host outputs are interchangeable.

mod simulated;

pub use simulated::{SimulatedPin, SimulatedTone};

use std::time::Duration;
use thiserror::Error;

/// Errors raised while configuring an output
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HardwareError {
    #[error("Invalid pin assignment: {0}")]
    InvalidPin(i32),

    #[error("Output is not configured")]
    NotConfigured,
}

/// A digital/PWM output pin
pub trait PinOutput: Send + 'static {
    /// Configure the pin as an output and drive it low
    fn configure(&mut self) -> Result<(), HardwareError>;

    /// Drive the pin fully high or low
    fn write(&mut self, high: bool);

    /// Set a PWM level (0..=255)
    fn write_level(&mut self, level: u8);
}

/// A square-wave tone generator
pub trait ToneOutput: Send + 'static {
    /// Configure the generator
    fn configure(&mut self) -> Result<(), HardwareError>;

    /// Start (or retune) a continuous tone
    fn tone(&mut self, freq_hz: u32, amp: u8);

    /// Start a tone that the generator stops by itself after `duration`
    fn tone_for(&mut self, freq_hz: u32, amp: u8, duration: Duration);

    /// Stop any tone
    fn silence(&mut self);
}
