//! Simulated outputs for running the agent on a development host

use super::{HardwareError, PinOutput, ToneOutput};
use std::time::Duration;
use tracing::{debug, info};

/// Pin that logs every level change
#[derive(Debug)]
pub struct SimulatedPin {
    pin: i32,
    configured: bool,
    level: u8,
}

impl SimulatedPin {
    pub fn new(pin: i32) -> Self {
        Self {
            pin,
            configured: false,
            level: 0,
        }
    }

    #[cfg(test)]
    pub fn level(&self) -> u8 {
        self.level
    }
}

impl PinOutput for SimulatedPin {
    fn configure(&mut self) -> Result<(), HardwareError> {
        if self.pin < 0 {
            return Err(HardwareError::InvalidPin(self.pin));
        }
        self.configured = true;
        self.level = 0;
        debug!("[GPIO{}] configured as output", self.pin);
        Ok(())
    }

    fn write(&mut self, high: bool) {
        self.write_level(if high { u8::MAX } else { 0 });
    }

    fn write_level(&mut self, level: u8) {
        if !self.configured || self.level == level {
            return;
        }
        self.level = level;
        info!("[GPIO{}] level={}", self.pin, level);
    }
}

/// Tone generator that logs frequency changes
#[derive(Debug)]
pub struct SimulatedTone {
    pin: i32,
    configured: bool,
    current: Option<u32>,
}

impl SimulatedTone {
    pub fn new(pin: i32) -> Self {
        Self {
            pin,
            configured: false,
            current: None,
        }
    }

    /// Frequency currently sounding, if any
    #[cfg(test)]
    pub fn current(&self) -> Option<u32> {
        self.current
    }
}

impl ToneOutput for SimulatedTone {
    fn configure(&mut self) -> Result<(), HardwareError> {
        if self.pin < 0 {
            return Err(HardwareError::InvalidPin(self.pin));
        }
        self.configured = true;
        debug!("[TONE{}] configured", self.pin);
        Ok(())
    }

    fn tone(&mut self, freq_hz: u32, amp: u8) {
        if !self.configured || self.current == Some(freq_hz) {
            return;
        }
        self.current = Some(freq_hz);
        debug!("[TONE{}] {} Hz amp={}", self.pin, freq_hz, amp);
    }

    fn tone_for(&mut self, freq_hz: u32, amp: u8, duration: Duration) {
        if !self.configured {
            return;
        }
        // the simulated timer expires immediately from the caller's point of view
        self.current = None;
        info!(
            "[TONE{}] {} Hz amp={} for {}ms",
            self.pin,
            freq_hz,
            amp,
            duration.as_millis()
        );
    }

    fn silence(&mut self) {
        if self.current.take().is_some() {
            debug!("[TONE{}] silent", self.pin);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_pin_is_rejected() {
        assert_eq!(
            SimulatedPin::new(-1).configure(),
            Err(HardwareError::InvalidPin(-1))
        );
        assert_eq!(
            SimulatedTone::new(-1).configure(),
            Err(HardwareError::InvalidPin(-1))
        );
    }

    #[test]
    fn test_unconfigured_pin_ignores_writes() {
        let mut pin = SimulatedPin::new(2);
        pin.write(true);
        assert_eq!(pin.level(), 0);

        pin.configure().unwrap();
        pin.write(true);
        assert_eq!(pin.level(), 255);
        pin.write_level(40);
        assert_eq!(pin.level(), 40);
    }

    #[test]
    fn test_tone_tracks_current_frequency() {
        let mut tone = SimulatedTone::new(4);
        tone.configure().unwrap();
        tone.tone(440, 200);
        assert_eq!(tone.current(), Some(440));
        tone.silence();
        assert_eq!(tone.current(), None);
    }
}
