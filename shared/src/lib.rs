//! Actuator Agent Shared Types
//!
//! This crate provides the I/O-free building blocks of the actuator agent:
//! the command and score model, the playback and connection state machines,
//! and the session status classification.

pub mod command;
pub mod state_machine;
pub mod status;

use std::time::{SystemTime, UNIX_EPOCH};

// Re-export commonly used types at crate root
pub use command::{Command, CommandDocument, CommandError, Note, Score};
pub use state_machine::{ConnectionState, LinkState, PlaybackState, SessionState};
pub use status::{FailureClass, SessionStatus};

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Timing parameters for playback and connectivity
pub mod timing {
    /// Tempo used when a score carries none or a non-positive one
    pub const DEFAULT_TEMPO_BPM: u32 = 120;

    /// Silence inserted after a note that is not tied to the next one
    pub const NOTE_GAP_MS: u64 = 20;

    /// Resolution of glide sampling and cancellation polling
    pub const TICK_MS: u64 = 1;

    /// Time a superseded playback session gets to observe its stop signal
    pub const STOP_GRACE_MS: u64 = 50;

    /// Frequency used by the buzzer ON and BEEP commands
    pub const BEEP_FREQ_HZ: u32 = 1000;

    /// BEEP duration bounds and default
    pub const BEEP_DEFAULT_MS: u64 = 100;
    pub const BEEP_MIN_MS: u64 = 10;
    pub const BEEP_MAX_MS: u64 = 10_000;

    /// Link establishment budget
    pub const LINK_MAX_ATTEMPTS: u32 = 30;
    pub const LINK_ATTEMPT_INTERVAL_MS: u64 = 500;

    /// How often an established link is re-probed
    pub const LINK_CHECK_INTERVAL_MS: u64 = 30_000;

    /// Session reconnect backoff bounds
    pub const BACKOFF_INITIAL_MS: u64 = 1000;
    pub const BACKOFF_MAX_MS: u64 = 30_000;

    /// MQTT keep-alive advertised to the broker
    pub const KEEP_ALIVE_SECS: u16 = 60;
}

/// Limits applied to inbound payloads
pub mod limits {
    /// Largest command payload accepted by the dispatcher
    pub const MAX_PAYLOAD_BYTES: usize = 4096;

    /// Longest score accepted by PLAY_SONG
    pub const MAX_SCORE_NOTES: usize = 512;

    /// Amplitude used when a note carries none
    pub const DEFAULT_AMPLITUDE: u8 = 200;
}
