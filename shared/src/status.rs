//! Session transport status codes
//!
//! Codes follow the conventional pub/sub client state table: negative values
//! are client-side conditions, positive values are broker CONNACK refusals.

use std::fmt;

/// How a connect failure should be treated by the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Network-level condition; retry with backoff
    Transient,
    /// Broker refused this client; still retried, but logged distinctly
    Rejected,
}

/// Session-layer status reported by a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    ConnectionTimeout,
    ConnectionLost,
    ConnectFailed,
    Disconnected,
    Connected,
    BadProtocol,
    BadClientId,
    Unavailable,
    BadCredentials,
    Unauthorized,
    /// A code outside the known table
    Unknown(i32),
}

impl SessionStatus {
    /// Map a raw transport status code
    pub fn from_code(code: i32) -> Self {
        match code {
            -4 => SessionStatus::ConnectionTimeout,
            -3 => SessionStatus::ConnectionLost,
            -2 => SessionStatus::ConnectFailed,
            -1 => SessionStatus::Disconnected,
            0 => SessionStatus::Connected,
            1 => SessionStatus::BadProtocol,
            2 => SessionStatus::BadClientId,
            3 => SessionStatus::Unavailable,
            4 => SessionStatus::BadCredentials,
            5 => SessionStatus::Unauthorized,
            other => SessionStatus::Unknown(other),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            SessionStatus::ConnectionTimeout => -4,
            SessionStatus::ConnectionLost => -3,
            SessionStatus::ConnectFailed => -2,
            SessionStatus::Disconnected => -1,
            SessionStatus::Connected => 0,
            SessionStatus::BadProtocol => 1,
            SessionStatus::BadClientId => 2,
            SessionStatus::Unavailable => 3,
            SessionStatus::BadCredentials => 4,
            SessionStatus::Unauthorized => 5,
            SessionStatus::Unknown(code) => *code,
        }
    }

    /// Classify a failure status
    pub fn class(&self) -> FailureClass {
        match self {
            SessionStatus::BadCredentials | SessionStatus::Unauthorized => FailureClass::Rejected,
            _ => FailureClass::Transient,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SessionStatus::ConnectionTimeout => "connection timeout",
            SessionStatus::ConnectionLost => "connection lost",
            SessionStatus::ConnectFailed => "connect failed",
            SessionStatus::Disconnected => "disconnected",
            SessionStatus::Connected => "connected",
            SessionStatus::BadProtocol => "bad protocol",
            SessionStatus::BadClientId => "bad client id",
            SessionStatus::Unavailable => "server unavailable",
            SessionStatus::BadCredentials => "bad credentials",
            SessionStatus::Unauthorized => "unauthorized",
            SessionStatus::Unknown(_) => "unknown status",
        };
        write!(f, "{} (rc={})", text, self.code())
    }
}
