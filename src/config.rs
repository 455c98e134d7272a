//! Configuration loading

use crate::connection::SupervisorConfig;
use crate::playback::SequencerConfig;
use crate::transport::SessionCredentials;
use actuator_shared::timing;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "AGENT_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "config.json";
const RETRY_INTERVAL: Duration = Duration::from_secs(3);

pub const DEFAULT_LED_TOPIC: &str = "device/control/led";
pub const DEFAULT_BUZZER_TOPIC: &str = "device/control/buzzer";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Agent configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Device identity; also the default client id.
    #[serde(default = "default_device_id")]
    pub device_id: String,
    pub link: LinkConfig,
    pub broker: BrokerConfig,
    #[serde(default)]
    pub handlers: HandlersConfig,
    /// Topic command acknowledgements are published on.
    #[serde(default)]
    pub status_topic: Option<String>,
    #[serde(default)]
    pub timing: TimingConfig,
}

/// Network link settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkConfig {
    /// Network name (e.g. SSID).
    pub name: String,
    #[serde(default = "default_link_attempts")]
    pub attempts: u32,
    #[serde(default = "default_link_attempt_interval_ms")]
    pub attempt_interval_ms: u64,
    #[serde(default = "default_link_check_interval_ms")]
    pub check_interval_ms: u64,
}

/// Broker connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u16,
}

/// Per-actuator settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HandlerConfig {
    /// Output pin; missing or negative leaves the handler inert.
    #[serde(default)]
    pub pin: Option<i32>,
    #[serde(default)]
    pub topic: Option<String>,
}

impl HandlerConfig {
    pub fn pin_or_invalid(&self) -> i32 {
        self.pin.unwrap_or(-1)
    }

    pub fn topic_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.topic.as_deref().unwrap_or(default)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HandlersConfig {
    #[serde(default)]
    pub led: HandlerConfig,
    #[serde(default)]
    pub buzzer: HandlerConfig,
}

/// Timing overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
    pub loop_interval_ms: u64,
    pub stop_grace_ms: u64,
    pub note_gap_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            backoff_initial_ms: timing::BACKOFF_INITIAL_MS,
            backoff_max_ms: timing::BACKOFF_MAX_MS,
            loop_interval_ms: 10,
            stop_grace_ms: timing::STOP_GRACE_MS,
            note_gap_ms: timing::NOTE_GAP_MS,
        }
    }
}

fn default_device_id() -> String {
    "actuator-agent".into()
}

fn default_port() -> u16 {
    1883
}

fn default_keep_alive_secs() -> u16 {
    timing::KEEP_ALIVE_SECS
}

fn default_link_attempts() -> u32 {
    timing::LINK_MAX_ATTEMPTS
}

fn default_link_attempt_interval_ms() -> u64 {
    timing::LINK_ATTEMPT_INTERVAL_MS
}

fn default_link_check_interval_ms() -> u64 {
    timing::LINK_CHECK_INTERVAL_MS
}

impl Config {
    /// Load and validate configuration from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse and validate configuration text.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.link.name.trim().is_empty() {
            return Err(ConfigError::Invalid("link.name is required".into()));
        }
        if self.broker.host.trim().is_empty() {
            return Err(ConfigError::Invalid("broker.host is required".into()));
        }
        if self.link.attempts == 0 {
            return Err(ConfigError::Invalid("link.attempts must be positive".into()));
        }
        if self.timing.backoff_initial_ms == 0 {
            return Err(ConfigError::Invalid(
                "timing.backoff_initial_ms must be positive".into(),
            ));
        }
        if self.timing.backoff_max_ms < self.timing.backoff_initial_ms {
            return Err(ConfigError::Invalid(
                "timing.backoff_max_ms must not be below backoff_initial_ms".into(),
            ));
        }
        if self.timing.loop_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "timing.loop_interval_ms must be positive".into(),
            ));
        }
        if self.handlers.led.pin_or_invalid() < 0 {
            warn!("LED pin not configured; LED commands will fail");
        }
        if self.handlers.buzzer.pin_or_invalid() < 0 {
            warn!("Buzzer pin not configured; buzzer commands will fail");
        }
        Ok(())
    }

    pub fn led_topic(&self) -> &str {
        self.handlers.led.topic_or(DEFAULT_LED_TOPIC)
    }

    pub fn buzzer_topic(&self) -> &str {
        self.handlers.buzzer.topic_or(DEFAULT_BUZZER_TOPIC)
    }

    pub fn loop_interval(&self) -> Duration {
        Duration::from_millis(self.timing.loop_interval_ms)
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            credentials: SessionCredentials {
                client_id: self
                    .broker
                    .client_id
                    .clone()
                    .unwrap_or_else(|| self.device_id.clone()),
                username: self.broker.username.clone(),
                password: self.broker.password.clone(),
                keep_alive_secs: self.broker.keep_alive_secs,
            },
            status_topic: self.status_topic.clone(),
            link_attempts: self.link.attempts,
            link_attempt_interval: Duration::from_millis(self.link.attempt_interval_ms),
            link_check_interval: Duration::from_millis(self.link.check_interval_ms),
            backoff_initial: Duration::from_millis(self.timing.backoff_initial_ms),
            backoff_max: Duration::from_millis(self.timing.backoff_max_ms),
            poll_budget: self.loop_interval(),
        }
    }

    pub fn sequencer_config(&self) -> SequencerConfig {
        SequencerConfig {
            note_gap: Duration::from_millis(self.timing.note_gap_ms),
            stop_grace: Duration::from_millis(self.timing.stop_grace_ms),
            ..SequencerConfig::default()
        }
    }
}

/// Config path: first CLI argument, else `AGENT_CONFIG`, else `config.json`.
pub fn resolve_path(arg: Option<String>, env: Option<String>) -> PathBuf {
    arg.or(env)
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Keep trying until a valid configuration loads.
pub async fn load_with_retry(path: &Path) -> Config {
    loop {
        match Config::load(path) {
            Ok(config) => {
                info!("Loaded config from {}", path.display());
                return config;
            }
            Err(e) => {
                error!(
                    "Config {} unusable: {}; retrying in {}s",
                    path.display(),
                    e,
                    RETRY_INTERVAL.as_secs()
                );
                tokio::time::sleep(RETRY_INTERVAL).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "link": { "name": "lab-net" },
        "broker": { "host": "broker.local" }
    }"#;

    #[test]
    fn minimal_config_uses_defaults() {
        let config = Config::from_json(MINIMAL).unwrap();
        assert_eq!(config.device_id, "actuator-agent");
        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.broker.keep_alive_secs, 60);
        assert_eq!(config.led_topic(), DEFAULT_LED_TOPIC);
        assert_eq!(config.buzzer_topic(), DEFAULT_BUZZER_TOPIC);
        assert_eq!(config.handlers.led.pin_or_invalid(), -1);
        assert_eq!(config.status_topic, None);
        assert_eq!(config.loop_interval(), Duration::from_millis(10));

        let sup = config.supervisor_config();
        assert_eq!(sup.credentials.client_id, "actuator-agent");
        assert_eq!(sup.link_attempts, 30);
        assert_eq!(sup.link_attempt_interval, Duration::from_millis(500));
        assert_eq!(sup.backoff_initial, Duration::from_secs(1));
        assert_eq!(sup.backoff_max, Duration::from_secs(30));

        let seq = config.sequencer_config();
        assert_eq!(seq.note_gap, Duration::from_millis(20));
        assert_eq!(seq.stop_grace, Duration::from_millis(50));
    }

    #[test]
    fn full_config_overrides_defaults() {
        let config = Config::from_json(
            r#"{
                "device_id": "bench-7",
                "link": { "name": "lab-net", "password": "pw", "attempts": 5 },
                "broker": {
                    "host": "10.0.0.2", "port": 1884,
                    "username": "dev", "password": "secret", "keep_alive_secs": 15
                },
                "handlers": {
                    "led": { "pin": 2, "topic": "bench/led" },
                    "buzzer": { "pin": 4 }
                },
                "status_topic": "bench/status",
                "timing": { "backoff_max_ms": 8000, "note_gap_ms": 0 }
            }"#,
        )
        .unwrap();

        assert_eq!(config.led_topic(), "bench/led");
        assert_eq!(config.buzzer_topic(), DEFAULT_BUZZER_TOPIC);
        assert_eq!(config.handlers.buzzer.pin_or_invalid(), 4);

        let sup = config.supervisor_config();
        assert_eq!(sup.credentials.client_id, "bench-7");
        assert_eq!(sup.credentials.username.as_deref(), Some("dev"));
        assert_eq!(sup.credentials.keep_alive_secs, 15);
        assert_eq!(sup.status_topic.as_deref(), Some("bench/status"));
        assert_eq!(sup.link_attempts, 5);
        assert_eq!(sup.backoff_initial, Duration::from_secs(1));
        assert_eq!(sup.backoff_max, Duration::from_secs(8));
        assert_eq!(config.sequencer_config().note_gap, Duration::ZERO);
    }

    #[test]
    fn missing_or_blank_required_fields_are_rejected() {
        assert!(matches!(
            Config::from_json(r#"{ "link": { "name": "x" } }"#),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            Config::from_json(r#"{ "link": { "name": "x" }, "broker": { "host": " " } }"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_json(r#"{ "link": { "name": "" }, "broker": { "host": "b" } }"#),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn zero_or_inverted_backoff_is_rejected() {
        let with_timing = |timing: &str| {
            Config::from_json(&format!(
                r#"{{ "link": {{ "name": "x" }}, "broker": {{ "host": "b" }}, "timing": {} }}"#,
                timing
            ))
        };
        assert!(matches!(
            with_timing(r#"{ "backoff_initial_ms": 0 }"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            with_timing(r#"{ "backoff_initial_ms": 5000, "backoff_max_ms": 1000 }"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(with_timing(r#"{ "backoff_initial_ms": 250 }"#).is_ok());
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(
            Config::load("/nonexistent/agent-config.json"),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn path_resolution_order() {
        assert_eq!(
            resolve_path(Some("a.json".into()), Some("b.json".into())),
            PathBuf::from("a.json")
        );
        assert_eq!(resolve_path(None, Some("b.json".into())), PathBuf::from("b.json"));
        assert_eq!(resolve_path(None, None), PathBuf::from("config.json"));
    }
}
