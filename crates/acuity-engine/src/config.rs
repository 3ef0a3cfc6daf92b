//! Engine configuration loaded from TOML.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub feedback: FeedbackConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

impl Config {
    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), EngineError> {
        let d = &self.detection;
        if d.observation_interval_ms == 0 {
            return Err(EngineError::Config(
                "detection.observation_interval_ms must be greater than zero".to_string(),
            ));
        }
        if d.notification_interval_ms < d.observation_interval_ms {
            return Err(EngineError::Config(format!(
                "detection.notification_interval_ms ({}) must be at least observation_interval_ms ({})",
                d.notification_interval_ms, d.observation_interval_ms
            )));
        }
        if !(0.0..=1.0).contains(&d.open_threshold) {
            return Err(EngineError::Config(format!(
                "detection.open_threshold must be within [0, 1], got {}",
                d.open_threshold
            )));
        }
        if self.server.max_line_length == 0 {
            return Err(EngineError::Config(
                "server.max_line_length must be greater than zero".to_string(),
            ));
        }
        if self.engine.event_queue_capacity == 0 {
            return Err(EngineError::Config(
                "engine.event_queue_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Exam-server connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port used when the entered address has none. Deployments have used
    /// both 9699 and 9099, so nothing is assumed.
    #[serde(default)]
    pub default_port: Option<u16>,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,
}

impl ServerConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            default_port: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            max_line_length: default_max_line_length(),
        }
    }
}

/// Eye detection and vote aggregation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Minimum spacing between accepted observations.
    #[serde(default = "default_observation_interval_ms")]
    pub observation_interval_ms: u64,
    /// Length of one vote window; capacity is this over the observation interval.
    #[serde(default = "default_notification_interval_ms")]
    pub notification_interval_ms: u64,
    /// Quiet period after a window is flushed.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// An eye counts as open when its probability is strictly above this.
    #[serde(default = "default_open_threshold")]
    pub open_threshold: f32,
    /// Front camera: the detector's right eye is the subject's left.
    #[serde(default = "default_true")]
    pub mirror_eyes: bool,
}

impl DetectionConfig {
    pub fn observation_interval(&self) -> Duration {
        Duration::from_millis(self.observation_interval_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Number of votes in a full window.
    pub fn window_capacity(&self) -> usize {
        let capacity = self
            .notification_interval_ms
            .checked_div(self.observation_interval_ms)
            .unwrap_or(0);
        usize::try_from(capacity).unwrap_or(usize::MAX)
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            observation_interval_ms: default_observation_interval_ms(),
            notification_interval_ms: default_notification_interval_ms(),
            debounce_ms: default_debounce_ms(),
            open_threshold: default_open_threshold(),
            mirror_eyes: true,
        }
    }
}

/// Answer feedback settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackConfig {
    /// How long the correct/incorrect dialog stays up.
    #[serde(default = "default_feedback_display_ms")]
    pub display_ms: u64,
    /// Give up waiting for the server's verdict after this long. Unset waits
    /// forever.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl FeedbackConfig {
    pub fn display(&self) -> Duration {
        Duration::from_millis(self.display_ms)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            display_ms: default_feedback_display_ms(),
            timeout_ms: None,
        }
    }
}

/// Event loop and runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_queue_capacity: default_event_queue_capacity(),
            log_level: default_log_level(),
        }
    }
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_max_line_length() -> usize {
    acuity_protocol::wire::DEFAULT_MAX_LINE_LENGTH
}

fn default_observation_interval_ms() -> u64 {
    100
}

fn default_notification_interval_ms() -> u64 {
    2_000
}

fn default_debounce_ms() -> u64 {
    2_000
}

fn default_open_threshold() -> f32 {
    0.96
}

fn default_true() -> bool {
    true
}

fn default_feedback_display_ms() -> u64 {
    1_000
}

fn default_event_queue_capacity() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("observation_interval_ms = 100"));
        assert!(!toml_str.contains("default_port"));
    }

    #[test]
    fn default_window_capacity_is_twenty() {
        assert_eq!(DetectionConfig::default().window_capacity(), 20);
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn parse_example_config() {
        let toml_str = r#"
[server]
default_port = 9099
connect_timeout_ms = 2500

[detection]
observation_interval_ms = 50
notification_interval_ms = 1000
open_threshold = 0.9
mirror_eyes = false

[feedback]
display_ms = 750
timeout_ms = 15000

[engine]
log_level = "debug"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.default_port, Some(9099));
        assert_eq!(config.server.connect_timeout(), Duration::from_millis(2500));
        assert_eq!(config.server.max_line_length, 4096);
        assert_eq!(config.detection.window_capacity(), 20);
        assert_eq!(config.detection.debounce_ms, 2000);
        assert!(!config.detection.mirror_eyes);
        assert_eq!(config.feedback.timeout(), Some(Duration::from_secs(15)));
        assert_eq!(config.engine.log_level, "debug");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.default_port, None);
        assert_eq!(config.feedback.timeout(), None);
        assert_eq!(config.feedback.display(), Duration::from_secs(1));
    }

    #[test]
    fn validate_rejects_unusable_detection() {
        let mut config = Config::default();
        config.detection.observation_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.detection.notification_interval_ms = 50;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.detection.open_threshold = 1.5;
        assert!(config.validate().is_err());
    }
}
