//! Application configuration using Figment
//!
//! Configuration is loaded from:
//! 1. `config/taskrig.toml` (or a file given on the command line)
//! 2. Environment variables (prefixed with `TASKRIG_`, sections split on `__`)
//!
//! Every section has defaults, so an absent file yields a working configuration.
//! Per-rig classifier thresholds live in the device configuration files, see
//! [`crate::device_config`].
//!
//! # Example
//! ```no_run
//! use taskrig::config::AppConfig;
//!
//! let config = AppConfig::load()?;
//! println!("Polling every {} ms", config.poll.period_ms);
//! # Ok::<(), taskrig::error::RigError>(())
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppResult, RigError};
use crate::protocol::{codec::RECORD_SIZE, BAUDRATE, SERIAL_SEGMENT};
use crate::tracing_setup::OutputFormat;

/// Longest accepted poll period.
pub const MAX_POLL_PERIOD_MS: u64 = 1000;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Serial link settings
    pub serial: SerialConfig,
    /// Poll loop cadence
    pub poll: PollConfig,
    /// Device configuration selection
    pub device: DeviceSelection,
    /// Session log output
    pub session: SessionConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log line layout (pretty, compact, json)
    pub log_format: OutputFormat,
    /// Log span open/close events
    pub log_spans: bool,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "taskrig".to_string(),
            log_level: "info".to_string(),
            log_format: OutputFormat::default(),
            log_spans: false,
        }
    }
}

/// Serial link configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Explicit port path. When absent the first board with the rig's USB ids is used.
    pub port: Option<String>,
    /// Baud rate
    pub baud_rate: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: BAUDRATE,
        }
    }
}

/// Poll loop configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Tick period in milliseconds
    pub period_ms: u64,
    /// A tick decodes only when more than this many bytes are buffered
    pub min_segment: usize,
    /// Capacity of the outbound event channel
    pub event_channel_capacity: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            period_ms: 25,
            min_segment: SERIAL_SEGMENT,
            event_channel_capacity: 256,
        }
    }
}

impl PollConfig {
    /// Tick period as a `Duration`.
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

/// Which device configuration to run with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSelection {
    /// Device id (file stem in `config_dir`)
    pub id: String,
    /// Folder holding device configuration files
    pub config_dir: PathBuf,
}

impl Default for DeviceSelection {
    fn default() -> Self {
        Self {
            id: "default".to_string(),
            config_dir: PathBuf::from("config/devices"),
        }
    }
}

/// Session log configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Output folder. Defaults to `~/taskrig-logs`.
    pub log_root: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from `config/taskrig.toml` and environment variables
    ///
    /// Environment variables can override configuration with prefix `TASKRIG_`.
    /// Example: `TASKRIG_POLL__PERIOD_MS=10`
    pub fn load() -> AppResult<Self> {
        Self::load_from("config/taskrig.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config: Self = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("TASKRIG_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(RigError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.poll.period_ms == 0 || self.poll.period_ms > MAX_POLL_PERIOD_MS {
            return Err(RigError::Configuration(format!(
                "Invalid poll.period_ms {}. Must be 1-{MAX_POLL_PERIOD_MS}",
                self.poll.period_ms
            )));
        }

        // below one framed record the codec could never make progress
        if self.poll.min_segment < RECORD_SIZE {
            return Err(RigError::Configuration(format!(
                "Invalid poll.min_segment {}. Must be at least {RECORD_SIZE}",
                self.poll.min_segment
            )));
        }

        if self.poll.event_channel_capacity == 0 {
            return Err(RigError::Configuration(
                "poll.event_channel_capacity must be positive".to_string(),
            ));
        }

        if self.serial.baud_rate == 0 {
            return Err(RigError::Configuration(
                "serial.baud_rate must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Session log folder, falling back to the home directory default.
    pub fn log_root(&self) -> PathBuf {
        self.session
            .log_root
            .clone()
            .unwrap_or_else(crate::session::default_log_root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.poll.period(), Duration::from_millis(25));
        assert_eq!(config.serial.baud_rate, BAUDRATE);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let config = AppConfig::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.poll, PollConfig::default());
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("taskrig.toml");
        fs::write(
            &path,
            "[poll]\nperiod_ms = 10\n[device]\nid = \"rig_a\"\n[serial]\nport = \"/dev/ttyACM1\"\n",
        )
        .unwrap();
        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.poll.period_ms, 10);
        assert_eq!(config.poll.min_segment, SERIAL_SEGMENT);
        assert_eq!(config.device.id, "rig_a");
        assert_eq!(config.serial.port.as_deref(), Some("/dev/ttyACM1"));
    }

    #[test]
    fn log_format_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("taskrig.toml");
        fs::write(
            &path,
            "[application]\nlog_format = \"json\"\nlog_spans = true\n",
        )
        .unwrap();
        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.application.log_format, OutputFormat::Json);
        assert!(config.application.log_spans);

        fs::write(&path, "[application]\nlog_format = \"fancy\"\n").unwrap();
        assert!(AppConfig::load_from(&path).is_err());
    }

    #[test]
    fn zero_period_rejected() {
        let mut config = AppConfig::default();
        config.poll.period_ms = 0;
        assert!(config.validate().is_err());
        config.poll.period_ms = MAX_POLL_PERIOD_MS + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn small_segment_rejected() {
        let mut config = AppConfig::default();
        config.poll.min_segment = RECORD_SIZE - 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_log_level_rejected() {
        let mut config = AppConfig::default();
        config.application.log_level = "loud".to_string();
        assert!(config.validate().is_err());
    }
}
