//! Custom error types for the rig controller.
//!
//! This module defines the primary error type, `RigError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the failures that can occur between the serial link, the configuration files and
//! the polling loop.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps errors from `figment`, raised while loading the application
//!   configuration (file parsing, environment overrides, missing fields).
//! - **`DeviceConfigParse`**: A device configuration file is not valid TOML.
//! - **`Configuration`**: Semantic errors in configuration that pass parsing but are
//!   logically incorrect, including a missing threshold key or a broken `base` chain.
//!   These are fatal at construction time and are never replaced by defaults.
//! - **`Io`**: Wraps `std::io::Error` for transport reads/writes and session log files.
//! - **`Serial`**: Errors reported by the `serialport` crate while opening or
//!   configuring the port.
//! - **`DeviceNotFound`**: No connected serial device matches the rig's USB identifiers.
//! - **`InvalidState`**: A poll loop operation was requested in a state that does not
//!   allow it (e.g. ticking a stopped loop).
//! - **`InvalidVolume`** / **`RewardOverflow`**: The reward converter refused a
//!   requested volume.
//!
//! Partial reads and garbled bytes on the wire are deliberately absent: they are
//! recovered from silently by the packet codec.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, RigError>;

#[allow(missing_docs)]
#[derive(Error, Debug)]
pub enum RigError {
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Device configuration parse error: {0}")]
    DeviceConfigParse(#[from] toml::de::Error),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session log serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "instrument_serial")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("Serial support not enabled. Rebuild with --features instrument_serial")]
    SerialFeatureDisabled,

    #[error("Please plug in your {0} device")]
    DeviceNotFound(String),

    #[error("Invalid poll loop transition: cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("Invalid reward volume {0}: must be finite and non-negative")]
    InvalidVolume(f64),

    #[error("Reward duration {0} ms does not fit the actuation command")]
    RewardOverflow(f64),

    #[error("Rig command channel closed")]
    ChannelClosed,
}

impl From<figment::Error> for RigError {
    fn from(value: figment::Error) -> Self {
        RigError::Config(Box::new(value))
    }
}
