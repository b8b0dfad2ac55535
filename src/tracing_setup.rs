//! Tracing initialization
//!
//! Installs the global `tracing-subscriber` for the binary. Output format, level and
//! span lifecycle events come from the `[application]` section:
//!
//! ```toml
//! [application]
//! log_level = "debug"
//! log_format = "json"   # pretty | compact | json
//! log_spans = true      # log poll loop span open/close
//! ```
//!
//! `RUST_LOG` takes precedence over `log_level` when set.

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::config::AppConfig;

/// Log line layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Multi-line, colored; for watching a session live.
    Pretty,
    /// One line per event.
    #[default]
    Compact,
    /// One JSON object per event, for log shippers.
    Json,
}

/// Resolved subscriber settings.
#[derive(Debug, Clone, PartialEq)]
pub struct TracingConfig {
    /// Default level when `RUST_LOG` is unset.
    pub level: Level,
    /// Line layout.
    pub format: OutputFormat,
    /// Log span open and close.
    pub span_events: bool,
}

impl TracingConfig {
    /// Settings from the `[application]` section.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, String> {
        Ok(Self {
            level: parse_log_level(&config.application.log_level)?,
            format: config.application.log_format,
            span_events: config.application.log_spans,
        })
    }

    fn span_events(&self) -> FmtSpan {
        if self.span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }
}

/// Install the subscriber described by the application configuration.
pub fn init_from_config(config: &AppConfig) -> Result<(), String> {
    init(&TracingConfig::from_app_config(config)?)
}

/// Install the global subscriber.
///
/// Returns `Ok(())` without changes if one is already installed.
pub fn init(config: &TracingConfig) -> Result<(), String> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str().to_lowercase()));

    let layer = match config.format {
        OutputFormat::Pretty => fmt::layer()
            .pretty()
            .with_span_events(config.span_events())
            .with_filter(filter)
            .boxed(),
        OutputFormat::Compact => fmt::layer()
            .compact()
            .with_span_events(config.span_events())
            .with_ansi(false)
            .with_filter(filter)
            .boxed(),
        OutputFormat::Json => fmt::layer()
            .json()
            .with_span_events(config.span_events())
            .with_filter(filter)
            .boxed(),
    };

    match tracing_subscriber::registry().with(layer).try_init() {
        Ok(()) => Ok(()),
        Err(err) if err.to_string().contains("already been set") => {
            tracing::debug!(error = %err, "Tracing already initialized");
            Ok(())
        }
        Err(err) => Err(format!("Failed to initialize tracing: {err}")),
    }
}

fn parse_log_level(level: &str) -> Result<Level, String> {
    level
        .parse::<Level>()
        .map_err(|_| format!("Invalid log level '{level}'"))
}
