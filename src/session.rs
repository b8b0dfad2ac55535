//! Session record for a rig run.
//!
//! The poll loop reports everything it observes and every command it sends to an
//! [`EventRecorder`]. [`SessionLog`] is the file-backed recorder: it keeps the raw
//! lever traces, sound onsets, timestamped non-classified signals, classified events
//! and commands, plus the resolved device configuration, and writes them as one JSON
//! document when the session finishes.
//!
//! ## Layout on disk
//!
//! `<root>/<YYYY-MM-DD>/<HHMMSS>.log`, dated by the session start in local time.
//!
//! The JSON document is a diagnostic dump, not a stable storage format.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{AppResult, RigError};
use crate::protocol::Command;
use crate::router::RigEvent;

/// Sink for everything a session observes.
pub trait EventRecorder: Send {
    /// Record an event produced by the poll loop.
    fn record_event(&mut self, event: &RigEvent);

    /// Record a command after it was written to the transport.
    fn record_command(&mut self, command: &Command);

    /// Flush the record. Called once when the loop stops.
    fn finish(&mut self) -> AppResult<()> {
        Ok(())
    }
}

/// Readings of one burst.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceChunk {
    /// Readings in device order.
    pub values: Vec<i32>,
    /// Matching device timestamps.
    pub timestamps: Vec<u32>,
}

/// A host-time stamped entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stamp {
    /// Wall clock when the entry was recorded.
    pub host_time: DateTime<Utc>,
    /// What happened.
    pub name: String,
    /// Device clock, when the entry came from the device.
    pub device_timestamp: Option<u32>,
    /// Command payload, when there is one.
    pub value: Option<i32>,
}

impl Stamp {
    fn now(name: &str, device_timestamp: Option<u32>, value: Option<i32>) -> Self {
        Self {
            host_time: Utc::now(),
            name: name.to_string(),
            device_timestamp,
            value,
        }
    }
}

/// File-backed session record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionLog {
    /// Session start, local time.
    pub started_at: DateTime<Local>,
    /// Resolved device configuration in effect.
    pub config: Option<serde_json::Value>,
    /// Raw lever bursts.
    pub lever: Vec<TraceChunk>,
    /// Sound onsets.
    pub sound: Vec<TraceChunk>,
    /// `(name, device timestamp)` of non-classified signals and TTL echoes.
    pub other: Vec<(String, u32)>,
    /// Classified events.
    pub events: Vec<Stamp>,
    /// Commands sent to the rig.
    pub commands: Vec<Stamp>,
    #[serde(skip)]
    root: Option<PathBuf>,
}

impl SessionLog {
    /// Start a record that will be saved under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            started_at: Local::now(),
            config: None,
            lever: Vec::new(),
            sound: Vec::new(),
            other: Vec::new(),
            events: Vec::new(),
            commands: Vec::new(),
            root: Some(root.into()),
        }
    }

    /// Attach the device configuration the session runs with.
    pub fn with_config<T: Serialize>(mut self, config: &T) -> AppResult<Self> {
        self.config = Some(serde_json::to_value(config)?);
        Ok(self)
    }

    /// Where `save` will write this record.
    pub fn log_path(&self) -> AppResult<PathBuf> {
        let root = self.root.as_ref().ok_or_else(|| {
            RigError::Configuration("session log has no output folder".to_string())
        })?;
        Ok(root
            .join(self.started_at.format("%Y-%m-%d").to_string())
            .join(format!("{}.log", self.started_at.format("%H%M%S"))))
    }

    /// Write the record as pretty JSON, creating the dated folder if needed.
    pub fn save(&self) -> AppResult<PathBuf> {
        let path = self.log_path()?;
        if let Some(folder) = path.parent() {
            fs::create_dir_all(folder)?;
            if fs::metadata(folder)?.permissions().readonly() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    format!("{} is not writable by the session logger", folder.display()),
                )
                .into());
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json)?;
        info!(path = %path.display(), "Saved session log");
        Ok(path)
    }
}

impl EventRecorder for SessionLog {
    fn record_event(&mut self, event: &RigEvent) {
        match event {
            RigEvent::LeverTrace { values, timestamps } => self.lever.push(TraceChunk {
                values: values.clone(),
                timestamps: timestamps.clone(),
            }),
            RigEvent::SoundPlayed { values, timestamps } => self.sound.push(TraceChunk {
                values: values.clone(),
                timestamps: timestamps.clone(),
            }),
            RigEvent::Other { name, timestamp } => self.other.push((name.to_string(), *timestamp)),
            RigEvent::TtlAcknowledged { timestamp } => {
                self.other.push(("send_ttl".to_string(), *timestamp))
            }
            RigEvent::LeverRise { timestamp } => {
                self.events.push(Stamp::now("lever_rise", Some(*timestamp), None))
            }
            RigEvent::LeverFlux { timestamp } => {
                self.events.push(Stamp::now("lever_flux", Some(*timestamp), None))
            }
            RigEvent::Licked => self.events.push(Stamp::now("licked", None, None)),
            RigEvent::Finished => self.events.push(Stamp::now("finished", None, None)),
        }
    }

    fn record_command(&mut self, command: &Command) {
        let (signal_type, value) = command.wire_fields();
        self.commands
            .push(Stamp::now(signal_type.name(), None, Some(value)));
    }

    fn finish(&mut self) -> AppResult<()> {
        self.save().map(|_| ())
    }
}

/// Default folder for session logs: `~/taskrig-logs`.
pub fn default_log_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("taskrig-logs")
}

/// Loads a saved session record.
pub fn load_session(path: &Path) -> AppResult<SessionLog> {
    let json = fs::read_to_string(path)?;
    let session = serde_json::from_str(&json)?;
    Ok(session)
}
