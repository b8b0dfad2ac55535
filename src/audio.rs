//! Sound playback seam.
//!
//! Sounds are played by the host, not the firmware. The poll loop only asks an
//! [`AudioPlayer`] to play a sound id; the firmware reports the onset back as a
//! `PlaySound` sample.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::info;

use crate::error::AppResult;

/// Something that can play a numbered sound.
pub trait AudioPlayer: Send {
    /// Start playing `sound_id`. Must not block until playback ends.
    fn play(&mut self, sound_id: u32) -> AppResult<()>;
}

/// Number of recent requests a [`LoggingAudio`] keeps.
pub const PLAYED_HISTORY: usize = 64;

/// Player that only logs and remembers the most recent requests.
///
/// Used when no audio backend is attached and in tests.
#[derive(Debug, Clone, Default)]
pub struct LoggingAudio {
    played: Arc<Mutex<VecDeque<u32>>>,
}

impl LoggingAudio {
    /// Create a player with an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// The last `PLAYED_HISTORY` sound ids requested, oldest first.
    pub fn played(&self) -> Vec<u32> {
        self.played.lock().iter().copied().collect()
    }
}

impl AudioPlayer for LoggingAudio {
    fn play(&mut self, sound_id: u32) -> AppResult<()> {
        info!(sound_id, "Play sound");
        let mut played = self.played.lock();
        if played.len() == PLAYED_HISTORY {
            played.pop_front();
        }
        played.push_back(sound_id);
        Ok(())
    }
}
