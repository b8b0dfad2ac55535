//! Lever push detection.
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::despike::despike;
use super::{check_threshold, mean, std_dev};
use crate::error::AppResult;

/// Thresholds for the lever classifier.
///
/// All fields are required; a device configuration that omits one fails to load.
///
/// # Example Configuration (`.toml`)
///
/// ```toml
/// [lever]
/// min_rise = 40.0  # push must exceed the previous burst mean by this much
/// max_flux = 10.0  # mean drift that still counts as resting
/// max_std = 8.0    # within-burst jitter that still counts as resting
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LeverConfig {
    /// Minimum rise of the burst peak over the previous burst mean to count as a push.
    pub min_rise: f64,
    /// Maximum change of the burst mean before the lever is considered moving.
    pub max_flux: f64,
    /// Maximum standard deviation within a burst before the lever is considered moving.
    pub max_std: f64,
}

/// Outcome of classifying one lever burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeverEvent {
    /// Nothing happened.
    None,
    /// Deliberate push.
    Rise,
    /// Movement below the push threshold but above the noise bounds.
    Flux,
}

/// State carried from one lever burst to the next.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LeverState {
    /// Mean of the previous despiked burst.
    pub previous_mean: f64,
    /// Resting position reference. Carried with the state but not used by the
    /// classification rule.
    pub baseline: f64,
}

/// Stateful lever classifier. One instance per session.
#[derive(Debug, Clone)]
pub struct LeverClassifier {
    config: LeverConfig,
    state: LeverState,
}

impl LeverClassifier {
    /// Build a classifier with fresh state.
    pub fn new(config: LeverConfig) -> AppResult<Self> {
        check_threshold("lever.min_rise", config.min_rise)?;
        check_threshold("lever.max_flux", config.max_flux)?;
        check_threshold("lever.max_std", config.max_std)?;
        Ok(Self {
            config,
            state: LeverState::default(),
        })
    }

    /// Current carried state.
    pub fn state(&self) -> LeverState {
        self.state
    }

    /// Thresholds in use.
    pub fn config(&self) -> &LeverConfig {
        &self.config
    }

    /// Classify one ordered burst of lever readings.
    ///
    /// Returns the event and the device timestamp of the despiked peak. The stored
    /// mean is replaced by this burst's despiked mean whatever the outcome. An empty
    /// burst leaves the state untouched and returns `(None, 0)`.
    pub fn classify(&mut self, values: &[i32], timestamps: &[u32]) -> (LeverEvent, u32) {
        debug_assert_eq!(values.len(), timestamps.len());
        if values.is_empty() {
            return (LeverEvent::None, 0);
        }

        let trace: Vec<f64> = values.iter().map(|&v| f64::from(v)).collect();
        let filtered = despike(&trace);

        // first maximum wins on ties
        let (peak_idx, peak) = filtered
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (idx, value)| {
                if value > best.1 {
                    (idx, value)
                } else {
                    best
                }
            });
        let peak_timestamp = timestamps.get(peak_idx).copied().unwrap_or_default();

        let burst_mean = mean(&filtered);
        let previous = self.state.previous_mean;
        let event = if peak - previous > self.config.min_rise {
            LeverEvent::Rise
        } else if (burst_mean - previous).abs() > self.config.max_flux
            || std_dev(&filtered) > self.config.max_std
        {
            LeverEvent::Flux
        } else {
            LeverEvent::None
        };
        self.state.previous_mean = burst_mean;

        trace!(?event, peak, burst_mean, previous, "Classified lever burst");
        (event, peak_timestamp)
    }
}
