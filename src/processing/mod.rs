//! Signal classification.
//!
//! Turns bursts of raw lever and lick readings into discrete behavioral events and
//! converts reward volumes into valve actuation times.

pub mod despike;
pub mod lever;
pub mod lick;
pub mod reward;

pub use lever::{LeverClassifier, LeverConfig, LeverEvent, LeverState};
pub use lick::{LickClassifier, LickConfig, LickEvent};
pub use reward::{RewardConfig, RewardConverter};

/// Arithmetic mean. Returns `0.0` for an empty slice.
pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation. Returns `0.0` for an empty slice.
pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mu = mean(values);
    let variance = values.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Reject non-finite or negative thresholds at construction time.
pub(crate) fn check_threshold(name: &str, value: f64) -> crate::error::AppResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(crate::error::RigError::Configuration(format!(
            "{name} must be finite and non-negative, got {value}"
        )));
    }
    Ok(())
}
