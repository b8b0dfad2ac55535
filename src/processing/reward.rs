//! Conversion of reward volume to valve opening time.
use serde::{Deserialize, Serialize};

use crate::error::{AppResult, RigError};

/// Reward calibration.
///
/// `time_coef = [linear_coef, startup_time]`, fitted per rig: milliseconds per
/// volume unit and the fixed valve latency in milliseconds.
///
/// ```toml
/// [reward]
/// time_coef = [48.5, 12.0]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardConfig {
    /// `[linear_coef, startup_time]`.
    pub time_coef: [f64; 2],
}

/// Linear volume to duration mapping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewardConverter {
    linear_coef: f64,
    startup_time: f64,
}

impl RewardConverter {
    /// Build a converter from explicit coefficients.
    pub fn new(linear_coef: f64, startup_time: f64) -> AppResult<Self> {
        if !linear_coef.is_finite() || !startup_time.is_finite() {
            return Err(RigError::Configuration(format!(
                "reward.time_coef must be finite, got [{linear_coef}, {startup_time}]"
            )));
        }
        Ok(Self {
            linear_coef,
            startup_time,
        })
    }

    /// Build a converter from the `reward` configuration section.
    pub fn from_config(config: &RewardConfig) -> AppResult<Self> {
        let [linear_coef, startup_time] = config.time_coef;
        Self::new(linear_coef, startup_time)
    }

    /// Valve opening time in milliseconds: `floor(linear_coef * volume + startup_time)`.
    ///
    /// Negative or non-finite volumes are rejected with `InvalidVolume` rather than
    /// clamped. A zero volume yields the bare startup time. Results outside
    /// `0..=i32::MAX`, the range the command payload can carry, are rejected with
    /// `RewardOverflow`.
    pub fn duration_ms(&self, volume: f64) -> AppResult<u32> {
        if !volume.is_finite() || volume < 0.0 {
            return Err(RigError::InvalidVolume(volume));
        }
        let duration = (self.linear_coef * volume + self.startup_time).floor();
        if !(0.0..=f64::from(i32::MAX)).contains(&duration) {
            return Err(RigError::RewardOverflow(duration));
        }
        Ok(duration as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_formula() {
        let reward = RewardConverter::new(2.0, 3.0).unwrap();
        assert_eq!(reward.duration_ms(10.0).unwrap(), 23);
    }

    #[test]
    fn result_is_floored() {
        let reward = RewardConverter::new(1.5, 0.4).unwrap();
        assert_eq!(reward.duration_ms(3.0).unwrap(), 4);
    }

    #[test]
    fn zero_volume_is_startup_time() {
        let reward = RewardConverter::new(2.0, 3.7).unwrap();
        assert_eq!(reward.duration_ms(0.0).unwrap(), 3);
    }

    #[test]
    fn negative_volume_is_rejected() {
        let reward = RewardConverter::new(2.0, 3.0).unwrap();
        assert!(matches!(
            reward.duration_ms(-1.0),
            Err(RigError::InvalidVolume(_))
        ));
        assert!(matches!(
            reward.duration_ms(f64::NAN),
            Err(RigError::InvalidVolume(_))
        ));
    }

    #[test]
    fn overflow_is_rejected() {
        let reward = RewardConverter::new(1e9, 0.0).unwrap();
        assert!(matches!(
            reward.duration_ms(10.0),
            Err(RigError::RewardOverflow(_))
        ));
        let reward = RewardConverter::new(1.0, -50.0).unwrap();
        assert!(matches!(
            reward.duration_ms(1.0),
            Err(RigError::RewardOverflow(_))
        ));
    }

    #[test]
    fn from_config_unpacks_time_coef() {
        let reward = RewardConverter::from_config(&RewardConfig {
            time_coef: [2.0, 3.0],
        })
        .unwrap();
        assert_eq!(reward, RewardConverter::new(2.0, 3.0).unwrap());
    }
}
