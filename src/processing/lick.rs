//! Lick contact detection.
use serde::{Deserialize, Serialize};

use super::check_threshold;
use crate::error::AppResult;

/// Configuration for the lick classifier.
///
/// ```toml
/// [lick]
/// threshold = 200.0
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LickConfig {
    /// Minimum jump between consecutive touch readings that counts as a lick.
    pub threshold: f64,
}

/// Outcome of classifying one lick burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LickEvent {
    /// No contact onset in this burst.
    None,
    /// Contact onset.
    Licked,
}

/// Stateless lick classifier.
#[derive(Debug, Clone)]
pub struct LickClassifier {
    threshold: f64,
    #[cfg(test)]
    pub(crate) calls: std::cell::Cell<usize>,
}

impl LickClassifier {
    /// Build a classifier from configuration.
    pub fn new(config: LickConfig) -> AppResult<Self> {
        check_threshold("lick.threshold", config.threshold)?;
        Ok(Self {
            threshold: config.threshold,
            #[cfg(test)]
            calls: std::cell::Cell::new(0),
        })
    }

    /// Configured threshold.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Report `Licked` if the largest rise between consecutive readings exceeds the
    /// threshold. Needs at least two readings.
    pub fn classify(&self, values: &[i32]) -> LickEvent {
        #[cfg(test)]
        self.calls.set(self.calls.get() + 1);
        let max_diff = values
            .windows(2)
            .map(|pair| f64::from(pair[1]) - f64::from(pair[0]))
            .fold(None, |acc: Option<f64>, diff| {
                Some(acc.map_or(diff, |best| best.max(diff)))
            });
        match max_diff {
            Some(diff) if diff > self.threshold => LickEvent::Licked,
            _ => LickEvent::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier(threshold: f64) -> LickClassifier {
        LickClassifier::new(LickConfig { threshold }).unwrap()
    }

    #[test]
    fn threshold_comparison_is_strict() {
        assert_eq!(classifier(4.0).classify(&[0, 0, 5]), LickEvent::Licked);
        assert_eq!(classifier(5.0).classify(&[0, 0, 5]), LickEvent::None);
    }

    #[test]
    fn falling_edges_do_not_count() {
        assert_eq!(classifier(4.0).classify(&[50, 0, 0]), LickEvent::None);
    }

    #[test]
    fn needs_two_readings() {
        assert_eq!(classifier(0.0).classify(&[100]), LickEvent::None);
        assert_eq!(classifier(0.0).classify(&[]), LickEvent::None);
    }

    #[test]
    fn no_memory_between_bursts() {
        let lick = classifier(4.0);
        assert_eq!(lick.classify(&[0, 10]), LickEvent::Licked);
        assert_eq!(lick.classify(&[0, 10]), LickEvent::Licked);
    }

    #[test]
    fn extreme_readings_do_not_overflow() {
        assert_eq!(
            classifier(1.0).classify(&[i32::MIN, i32::MAX]),
            LickEvent::Licked
        );
    }
}
