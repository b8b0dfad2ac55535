//! Dispatch of decoded bursts to the classifiers.
//!
//! A burst is split by signal kind, keeping device order inside each kind, and each
//! group goes to its consumer. The router owns the classifiers so lever state lives
//! exactly as long as the session.

use serde::Serialize;
use tracing::debug;

use crate::processing::{LeverClassifier, LeverEvent, LickClassifier, LickEvent};
use crate::protocol::{Sample, SignalType, OTHER_SIGNALS};

/// Notifications produced by the rig.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RigEvent {
    /// Deliberate lever push; timestamp of the burst peak.
    LeverRise {
        /// Device timestamp of the peak.
        timestamp: u32,
    },
    /// Lever moved without a full push; timestamp of the burst peak.
    LeverFlux {
        /// Device timestamp of the peak.
        timestamp: u32,
    },
    /// Raw lever readings of one burst, for the session record.
    LeverTrace {
        /// Readings in device order.
        values: Vec<i32>,
        /// Matching device timestamps.
        timestamps: Vec<u32>,
    },
    /// Lick onset.
    Licked,
    /// The firmware echoed a requested TTL pulse.
    TtlAcknowledged {
        /// Device timestamp of the first echo in the burst.
        timestamp: u32,
    },
    /// Sound onsets reported by the firmware.
    SoundPlayed {
        /// Sound ids.
        values: Vec<i32>,
        /// Matching device timestamps.
        timestamps: Vec<u32>,
    },
    /// First occurrence of a non-classified signal in a burst.
    Other {
        /// Signal name.
        name: &'static str,
        /// Device timestamp.
        timestamp: u32,
    },
    /// The poll loop stopped. Emitted exactly once.
    Finished,
}

/// Events produced from one burst, in dispatch order.
pub type RoutedEvents = Vec<RigEvent>;

/// Values and timestamps of one signal kind, in device order.
#[derive(Debug, Default, Clone, PartialEq)]
struct Channel {
    values: Vec<i32>,
    timestamps: Vec<u32>,
}

impl Channel {
    fn collect(burst: &[Sample], signal_type: SignalType) -> Self {
        let mut channel = Self::default();
        for sample in burst.iter().filter(|s| s.signal_type == signal_type) {
            channel.values.push(sample.value);
            channel.timestamps.push(sample.timestamp);
        }
        channel
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn first_timestamp(&self) -> Option<u32> {
        self.timestamps.first().copied()
    }
}

/// Routes bursts to the lever and lick classifiers and surfaces the rest as records.
#[derive(Debug, Clone)]
pub struct SignalRouter {
    lever: LeverClassifier,
    lick: LickClassifier,
}

impl SignalRouter {
    /// Create a router around session-owned classifiers.
    pub fn new(lever: LeverClassifier, lick: LickClassifier) -> Self {
        Self { lever, lick }
    }

    /// The lever classifier, for state inspection.
    pub fn lever(&self) -> &LeverClassifier {
        &self.lever
    }

    /// Dispatch one burst.
    ///
    /// `awaiting_ttl` gates TTL acknowledgments: echoes are only surfaced after a TTL
    /// was requested. Order of the returned events: lever, lick, TTL, sound, then the
    /// other signals in table order. An empty or unrecognized burst yields no events.
    pub fn route(&mut self, burst: &[Sample], awaiting_ttl: bool) -> RoutedEvents {
        let mut events = RoutedEvents::new();

        let lever = Channel::collect(burst, SignalType::Lever);
        if !lever.is_empty() {
            let (result, peak_timestamp) = self.lever.classify(&lever.values, &lever.timestamps);
            events.push(RigEvent::LeverTrace {
                values: lever.values,
                timestamps: lever.timestamps,
            });
            match result {
                LeverEvent::Rise => events.push(RigEvent::LeverRise {
                    timestamp: peak_timestamp,
                }),
                LeverEvent::Flux => events.push(RigEvent::LeverFlux {
                    timestamp: peak_timestamp,
                }),
                LeverEvent::None => {}
            }
        }

        let lick = Channel::collect(burst, SignalType::LickTouch);
        // a single reading has nothing to diff against
        if lick.len() > 1 && self.lick.classify(&lick.values) == LickEvent::Licked {
            events.push(RigEvent::Licked);
        }

        if awaiting_ttl {
            if let Some(timestamp) = Channel::collect(burst, SignalType::SendTtl).first_timestamp()
            {
                events.push(RigEvent::TtlAcknowledged { timestamp });
            }
        }

        let sound = Channel::collect(burst, SignalType::PlaySound);
        if !sound.is_empty() {
            events.push(RigEvent::SoundPlayed {
                values: sound.values,
                timestamps: sound.timestamps,
            });
        }

        for signal_type in OTHER_SIGNALS {
            if let Some(sample) = burst.iter().find(|s| s.signal_type == signal_type) {
                events.push(RigEvent::Other {
                    name: signal_type.name(),
                    timestamp: sample.timestamp,
                });
            }
        }

        if !events.is_empty() {
            debug!(samples = burst.len(), events = events.len(), "Routed burst");
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::{LeverConfig, LickConfig};

    fn router() -> SignalRouter {
        SignalRouter::new(
            LeverClassifier::new(LeverConfig {
                min_rise: 5.0,
                max_flux: 2.0,
                max_std: 2.0,
            })
            .unwrap(),
            LickClassifier::new(LickConfig { threshold: 4.0 }).unwrap(),
        )
    }

    fn s(signal_type: SignalType, timestamp: u32, value: i32) -> Sample {
        Sample {
            signal_type,
            timestamp,
            value,
        }
    }

    #[test]
    fn empty_burst_yields_nothing() {
        assert!(router().route(&[], true).is_empty());
    }

    #[test]
    fn single_lick_sample_never_reaches_classifier() {
        let mut router = router();
        let events = router.route(&[s(SignalType::LickTouch, 1, 1000)], false);
        assert!(events.is_empty());
        assert_eq!(router.lick.calls.get(), 0);

        router.route(
            &[s(SignalType::LickTouch, 2, 0), s(SignalType::LickTouch, 3, 0)],
            false,
        );
        assert_eq!(router.lick.calls.get(), 1);
    }

    #[test]
    fn lick_burst_is_classified() {
        let mut router = router();
        let burst = [
            s(SignalType::LickTouch, 1, 0),
            s(SignalType::Lever, 2, 0),
            s(SignalType::LickTouch, 3, 9),
        ];
        let events = router.route(&burst, false);
        assert!(events.contains(&RigEvent::Licked));
    }

    #[test]
    fn lever_samples_are_grouped_in_order() {
        let mut router = router();
        let burst = [
            s(SignalType::Lever, 1, 0),
            s(SignalType::LickTouch, 2, 0),
            s(SignalType::Lever, 3, 20),
            s(SignalType::Lever, 4, 20),
        ];
        let events = router.route(&burst, false);
        assert_eq!(
            events,
            vec![
                RigEvent::LeverTrace {
                    values: vec![0, 20, 20],
                    timestamps: vec![1, 3, 4],
                },
                RigEvent::LeverRise { timestamp: 3 },
            ]
        );
    }

    #[test]
    fn lever_state_untouched_without_lever_samples() {
        let mut router = router();
        router.route(&[s(SignalType::Lever, 1, 30)], false);
        let before = router.lever().state();
        router.route(
            &[s(SignalType::LickTouch, 2, 0), s(SignalType::LickTouch, 3, 1)],
            false,
        );
        assert_eq!(router.lever().state(), before);
    }

    #[test]
    fn ttl_only_when_awaited_and_first_only() {
        let burst = [s(SignalType::SendTtl, 40, 0), s(SignalType::SendTtl, 55, 0)];
        assert!(router().route(&burst, false).is_empty());
        assert_eq!(
            router().route(&burst, true),
            vec![RigEvent::TtlAcknowledged { timestamp: 40 }]
        );
    }

    #[test]
    fn sound_records_pass_through() {
        let burst = [s(SignalType::PlaySound, 7, 3), s(SignalType::PlaySound, 9, 4)];
        assert_eq!(
            router().route(&burst, false),
            vec![RigEvent::SoundPlayed {
                values: vec![3, 4],
                timestamps: vec![7, 9],
            }]
        );
    }

    #[test]
    fn other_signals_report_first_timestamp_once() {
        let burst = [
            s(SignalType::FrameSync, 12, 0),
            s(SignalType::WaterStart, 15, 0),
            s(SignalType::FrameSync, 18, 0),
        ];
        assert_eq!(
            router().route(&burst, false),
            vec![
                RigEvent::Other {
                    name: "water_start",
                    timestamp: 15,
                },
                RigEvent::Other {
                    name: "frame_sync",
                    timestamp: 12,
                },
            ]
        );
    }
}
