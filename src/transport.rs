//! Transport classifier.
//!
//! Guesses from inter-character gaps whether the current burst comes from a
//! fast, uniform-latency peripheral or a slower one that is still clearly
//! machine paced. The guess only selects timing constants; it never tries to
//! identify hardware.

use std::time::{Duration, Instant};

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::config::{ScanConfig, TAKEOVER_FACTOR};

/// Run of machine-paced gaps needed before the profile is pinned.
pub const PIN_AFTER_GAPS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum_macros::Display)]
pub enum TransportProfile {
    #[default]
    Unknown,
    Fast,
    Moderate,
}

/// How the classifier picks a profile for each session.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    clap::ValueEnum,
    strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    /// Infer from timing
    #[default]
    Auto,
    /// Every session is pinned fast
    Fast,
    /// Every session is pinned moderate
    Moderate,
}

#[derive(Debug, Clone)]
pub struct TransportClassifier {
    mode: TransportMode,
    fast_gap: Duration,
    moderate_gap: Duration,
    consecutive_machine_gaps: u32,
    all_fast: bool,
    profile: TransportProfile,
}

impl TransportClassifier {
    pub fn new(config: &ScanConfig) -> Self {
        let mut classifier = Self {
            mode: config.transport,
            fast_gap: config.fast_gap(),
            moderate_gap: config.moderate_gap(),
            consecutive_machine_gaps: 0,
            all_fast: true,
            profile: TransportProfile::Unknown,
        };
        classifier.reset();
        classifier
    }

    /// Forget everything learned about the current session.
    pub fn reset(&mut self) {
        self.consecutive_machine_gaps = 0;
        self.all_fast = true;
        self.profile = match self.mode {
            TransportMode::Auto => TransportProfile::Unknown,
            TransportMode::Fast => TransportProfile::Fast,
            TransportMode::Moderate => TransportProfile::Moderate,
        };
    }

    pub fn profile(&self) -> TransportProfile {
        self.profile
    }

    pub fn consecutive_machine_gaps(&self) -> u32 {
        self.consecutive_machine_gaps
    }

    /// Feeds the gap between two accepted characters and returns the updated profile.
    pub fn observe_gap(&mut self, gap: Duration) -> TransportProfile {
        if self.mode != TransportMode::Auto {
            return self.profile;
        }

        if gap < self.moderate_gap {
            self.consecutive_machine_gaps += 1;
            if gap >= self.fast_gap {
                self.all_fast = false;
            }
        } else {
            self.consecutive_machine_gaps = 0;
            self.all_fast = false;
        }

        if self.consecutive_machine_gaps >= PIN_AFTER_GAPS {
            let next = if self.all_fast && self.profile != TransportProfile::Moderate {
                TransportProfile::Fast
            } else {
                TransportProfile::Moderate
            };
            if next != self.profile {
                tracing::debug!(from = %self.profile, to = %next, "transport profile pinned");
                self.profile = next;
            }
        }
        self.profile
    }

    /// A gap longer than this means a person took over the keyboard.
    pub fn takeover_gap(&self) -> Duration {
        let base = match self.profile {
            TransportProfile::Moderate => self.moderate_gap,
            TransportProfile::Unknown | TransportProfile::Fast => self.fast_gap,
        };
        base * TAKEOVER_FACTOR as u32
    }
}

/// Summary of the gaps inside one burst.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GapStats {
    pub count: usize,
    pub mean_ms: f64,
    /// Standard deviation; uniform-latency devices keep this small
    pub jitter_ms: f64,
}

impl GapStats {
    pub fn from_timestamps(timestamps: &[Instant]) -> Self {
        let gaps: Vec<f64> = timestamps
            .iter()
            .tuple_windows()
            .map(|(a, b)| b.saturating_duration_since(*a).as_secs_f64() * 1000.0)
            .collect();

        match (mean(&gaps), std_dev(&gaps)) {
            (Some(mean_ms), Some(jitter_ms)) => Self {
                count: gaps.len(),
                mean_ms,
                jitter_ms,
            },
            _ => Self::default(),
        }
    }
}

fn mean(data: &[f64]) -> Option<f64> {
    match data.len() {
        0 => None,
        count => Some(data.iter().sum::<f64>() / count as f64),
    }
}

fn std_dev(data: &[f64]) -> Option<f64> {
    let data_mean = mean(data)?;
    let variance = data
        .iter()
        .map(|value| {
            let diff = data_mean - *value;
            diff * diff
        })
        .sum::<f64>()
        / data.len() as f64;
    Some(variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn classifier() -> TransportClassifier {
        TransportClassifier::new(&ScanConfig::default())
    }

    #[test]
    fn uniform_fast_gaps_pin_fast() {
        let mut c = classifier();
        assert_eq!(c.observe_gap(ms(10)), TransportProfile::Unknown);
        assert_eq!(c.observe_gap(ms(12)), TransportProfile::Fast);
        assert_eq!(c.consecutive_machine_gaps(), 2);
    }

    #[test]
    fn looser_machine_gaps_pin_moderate() {
        let mut c = classifier();
        c.observe_gap(ms(140));
        assert_eq!(c.observe_gap(ms(140)), TransportProfile::Moderate);
    }

    #[test]
    fn fast_upgrades_to_moderate_but_never_back() {
        let mut c = classifier();
        c.observe_gap(ms(10));
        c.observe_gap(ms(10));
        assert_eq!(c.profile(), TransportProfile::Fast);
        assert_eq!(c.observe_gap(ms(90)), TransportProfile::Moderate);
        c.observe_gap(ms(5));
        c.observe_gap(ms(5));
        assert_eq!(c.profile(), TransportProfile::Moderate);
    }

    #[test]
    fn slow_gap_breaks_the_run() {
        let mut c = classifier();
        c.observe_gap(ms(20));
        c.observe_gap(ms(200));
        assert_eq!(c.consecutive_machine_gaps(), 0);
        assert_eq!(c.observe_gap(ms(20)), TransportProfile::Unknown);
        // the slow gap rules out a uniform fast burst for the rest of the session
        assert_eq!(c.observe_gap(ms(20)), TransportProfile::Moderate);
    }

    #[test]
    fn pinned_modes_ignore_timing() {
        let cfg = ScanConfig {
            transport: TransportMode::Moderate,
            ..ScanConfig::default()
        };
        let mut c = TransportClassifier::new(&cfg);
        assert_eq!(c.profile(), TransportProfile::Moderate);
        assert_eq!(c.observe_gap(ms(1)), TransportProfile::Moderate);
        c.reset();
        assert_eq!(c.profile(), TransportProfile::Moderate);
    }

    #[test]
    fn takeover_gap_follows_profile() {
        let mut c = classifier();
        assert_eq!(c.takeover_gap(), ms(250));
        c.observe_gap(ms(100));
        c.observe_gap(ms(100));
        assert_eq!(c.takeover_gap(), ms(750));
        c.reset();
        assert_eq!(c.profile(), TransportProfile::Unknown);
        assert_eq!(c.takeover_gap(), ms(250));
    }

    #[test]
    fn gap_stats_of_uniform_burst() {
        let start = Instant::now();
        let stamps: Vec<Instant> = (0..5).map(|i| start + ms(i * 10)).collect();
        let stats = GapStats::from_timestamps(&stamps);
        assert_eq!(stats.count, 4);
        assert!((stats.mean_ms - 10.0).abs() < 1e-6);
        assert!(stats.jitter_ms.abs() < 1e-6);
    }

    #[test]
    fn gap_stats_of_jittery_burst() {
        let start = Instant::now();
        let stamps = [start, start + ms(100), start + ms(120), start + ms(220)];
        let stats = GapStats::from_timestamps(&stamps);
        assert_eq!(stats.count, 3);
        assert!((stats.mean_ms - 73.333).abs() < 0.01);
        assert!((stats.jitter_ms - 37.712).abs() < 0.01);
    }

    #[test]
    fn gap_stats_need_two_timestamps() {
        assert_eq!(GapStats::from_timestamps(&[]), GapStats::default());
        assert_eq!(
            GapStats::from_timestamps(&[Instant::now()]),
            GapStats::default()
        );
    }
}
