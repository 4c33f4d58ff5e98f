//! Battery reading filter
//!
//! The fuel gauge on the battery hat is noisy: single reads jump by several
//! percent and the charging bit flickers while the charger negotiates. The
//! filter smooths the percentage with an exponential moving average, drops
//! samples that disagree with most of the recent history, and reports the
//! charging state as a majority vote over the recent flags.

use core::cmp::Ordering;

use heapless::HistoryBuffer;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Number of raw samples kept for outlier rejection and voting
pub const HISTORY_LEN: usize = 10;

/// One raw reading from the battery sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BatterySample {
    /// Raw state of charge, 0-100
    pub percentage: u8,
    /// Raw charging flag
    pub charging: bool,
}

/// Whether a sample contributed to the smoothed value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SampleOutcome {
    /// Folded into the moving average
    Accepted,
    /// Rejected from the average; still recorded in history
    Outlier,
}

/// Filter tuning
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FilterConfig {
    /// Weight of the newest sample in the moving average
    pub alpha: f32,
    /// Absolute difference above which a history entry disagrees
    pub outlier_threshold: u32,
    /// Fraction of disagreeing entries above which a sample is an outlier
    pub outlier_ratio: f32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            alpha: 0.9,
            outlier_threshold: 1000,
            outlier_ratio: 0.4,
        }
    }
}

/// Point-in-time view of the filter for display
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TelemetrySnapshot {
    /// Smoothed state of charge
    pub percentage: f32,
    /// Voted charging state, `None` before the first sample
    pub charging: Option<bool>,
}

/// Smoothed battery state
#[derive(Debug, Clone)]
pub struct BatteryFilter {
    config: FilterConfig,
    filtered: f32,
    percentages: HistoryBuffer<u8, HISTORY_LEN>,
    charging: HistoryBuffer<bool, HISTORY_LEN>,
}

impl Default for BatteryFilter {
    fn default() -> Self {
        Self::new(FilterConfig::default())
    }
}

impl BatteryFilter {
    /// Create an empty filter; the smoothed value starts at 0
    pub fn new(config: FilterConfig) -> Self {
        Self {
            config,
            filtered: 0.0,
            percentages: HistoryBuffer::new(),
            charging: HistoryBuffer::new(),
        }
    }

    /// Filter tuning in use
    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Feed one raw sample
    ///
    /// Both histories record every sample; only non-outliers move the
    /// smoothed percentage.
    pub fn update(&mut self, sample: BatterySample) -> SampleOutcome {
        let outlier = is_outlier(
            self.percentages.as_slice().iter().copied(),
            sample.percentage,
            self.config.outlier_threshold,
            self.config.outlier_ratio,
        );

        if !outlier {
            let alpha = self.config.alpha;
            self.filtered = alpha * f32::from(sample.percentage) + (1.0 - alpha) * self.filtered;
        }

        self.percentages.write(sample.percentage);
        self.charging.write(sample.charging);

        if outlier {
            SampleOutcome::Outlier
        } else {
            SampleOutcome::Accepted
        }
    }

    /// Smoothed state of charge
    pub fn filtered_percentage(&self) -> f32 {
        self.filtered
    }

    /// Majority charging state; `false` while no flag has been recorded
    pub fn is_charging(&self) -> bool {
        self.charging_estimate().unwrap_or(false)
    }

    /// Majority charging state, `None` while no flag has been recorded
    pub fn charging_estimate(&self) -> Option<bool> {
        majority_vote(self.charging.oldest_ordered().copied())
    }

    /// Number of samples currently held (at most [`HISTORY_LEN`])
    pub fn history_len(&self) -> usize {
        self.percentages.len()
    }

    /// Raw percentages, oldest first
    pub fn percentage_history(&self) -> impl Iterator<Item = u8> + '_ {
        self.percentages.oldest_ordered().copied()
    }

    /// Values needed to render the battery line
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            percentage: self.filtered,
            charging: self.charging_estimate(),
        }
    }
}

/// Decide whether `candidate` disagrees with too much of `history`
///
/// An entry disagrees when it differs from the candidate by more than
/// `threshold`. The candidate is an outlier when the disagreeing fraction
/// exceeds `ratio`. An empty history never produces an outlier.
pub fn is_outlier<I>(history: I, candidate: u8, threshold: u32, ratio: f32) -> bool
where
    I: IntoIterator<Item = u8>,
{
    let mut total = 0u32;
    let mut disagreeing = 0u32;
    for entry in history {
        total += 1;
        let diff = (i32::from(candidate) - i32::from(entry)).unsigned_abs();
        if diff > threshold {
            disagreeing += 1;
        }
    }

    if total == 0 {
        return false;
    }
    disagreeing as f32 / total as f32 > ratio
}

/// Most common value among `votes`
///
/// A tie goes to whichever value was seen first. Returns `None` for no
/// votes.
pub fn majority_vote<I>(votes: I) -> Option<bool>
where
    I: IntoIterator<Item = bool>,
{
    let mut first = None;
    let mut yes = 0usize;
    let mut no = 0usize;
    for vote in votes {
        first.get_or_insert(vote);
        if vote {
            yes += 1;
        } else {
            no += 1;
        }
    }

    let first = first?;
    Some(match yes.cmp(&no) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => first,
    })
}
