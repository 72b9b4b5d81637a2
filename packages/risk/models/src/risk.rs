//! Risk tiers, threshold profiles, and pipeline output records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::grid::GridCell;

/// Slope above which the preliminary tier is [`RiskTier::High`].
pub const PRELIMINARY_HIGH_SLOPE_DEG: f64 = 25.0;

/// Slope above which the preliminary tier is [`RiskTier::Medium`].
pub const PRELIMINARY_MEDIUM_SLOPE_DEG: f64 = 12.0;

/// Discrete landslide risk tier.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum RiskTier {
    /// Below the medium threshold.
    Low,
    /// Between the medium and high thresholds.
    Medium,
    /// At or above the high threshold.
    High,
}

impl RiskTier {
    /// Map color used by map consumers.
    #[must_use]
    pub const fn color(self) -> &'static str {
        match self {
            Self::Low => "#00FF00",
            Self::Medium => "#FFFF00",
            Self::High => "#FF0000",
        }
    }

    /// Coarse slope-only tier assigned during extraction.
    #[must_use]
    pub fn from_slope(slope_deg: f64) -> Self {
        if slope_deg > PRELIMINARY_HIGH_SLOPE_DEG {
            Self::High
        } else if slope_deg > PRELIMINARY_MEDIUM_SLOPE_DEG {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// Error returned when threshold cut points are out of order or outside
/// `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InvalidThresholdsError {
    /// Requested medium cut point.
    pub medium: f64,
    /// Requested high cut point.
    pub high: f64,
}

impl std::fmt::Display for InvalidThresholdsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid risk thresholds medium={} high={}: expected 0 <= medium <= high <= 1",
            self.medium, self.high
        )
    }
}

impl std::error::Error for InvalidThresholdsError {}

#[derive(Deserialize)]
struct RawThresholds {
    medium: f64,
    high: f64,
}

impl TryFrom<RawThresholds> for TierThresholds {
    type Error = InvalidThresholdsError;

    fn try_from(raw: RawThresholds) -> Result<Self, Self::Error> {
        Self::new(raw.medium, raw.high)
    }
}

/// Probability cut points mapping a score to a [`RiskTier`].
///
/// `p < medium` is Low, `medium <= p < high` is Medium, `p >= high` is High.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawThresholds")]
pub struct TierThresholds {
    medium: f64,
    high: f64,
}

impl TierThresholds {
    /// Cut points the model was calibrated against during training.
    pub const BATCH: Self = Self {
        medium: 0.35,
        high: 0.70,
    };

    /// Cut points used by the live serving deployment.
    pub const SERVING: Self = Self {
        medium: 0.50,
        high: 0.85,
    };

    /// Creates a threshold pair.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidThresholdsError`] unless `0 <= medium <= high <= 1`.
    pub fn new(medium: f64, high: f64) -> Result<Self, InvalidThresholdsError> {
        if (0.0..=1.0).contains(&medium) && (0.0..=1.0).contains(&high) && medium <= high {
            Ok(Self { medium, high })
        } else {
            Err(InvalidThresholdsError { medium, high })
        }
    }

    /// The Low/Medium cut point.
    #[must_use]
    pub const fn medium(&self) -> f64 {
        self.medium
    }

    /// The Medium/High cut point.
    #[must_use]
    pub const fn high(&self) -> f64 {
        self.high
    }

    /// Maps a probability to its tier. `NaN` maps to Low.
    #[must_use]
    pub fn tier_for(&self, probability: f64) -> RiskTier {
        if probability >= self.high {
            RiskTier::High
        } else if probability >= self.medium {
            RiskTier::Medium
        } else {
            RiskTier::Low
        }
    }
}

/// Per-tier tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCounts {
    /// Cells labelled Low.
    pub low: u64,
    /// Cells labelled Medium.
    pub medium: u64,
    /// Cells labelled High.
    pub high: u64,
}

impl TierCounts {
    /// Counts one more cell in `tier`.
    pub const fn record(&mut self, tier: RiskTier) {
        match tier {
            RiskTier::Low => self.low += 1,
            RiskTier::Medium => self.medium += 1,
            RiskTier::High => self.high += 1,
        }
    }

    /// Total cells counted.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.low + self.medium + self.high
    }
}

impl FromIterator<RiskTier> for TierCounts {
    fn from_iter<I: IntoIterator<Item = RiskTier>>(iter: I) -> Self {
        let mut counts = Self::default();
        for tier in iter {
            counts.record(tier);
        }
        counts
    }
}

/// Cumulative rainfall over trailing windows anchored at day 1, in mm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RainfallAggregates {
    /// Days 1-3.
    pub rain_3d: f64,
    /// Days 1-5.
    pub rain_5d: f64,
    /// Days 1-7.
    pub rain_7d: f64,
    /// Days 1-10.
    pub rain_10d: f64,
}

impl RainfallAggregates {
    /// Property names under which the aggregates are surfaced to consumers.
    pub const PROPERTY_NAMES: [&'static str; 4] =
        ["Rain_3D (mm)", "Rain_5D (mm)", "Rain_7D (mm)", "Rain_10D (mm)"];

    /// The four aggregates, shortest window first.
    #[must_use]
    pub const fn values(&self) -> [f64; 4] {
        [self.rain_3d, self.rain_5d, self.rain_7d, self.rain_10d]
    }
}

/// A scored cell, as handed to whatever persists results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledCell {
    /// Cell geometry and location.
    #[serde(flatten)]
    pub cell: GridCell,
    /// Every covariate plus the surfaced rainfall aggregates.
    pub properties: BTreeMap<String, f64>,
    /// Model-based tier.
    pub risk: RiskTier,
    /// Probability of the landslide class.
    pub probability: f64,
    /// Rainfall aggregates that fed the model.
    pub rainfall: RainfallAggregates,
}

/// Coverage statistics for one extraction run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionSummary {
    /// Cells in the grid.
    pub total_cells: u64,
    /// Batches attempted.
    pub batches: u64,
    /// Batches abandoned after a request failure.
    pub failed_batches: u64,
    /// Cells retained as valid.
    pub valid_cells: u64,
    /// Nodata occurrences (one per band per cell).
    pub nodata_warnings: u64,
    /// Preliminary tier distribution of valid cells.
    pub tiers: TierCounts,
}
