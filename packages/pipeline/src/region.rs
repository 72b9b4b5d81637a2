//! Compile-time registry of study regions.
//!
//! Each region is a TOML file under `regions/` giving its bounding box,
//! sampling parameters, and threshold profiles. The files are embedded
//! at compile time and exposed via [`all_regions`] and [`region`].

use landslide_covariate::extract::{DEFAULT_BATCH_SIZE, DEFAULT_SCALE_M};
use landslide_covariate::spec::MAX_COMPOSITE_DAYS;
use landslide_grid::DEFAULT_CELL_SIZE_M;
use landslide_risk_models::{BoundingBox, TierThresholds};
use serde::Deserialize;

use crate::ThresholdProfile;

/// A study region loaded from TOML.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Region {
    /// Unique identifier (e.g., `"nan"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Area covered by the grid.
    pub bbox: BoundingBox,
    /// Nominal cell edge length in metres.
    #[serde(default = "default_cell_size")]
    pub cell_size_m: f64,
    /// Cells per sampling request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Sampling resolution in metres.
    #[serde(default = "default_scale")]
    pub scale_m: f64,
    /// Length of the imagery composite window in days.
    #[serde(default = "default_composite_days")]
    pub composite_days: u32,
    /// Distance-to-road raster, if one is published for the region.
    #[serde(default)]
    pub road_dataset: Option<String>,
    /// Probability cut points per path.
    pub thresholds: ThresholdProfiles,
}

/// The two threshold parameter sets a region carries.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ThresholdProfiles {
    /// Used when scoring a fresh extraction.
    pub batch: TierThresholds,
    /// Used when re-scoring with live rainfall.
    pub serving: TierThresholds,
}

impl ThresholdProfiles {
    /// The thresholds for `profile`.
    #[must_use]
    pub const fn get(&self, profile: ThresholdProfile) -> TierThresholds {
        match profile {
            ThresholdProfile::Batch => self.batch,
            ThresholdProfile::Serving => self.serving,
        }
    }
}

const fn default_cell_size() -> f64 {
    DEFAULT_CELL_SIZE_M
}

const fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

const fn default_scale() -> f64 {
    DEFAULT_SCALE_M
}

const fn default_composite_days() -> u32 {
    MAX_COMPOSITE_DAYS
}

// ── Compile-time embedded TOML files ────────────────────────────────

const REGION_TOMLS: &[(&str, &str)] = &[("nan", include_str!("../regions/nan.toml"))];

#[cfg(test)]
const EXPECTED_REGION_COUNT: usize = 1;

/// Returns every configured region.
///
/// # Panics
///
/// Panics if any TOML config is malformed (this is a compile-time guarantee
/// since the configs are embedded).
#[must_use]
pub fn all_regions() -> Vec<Region> {
    REGION_TOMLS
        .iter()
        .map(|(name, toml_str)| {
            toml::de::from_str(toml_str)
                .unwrap_or_else(|e| panic!("Failed to parse region '{name}': {e}"))
        })
        .collect()
}

/// Looks up a region by id.
#[must_use]
pub fn region(id: &str) -> Option<Region> {
    all_regions().into_iter().find(|r| r.id == id)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    #[test]
    fn loads_all_regions() {
        assert_eq!(all_regions().len(), EXPECTED_REGION_COUNT);
    }

    #[test]
    fn region_ids_are_unique() {
        let mut seen = BTreeSet::new();
        for r in all_regions() {
            assert!(seen.insert(r.id.clone()), "Duplicate region ID: {}", r.id);
        }
    }

    #[test]
    fn nan_matches_published_extent() {
        let nan = region("nan").unwrap();
        assert_eq!(nan.bbox, landslide_grid::NAN_PROVINCE);
        assert!((nan.cell_size_m - 500.0).abs() < f64::EPSILON);
        assert_eq!(nan.batch_size, 2_000);
        assert_eq!(nan.composite_days, 90);
        assert_eq!(nan.thresholds.batch, TierThresholds::BATCH);
        assert_eq!(nan.thresholds.serving, TierThresholds::SERVING);
        assert_eq!(nan.road_dataset, None);
    }

    #[test]
    fn regions_have_sane_parameters() {
        for r in all_regions() {
            assert!(r.bbox.min_lon < r.bbox.max_lon, "{}", r.id);
            assert!(r.bbox.min_lat < r.bbox.max_lat, "{}", r.id);
            assert!(r.cell_size_m > 0.0, "{}", r.id);
            assert!(r.batch_size > 0, "{}", r.id);
            assert!(r.composite_days <= MAX_COMPOSITE_DAYS, "{}", r.id);
        }
    }

    #[test]
    fn invalid_thresholds_are_rejected() {
        let toml_str = r#"
            id = "bad"
            name = "Bad"
            [bbox]
            min_lon = 0.0
            min_lat = 0.0
            max_lon = 1.0
            max_lat = 1.0
            [thresholds.batch]
            medium = 0.8
            high = 0.2
            [thresholds.serving]
            medium = 0.5
            high = 0.85
        "#;
        assert!(toml::de::from_str::<Region>(toml_str).is_err());
    }

    #[test]
    fn unknown_region_is_none() {
        assert!(region("atlantis").is_none());
    }
}
