#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared types for the landslide risk pipeline.
//!
//! Grid geometry, per-cell covariate records, and risk tiers live here so
//! that the extraction, feature engineering, and classification crates all
//! agree on one vocabulary. The distinction between a covariate that is
//! missing, one that is explicitly "no data", and a legitimate zero is
//! carried by [`covariate::CovariateValue`] rather than by convention.

pub mod covariate;
pub mod grid;
pub mod risk;
pub mod text;

pub use covariate::{Band, CovariateRecord, CovariateValue, ExtractedCell, ValidCovariates};
pub use grid::{BoundingBox, GridCell};
pub use risk::{
    ExtractionSummary, LabeledCell, RainfallAggregates, RiskTier, TierCounts, TierThresholds,
};
