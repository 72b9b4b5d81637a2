#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Risk classification of engineered features.
//!
//! Features are standardised with a frozen [`FeatureScaler`], scored by
//! a frozen [`ScoringFunction`], and the landslide-class probability is
//! cut into Low / Medium / High with injected [`TierThresholds`].
//!
//! Scoring problems never abort a run. If the scorer errors, returns a
//! degenerate single-class prediction, or returns the wrong shape, every
//! row of that call is given probability 0 and a warning is logged.

pub mod model;
pub mod scaler;

use std::sync::Arc;

use landslide_features::{EngineeredFeatures, FEATURE_ORDER};
use landslide_risk_models::{
    ExtractedCell, LabeledCell, RainfallAggregates, RiskTier, TierCounts, TierThresholds,
};
use ndarray::{Array1, Axis};

pub use model::{LogisticModel, Scores, ScoringFunction};
pub use scaler::FeatureScaler;

/// Errors from loading or applying the frozen model artifacts.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    /// An artifact could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// Artifact path.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// An artifact is not valid JSON for its type.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An artifact does not match the model's column contract.
    #[error("Feature contract mismatch: {message}")]
    Contract {
        /// What differs.
        message: String,
    },

    /// A matrix has the wrong number of columns.
    #[error("Shape mismatch: {message}")]
    Shape {
        /// What differs.
        message: String,
    },

    /// The scoring function failed.
    #[error("Scoring failed: {message}")]
    Scoring {
        /// Failure description.
        message: String,
    },
}

/// Checks that artifact feature names equal the model column order.
fn check_feature_names(names: &[String]) -> Result<(), ClassifierError> {
    if names.iter().map(String::as_str).eq(FEATURE_ORDER) {
        return Ok(());
    }
    let first_diff = names
        .iter()
        .map(String::as_str)
        .zip(FEATURE_ORDER)
        .position(|(a, b)| a != b);
    Err(ClassifierError::Contract {
        message: match first_diff {
            Some(i) => format!(
                "column {i} is {:?}, expected {:?}",
                names[i], FEATURE_ORDER[i]
            ),
            None => format!(
                "{} feature names, expected {}",
                names.len(),
                FEATURE_ORDER.len()
            ),
        },
    })
}

/// Probability and tier of one row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    /// Landslide-class probability.
    pub probability: f64,
    /// Tier under the classifier's thresholds.
    pub tier: RiskTier,
}

/// Scaler, scorer, and thresholds applied together.
///
/// Cloning shares the scorer.
#[derive(Clone)]
pub struct RiskClassifier {
    scaler: Option<FeatureScaler>,
    scorer: Arc<dyn ScoringFunction>,
    thresholds: TierThresholds,
}

impl RiskClassifier {
    /// A classifier that feeds features to `scorer` unscaled.
    #[must_use]
    pub fn new(scorer: Arc<dyn ScoringFunction>, thresholds: TierThresholds) -> Self {
        Self {
            scaler: None,
            scorer,
            thresholds,
        }
    }

    /// Standardises features with `scaler` before scoring.
    #[must_use]
    pub fn with_scaler(mut self, scaler: FeatureScaler) -> Self {
        self.scaler = Some(scaler);
        self
    }

    /// Uses `thresholds` for tiering.
    #[must_use]
    pub const fn with_thresholds(mut self, thresholds: TierThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// The thresholds in use.
    #[must_use]
    pub const fn thresholds(&self) -> TierThresholds {
        self.thresholds
    }

    /// Landslide-class probability per row. All zeros if scaling or
    /// scoring cannot produce two-class output.
    #[must_use]
    pub fn probabilities(&self, features: &EngineeredFeatures) -> Array1<f64> {
        let rows = features.rows();
        let zeros = || Array1::zeros(rows);

        let scaled;
        let input = match &self.scaler {
            Some(scaler) => match scaler.transform(&features.matrix) {
                Ok(m) => {
                    scaled = m;
                    &scaled
                }
                Err(e) => {
                    log::warn!("Scaling failed, assigning probability 0 to {rows} rows: {e}");
                    return zeros();
                }
            },
            None => &features.matrix,
        };

        match self.scorer.score(input) {
            Ok(Scores::TwoClass(p)) if p.nrows() == rows && p.ncols() >= 2 => {
                p.index_axis(Axis(1), 1).to_owned()
            }
            Ok(Scores::TwoClass(p)) => {
                log::warn!(
                    "Scorer returned {}x{} probabilities for {rows} rows, assigning 0",
                    p.nrows(),
                    p.ncols()
                );
                zeros()
            }
            Ok(Scores::Degenerate(_)) => {
                log::warn!("Scorer is single-class, assigning probability 0 to {rows} rows");
                zeros()
            }
            Err(e) => {
                log::warn!("Scoring failed, assigning probability 0 to {rows} rows: {e}");
                zeros()
            }
        }
    }

    /// Classifies every row, preserving order.
    #[must_use]
    pub fn classify(&self, features: &EngineeredFeatures) -> Vec<Classification> {
        self.probabilities(features)
            .iter()
            .map(|&probability| Classification {
                probability,
                tier: self.thresholds.tier_for(probability),
            })
            .collect()
    }

    /// Labels `cells`, whose features are the rows of `features` in the
    /// same order.
    ///
    /// Each output carries the cell's covariates plus the rainfall
    /// aggregates under their `Rain_ND (mm)` property names.
    ///
    /// # Errors
    ///
    /// * If `features` does not hold exactly one row per cell
    pub fn label_cells(
        &self,
        cells: &[ExtractedCell],
        features: &EngineeredFeatures,
    ) -> Result<Vec<LabeledCell>, ClassifierError> {
        if cells.len() != features.rows() || cells.len() != features.rainfall.len() {
            return Err(ClassifierError::Shape {
                message: format!(
                    "{} cells but {} feature rows and {} rainfall rows",
                    cells.len(),
                    features.rows(),
                    features.rainfall.len()
                ),
            });
        }

        let classifications = self.classify(features);
        let labeled: Vec<LabeledCell> = cells
            .iter()
            .zip(classifications)
            .zip(&features.rainfall)
            .map(|((cell, classification), &rainfall)| {
                let mut properties = cell.properties.to_properties();
                insert_rainfall(&mut properties, rainfall);
                LabeledCell {
                    cell: cell.cell.clone(),
                    properties,
                    risk: classification.tier,
                    probability: classification.probability,
                    rainfall,
                }
            })
            .collect();

        let counts: TierCounts = labeled.iter().map(|c| c.risk).collect();
        log::info!(
            "Classified {} cells: {} high, {} medium, {} low",
            labeled.len(),
            counts.high,
            counts.medium,
            counts.low
        );
        Ok(labeled)
    }
}

fn insert_rainfall(
    properties: &mut std::collections::BTreeMap<String, f64>,
    rainfall: RainfallAggregates,
) {
    for (name, value) in RainfallAggregates::PROPERTY_NAMES
        .into_iter()
        .zip(rainfall.values())
    {
        properties.insert(name.to_string(), value);
    }
}
