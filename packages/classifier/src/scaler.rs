//! Frozen per-column standardisation.

use std::path::Path;

use landslide_features::FEATURE_ORDER;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::ClassifierError;

/// On-disk form: `{"feature_names": [...], "mean": [...], "scale": [...]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScalerFile {
    feature_names: Vec<String>,
    mean: Vec<f64>,
    scale: Vec<f64>,
}

/// Applies `(x - mean) / scale` column by column with parameters fit at
/// training time. A zero scale is treated as 1.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl FeatureScaler {
    /// Builds a scaler for the model's column order.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifierError::Contract`] if either vector does not
    /// have one entry per model column.
    pub fn new(mean: Vec<f64>, scale: Vec<f64>) -> Result<Self, ClassifierError> {
        if mean.len() != FEATURE_ORDER.len() || scale.len() != FEATURE_ORDER.len() {
            return Err(ClassifierError::Contract {
                message: format!(
                    "scaler has {} means and {} scales, model expects {} columns",
                    mean.len(),
                    scale.len(),
                    FEATURE_ORDER.len()
                ),
            });
        }
        let scale = scale
            .into_iter()
            .map(|s| if s == 0.0 { 1.0 } else { s })
            .collect();
        Ok(Self {
            mean: Array1::from(mean),
            scale,
        })
    }

    /// Parses a scaler artifact.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifierError::Json`] on malformed JSON and
    /// [`ClassifierError::Contract`] if the feature names differ from the
    /// model's column order.
    pub fn from_json(json: &str) -> Result<Self, ClassifierError> {
        let file: ScalerFile = serde_json::from_str(json)?;
        crate::check_feature_names(&file.feature_names)?;
        Self::new(file.mean, file.scale)
    }

    /// Reads a scaler artifact from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifierError::Io`] if the file cannot be read, or any
    /// error of [`Self::from_json`].
    pub fn load(path: &Path) -> Result<Self, ClassifierError> {
        let json = std::fs::read_to_string(path).map_err(|source| ClassifierError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let scaler = Self::from_json(&json)?;
        log::info!("Loaded feature scaler from {}", path.display());
        Ok(scaler)
    }

    /// Standardises every row of `matrix`.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifierError::Shape`] if the column count is wrong.
    pub fn transform(&self, matrix: &Array2<f64>) -> Result<Array2<f64>, ClassifierError> {
        if matrix.ncols() != self.mean.len() {
            return Err(ClassifierError::Shape {
                message: format!(
                    "scaler expects {} columns, got {}",
                    self.mean.len(),
                    matrix.ncols()
                ),
            });
        }
        Ok((matrix - &self.mean) / &self.scale)
    }
}
