//! Scoring functions.

use std::path::Path;

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::ClassifierError;

/// Raw output of a scoring function.
#[derive(Debug, Clone, PartialEq)]
pub enum Scores {
    /// Per-class probabilities, one row per input row. Column 1 is the
    /// landslide class.
    TwoClass(Array2<f64>),
    /// Point predictions from a model that only ever saw one class.
    Degenerate(Array1<f64>),
}

/// A frozen model mapping a feature matrix to class scores.
pub trait ScoringFunction: Send + Sync {
    /// Scores every row of `features`.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifierError`] if the matrix cannot be scored.
    fn score(&self, features: &Array2<f64>) -> Result<Scores, ClassifierError>;
}

/// A frozen logistic-regression artifact.
///
/// Stored as `{"feature_names", "classes", "coefficients", "intercept"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    /// Column names the coefficients apply to, in order.
    pub feature_names: Vec<String>,
    /// Class labels seen during training.
    pub classes: Vec<f64>,
    /// One coefficient per feature.
    pub coefficients: Vec<f64>,
    /// Bias term.
    pub intercept: f64,
}

impl LogisticModel {
    /// Parses a model artifact.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifierError::Json`] on malformed JSON and
    /// [`ClassifierError::Contract`] if the feature names differ from the
    /// model column order, the coefficient count is wrong, or no classes
    /// are listed.
    pub fn from_json(json: &str) -> Result<Self, ClassifierError> {
        let model: Self = serde_json::from_str(json)?;
        crate::check_feature_names(&model.feature_names)?;
        if model.coefficients.len() != model.feature_names.len() {
            return Err(ClassifierError::Contract {
                message: format!(
                    "{} coefficients for {} features",
                    model.coefficients.len(),
                    model.feature_names.len()
                ),
            });
        }
        if model.classes.is_empty() {
            return Err(ClassifierError::Contract {
                message: "model lists no classes".to_string(),
            });
        }
        Ok(model)
    }

    /// Reads a model artifact from `path`.
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
        let model = Self::from_json(&json)?;
        log::info!(
            "Loaded logistic model from {} ({} classes)",
            path.display(),
            model.classes.len()
        );
        Ok(model)
    }
}

impl ScoringFunction for LogisticModel {
    fn score(&self, features: &Array2<f64>) -> Result<Scores, ClassifierError> {
        if features.ncols() != self.coefficients.len() {
            return Err(ClassifierError::Shape {
                message: format!(
                    "model expects {} columns, got {}",
                    self.coefficients.len(),
                    features.ncols()
                ),
            });
        }

        if let [only] = self.classes.as_slice() {
            return Ok(Scores::Degenerate(Array1::from_elem(features.nrows(), *only)));
        }

        let weights = Array1::from(self.coefficients.clone());
        let positive = (features.dot(&weights) + self.intercept).mapv(sigmoid);

        let mut probabilities = Array2::<f64>::zeros((features.nrows(), 2));
        probabilities
            .index_axis_mut(Axis(1), 0)
            .assign(&positive.mapv(|p| 1.0 - p));
        probabilities.index_axis_mut(Axis(1), 1).assign(&positive);
        Ok(Scores::TwoClass(probabilities))
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}
