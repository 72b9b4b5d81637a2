#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Landslide risk runs over a study region.
//!
//! A [`PipelineContext`] is built once per process from a [`Region`] and
//! the frozen model artifacts. It then drives either path:
//!
//! - **batch**: grid, chunked covariate extraction, feature engineering,
//!   and classification with the region's batch thresholds;
//! - **re-score**: previously extracted cells are combined with live
//!   rainfall (fetched once per ~5 km grid group) and classified with
//!   the serving thresholds.
//!
//! Neither path fails part-way: bad batches, missing rainfall, and
//! scorer problems are logged and degrade the result instead.

pub mod config;
pub mod output;
pub mod region;

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::NaiveDate;
use landslide_classifier::{ClassifierError, FeatureScaler, LogisticModel, RiskClassifier};
use landslide_covariate::extract::{CancelFlag, ChunkedExtractor, Extraction};
use landslide_covariate::http::{DEFAULT_REQUEST_TIMEOUT, HttpSampler};
use landslide_covariate::progress::ProgressCallback;
use landslide_covariate::spec::{CombinedCovariateSpec, CompositeWindow};
use landslide_covariate::{CovariateSampler, SamplerError};
use landslide_features::{FeatureEngineer, FeatureInput};
use landslide_grid::{generate_grid, grid_group_id};
use landslide_rainfall::open_meteo::DEFAULT_CONCURRENCY;
use landslide_rainfall::{DRY, GroupLocation, RainfallError, RainfallProvider, fetch_groups};
use landslide_risk_models::{
    ExtractedCell, ExtractionSummary, GridCell, LabeledCell, TierCounts,
};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::config::{ModelSettings, SamplerSettings};
use crate::region::Region;

/// Configuration problems, fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required setting was not given and its variable is unset.
    #[error("Missing configuration: set {name} or pass it on the command line")]
    Missing {
        /// Environment variable name.
        name: String,
    },

    /// No region has the requested id.
    #[error("Unknown region: {id}")]
    UnknownRegion {
        /// Requested id.
        id: String,
    },
}

/// Errors that can occur while setting up or persisting a run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Invalid or missing configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The sampling client could not be created.
    #[error("Sampler error: {0}")]
    Sampler(#[from] SamplerError),

    /// The rainfall client could not be created.
    #[error("Rainfall error: {0}")]
    Rainfall(#[from] RainfallError),

    /// A model artifact could not be loaded.
    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    /// A file could not be read or written.
    #[error("Failed to access {path}: {source}")]
    Io {
        /// File path.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Which of a region's threshold sets to classify with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum ThresholdProfile {
    /// Thresholds the model was calibrated with.
    Batch,
    /// Thresholds of the live map.
    Serving,
}

/// Outcome of a full batch run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Extraction coverage statistics.
    pub summary: ExtractionSummary,
    /// Valid cells as extracted, for re-scoring later.
    pub extracted: Vec<ExtractedCell>,
    /// Classified cells in grid order.
    pub labeled: Vec<LabeledCell>,
    /// Model tier distribution of `labeled`.
    pub tiers: TierCounts,
}

/// Loads the frozen model and optional scaler. Tiers default to the
/// region's batch thresholds.
///
/// # Errors
///
/// Returns [`PipelineError::Classifier`] if an artifact cannot be loaded
/// or does not match the feature contract.
pub fn load_classifier(
    region: &Region,
    model: &ModelSettings,
) -> Result<RiskClassifier, PipelineError> {
    let scorer = LogisticModel::load(&model.model_path)?;
    let mut classifier = RiskClassifier::new(Arc::new(scorer), region.thresholds.batch);
    if let Some(path) = &model.scaler_path {
        classifier = classifier.with_scaler(FeatureScaler::load(path)?);
    }
    Ok(classifier)
}

/// The band composition for `region` with the imagery composite ending
/// at `composite_end`.
#[must_use]
pub fn covariate_spec(region: &Region, composite_end: NaiveDate) -> CombinedCovariateSpec {
    let window = CompositeWindow::ending_at(composite_end, region.composite_days);
    CombinedCovariateSpec::new(window, region.road_dataset.as_deref())
}

/// Extracts covariates for `cells` in the region's batch size and scale.
pub async fn extract_cells(
    region: &Region,
    spec: &CombinedCovariateSpec,
    sampler: &dyn CovariateSampler,
    cells: &[GridCell],
    progress: Arc<dyn ProgressCallback>,
    cancel: CancelFlag,
) -> Extraction {
    ChunkedExtractor::new(sampler, spec)
        .batch_size(region.batch_size)
        .scale(region.scale_m)
        .progress(progress)
        .cancel_flag(cancel)
        .extract(cells)
        .await
}

/// Classifies extracted cells using whatever rainfall their properties
/// already carry.
///
/// # Errors
///
/// Returns [`PipelineError::Classifier`] if the engineered rows do not
/// line up with `cells`.
pub fn score_cells(
    classifier: &RiskClassifier,
    region: &Region,
    cells: &[ExtractedCell],
    profile: ThresholdProfile,
) -> Result<Vec<LabeledCell>, PipelineError> {
    let inputs: Vec<FeatureInput> = cells
        .iter()
        .map(|c| FeatureInput::from_covariates(&c.properties))
        .collect();
    label(classifier, region, cells, &inputs, profile)
}

/// Classifies extracted cells with fresh rainfall from `provider`,
/// fetched once per grid group.
///
/// # Errors
///
/// Returns [`PipelineError::Classifier`] if the engineered rows do not
/// line up with `cells`.
pub async fn rescore_cells(
    classifier: &RiskClassifier,
    region: &Region,
    cells: &[ExtractedCell],
    provider: &dyn RainfallProvider,
    profile: ThresholdProfile,
) -> Result<Vec<LabeledCell>, PipelineError> {
    let (groups, membership) = group_cells(cells);
    log::info!(
        "Re-scoring {} cells across {} rainfall groups",
        cells.len(),
        groups.len()
    );
    let rain = fetch_groups(provider, &groups, DEFAULT_CONCURRENCY).await;

    let inputs: Vec<FeatureInput> = cells
        .iter()
        .zip(&membership)
        .map(|(cell, group)| {
            let days = rain.get(group).copied().unwrap_or(DRY);
            FeatureInput::from_covariates(&cell.properties).with_rain(days)
        })
        .collect();
    label(classifier, region, cells, &inputs, profile)
}

fn label(
    classifier: &RiskClassifier,
    region: &Region,
    cells: &[ExtractedCell],
    inputs: &[FeatureInput],
    profile: ThresholdProfile,
) -> Result<Vec<LabeledCell>, PipelineError> {
    let features = FeatureEngineer.engineer(inputs);
    Ok(classifier
        .clone()
        .with_thresholds(region.thresholds.get(profile))
        .label_cells(cells, &features)?)
}

/// Everything a full run needs, built once and shared by every operation.
pub struct PipelineContext {
    region: Region,
    spec: CombinedCovariateSpec,
    sampler: Box<dyn CovariateSampler>,
    classifier: RiskClassifier,
}

impl PipelineContext {
    /// Assembles a context from ready-made parts. The imagery composite
    /// window ends at `composite_end`.
    #[must_use]
    pub fn new(
        region: Region,
        sampler: Box<dyn CovariateSampler>,
        classifier: RiskClassifier,
        composite_end: NaiveDate,
    ) -> Self {
        let spec = covariate_spec(&region, composite_end);
        Self {
            region,
            spec,
            sampler,
            classifier,
        }
    }

    /// Builds the HTTP sampler and loads the model artifacts. The
    /// composite window ends today.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the HTTP client cannot be built or an
    /// artifact cannot be loaded.
    pub fn from_settings(
        region: Region,
        sampler: &SamplerSettings,
        model: &ModelSettings,
    ) -> Result<Self, PipelineError> {
        let http = HttpSampler::new(&sampler.url, &sampler.token, DEFAULT_REQUEST_TIMEOUT)?;
        let classifier = load_classifier(&region, model)?;

        let today = chrono::Utc::now().date_naive();
        log::info!(
            "Pipeline ready for {} ({}), composite ending {today}",
            region.name,
            region.id
        );
        Ok(Self::new(region, Box::new(http), classifier, today))
    }

    /// The region being processed.
    #[must_use]
    pub const fn region(&self) -> &Region {
        &self.region
    }

    /// The band composition sent with each sampling request.
    #[must_use]
    pub const fn covariate_spec(&self) -> &CombinedCovariateSpec {
        &self.spec
    }

    /// The region's sampling grid.
    #[must_use]
    pub fn grid(&self) -> Vec<GridCell> {
        generate_grid(&self.region.bbox, self.region.cell_size_m)
    }

    /// See [`extract_cells`].
    pub async fn extract(
        &self,
        cells: &[GridCell],
        progress: Arc<dyn ProgressCallback>,
        cancel: CancelFlag,
    ) -> Extraction {
        extract_cells(
            &self.region,
            &self.spec,
            self.sampler.as_ref(),
            cells,
            progress,
            cancel,
        )
        .await
    }

    /// See [`score_cells`].
    ///
    /// # Errors
    ///
    /// See [`score_cells`].
    pub fn score(
        &self,
        cells: &[ExtractedCell],
        profile: ThresholdProfile,
    ) -> Result<Vec<LabeledCell>, PipelineError> {
        score_cells(&self.classifier, &self.region, cells, profile)
    }

    /// See [`rescore_cells`].
    ///
    /// # Errors
    ///
    /// See [`rescore_cells`].
    pub async fn rescore(
        &self,
        cells: &[ExtractedCell],
        provider: &dyn RainfallProvider,
        profile: ThresholdProfile,
    ) -> Result<Vec<LabeledCell>, PipelineError> {
        rescore_cells(&self.classifier, &self.region, cells, provider, profile).await
    }

    /// Grid, extraction, and batch-profile classification in one go.
    ///
    /// # Errors
    ///
    /// See [`score_cells`].
    pub async fn run(
        &self,
        progress: Arc<dyn ProgressCallback>,
        cancel: CancelFlag,
    ) -> Result<RunReport, PipelineError> {
        let grid = self.grid();
        log::info!(
            "Generated {} cells over {} at {} m",
            grid.len(),
            self.region.name,
            self.region.cell_size_m
        );

        let extraction = self.extract(&grid, progress, cancel).await;
        let labeled = self.score(&extraction.cells, ThresholdProfile::Batch)?;
        let tiers: TierCounts = labeled.iter().map(|c| c.risk).collect();

        Ok(RunReport {
            summary: extraction.summary,
            extracted: extraction.cells,
            labeled,
            tiers,
        })
    }
}

/// Groups cells by [`grid_group_id`]. Returns one location per group
/// (its first cell, in input order) and each cell's group id.
#[must_use]
pub fn group_cells(cells: &[ExtractedCell]) -> (Vec<GroupLocation>, Vec<String>) {
    let mut seen = BTreeSet::new();
    let mut groups = Vec::new();
    let membership = cells
        .iter()
        .map(|c| {
            let id = grid_group_id(c.cell.lat, c.cell.lon);
            if seen.insert(id.clone()) {
                groups.push(GroupLocation {
                    group_id: id.clone(),
                    lat: c.cell.lat,
                    lon: c.cell.lon,
                });
            }
            id
        })
        .collect();
    (groups, membership)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use landslide_classifier::{Scores, ScoringFunction};
    use landslide_covariate::SampleRequest;
    use landslide_covariate::progress::null_progress;
    use landslide_features::FEATURE_ORDER;
    use landslide_rainfall::StaticRainfall;
    use landslide_risk_models::{BoundingBox, CovariateRecord, RiskTier};
    use ndarray::Array2;

    use super::*;

    /// Serves fixed covariates; slope comes from `slope_at`, and chosen
    /// call numbers fail.
    struct FixedSampler {
        slope_at: fn(f64, f64) -> serde_json::Value,
        fail_calls: Vec<usize>,
        calls: Mutex<usize>,
    }

    impl FixedSampler {
        fn new(slope_at: fn(f64, f64) -> serde_json::Value) -> Self {
            Self {
                slope_at,
                fail_calls: Vec::new(),
                calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl CovariateSampler for FixedSampler {
        async fn sample(
            &self,
            request: &SampleRequest<'_>,
        ) -> Result<Vec<CovariateRecord>, SamplerError> {
            let call = {
                let mut calls = self.calls.lock().unwrap();
                *calls += 1;
                *calls - 1
            };
            if self.fail_calls.contains(&call) {
                return Err(SamplerError::Malformed {
                    message: "timed out".to_string(),
                });
            }
            Ok(request
                .points
                .iter()
                .map(|p| {
                    let props = serde_json::json!({
                        "Elevation": 640.0, "Slope": (self.slope_at)(p.lon, p.lat),
                        "Aspect": 180.0, "TWI": 6.0, "MODIS_LC": 10, "Soil_Type": 2,
                        "NDVI": 0.6, "NDWI": -0.1, "Distance_to_Road": 200.0
                    });
                    CovariateRecord::from_properties(props.as_object().unwrap())
                })
                .collect())
        }
    }

    struct ConstantScorer(f64);

    impl ScoringFunction for ConstantScorer {
        fn score(&self, features: &Array2<f64>) -> Result<Scores, ClassifierError> {
            assert_eq!(features.ncols(), FEATURE_ORDER.len());
            let mut p = Array2::zeros((features.nrows(), 2));
            p.column_mut(0).fill(1.0 - self.0);
            p.column_mut(1).fill(self.0);
            Ok(Scores::TwoClass(p))
        }
    }

    /// Constant probability that keeps the last matrix it was given.
    struct RecordingScorer {
        p: f64,
        seen: Mutex<Option<Array2<f64>>>,
    }

    impl ScoringFunction for RecordingScorer {
        fn score(&self, features: &Array2<f64>) -> Result<Scores, ClassifierError> {
            *self.seen.lock().unwrap() = Some(features.clone());
            ConstantScorer(self.p).score(features)
        }
    }

    fn column(features: &Array2<f64>, name: &str) -> Vec<f64> {
        let idx = FEATURE_ORDER.iter().position(|c| *c == name).unwrap();
        features.column(idx).to_vec()
    }

    fn small_region(bbox: BoundingBox, batch_size: usize) -> Region {
        let mut region = region::region("nan").unwrap();
        region.bbox = bbox;
        region.batch_size = batch_size;
        region
    }

    fn context(region: Region, sampler: FixedSampler, p: f64) -> PipelineContext {
        context_with(region, sampler, Arc::new(ConstantScorer(p)))
    }

    fn context_with(
        region: Region,
        sampler: FixedSampler,
        scorer: Arc<dyn ScoringFunction>,
    ) -> PipelineContext {
        let classifier = RiskClassifier::new(scorer, region.thresholds.batch);
        let end = NaiveDate::from_ymd_opt(2025, 9, 30).unwrap();
        PipelineContext::new(region, Box::new(sampler), classifier, end)
    }

    #[tokio::test]
    async fn two_by_two_grid_with_steady_rain() {
        let region = small_region(BoundingBox::new(0.0, 0.0, 0.01, 0.01), 2_000);
        let scorer = Arc::new(RecordingScorer {
            p: 0.20,
            seen: Mutex::new(None),
        });
        let ctx = context_with(
            region,
            FixedSampler::new(|_, _| serde_json::json!(10.0)),
            scorer.clone(),
        );

        let grid = ctx.grid();
        assert_eq!(grid.len(), 4);

        let extraction = ctx.extract(&grid, null_progress(), CancelFlag::new()).await;
        assert_eq!(extraction.summary.valid_cells, 4);
        assert_eq!(extraction.summary.nodata_warnings, 0);

        let labeled = ctx
            .rescore(
                &extraction.cells,
                &StaticRainfall::uniform(1.0),
                ThresholdProfile::Batch,
            )
            .await
            .unwrap();

        assert_eq!(labeled.len(), 4);
        for (i, cell) in labeled.iter().enumerate() {
            assert_eq!(cell.cell.index, i);
            assert_eq!(cell.risk, RiskTier::Low);
            assert!((cell.probability - 0.20).abs() < 1e-12);
            assert!((cell.rainfall.rain_3d - 3.0).abs() < 1e-12);
            assert!((cell.rainfall.rain_5d - 5.0).abs() < 1e-12);
            assert!((cell.rainfall.rain_7d - 7.0).abs() < 1e-12);
            assert!((cell.rainfall.rain_10d - 10.0).abs() < 1e-12);
        }

        let seen = scorer.seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen.dim(), (4, FEATURE_ORDER.len()));
        for (name, expected) in [
            ("Rain3D_x_Slope", 30.0),
            ("Rain10D_x_Slope", 100.0),
            ("Rain_3D_Prior", 3.0),
            ("Slope_Extracted", 10.0),
            ("CHIRPS_Day_1", 1.0),
        ] {
            for value in column(&seen, name) {
                assert!((value - expected).abs() < 1e-9, "{name} = {value}");
            }
        }
    }

    #[tokio::test]
    async fn nodata_slope_cell_is_excluded() {
        let region = small_region(BoundingBox::new(0.0, 0.0, 0.005, 0.005), 2_000);
        let ctx = context(region, FixedSampler::new(|_, _| serde_json::json!(-9999)), 0.5);

        let report = ctx.run(null_progress(), CancelFlag::new()).await.unwrap();
        assert_eq!(report.summary.total_cells, 1);
        assert_eq!(report.summary.nodata_warnings, 1);
        assert_eq!(report.summary.valid_cells, 0);
        assert!(report.labeled.is_empty());
        assert_eq!(report.tiers.total(), 0);
    }

    #[tokio::test]
    async fn failed_batch_only_loses_its_cells() {
        let region = small_region(BoundingBox::new(0.0, 0.0, 0.01, 0.01), 1);
        let mut sampler = FixedSampler::new(|_, _| serde_json::json!(30.0));
        sampler.fail_calls = vec![2];
        let ctx = context(region, sampler, 0.75);

        let report = ctx.run(null_progress(), CancelFlag::new()).await.unwrap();
        assert_eq!(report.summary.batches, 4);
        assert_eq!(report.summary.failed_batches, 1);
        assert_eq!(report.summary.valid_cells, 3);
        let kept: Vec<usize> = report.labeled.iter().map(|c| c.cell.index).collect();
        assert_eq!(kept, vec![0, 1, 3]);
        assert!(report.labeled.iter().all(|c| c.risk == RiskTier::High));
        assert_eq!(report.tiers.high, 3);
    }

    #[tokio::test]
    async fn serving_profile_uses_serving_thresholds() {
        let region = small_region(BoundingBox::new(0.0, 0.0, 0.005, 0.005), 2_000);
        let ctx = context(region, FixedSampler::new(|_, _| serde_json::json!(10.0)), 0.75);
        let grid = ctx.grid();
        let extraction = ctx.extract(&grid, null_progress(), CancelFlag::new()).await;

        let batch = ctx.score(&extraction.cells, ThresholdProfile::Batch).unwrap();
        let serving = ctx
            .rescore(
                &extraction.cells,
                &StaticRainfall::default(),
                ThresholdProfile::Serving,
            )
            .await
            .unwrap();
        assert_eq!(batch[0].risk, RiskTier::High);
        assert_eq!(serving[0].risk, RiskTier::Medium);
    }

    #[test]
    fn nearby_cells_share_a_rainfall_group() {
        let cell = |index, lon, lat| ExtractedCell {
            cell: GridCell::from_center(index, lon, lat, 0.002, 0.002),
            properties: serde_json::from_value(serde_json::json!({
                "Elevation": 1.0, "Slope": 1.0, "Aspect": 1.0, "TWI": 1.0,
                "MODIS_LC": 1.0, "Soil_Type": 1.0, "NDVI": 1.0, "NDWI": 1.0,
                "Distance_to_Road": 1.0
            }))
            .unwrap(),
            preliminary_tier: RiskTier::Low,
        };
        let cells = [
            cell(0, 100.751, 18.761),
            cell(1, 100.752, 18.762),
            cell(2, 101.2, 19.3),
        ];
        let (groups, membership) = group_cells(&cells);
        assert_eq!(groups.len(), 2);
        assert_eq!(membership[0], membership[1]);
        assert_ne!(membership[0], membership[2]);
        assert!((groups[0].lon - 100.751).abs() < f64::EPSILON);
    }

    #[test]
    fn profile_parses_from_lowercase() {
        assert_eq!(
            "batch".parse::<ThresholdProfile>().unwrap(),
            ThresholdProfile::Batch
        );
        assert_eq!(ThresholdProfile::Serving.to_string(), "serving");
    }
}
