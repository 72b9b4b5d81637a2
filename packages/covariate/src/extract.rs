//! Batched covariate extraction over a grid.
//!
//! Cells are split into fixed-size batches and sent to the sampler one
//! batch at a time. A batch whose request fails, or whose response does
//! not hold exactly one record per cell, is logged and skipped:
//! its cells produce neither records nor nodata warnings, and the run
//! continues with the next batch. Partial coverage is preferred over no
//! coverage, and nothing is retried.
//!
//! Within a successful batch every required band of every cell is
//! checked. Each nodata (or missing) band is logged and counted once; a
//! cell with any such band is dropped. Valid cells get a slope-only
//! preliminary tier for auditing.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use landslide_risk_models::{
    Band, CovariateRecord, ExtractedCell, ExtractionSummary, GridCell, RiskTier,
};

use crate::progress::{ProgressCallback, null_progress};
use crate::spec::CombinedCovariateSpec;
use crate::{CovariateSampler, SamplePoint, SampleRequest};

/// Cells per sampling request when none is configured.
pub const DEFAULT_BATCH_SIZE: usize = 2_000;

/// Sampling resolution in metres when none is configured.
pub const DEFAULT_SCALE_M: f64 = 500.0;

/// Cooperative cancellation flag, checked between batches.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Creates an unset flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. The batch in flight still completes.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Valid cells and coverage statistics of one run.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Cells that passed nodata screening, in grid order.
    pub cells: Vec<ExtractedCell>,
    /// Run-level counters.
    pub summary: ExtractionSummary,
}

/// Outcome of screening one successful batch.
#[derive(Debug, Default)]
struct BatchOutcome {
    cells: Vec<ExtractedCell>,
    nodata_warnings: u64,
}

/// Walks a grid in bounded batches against a [`CovariateSampler`].
pub struct ChunkedExtractor<'a> {
    sampler: &'a dyn CovariateSampler,
    spec: &'a CombinedCovariateSpec,
    batch_size: usize,
    scale: f64,
    progress: Arc<dyn ProgressCallback>,
    cancel: CancelFlag,
}

impl<'a> ChunkedExtractor<'a> {
    /// Creates an extractor with default batch size and scale.
    #[must_use]
    pub fn new(sampler: &'a dyn CovariateSampler, spec: &'a CombinedCovariateSpec) -> Self {
        Self {
            sampler,
            spec,
            batch_size: DEFAULT_BATCH_SIZE,
            scale: DEFAULT_SCALE_M,
            progress: null_progress(),
            cancel: CancelFlag::new(),
        }
    }

    /// Sets the number of cells per request (at least 1).
    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Sets the sampling resolution in metres.
    #[must_use]
    pub const fn scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    /// Reports progress (one unit per batch) to `progress`.
    #[must_use]
    pub fn progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Stops before the next batch once `cancel` is set.
    #[must_use]
    pub fn cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Extracts covariates for every cell.
    ///
    /// Never fails: batch errors are logged and counted in the summary.
    pub async fn extract(&self, cells: &[GridCell]) -> Extraction {
        let total = cells.len();
        let num_batches = total.div_ceil(self.batch_size);
        let required = self.spec.required_bands();

        let mut extraction = Extraction::default();
        extraction.summary.total_cells = total as u64;
        self.progress.set_total(num_batches as u64);

        for (batch_idx, chunk) in cells.chunks(self.batch_size).enumerate() {
            if self.cancel.is_cancelled() {
                log::warn!(
                    "Extraction cancelled before batch {}/{num_batches}; keeping {} valid cells",
                    batch_idx + 1,
                    extraction.cells.len()
                );
                break;
            }

            let start = batch_idx * self.batch_size;
            let end = start + chunk.len();
            log::info!(
                "Fetching batch {}/{num_batches} (cells {}-{end}/{total})...",
                batch_idx + 1,
                start + 1
            );

            extraction.summary.batches += 1;

            let request = SampleRequest {
                spec: self.spec,
                scale: self.scale,
                points: chunk
                    .iter()
                    .map(|c| SamplePoint {
                        lon: c.lon,
                        lat: c.lat,
                    })
                    .collect(),
            };

            match self.sampler.sample(&request).await {
                Ok(records) if records.len() != chunk.len() => {
                    extraction.summary.failed_batches += 1;
                    log::error!(
                        "Batch {}/{num_batches} returned {} records for {} cells, skipping",
                        batch_idx + 1,
                        records.len(),
                        chunk.len()
                    );
                }
                Ok(records) => {
                    let outcome = screen_batch(batch_idx, start, chunk, &records, &required);
                    extraction.summary.nodata_warnings += outcome.nodata_warnings;
                    extraction.cells.extend(outcome.cells);
                    log::info!(
                        "Batch {} done. Valid so far: {}",
                        batch_idx + 1,
                        extraction.cells.len()
                    );
                }
                Err(e) => {
                    extraction.summary.failed_batches += 1;
                    log::error!("Batch {}/{num_batches} failed, skipping: {e}", batch_idx + 1);
                }
            }

            self.progress.inc(1);
            self.progress
                .set_message(format!("{} valid cells", extraction.cells.len()));
        }

        extraction.summary.valid_cells = extraction.cells.len() as u64;
        extraction.summary.tiers = extraction.cells.iter().map(|c| c.preliminary_tier).collect();

        log_summary(&extraction.summary);
        self.progress.finish(format!(
            "{} of {} cells valid",
            extraction.summary.valid_cells, extraction.summary.total_cells
        ));

        extraction
    }
}

/// Screens one batch's records against the cells they were sampled for.
///
/// `records` must be index-aligned with `chunk`.
fn screen_batch(
    batch_idx: usize,
    start: usize,
    chunk: &[GridCell],
    records: &[CovariateRecord],
    required: &[Band],
) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();

    for (i, (cell, record)) in chunk.iter().zip(records).enumerate() {
        let mut has_nodata = false;
        for &band in required {
            if record.get(band).is_valid() {
                continue;
            }
            has_nodata = true;
            outcome.nodata_warnings += 1;
            log::warn!(
                "NoData | batch {} | band {band} | cell {} | lon={:.4} lat={:.4}",
                batch_idx + 1,
                start + i + 1,
                cell.lon,
                cell.lat
            );
        }

        if has_nodata {
            continue;
        }

        let Some(properties) = record.validate() else {
            continue;
        };
        outcome.cells.push(ExtractedCell {
            cell: cell.clone(),
            preliminary_tier: RiskTier::from_slope(properties.slope),
            properties,
        });
    }

    outcome
}

fn log_summary(summary: &ExtractionSummary) {
    log::info!("{}", "=".repeat(60));
    log::info!("EXTRACTION COMPLETE");
    log::info!("   Total grid cells     : {}", summary.total_cells);
    log::info!(
        "   Batches              : {} ({} failed)",
        summary.batches,
        summary.failed_batches
    );
    log::info!("   Valid cells          : {}", summary.valid_cells);
    log::info!("   NoData warnings      : {}", summary.nodata_warnings);
    log::info!("   High risk            : {}", summary.tiers.high);
    log::info!("   Medium risk          : {}", summary.tiers.medium);
    log::info!("   Low risk             : {}", summary.tiers.low);
    log::info!("{}", "=".repeat(60));
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::NaiveDate;
    use landslide_risk_models::CovariateValue;

    use super::*;
    use crate::SamplerError;
    use crate::spec::CompositeWindow;

    /// Answers from a per-point closure and fails chosen call numbers.
    struct MockSampler {
        calls: Mutex<usize>,
        fail_calls: BTreeSet<usize>,
        short_calls: BTreeSet<usize>,
        cancel_on: Option<(usize, CancelFlag)>,
        respond: fn(&SamplePoint) -> serde_json::Value,
    }

    impl MockSampler {
        fn new(respond: fn(&SamplePoint) -> serde_json::Value) -> Self {
            Self {
                calls: Mutex::new(0),
                fail_calls: BTreeSet::new(),
                short_calls: BTreeSet::new(),
                cancel_on: None,
                respond,
            }
        }

        fn failing(mut self, call: usize) -> Self {
            self.fail_calls.insert(call);
            self
        }

        /// Drops the last record of the response to `call`.
        fn short(mut self, call: usize) -> Self {
            self.short_calls.insert(call);
            self
        }

        /// Sets `cancel` while answering `call`.
        fn cancelling(mut self, call: usize, cancel: CancelFlag) -> Self {
            self.cancel_on = Some((call, cancel));
            self
        }
    }

    #[async_trait]
    impl CovariateSampler for MockSampler {
        async fn sample(
            &self,
            request: &SampleRequest<'_>,
        ) -> Result<Vec<CovariateRecord>, SamplerError> {
            let call = {
                let mut calls = self.calls.lock().unwrap();
                *calls += 1;
                *calls - 1
            };
            if let Some((_, cancel)) = self.cancel_on.as_ref().filter(|(at, _)| *at == call) {
                cancel.cancel();
            }
            if self.fail_calls.contains(&call) {
                return Err(SamplerError::Service {
                    code: 504,
                    message: "computation timed out".to_string(),
                });
            }
            let mut records: Vec<CovariateRecord> = request
                .points
                .iter()
                .map(|p| {
                    let props = (self.respond)(p);
                    CovariateRecord::from_properties(props.as_object().unwrap())
                })
                .collect();
            if self.short_calls.contains(&call) {
                records.pop();
            }
            Ok(records)
        }
    }

    fn full_props(slope: serde_json::Value) -> serde_json::Value {
        serde_json::json!({
            "Elevation": 640.0, "Slope": slope, "Aspect": 180.0, "TWI": 6.0,
            "MODIS_LC": 10, "Soil_Type": 2, "NDVI": 0.6, "NDWI": -0.1,
            "Distance_to_Road": 200.0
        })
    }

    fn spec() -> CombinedCovariateSpec {
        let end = NaiveDate::from_ymd_opt(2025, 9, 30).unwrap();
        CombinedCovariateSpec::new(CompositeWindow::ending_at(end, 90), None)
    }

    #[allow(clippy::cast_precision_loss)]
    fn cells(n: usize) -> Vec<GridCell> {
        (0..n)
            .map(|i| GridCell::from_center(i, 100.0 + i as f64 * 0.01, 18.0, 0.002, 0.002))
            .collect()
    }

    #[tokio::test]
    async fn single_nodata_band_excludes_cell() {
        // Cell at lon 100.01 reports slope as nodata; everything else valid.
        let sampler = MockSampler::new(|p| {
            if (p.lon - 100.01).abs() < 1e-9 {
                full_props(serde_json::json!(-9999))
            } else {
                full_props(serde_json::json!(10.0))
            }
        });
        let spec = spec();
        let grid = cells(3);
        let extraction = ChunkedExtractor::new(&sampler, &spec)
            .extract(&grid)
            .await;

        assert_eq!(extraction.summary.nodata_warnings, 1);
        assert_eq!(extraction.summary.valid_cells, 2);
        let kept: Vec<usize> = extraction.cells.iter().map(|c| c.cell.index).collect();
        assert_eq!(kept, vec![0, 2]);
    }

    #[tokio::test]
    async fn every_bad_band_counts_once() {
        let sampler = MockSampler::new(|_| serde_json::json!({"Slope": null, "Elevation": 1.0}));
        let spec = spec();
        let extraction = ChunkedExtractor::new(&sampler, &spec)
            .extract(&cells(2))
            .await;
        assert_eq!(extraction.summary.nodata_warnings, 16);
        assert!(extraction.cells.is_empty());
    }

    #[tokio::test]
    async fn failed_batch_is_isolated() {
        let respond = |p: &SamplePoint| {
            if (p.lon - 100.0).abs() < 1e-9 {
                full_props(serde_json::json!(-9999))
            } else {
                full_props(serde_json::json!(30.0))
            }
        };
        let spec = spec();
        let grid = cells(6);

        let healthy = MockSampler::new(respond);
        let baseline = ChunkedExtractor::new(&healthy, &spec)
            .batch_size(2)
            .extract(&grid)
            .await;

        let flaky = MockSampler::new(respond).failing(1);
        let degraded = ChunkedExtractor::new(&flaky, &spec)
            .batch_size(2)
            .extract(&grid)
            .await;

        assert_eq!(baseline.summary.batches, 3);
        assert_eq!(degraded.summary.failed_batches, 1);
        assert_eq!(degraded.summary.nodata_warnings, baseline.summary.nodata_warnings);
        let kept: Vec<usize> = degraded.cells.iter().map(|c| c.cell.index).collect();
        assert_eq!(kept, vec![1, 4, 5]);
        for cell in &degraded.cells {
            let same = baseline
                .cells
                .iter()
                .find(|b| b.cell.index == cell.cell.index)
                .unwrap();
            assert_eq!(same.preliminary_tier, cell.preliminary_tier);
        }
    }

    #[tokio::test]
    async fn preliminary_tiers_follow_slope() {
        let sampler = MockSampler::new(|p| {
            let slope = if p.lon < 100.005 {
                5.0
            } else if p.lon < 100.015 {
                20.0
            } else {
                40.0
            };
            full_props(serde_json::json!(slope))
        });
        let spec = spec();
        let extraction = ChunkedExtractor::new(&sampler, &spec)
            .extract(&cells(3))
            .await;
        let tiers: Vec<RiskTier> = extraction
            .cells
            .iter()
            .map(|c| c.preliminary_tier)
            .collect();
        assert_eq!(tiers, vec![RiskTier::Low, RiskTier::Medium, RiskTier::High]);
        assert_eq!(extraction.summary.tiers.total(), 3);
    }

    #[tokio::test]
    async fn cancellation_stops_between_batches() {
        let sampler = MockSampler::new(|_| full_props(serde_json::json!(1.0)));
        let spec = spec();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let extraction = ChunkedExtractor::new(&sampler, &spec)
            .batch_size(1)
            .cancel_flag(cancel)
            .extract(&cells(4))
            .await;
        assert_eq!(extraction.summary.batches, 0);
        assert_eq!(extraction.summary.total_cells, 4);
        assert!(extraction.cells.is_empty());
    }

    #[tokio::test]
    async fn short_response_fails_whole_batch() {
        let sampler = MockSampler::new(|_| full_props(serde_json::json!(20.0))).short(0);
        let spec = spec();
        let extraction = ChunkedExtractor::new(&sampler, &spec)
            .batch_size(3)
            .extract(&cells(5))
            .await;

        assert_eq!(extraction.summary.batches, 2);
        assert_eq!(extraction.summary.failed_batches, 1);
        assert_eq!(extraction.summary.nodata_warnings, 0);
        let kept: Vec<usize> = extraction.cells.iter().map(|c| c.cell.index).collect();
        assert_eq!(kept, vec![3, 4]);
    }

    #[tokio::test]
    async fn cancellation_mid_run_keeps_finished_batches() {
        let cancel = CancelFlag::new();
        let sampler = MockSampler::new(|_| full_props(serde_json::json!(20.0)))
            .cancelling(1, cancel.clone());
        let spec = spec();
        let extraction = ChunkedExtractor::new(&sampler, &spec)
            .batch_size(2)
            .cancel_flag(cancel)
            .extract(&cells(6))
            .await;

        // The batch in flight when cancel is requested still completes.
        assert_eq!(extraction.summary.batches, 2);
        assert_eq!(extraction.summary.failed_batches, 0);
        assert_eq!(extraction.summary.valid_cells, 4);
        let kept: Vec<usize> = extraction.cells.iter().map(|c| c.cell.index).collect();
        assert_eq!(kept, vec![0, 1, 2, 3]);
        assert_eq!(extraction.summary.tiers.medium, 4);
    }

    #[test]
    fn screening_keeps_zero_values() {
        let grid = cells(1);
        let record = CovariateRecord::from_properties(
            full_props(serde_json::json!(0.0)).as_object().unwrap(),
        );
        assert_eq!(record.slope, CovariateValue::Value(0.0));
        let outcome = screen_batch(0, 0, &grid, &[record], &Band::ALL);
        assert_eq!(outcome.cells.len(), 1);
        assert_eq!(outcome.nodata_warnings, 0);
    }
}
