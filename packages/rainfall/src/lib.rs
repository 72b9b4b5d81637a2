#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Daily rainfall history for the re-scoring path.
//!
//! Rainfall is fetched once per grid group (a ~5 km lattice point), not
//! per cell. Any group whose fetch fails falls back to ten dry days so a
//! single bad response never blocks a re-score.

pub mod open_meteo;

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::stream::{self, StreamExt as _};

/// Number of past days in a rainfall series.
pub const DAYS: usize = 10;

/// Ten daily totals in millimetres. Index 0 is day 1, the most recent
/// complete day; `None` marks a day the provider had no value for.
pub type DailyRainfall = [Option<f64>; DAYS];

/// A series of ten dry days.
pub const DRY: DailyRainfall = [Some(0.0); DAYS];

/// Errors that can occur while fetching rainfall.
#[derive(Debug, thiserror::Error)]
pub enum RainfallError {
    /// HTTP request failed (connection, timeout).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Non-success HTTP status.
    #[error("Rainfall service returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Truncated response body.
        body: String,
    },

    /// The service reported an error in its body.
    #[error("Rainfall service error: {reason}")]
    Service {
        /// Reason given by the service.
        reason: String,
    },

    /// The response did not carry a usable series.
    #[error("Malformed rainfall response: {message}")]
    Malformed {
        /// What was wrong with it.
        message: String,
    },
}

/// Source of daily rainfall history at a point.
#[async_trait]
pub trait RainfallProvider: Send + Sync {
    /// Returns the last [`DAYS`] days of rainfall at `lat`, `lon`.
    ///
    /// # Errors
    ///
    /// Returns [`RainfallError`] if the series cannot be obtained.
    async fn daily(&self, lat: f64, lon: f64) -> Result<DailyRainfall, RainfallError>;
}

/// Representative location of one grid group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupLocation {
    /// Group identifier, e.g. `g_18.765_100.755`.
    pub group_id: String,
    /// Latitude of a representative cell.
    pub lat: f64,
    /// Longitude of a representative cell.
    pub lon: f64,
}

/// Fetches rainfall for every group with at most `concurrency` requests
/// in flight.
///
/// Never fails: a group whose fetch errors gets [`DRY`] and a warning.
pub async fn fetch_groups(
    provider: &dyn RainfallProvider,
    groups: &[GroupLocation],
    concurrency: usize,
) -> BTreeMap<String, DailyRainfall> {
    let concurrency = concurrency.max(1);
    log::info!(
        "Fetching rainfall for {} grid groups (concurrency={concurrency})...",
        groups.len()
    );

    let results: Vec<_> = stream::iter(groups.iter().map(|group| async move {
        let result = provider.daily(group.lat, group.lon).await;
        (group, result)
    }))
    .buffer_unordered(concurrency)
    .collect()
    .await;

    let mut failed = 0_usize;
    let series = results
        .into_iter()
        .map(|(group, result)| {
            let days = result.unwrap_or_else(|e| {
                failed += 1;
                log::warn!(
                    "Rainfall fetch failed for group {} ({:.4}, {:.4}), assuming dry: {e}",
                    group.group_id,
                    group.lat,
                    group.lon
                );
                DRY
            });
            (group.group_id.clone(), days)
        })
        .collect();

    if failed > 0 {
        log::warn!("{failed} of {} rainfall groups fell back to zero", groups.len());
    }

    series
}

/// Serves the same fixed series for every location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticRainfall {
    days: DailyRainfall,
}

impl StaticRainfall {
    /// Serves `days` everywhere.
    #[must_use]
    pub const fn new(days: DailyRainfall) -> Self {
        Self { days }
    }

    /// Serves `mm` on each of the ten days everywhere.
    #[must_use]
    pub const fn uniform(mm: f64) -> Self {
        Self::new([Some(mm); DAYS])
    }
}

impl Default for StaticRainfall {
    fn default() -> Self {
        Self::new(DRY)
    }
}

#[async_trait]
impl RainfallProvider for StaticRainfall {
    async fn daily(&self, _lat: f64, _lon: f64) -> Result<DailyRainfall, RainfallError> {
        Ok(self.days)
    }
}
