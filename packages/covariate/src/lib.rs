#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Covariate sampling for grid cells.
//!
//! The [`spec`] module describes which bands the earth-observation service
//! composes for every point. [`CovariateSampler`] is the seam to that
//! service ([`http::HttpSampler`] talks to it over HTTP), and
//! [`extract::ChunkedExtractor`] walks the grid in bounded batches,
//! isolating failures so one bad batch never aborts a run.

pub mod extract;
pub mod http;
pub mod progress;
pub mod spec;

use async_trait::async_trait;
use landslide_risk_models::CovariateRecord;
use serde::{Deserialize, Serialize};

use crate::spec::CombinedCovariateSpec;

/// Errors from a single sampling request.
#[derive(Debug, thiserror::Error)]
pub enum SamplerError {
    /// HTTP request failed (connection, timeout, body read).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body was not valid JSON.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Service answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Truncated response body.
        body: String,
    },

    /// Service answered with an error envelope (quota, computation timeout).
    #[error("Sampling service error {code}: {message}")]
    Service {
        /// Error code reported by the service.
        code: i64,
        /// Error message reported by the service.
        message: String,
    },

    /// Response did not follow the sampling contract.
    #[error("Malformed sampling response: {message}")]
    Malformed {
        /// Description of what was wrong.
        message: String,
    },
}

/// A point to sample, in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplePoint {
    /// Longitude.
    pub lon: f64,
    /// Latitude.
    pub lat: f64,
}

/// One batched sampling request.
#[derive(Debug, Clone, Serialize)]
pub struct SampleRequest<'a> {
    /// Bands to compose for every point.
    pub spec: &'a CombinedCovariateSpec,
    /// Sampling resolution in metres.
    pub scale: f64,
    /// Points to sample, in order.
    pub points: Vec<SamplePoint>,
}

/// The external covariate sampling service.
///
/// Implementations return exactly one record per requested point, in
/// request order. Any other shape is an error.
#[async_trait]
pub trait CovariateSampler: Send + Sync {
    /// Samples every band of `request.spec` at every point.
    ///
    /// # Errors
    ///
    /// Returns [`SamplerError`] if the request fails or the response does
    /// not match the request.
    async fn sample(&self, request: &SampleRequest<'_>)
    -> Result<Vec<CovariateRecord>, SamplerError>;
}
