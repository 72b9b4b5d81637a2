//! HTTP client for the covariate sampling service.
//!
//! Each call is a single `POST {base_url}/sample` carrying the band
//! composition, the sampling scale, and the batch of points. The service
//! replies with a feature collection holding one feature per point:
//!
//! ```text
//! {"features": [{"properties": {"Elevation": 812.0, "Slope": 14.2, ...}}, ...]}
//! ```
//!
//! Failures are returned to the caller as-is. There is deliberately no
//! retry here: the extractor abandons a failed batch and moves on.

use std::time::Duration;

use async_trait::async_trait;
use landslide_risk_models::CovariateRecord;
use landslide_risk_models::text::truncate_for_log;

use crate::{CovariateSampler, SampleRequest, SamplerError};

/// Per-request timeout when none is configured.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Maximum length of a response body quoted in an error.
const BODY_PREVIEW_LEN: usize = 500;

const USER_AGENT: &str = concat!("landslide-risk/", env!("CARGO_PKG_VERSION"));

/// Samples covariates over HTTP with bearer-token authentication.
pub struct HttpSampler {
    client: reqwest::Client,
    base_url: String,
    token: String,
    timeout: Duration,
}

impl HttpSampler {
    /// Creates a sampler for the service at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`SamplerError::Http`] if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SamplerError> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            timeout,
        })
    }
}

#[async_trait]
impl CovariateSampler for HttpSampler {
    async fn sample(
        &self,
        request: &SampleRequest<'_>,
    ) -> Result<Vec<CovariateRecord>, SamplerError> {
        let url = format!("{}/sample", self.base_url);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .timeout(self.timeout)
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(SamplerError::Status {
                status: status.as_u16(),
                body: truncate_for_log(&body, BODY_PREVIEW_LEN),
            });
        }

        let json: serde_json::Value = serde_json::from_str(&body)?;
        parse_sample_response(&json, request.points.len())
    }
}

/// Parses a sampling response, expecting exactly `expected` features.
///
/// # Errors
///
/// Returns [`SamplerError::Service`] for an error envelope and
/// [`SamplerError::Malformed`] if the feature list is absent or its length
/// differs from the request.
pub fn parse_sample_response(
    json: &serde_json::Value,
    expected: usize,
) -> Result<Vec<CovariateRecord>, SamplerError> {
    // Error envelope: {"error": {"code": 429, "message": "..."}}
    if let Some(error_obj) = json.get("error") {
        let code = error_obj
            .get("code")
            .and_then(serde_json::Value::as_i64)
            .unwrap_or(0);
        let message = error_obj
            .get("message")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        return Err(SamplerError::Service { code, message });
    }

    let features = json["features"]
        .as_array()
        .ok_or_else(|| SamplerError::Malformed {
            message: "No features array in sampling response".to_string(),
        })?;

    if features.len() != expected {
        return Err(SamplerError::Malformed {
            message: format!(
                "expected {expected} features, received {}",
                features.len()
            ),
        });
    }

    let empty = serde_json::Map::new();
    Ok(features
        .iter()
        .map(|feature| {
            let properties = feature
                .get("properties")
                .and_then(serde_json::Value::as_object)
                .unwrap_or(&empty);
            CovariateRecord::from_properties(properties)
        })
        .collect())
}
