//! Open-Meteo forecast API client.
//!
//! Requests `daily=precipitation_sum` with ten past days plus today and
//! keeps the ten past days, most recent first.

use std::time::Duration;

use async_trait::async_trait;
use landslide_risk_models::text::truncate_for_log;

use crate::{DAYS, DailyRainfall, RainfallError, RainfallProvider};

/// Public forecast endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.open-meteo.com/v1/forecast";

/// Requests in flight at once.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Pause before each request, to stay within the free tier's rate limit.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(200);

/// Per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum length of a response body kept in error messages.
const BODY_PREVIEW_LEN: usize = 300;

/// Fetches daily precipitation from Open-Meteo.
pub struct OpenMeteoClient {
    client: reqwest::Client,
    base_url: String,
    delay: Duration,
}

impl OpenMeteoClient {
    /// Creates a client against `base_url` with the default timeout and
    /// courtesy delay.
    ///
    /// # Errors
    ///
    /// Returns [`RainfallError::Http`] if the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self, RainfallError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            delay: DEFAULT_DELAY,
        })
    }

    /// Overrides the pause before each request.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl RainfallProvider for OpenMeteoClient {
    async fn daily(&self, lat: f64, lon: f64) -> Result<DailyRainfall, RainfallError> {
        tokio::time::sleep(self.delay).await;

        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("latitude", lat.to_string()),
                ("longitude", lon.to_string()),
                ("daily", "precipitation_sum".to_string()),
                ("past_days", DAYS.to_string()),
                ("forecast_days", "1".to_string()),
                ("timezone", "auto".to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(RainfallError::Status {
                status: status.as_u16(),
                body: truncate_for_log(&text, BODY_PREVIEW_LEN),
            });
        }

        let body: serde_json::Value = serde_json::from_str(&text)?;
        parse_daily(&body)
    }
}

/// Extracts the ten past days from an Open-Meteo response, most recent
/// first.
///
/// The service returns the series oldest first with today last; today is
/// dropped. JSON `null` entries become `None`.
///
/// # Errors
///
/// Returns [`RainfallError::Service`] for an `{"error": true}` body and
/// [`RainfallError::Malformed`] when the series is missing or shorter
/// than ten days.
pub fn parse_daily(body: &serde_json::Value) -> Result<DailyRainfall, RainfallError> {
    if body.get("error").and_then(serde_json::Value::as_bool) == Some(true) {
        let reason = body
            .get("reason")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("unknown");
        return Err(RainfallError::Service {
            reason: reason.to_string(),
        });
    }

    let series = body
        .get("daily")
        .and_then(|d| d.get("precipitation_sum"))
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| RainfallError::Malformed {
            message: "missing daily.precipitation_sum".to_string(),
        })?;

    if series.len() < DAYS {
        return Err(RainfallError::Malformed {
            message: format!("expected at least {DAYS} days, got {}", series.len()),
        });
    }

    let mut days = [None; DAYS];
    for (slot, value) in days.iter_mut().zip(series[..DAYS].iter().rev()) {
        *slot = value.as_f64();
    }
    Ok(days)
}
