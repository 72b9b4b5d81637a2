//! Runtime settings resolved from command-line overrides and the
//! environment.

use std::path::PathBuf;

use landslide_rainfall::open_meteo::DEFAULT_BASE_URL;

use crate::ConfigError;

/// Sampling service base URL.
pub const SAMPLER_URL_VAR: &str = "LANDSLIDE_SAMPLER_URL";
/// Sampling service bearer token.
pub const SAMPLER_TOKEN_VAR: &str = "LANDSLIDE_SAMPLER_TOKEN";
/// Path of the logistic model artifact.
pub const MODEL_PATH_VAR: &str = "LANDSLIDE_MODEL_PATH";
/// Path of the feature scaler artifact.
pub const SCALER_PATH_VAR: &str = "LANDSLIDE_SCALER_PATH";
/// Open-Meteo forecast endpoint.
pub const OPEN_METEO_URL_VAR: &str = "LANDSLIDE_OPEN_METEO_URL";

/// Where and how to reach the covariate sampling service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplerSettings {
    /// Base URL; requests go to `{url}/sample`.
    pub url: String,
    /// Bearer token.
    pub token: String,
}

impl SamplerSettings {
    /// Uses the given values, falling back to [`SAMPLER_URL_VAR`] and
    /// [`SAMPLER_TOKEN_VAR`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] if either is unset.
    pub fn resolve(url: Option<String>, token: Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            url: required(url, SAMPLER_URL_VAR)?,
            token: required(token, SAMPLER_TOKEN_VAR)?,
        })
    }
}

/// Locations of the frozen model artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSettings {
    /// Logistic model JSON.
    pub model_path: PathBuf,
    /// Feature scaler JSON. Without one, features are scored unscaled.
    pub scaler_path: Option<PathBuf>,
}

impl ModelSettings {
    /// Uses the given paths, falling back to [`MODEL_PATH_VAR`] and
    /// [`SCALER_PATH_VAR`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] if no model path is available.
    pub fn resolve(
        model_path: Option<PathBuf>,
        scaler_path: Option<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let model_path = match model_path {
            Some(path) => path,
            None => PathBuf::from(required(None, MODEL_PATH_VAR)?),
        };
        let scaler_path = scaler_path.or_else(|| env_var(SCALER_PATH_VAR).map(PathBuf::from));
        if scaler_path.is_none() {
            log::warn!("No feature scaler configured ({SCALER_PATH_VAR}); scoring raw features");
        }
        Ok(Self {
            model_path,
            scaler_path,
        })
    }
}

/// The Open-Meteo endpoint, from the override, [`OPEN_METEO_URL_VAR`],
/// or the public default.
#[must_use]
pub fn open_meteo_url(url: Option<String>) -> String {
    url.or_else(|| env_var(OPEN_METEO_URL_VAR))
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
}

fn required(value: Option<String>, var: &str) -> Result<String, ConfigError> {
    value
        .or_else(|| env_var(var))
        .ok_or_else(|| ConfigError::Missing {
            name: var.to_string(),
        })
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
