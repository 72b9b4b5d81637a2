//! Result files: labeled cells as JSON and `GeoJSON`, and extracted
//! cells as JSON for later re-scoring.

use std::path::Path;

use geojson::{Feature, FeatureCollection, GeoJson, Geometry, JsonObject, JsonValue};
use landslide_risk_models::{ExtractedCell, ExtractionSummary, LabeledCell};
use serde::{Deserialize, Serialize};

use crate::PipelineError;

/// An extraction run as written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionFile {
    /// Region the cells belong to.
    pub region: String,
    /// Coverage statistics of the run.
    pub summary: ExtractionSummary,
    /// Valid cells in grid order.
    pub cells: Vec<ExtractedCell>,
}

/// Writes labeled cells as a JSON array.
///
/// # Errors
///
/// Returns [`PipelineError`] if serialization or the write fails.
pub fn write_json(path: &Path, cells: &[LabeledCell]) -> Result<(), PipelineError> {
    write(path, &serde_json::to_string(cells)?)?;
    log::info!("Wrote {} labeled cells to {}", cells.len(), path.display());
    Ok(())
}

/// Writes labeled cells as a `GeoJSON` `FeatureCollection`.
///
/// # Errors
///
/// Returns [`PipelineError`] if the write fails.
pub fn write_geojson(path: &Path, cells: &[LabeledCell]) -> Result<(), PipelineError> {
    let geojson = GeoJson::from(to_feature_collection(cells));
    write(path, &geojson.to_string())?;
    log::info!("Wrote {} features to {}", cells.len(), path.display());
    Ok(())
}

/// Writes an extraction run for later scoring.
///
/// # Errors
///
/// Returns [`PipelineError`] if serialization or the write fails.
pub fn write_extraction(path: &Path, extraction: &ExtractionFile) -> Result<(), PipelineError> {
    write(path, &serde_json::to_string(extraction)?)?;
    log::info!(
        "Wrote {} extracted cells to {}",
        extraction.cells.len(),
        path.display()
    );
    Ok(())
}

/// Reads an extraction run written by [`write_extraction`].
///
/// # Errors
///
/// Returns [`PipelineError`] if the file cannot be read or parsed.
pub fn read_extraction(path: &Path) -> Result<ExtractionFile, PipelineError> {
    let json = std::fs::read_to_string(path).map_err(|source| PipelineError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(serde_json::from_str(&json)?)
}

/// One polygon feature per cell. Properties hold every covariate and
/// rainfall aggregate plus `risk`, `color`, `probability`, and `id`.
#[must_use]
pub fn to_feature_collection(cells: &[LabeledCell]) -> FeatureCollection {
    let features = cells
        .iter()
        .map(|labeled| {
            let mut properties = JsonObject::new();
            for (key, value) in &labeled.properties {
                properties.insert(key.clone(), JsonValue::from(*value));
            }
            properties.insert("id".to_string(), JsonValue::from(labeled.cell.index));
            properties.insert("risk".to_string(), JsonValue::from(labeled.risk.to_string()));
            properties.insert("color".to_string(), JsonValue::from(labeled.risk.color()));
            properties.insert(
                "probability".to_string(),
                JsonValue::from(labeled.probability),
            );

            Feature {
                bbox: None,
                geometry: Some(Geometry::new(geojson::Value::from(
                    &labeled.cell.to_polygon(),
                ))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

fn write(path: &Path, contents: &str) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| PipelineError::Io {
            path: parent.display().to_string(),
            source,
        })?;
    }
    std::fs::write(path, contents).map_err(|source| PipelineError::Io {
        path: path.display().to_string(),
        source,
    })
}
