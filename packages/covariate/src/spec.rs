//! The combined covariate image sampled at every grid point.
//!
//! The raster math runs inside the earth-observation service; this module
//! only pins down the band composition and nodata behaviour that callers
//! depend on. Every band is unmasked to zero in the final image, so a
//! response always carries the full schema.

use chrono::{Days, NaiveDate};
use landslide_risk_models::Band;
use serde::{Deserialize, Serialize};

/// Longest allowed look-back for the multispectral composite.
pub const MAX_COMPOSITE_DAYS: u32 = 90;

/// Floor applied to `tan(slope)` before inverting it for the wetness proxy.
pub const MIN_TAN_SLOPE: f64 = 0.001;

/// Distance to road used when no road dataset is configured, metres.
pub const ROAD_DISTANCE_FALLBACK_M: f64 = 200.0;

/// Sentinel-2 QA60 bits flagging opaque clouds (10) and cirrus (11).
pub const CLOUD_MASK_BITS: [u8; 2] = [10, 11];

/// Surface reflectance scale factor for Sentinel-2 SR bands.
pub const REFLECTANCE_SCALE: f64 = 10_000.0;

/// Radius of the circular focal mean used to fill composite gaps, pixels.
pub const GAP_FILL_RADIUS_PX: u32 = 3;

/// How the service derives one band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Derivation {
    /// Select a band of a single image or mosaic.
    Select {
        /// Dataset identifier.
        dataset: String,
        /// Band within the dataset.
        band: String,
    },
    /// Terrain slope of the elevation band, degrees.
    TerrainSlope,
    /// Terrain aspect of the elevation band, degrees.
    TerrainAspect,
    /// `ln(1 / max(tan(slope_rad), min_tan_slope))`.
    WetnessProxy {
        /// Floor for `tan(slope)`.
        min_tan_slope: f64,
    },
    /// `(a - b) / (a + b)` over a cloud-masked median composite.
    NormalizedDifference {
        /// Image collection identifier.
        collection: String,
        /// First band.
        a: String,
        /// Second band.
        b: String,
        /// QA bits that mask a pixel.
        cloud_mask_bits: Vec<u8>,
        /// Divisor applied to raw reflectance.
        reflectance_scale: f64,
        /// Focal-mean gap fill radius in pixels.
        gap_fill_radius_px: u32,
    },
    /// The same value everywhere.
    Constant {
        /// The value.
        value: f64,
    },
}

/// One output band and how it is produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandDefinition {
    /// Output band (its name is the response property).
    pub band: Band,
    /// Derivation rule.
    pub derivation: Derivation,
}

/// Date range of the multispectral composite, inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeWindow {
    /// First day.
    pub start: NaiveDate,
    /// Last day.
    pub end: NaiveDate,
}

impl CompositeWindow {
    /// The window of `days` days ending at `end`, clamped to
    /// `1..=`[`MAX_COMPOSITE_DAYS`].
    #[must_use]
    pub fn ending_at(end: NaiveDate, days: u32) -> Self {
        let clamped = days.clamp(1, MAX_COMPOSITE_DAYS);
        if clamped != days {
            log::warn!("Composite window of {days} days clamped to {clamped}");
        }
        let start = end
            .checked_sub_days(Days::new(u64::from(clamped)))
            .unwrap_or(NaiveDate::MIN);
        Self { start, end }
    }
}

/// The full band composition sent with every sampling request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedCovariateSpec {
    /// Bands in composition order.
    pub bands: Vec<BandDefinition>,
    /// Multispectral composite window.
    pub composite: CompositeWindow,
    /// Value substituted for masked pixels in the final image.
    pub unmask_value: f64,
}

impl CombinedCovariateSpec {
    /// Builds the standard composition.
    ///
    /// `road_dataset` selects a distance-to-road raster; without one the
    /// band is the constant [`ROAD_DISTANCE_FALLBACK_M`].
    #[must_use]
    pub fn new(composite: CompositeWindow, road_dataset: Option<&str>) -> Self {
        let select = |dataset: &str, band: &str| Derivation::Select {
            dataset: dataset.to_string(),
            band: band.to_string(),
        };
        let normalized = |a: &str, b: &str| Derivation::NormalizedDifference {
            collection: "COPERNICUS/S2_SR_HARMONIZED".to_string(),
            a: a.to_string(),
            b: b.to_string(),
            cloud_mask_bits: CLOUD_MASK_BITS.to_vec(),
            reflectance_scale: REFLECTANCE_SCALE,
            gap_fill_radius_px: GAP_FILL_RADIUS_PX,
        };
        let road = road_dataset.map_or(
            Derivation::Constant {
                value: ROAD_DISTANCE_FALLBACK_M,
            },
            |dataset| select(dataset, "distance"),
        );

        let derivations = [
            (Band::Elevation, select("NASA/NASADEM_HGT/001", "elevation")),
            (Band::Slope, Derivation::TerrainSlope),
            (Band::Aspect, Derivation::TerrainAspect),
            (
                Band::Twi,
                Derivation::WetnessProxy {
                    min_tan_slope: MIN_TAN_SLOPE,
                },
            ),
            (Band::LandCover, select("ESA/WorldCover/v200", "Map")),
            (
                Band::SoilType,
                select("OpenLandMap/SOL/SOL_TEXTURE-CLASS_USDA-TT_M/v02", "b0"),
            ),
            (Band::Ndvi, normalized("B8", "B4")),
            (Band::Ndwi, normalized("B3", "B8")),
            (Band::DistanceToRoad, road),
        ];

        Self {
            bands: derivations
                .into_iter()
                .map(|(band, derivation)| BandDefinition { band, derivation })
                .collect(),
            composite,
            unmask_value: 0.0,
        }
    }

    /// Bands every response must carry.
    #[must_use]
    pub fn required_bands(&self) -> Vec<Band> {
        self.bands.iter().map(|d| d.band).collect()
    }
}

/// The wetness proxy for a slope in degrees, as the service computes it.
#[must_use]
pub fn twi_proxy(slope_deg: f64) -> f64 {
    (1.0 / slope_deg.to_radians().tan().max(MIN_TAN_SLOPE)).ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> CompositeWindow {
        CompositeWindow::ending_at(NaiveDate::from_ymd_opt(2025, 9, 30).unwrap(), 90)
    }

    #[test]
    fn covers_every_band_once() {
        let spec = CombinedCovariateSpec::new(window(), None);
        assert_eq!(spec.required_bands(), Band::ALL.to_vec());
    }

    #[test]
    fn road_band_falls_back_to_constant() {
        let spec = CombinedCovariateSpec::new(window(), None);
        let road = spec.bands.last().unwrap();
        assert_eq!(
            road.derivation,
            Derivation::Constant {
                value: ROAD_DISTANCE_FALLBACK_M
            }
        );

        let with_roads = CombinedCovariateSpec::new(window(), Some("users/roads/distance"));
        assert!(matches!(
            with_roads.bands.last().unwrap().derivation,
            Derivation::Select { .. }
        ));
    }

    #[test]
    fn composite_window_is_clamped() {
        let end = NaiveDate::from_ymd_opt(2025, 9, 30).unwrap();
        let w = CompositeWindow::ending_at(end, 365);
        assert_eq!(w.start, NaiveDate::from_ymd_opt(2025, 7, 2).unwrap());
        let w = CompositeWindow::ending_at(end, 0);
        assert_eq!(w.start, NaiveDate::from_ymd_opt(2025, 9, 29).unwrap());
    }

    #[test]
    fn wetness_proxy_is_floored_on_flat_ground() {
        let flat = twi_proxy(0.0);
        assert!((flat - 1000.0_f64.ln()).abs() < 1e-9);
        assert!(twi_proxy(30.0) < twi_proxy(5.0));
        assert!(twi_proxy(45.0).abs() < 1e-9);
    }

    #[test]
    fn serializes_with_band_names() {
        let json = serde_json::to_value(CombinedCovariateSpec::new(window(), None)).unwrap();
        assert_eq!(json["bands"][3]["band"], "TWI");
        assert_eq!(json["bands"][3]["derivation"]["kind"], "wetness_proxy");
        assert_eq!(json["composite"]["start"], "2025-07-02");
    }
}
