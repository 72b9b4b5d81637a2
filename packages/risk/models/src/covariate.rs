//! Covariate bands and per-cell covariate records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString, IntoStaticStr};

use crate::grid::GridCell;
use crate::risk::RiskTier;

/// Reserved value the sampling service uses for "no measurement".
pub const NODATA_SENTINEL: f64 = -9999.0;

/// Returns `true` if `value` is the nodata sentinel.
#[must_use]
#[allow(clippy::float_cmp)]
pub fn is_nodata(value: f64) -> bool {
    value == NODATA_SENTINEL
}

/// A covariate band sampled for every grid cell.
///
/// The string form is the exact property name the sampling service
/// returns for the band.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    IntoStaticStr,
)]
pub enum Band {
    /// Terrain height above sea level, metres.
    #[serde(rename = "Elevation")]
    #[strum(serialize = "Elevation")]
    Elevation,
    /// Terrain slope, degrees.
    #[serde(rename = "Slope")]
    #[strum(serialize = "Slope")]
    Slope,
    /// Terrain aspect, degrees clockwise from north.
    #[serde(rename = "Aspect")]
    #[strum(serialize = "Aspect")]
    Aspect,
    /// Topographic wetness proxy.
    #[serde(rename = "TWI")]
    #[strum(serialize = "TWI")]
    Twi,
    /// Land cover class.
    #[serde(rename = "MODIS_LC")]
    #[strum(serialize = "MODIS_LC")]
    LandCover,
    /// Soil texture class.
    #[serde(rename = "Soil_Type")]
    #[strum(serialize = "Soil_Type")]
    SoilType,
    /// Normalized difference vegetation index.
    #[serde(rename = "NDVI")]
    #[strum(serialize = "NDVI")]
    Ndvi,
    /// Normalized difference water index.
    #[serde(rename = "NDWI")]
    #[strum(serialize = "NDWI")]
    Ndwi,
    /// Distance to the nearest road, metres.
    #[serde(rename = "Distance_to_Road")]
    #[strum(serialize = "Distance_to_Road")]
    DistanceToRoad,
}

impl Band {
    /// Every band, in the order the service composes them.
    pub const ALL: [Self; 9] = [
        Self::Elevation,
        Self::Slope,
        Self::Aspect,
        Self::Twi,
        Self::LandCover,
        Self::SoilType,
        Self::Ndvi,
        Self::Ndwi,
        Self::DistanceToRoad,
    ];

    /// The property name of this band.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.into()
    }
}

/// A single covariate as returned by the sampling service.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum CovariateValue {
    /// A real measurement (which may legitimately be zero).
    Value(f64),
    /// The service reported the nodata sentinel or `null`.
    NoData,
    /// The property was absent from the response.
    #[default]
    Missing,
}

impl CovariateValue {
    /// Interprets one JSON property.
    ///
    /// `null`, the sentinel, and non-numeric values are all [`Self::NoData`];
    /// an absent key is [`Self::Missing`].
    #[must_use]
    pub fn from_json(value: Option<&serde_json::Value>) -> Self {
        match value {
            None => Self::Missing,
            Some(v) => match v.as_f64() {
                Some(x) if is_nodata(x) => Self::NoData,
                Some(x) => Self::Value(x),
                None => Self::NoData,
            },
        }
    }

    /// The measurement, if there is one.
    #[must_use]
    pub const fn value(self) -> Option<f64> {
        match self {
            Self::Value(x) => Some(x),
            Self::NoData | Self::Missing => None,
        }
    }

    /// Whether this covariate carries a usable measurement.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        matches!(self, Self::Value(_))
    }
}

/// The covariates sampled for one cell, before validation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CovariateRecord {
    /// See [`Band::Elevation`].
    pub elevation: CovariateValue,
    /// See [`Band::Slope`].
    pub slope: CovariateValue,
    /// See [`Band::Aspect`].
    pub aspect: CovariateValue,
    /// See [`Band::Twi`].
    pub twi: CovariateValue,
    /// See [`Band::LandCover`].
    pub land_cover: CovariateValue,
    /// See [`Band::SoilType`].
    pub soil_type: CovariateValue,
    /// See [`Band::Ndvi`].
    pub ndvi: CovariateValue,
    /// See [`Band::Ndwi`].
    pub ndwi: CovariateValue,
    /// See [`Band::DistanceToRoad`].
    pub distance_to_road: CovariateValue,
    /// Any other numeric properties the service returned.
    pub extra: BTreeMap<String, f64>,
}

impl CovariateRecord {
    /// Builds a record from a sampled feature's property map.
    #[must_use]
    pub fn from_properties(properties: &serde_json::Map<String, serde_json::Value>) -> Self {
        let mut record = Self::default();
        for band in Band::ALL {
            record.set(band, CovariateValue::from_json(properties.get(band.name())));
        }
        for (key, value) in properties {
            if key.parse::<Band>().is_err()
                && let Some(x) = value.as_f64()
            {
                record.extra.insert(key.clone(), x);
            }
        }
        record
    }

    /// The value of `band`.
    #[must_use]
    pub const fn get(&self, band: Band) -> CovariateValue {
        match band {
            Band::Elevation => self.elevation,
            Band::Slope => self.slope,
            Band::Aspect => self.aspect,
            Band::Twi => self.twi,
            Band::LandCover => self.land_cover,
            Band::SoilType => self.soil_type,
            Band::Ndvi => self.ndvi,
            Band::Ndwi => self.ndwi,
            Band::DistanceToRoad => self.distance_to_road,
        }
    }

    /// Replaces the value of `band`.
    pub const fn set(&mut self, band: Band, value: CovariateValue) {
        match band {
            Band::Elevation => self.elevation = value,
            Band::Slope => self.slope = value,
            Band::Aspect => self.aspect = value,
            Band::Twi => self.twi = value,
            Band::LandCover => self.land_cover = value,
            Band::SoilType => self.soil_type = value,
            Band::Ndvi => self.ndvi = value,
            Band::Ndwi => self.ndwi = value,
            Band::DistanceToRoad => self.distance_to_road = value,
        }
    }

    /// Bands that are nodata or missing, in [`Band::ALL`] order.
    pub fn invalid_bands(&self) -> impl Iterator<Item = Band> + '_ {
        Band::ALL
            .into_iter()
            .filter(|&band| !self.get(band).is_valid())
    }

    /// Converts to [`ValidCovariates`] if every band has a measurement.
    #[must_use]
    pub fn validate(&self) -> Option<ValidCovariates> {
        Some(ValidCovariates {
            elevation: self.elevation.value()?,
            slope: self.slope.value()?,
            aspect: self.aspect.value()?,
            twi: self.twi.value()?,
            land_cover: self.land_cover.value()?,
            soil_type: self.soil_type.value()?,
            ndvi: self.ndvi.value()?,
            ndwi: self.ndwi.value()?,
            distance_to_road: self.distance_to_road.value()?,
            extra: self.extra.clone(),
        })
    }
}

/// Covariates of a cell that passed nodata screening.
///
/// Serializes to the flat property map the sampling service uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidCovariates {
    /// Elevation, metres.
    #[serde(rename = "Elevation")]
    pub elevation: f64,
    /// Slope, degrees.
    #[serde(rename = "Slope")]
    pub slope: f64,
    /// Aspect, degrees.
    #[serde(rename = "Aspect")]
    pub aspect: f64,
    /// Topographic wetness proxy.
    #[serde(rename = "TWI")]
    pub twi: f64,
    /// Land cover class.
    #[serde(rename = "MODIS_LC")]
    pub land_cover: f64,
    /// Soil texture class.
    #[serde(rename = "Soil_Type")]
    pub soil_type: f64,
    /// Vegetation index.
    #[serde(rename = "NDVI")]
    pub ndvi: f64,
    /// Water index.
    #[serde(rename = "NDWI")]
    pub ndwi: f64,
    /// Distance to road, metres.
    #[serde(rename = "Distance_to_Road")]
    pub distance_to_road: f64,
    /// Additional numeric properties carried through untouched.
    #[serde(flatten)]
    pub extra: BTreeMap<String, f64>,
}

impl ValidCovariates {
    /// The value of `band`.
    #[must_use]
    pub const fn get(&self, band: Band) -> f64 {
        match band {
            Band::Elevation => self.elevation,
            Band::Slope => self.slope,
            Band::Aspect => self.aspect,
            Band::Twi => self.twi,
            Band::LandCover => self.land_cover,
            Band::SoilType => self.soil_type,
            Band::Ndvi => self.ndvi,
            Band::Ndwi => self.ndwi,
            Band::DistanceToRoad => self.distance_to_road,
        }
    }

    /// Flattens into a name → value property map.
    #[must_use]
    pub fn to_properties(&self) -> BTreeMap<String, f64> {
        let mut map = self.extra.clone();
        for band in Band::ALL {
            map.insert(band.name().to_string(), self.get(band));
        }
        map
    }
}

/// A cell that survived extraction, with its slope-only audit tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedCell {
    /// The sampled cell.
    #[serde(flatten)]
    pub cell: GridCell,
    /// Its validated covariates.
    pub properties: ValidCovariates,
    /// Coarse slope-based tier, kept for auditing only.
    #[serde(rename = "risk")]
    pub preliminary_tier: RiskTier,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn band_names_match_service_properties() {
        assert_eq!(Band::Twi.name(), "TWI");
        assert_eq!(Band::LandCover.to_string(), "MODIS_LC");
        assert_eq!("Distance_to_Road".parse::<Band>().unwrap(), Band::DistanceToRoad);
        assert!("Road_Zone".parse::<Band>().is_err());
    }

    #[test]
    fn zero_is_not_nodata() {
        let zero = serde_json::json!(0.0);
        let sentinel = serde_json::json!(-9999);
        let sentinel_f = serde_json::json!(-9999.0);
        assert_eq!(CovariateValue::from_json(Some(&zero)), CovariateValue::Value(0.0));
        assert_eq!(CovariateValue::from_json(Some(&sentinel)), CovariateValue::NoData);
        assert_eq!(CovariateValue::from_json(Some(&sentinel_f)), CovariateValue::NoData);
        assert_eq!(
            CovariateValue::from_json(Some(&serde_json::Value::Null)),
            CovariateValue::NoData
        );
        assert_eq!(CovariateValue::from_json(None), CovariateValue::Missing);
    }

    #[test]
    fn record_from_properties_keeps_extras() {
        let record = CovariateRecord::from_properties(&props(serde_json::json!({
            "Elevation": 812.0, "Slope": 0, "Aspect": 90, "TWI": 4.2,
            "MODIS_LC": 10, "Soil_Type": 3, "NDVI": 0.55, "NDWI": -0.2,
            "Distance_to_Road": 200, "Road_Zone": 3, "label": "x"
        })));
        assert_eq!(record.slope, CovariateValue::Value(0.0));
        assert_eq!(record.extra.get("Road_Zone"), Some(&3.0));
        assert!(!record.extra.contains_key("label"));
        let valid = record.validate().unwrap();
        assert!((valid.get(Band::Elevation) - 812.0).abs() < f64::EPSILON);
        assert_eq!(valid.to_properties().len(), 10);
    }

    #[test]
    fn invalid_bands_lists_nodata_and_missing() {
        let record = CovariateRecord::from_properties(&props(serde_json::json!({
            "Elevation": 812.0, "Slope": -9999, "Aspect": null
        })));
        let invalid: Vec<Band> = record.invalid_bands().collect();
        assert_eq!(invalid.len(), 8);
        assert_eq!(invalid[0], Band::Slope);
        assert!(record.validate().is_none());
    }

    #[test]
    fn valid_covariates_serialize_flat() {
        let record = CovariateRecord::from_properties(&props(serde_json::json!({
            "Elevation": 1.0, "Slope": 2.0, "Aspect": 3.0, "TWI": 4.0,
            "MODIS_LC": 5.0, "Soil_Type": 6.0, "NDVI": 0.1, "NDWI": 0.2,
            "Distance_to_Road": 200.0, "CHIRPS_Day_1": 4.5
        })));
        let json = serde_json::to_value(record.validate().unwrap()).unwrap();
        assert_eq!(json["Slope"], serde_json::json!(2.0));
        assert_eq!(json["CHIRPS_Day_1"], serde_json::json!(4.5));
        let back: ValidCovariates = serde_json::from_value(json).unwrap();
        assert_eq!(back.extra.get("CHIRPS_Day_1"), Some(&4.5));
    }
}
