#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Feature engineering for the landslide scoring model.
//!
//! Raw covariates and daily rainfall are laid out as named columns in a
//! [`FeatureFrame`] and transformed column-at-a-time into the fixed
//! 27-column order the model was trained on ([`FEATURE_ORDER`]).
//! Engineering never fails: a column no input carries is filled with
//! its training median instead.

pub mod frame;

use std::collections::BTreeMap;

use landslide_risk_models::{Band, RainfallAggregates, ValidCovariates};
use ndarray::{Array1, Array2, Zip};

pub use frame::FeatureFrame;

/// Number of daily rainfall columns.
pub const RAIN_DAYS: usize = 10;

/// Daily rainfall column names, day 1 (most recent) first.
pub const DAY_COLUMNS: [&str; RAIN_DAYS] = [
    "CHIRPS_Day_1",
    "CHIRPS_Day_2",
    "CHIRPS_Day_3",
    "CHIRPS_Day_4",
    "CHIRPS_Day_5",
    "CHIRPS_Day_6",
    "CHIRPS_Day_7",
    "CHIRPS_Day_8",
    "CHIRPS_Day_9",
    "CHIRPS_Day_10",
];

/// Input columns of the scoring model, in order.
pub const FEATURE_ORDER: [&str; 27] = [
    "CHIRPS_Day_1",
    "CHIRPS_Day_2",
    "CHIRPS_Day_3",
    "CHIRPS_Day_4",
    "CHIRPS_Day_5",
    "CHIRPS_Day_6",
    "CHIRPS_Day_7",
    "CHIRPS_Day_8",
    "CHIRPS_Day_9",
    "CHIRPS_Day_10",
    "Elevation_Extracted",
    "Slope_Extracted",
    "Aspect_Extracted",
    "MODIS_LC",
    "NDVI",
    "NDWI",
    "TWI",
    "Soil_Type",
    "Road_Zone",
    "Rain_3D_Prior",
    "Rain_5D_Prior",
    "Rain_7D_Prior",
    "Rain_10D_Prior",
    "Rain3D_x_Slope",
    "Rain5D_x_Slope",
    "Rain7D_x_Slope",
    "Rain10D_x_Slope",
];

/// Name of the pre-bucketed road proximity column.
pub const ROAD_ZONE: &str = "Road_Zone";

/// Distance assumed for a record without one, in metres (far from any
/// road).
pub const MISSING_ROAD_DISTANCE_M: f64 = 5_000.0;

/// Zone used when neither a zone nor a distance column exists.
pub const DEFAULT_ROAD_ZONE: f64 = 1.0;

/// Upper (inclusive) distance bounds of road zones 1 to 4. Anything
/// farther is zone 5.
pub const ROAD_ZONE_BOUNDS_M: [f64; 4] = [50.0, 100.0, 200.0, 500.0];

const RENAMES: [(&str, &str); 3] = [
    ("Elevation", "Elevation_Extracted"),
    ("Slope", "Slope_Extracted"),
    ("Aspect", "Aspect_Extracted"),
];

/// The training-set median of a model column. Zero for rainfall and
/// derived columns.
#[must_use]
pub fn training_median(column: &str) -> f64 {
    match column {
        "Elevation_Extracted" => 500.0,
        "Slope_Extracted" => 15.0,
        "Aspect_Extracted" => 180.0,
        "MODIS_LC" => 10.0,
        "NDVI" => 0.6,
        "NDWI" => -0.1,
        "TWI" => 8.5,
        "Soil_Type" => 2.0,
        "Road_Zone" => 3.0,
        _ => 0.0,
    }
}

/// Buckets a road distance in metres into zones 1 (nearest) to 5.
/// Negative distances count as 0.
#[must_use]
pub fn road_zone(distance_m: f64) -> f64 {
    let distance = distance_m.max(0.0);
    let zone = ROAD_ZONE_BOUNDS_M
        .iter()
        .position(|&bound| distance <= bound)
        .unwrap_or(ROAD_ZONE_BOUNDS_M.len());
    #[allow(clippy::cast_precision_loss)]
    let zone = (zone + 1) as f64;
    zone
}

/// Raw values for one record. Any field may be absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureInput {
    /// Raw covariates keyed by band.
    pub bands: BTreeMap<Band, f64>,
    /// Daily rainfall, day 1 most recent.
    pub daily_rain: [Option<f64>; RAIN_DAYS],
    /// Pre-bucketed road zone, if the source carried one.
    pub road_zone: Option<f64>,
}

impl FeatureInput {
    /// Reads bands, `Road_Zone`, and `CHIRPS_Day_N` from a property map.
    /// Unknown keys are ignored.
    #[must_use]
    pub fn from_properties(properties: &BTreeMap<String, f64>) -> Self {
        let mut input = Self::default();
        for (key, &value) in properties {
            if let Ok(band) = key.parse::<Band>() {
                input.bands.insert(band, value);
            } else if key == ROAD_ZONE {
                input.road_zone = Some(value);
            } else if let Some(day) = DAY_COLUMNS.iter().position(|c| *c == key.as_str()) {
                input.daily_rain[day] = Some(value);
            }
        }
        input
    }

    /// Input for a screened cell.
    #[must_use]
    pub fn from_covariates(covariates: &ValidCovariates) -> Self {
        Self::from_properties(&covariates.to_properties())
    }

    /// Replaces the rainfall series.
    #[must_use]
    pub const fn with_rain(mut self, daily_rain: [Option<f64>; RAIN_DAYS]) -> Self {
        self.daily_rain = daily_rain;
        self
    }
}

/// Model-ready matrix plus the rainfall aggregates per row.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineeredFeatures {
    /// `rows x 27`, columns in [`FEATURE_ORDER`].
    pub matrix: Array2<f64>,
    /// Rolling rainfall totals, one per row.
    pub rainfall: Vec<RainfallAggregates>,
}

impl EngineeredFeatures {
    /// Number of rows.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.matrix.nrows()
    }
}

/// Turns raw records into the scoring model's input matrix.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureEngineer;

impl FeatureEngineer {
    /// Engineers features for every input, preserving order.
    #[must_use]
    pub fn engineer(&self, inputs: &[FeatureInput]) -> EngineeredFeatures {
        let mut frame = Self::raw_frame(inputs);

        let rain = Self::add_rain_windows(&mut frame);
        Self::add_slope_interactions(&mut frame, &rain);
        Self::add_road_zone(&mut frame);

        for (from, to) in RENAMES {
            frame.rename(from, to);
        }

        for name in FEATURE_ORDER {
            if !frame.has(name) {
                log::debug!(
                    "Column {name} absent from all {} rows, using median {}",
                    frame.rows(),
                    training_median(name)
                );
            }
        }

        let matrix = frame.select(&FEATURE_ORDER, training_median);
        let rainfall = (0..frame.rows())
            .map(|i| RainfallAggregates {
                rain_3d: rain[0][i],
                rain_5d: rain[1][i],
                rain_7d: rain[2][i],
                rain_10d: rain[3][i],
            })
            .collect();

        EngineeredFeatures { matrix, rainfall }
    }

    /// Lays inputs out as columns. A column exists when at least one
    /// record carries it; other records get 0, or a far distance for
    /// `Distance_to_Road`.
    fn raw_frame(inputs: &[FeatureInput]) -> FeatureFrame {
        let mut frame = FeatureFrame::new(inputs.len());

        for band in Band::ALL {
            let values: Vec<Option<f64>> =
                inputs.iter().map(|i| i.bands.get(&band).copied()).collect();
            let fill = if band == Band::DistanceToRoad {
                MISSING_ROAD_DISTANCE_M
            } else {
                0.0
            };
            frame.insert_sparse(band.name(), &values, fill);
        }

        let zones: Vec<Option<f64>> = inputs.iter().map(|i| i.road_zone).collect();
        frame.insert_sparse(ROAD_ZONE, &zones, 0.0);

        for (day, name) in DAY_COLUMNS.iter().enumerate() {
            let values: Vec<Option<f64>> = inputs.iter().map(|i| i.daily_rain[day]).collect();
            frame.insert_sparse(name, &values, 0.0);
        }

        frame
    }

    /// Adds the cumulative 3/5/7/10-day totals and returns them.
    fn add_rain_windows(frame: &mut FeatureFrame) -> [Array1<f64>; 4] {
        let day = |d: usize| {
            let name = DAY_COLUMNS[d - 1];
            frame.column_or(name, training_median(name))
        };

        let rain_3d = day(1) + day(2) + day(3);
        let rain_5d = rain_3d.clone() + day(4) + day(5);
        let rain_7d = rain_5d.clone() + day(6) + day(7);
        let rain_10d = rain_7d.clone() + day(8) + day(9) + day(10);

        let windows = [rain_3d, rain_5d, rain_7d, rain_10d];
        for (name, column) in [
            "Rain_3D_Prior",
            "Rain_5D_Prior",
            "Rain_7D_Prior",
            "Rain_10D_Prior",
        ]
        .into_iter()
        .zip(&windows)
        {
            frame.insert(name, column.clone());
        }
        windows
    }

    fn add_slope_interactions(frame: &mut FeatureFrame, rain: &[Array1<f64>; 4]) {
        let slope = frame.column_or(Band::Slope.name(), training_median("Slope_Extracted"));
        for (name, window) in [
            "Rain3D_x_Slope",
            "Rain5D_x_Slope",
            "Rain7D_x_Slope",
            "Rain10D_x_Slope",
        ]
        .into_iter()
        .zip(rain)
        {
            frame.insert(name, window * &slope);
        }
    }

    fn add_road_zone(frame: &mut FeatureFrame) {
        if frame.has(ROAD_ZONE) {
            return;
        }
        let zones = match frame.column(Band::DistanceToRoad.name()) {
            Some(distance) => {
                let mut zones = Array1::zeros(distance.len());
                Zip::from(&mut zones)
                    .and(distance)
                    .for_each(|z, &d| *z = road_zone(d));
                zones
            }
            None => Array1::from_elem(frame.rows(), DEFAULT_ROAD_ZONE),
        };
        frame.insert(ROAD_ZONE, zones);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(features: &EngineeredFeatures, name: &str) -> Vec<f64> {
        let j = FEATURE_ORDER.iter().position(|c| *c == name).unwrap();
        features.matrix.column(j).to_vec()
    }

    fn full_input(slope: f64, rain: f64) -> FeatureInput {
        let mut input = FeatureInput::default().with_rain([Some(rain); RAIN_DAYS]);
        for (band, value) in [
            (Band::Elevation, 640.0),
            (Band::Slope, slope),
            (Band::Aspect, 135.0),
            (Band::Twi, 6.5),
            (Band::LandCover, 10.0),
            (Band::SoilType, 3.0),
            (Band::Ndvi, 0.7),
            (Band::Ndwi, -0.2),
            (Band::DistanceToRoad, 75.0),
        ] {
            input.bands.insert(band, value);
        }
        input
    }

    #[test]
    fn matrix_has_contract_shape() {
        let features = FeatureEngineer.engineer(&[full_input(10.0, 1.0), full_input(20.0, 0.0)]);
        assert_eq!(features.matrix.dim(), (2, FEATURE_ORDER.len()));
        assert_eq!(features.rainfall.len(), 2);
    }

    #[test]
    fn end_to_end_values() {
        let features = FeatureEngineer.engineer(&[full_input(10.0, 1.0)]);
        let row = features.matrix.row(0).to_vec();

        assert_eq!(&row[..10], &[1.0; 10]);
        assert_eq!(
            &row[10..19],
            &[640.0, 10.0, 135.0, 10.0, 0.7, -0.2, 6.5, 3.0, 2.0]
        );
        assert_eq!(&row[19..23], &[3.0, 5.0, 7.0, 10.0]);
        assert_eq!(&row[23..], &[30.0, 50.0, 70.0, 100.0]);
        assert_eq!(
            features.rainfall[0],
            RainfallAggregates {
                rain_3d: 3.0,
                rain_5d: 5.0,
                rain_7d: 7.0,
                rain_10d: 10.0,
            }
        );
    }

    #[test]
    fn order_is_independent_of_input_keys() {
        let mut forward = BTreeMap::new();
        let mut extra = BTreeMap::new();
        for (k, v) in [("Slope", 12.0), ("NDVI", 0.5), ("CHIRPS_Day_2", 4.0)] {
            forward.insert(k.to_string(), v);
        }
        for (k, v) in [
            ("Unrelated", 1.0),
            ("CHIRPS_Day_2", 4.0),
            ("NDVI", 0.5),
            ("Slope", 12.0),
        ] {
            extra.insert(k.to_string(), v);
        }

        let a = FeatureEngineer.engineer(&[FeatureInput::from_properties(&forward)]);
        let b = FeatureEngineer.engineer(&[FeatureInput::from_properties(&extra)]);
        assert_eq!(a, b);
        assert_eq!(a.matrix.ncols(), FEATURE_ORDER.len());
    }

    #[test]
    fn rain_windows_are_cumulative_and_monotonic() {
        let rain = [
            Some(0.0),
            Some(2.5),
            Some(0.0),
            Some(7.0),
            Some(0.1),
            None,
            Some(12.0),
            Some(0.0),
            Some(3.3),
            Some(1.0),
        ];
        let features = FeatureEngineer.engineer(&[FeatureInput::default().with_rain(rain)]);
        let agg = features.rainfall[0];

        assert!((agg.rain_3d - 2.5).abs() < 1e-12);
        assert!((agg.rain_5d - 9.6).abs() < 1e-12);
        assert!((agg.rain_7d - 21.6).abs() < 1e-12);
        assert!((agg.rain_10d - 25.9).abs() < 1e-12);
        assert!(agg.rain_3d <= agg.rain_5d);
        assert!(agg.rain_5d <= agg.rain_7d);
        assert!(agg.rain_7d <= agg.rain_10d);
    }

    #[test]
    fn road_zone_partition() {
        assert!((road_zone(0.0) - 1.0).abs() < f64::EPSILON);
        assert!((road_zone(50.0) - 1.0).abs() < f64::EPSILON);
        assert!((road_zone(75.0) - 2.0).abs() < f64::EPSILON);
        assert!((road_zone(200.0) - 3.0).abs() < f64::EPSILON);
        assert!((road_zone(500.0) - 4.0).abs() < f64::EPSILON);
        assert!((road_zone(501.0) - 5.0).abs() < f64::EPSILON);
        assert!((road_zone(-30.0) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn road_zone_defaults() {
        // Neither zone nor distance anywhere.
        let none = FeatureEngineer.engineer(&[FeatureInput::default()]);
        assert_eq!(column(&none, "Road_Zone"), vec![1.0]);

        // Distance on one record only: the other is assumed far away.
        let mut near = FeatureInput::default();
        near.bands.insert(Band::DistanceToRoad, 75.0);
        let mixed = FeatureEngineer.engineer(&[near, FeatureInput::default()]);
        assert_eq!(column(&mixed, "Road_Zone"), vec![2.0, 5.0]);

        // A carried zone wins over distance.
        let mut zoned = FeatureInput::default();
        zoned.bands.insert(Band::DistanceToRoad, 10.0);
        zoned.road_zone = Some(4.0);
        let kept = FeatureEngineer.engineer(&[zoned]);
        assert_eq!(column(&kept, "Road_Zone"), vec![4.0]);
    }

    #[test]
    fn absent_columns_use_training_medians() {
        let input = FeatureInput::default().with_rain([Some(1.0); RAIN_DAYS]);
        let features = FeatureEngineer.engineer(&[input]);
        assert_eq!(column(&features, "Elevation_Extracted"), vec![500.0]);
        assert_eq!(column(&features, "Slope_Extracted"), vec![15.0]);
        assert_eq!(column(&features, "Aspect_Extracted"), vec![180.0]);
        assert_eq!(column(&features, "MODIS_LC"), vec![10.0]);
        assert_eq!(column(&features, "NDVI"), vec![0.6]);
        assert_eq!(column(&features, "NDWI"), vec![-0.1]);
        assert_eq!(column(&features, "TWI"), vec![8.5]);
        assert_eq!(column(&features, "Soil_Type"), vec![2.0]);
        // Interactions use the slope median when slope is absent.
        assert_eq!(column(&features, "Rain3D_x_Slope"), vec![45.0]);
    }

    #[test]
    fn partially_present_columns_fill_with_zero() {
        let mut with_slope = FeatureInput::default().with_rain([Some(1.0); RAIN_DAYS]);
        with_slope.bands.insert(Band::Slope, 20.0);
        let without = FeatureInput::default().with_rain([Some(1.0); RAIN_DAYS]);

        let features = FeatureEngineer.engineer(&[with_slope, without]);
        assert_eq!(column(&features, "Slope_Extracted"), vec![20.0, 0.0]);
        assert_eq!(column(&features, "Rain3D_x_Slope"), vec![60.0, 0.0]);
    }

    #[test]
    fn reads_screened_covariates() {
        let props: serde_json::Value = serde_json::json!({
            "Elevation": 900.0, "Slope": 31.0, "Aspect": 90.0, "TWI": 5.0,
            "MODIS_LC": 20.0, "Soil_Type": 1.0, "NDVI": 0.3, "NDWI": 0.1,
            "Distance_to_Road": 600.0
        });
        let covariates: ValidCovariates = serde_json::from_value(props).unwrap();
        let input = FeatureInput::from_covariates(&covariates);

        assert_eq!(input.bands.len(), 9);
        assert_eq!(input.bands[&Band::Slope], 31.0);
        assert_eq!(input.road_zone, None);
        let features = FeatureEngineer.engineer(&[input]);
        assert_eq!(column(&features, "Road_Zone"), vec![5.0]);
    }

    #[test]
    fn no_inputs_no_rows() {
        let features = FeatureEngineer.engineer(&[]);
        assert_eq!(features.rows(), 0);
        assert!(features.rainfall.is_empty());
    }
}
