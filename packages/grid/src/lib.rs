#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Regular sampling lattice over a geographic bounding box.
//!
//! Cells have a fixed physical size (500 m by default). The longitude step
//! is scaled by the cosine of the box's mean latitude so cells are roughly
//! square on the ground across the region; the latitude step is a fixed
//! metres-to-degrees conversion. Centers sit at `min + step/2 + k*step`
//! and stop before reaching the far edge, so the box is tiled without
//! overlap and every center lies strictly inside it.

use landslide_risk_models::{BoundingBox, GridCell};

/// Metres spanned by one degree of longitude at the equator.
pub const METERS_PER_DEGREE_LON: f64 = 111_320.0;

/// Metres spanned by one degree of latitude.
pub const METERS_PER_DEGREE_LAT: f64 = 110_540.0;

/// Default physical cell edge length.
pub const DEFAULT_CELL_SIZE_M: f64 = 500.0;

/// Nan Province, Thailand.
pub const NAN_PROVINCE: BoundingBox =
    BoundingBox::new(100.248_301, 17.902_120, 101.541_031, 19.726_141);

/// Lattice spacing of the rainfall grid groups, degrees (~5 km).
pub const GROUP_STEP_DEG: f64 = 0.045;

/// Cell dimensions in degrees, shared by every cell of one run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellSteps {
    /// Longitude step (cell width).
    pub lon: f64,
    /// Latitude step (cell height).
    pub lat: f64,
}

impl CellSteps {
    /// Computes the steps for `cell_size_m` cells over `bbox`.
    #[must_use]
    pub fn for_bbox(bbox: &BoundingBox, cell_size_m: f64) -> Self {
        let lon_scale = METERS_PER_DEGREE_LON * bbox.mean_lat().to_radians().cos();
        Self {
            lon: cell_size_m / lon_scale,
            lat: cell_size_m / METERS_PER_DEGREE_LAT,
        }
    }

    fn is_usable(&self) -> bool {
        self.lon.is_finite() && self.lat.is_finite() && self.lon > 0.0 && self.lat > 0.0
    }
}

/// Upper bound on the number of cells in one grid.
pub const MAX_GRID_CELLS: usize = 10_000_000;

/// Number of centers `min + half + k*step` that stay below `max`, or `None`
/// when the axis would hold more than [`MAX_GRID_CELLS`] centers.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn axis_len(min: f64, max: f64, step: f64) -> Option<usize> {
    let half = step / 2.0;
    let estimate = ((max - min - half) / step).ceil().max(0.0);
    if !estimate.is_finite() || estimate > MAX_GRID_CELLS as f64 {
        return None;
    }
    let mut n = estimate as usize;
    // Correct for rounding at the boundary in either direction.
    while n > 0 && min + half + (n - 1) as f64 * step >= max {
        n -= 1;
    }
    while min + half + n as f64 * step < max {
        n = n.checked_add(1).filter(|&n| n <= MAX_GRID_CELLS)?;
    }
    Some(n)
}

/// Centers along one axis, `len` of them.
#[allow(clippy::cast_precision_loss)]
fn axis_centers(min: f64, step: f64, len: usize) -> impl Iterator<Item = f64> {
    let half = step / 2.0;
    (0..len).map(move |k| min + half + k as f64 * step)
}

/// Generates the cells covering `bbox`, row by row from south to north and
/// west to east within a row.
///
/// Returns an empty grid for a degenerate box, a non-positive cell size,
/// or a cell size that would exceed [`MAX_GRID_CELLS`].
#[must_use]
pub fn generate_grid(bbox: &BoundingBox, cell_size_m: f64) -> Vec<GridCell> {
    let steps = CellSteps::for_bbox(bbox, cell_size_m);
    if !steps.is_usable() {
        log::warn!("Cell size {cell_size_m} m yields no usable grid steps; grid is empty");
        return Vec::new();
    }

    let cols = axis_len(bbox.min_lon, bbox.max_lon, steps.lon);
    let rows = axis_len(bbox.min_lat, bbox.max_lat, steps.lat);
    let (Some(cols), Some(rows)) = (cols, rows) else {
        log::warn!("Cell size {cell_size_m} m exceeds {MAX_GRID_CELLS} cells; grid is empty");
        return Vec::new();
    };
    if cols.checked_mul(rows).is_none_or(|total| total > MAX_GRID_CELLS) {
        log::warn!(
            "Cell size {cell_size_m} m yields {cols} x {rows} cells, over {MAX_GRID_CELLS}; grid is empty"
        );
        return Vec::new();
    }

    let half_w = steps.lon / 2.0;
    let half_h = steps.lat / 2.0;
    let lons: Vec<f64> = axis_centers(bbox.min_lon, steps.lon, cols).collect();

    let mut cells = Vec::with_capacity(cols * rows);
    for lat in axis_centers(bbox.min_lat, steps.lat, rows) {
        for &lon in &lons {
            cells.push(GridCell::from_center(cells.len(), lon, lat, half_w, half_h));
        }
    }

    log::debug!(
        "Generated {} cells ({} per row, step {:.5}° x {:.5}°)",
        cells.len(),
        lons.len(),
        steps.lon,
        steps.lat
    );

    cells
}

/// Identifier of the ~5 km group a point belongs to, e.g. `g_18.765_100.755`.
///
/// Nearby cells share a group so per-group data (rainfall) is fetched once.
#[must_use]
pub fn grid_group_id(lat: f64, lon: f64) -> String {
    let snap = |v: f64| (v / GROUP_STEP_DEG).round_ties_even() * GROUP_STEP_DEG;
    format!("g_{:.3}_{:.3}", snap(lat), snap(lon))
}
