//! Bounding boxes and rectangular sampling cells.

use geo::{LineString, Polygon};
use serde::{Deserialize, Serialize};

/// Axis-aligned geographic bounding box in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Western edge.
    pub min_lon: f64,
    /// Southern edge.
    pub min_lat: f64,
    /// Eastern edge.
    pub max_lon: f64,
    /// Northern edge.
    pub max_lat: f64,
}

impl BoundingBox {
    /// Creates a bounding box from its corners.
    #[must_use]
    pub const fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    /// Mean latitude, used for the longitude scale factor.
    #[must_use]
    pub fn mean_lat(&self) -> f64 {
        f64::midpoint(self.min_lat, self.max_lat)
    }

    /// Returns `true` if the point lies strictly inside the box.
    #[must_use]
    pub fn contains_strictly(&self, lon: f64, lat: f64) -> bool {
        lon > self.min_lon && lon < self.max_lon && lat > self.min_lat && lat < self.max_lat
    }
}

/// A single rectangular sampling cell identified by its center.
///
/// `polygon` is a closed ring of five `[lon, lat]` pairs starting at the
/// south-west corner and running counter-clockwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridCell {
    /// Position of the cell in generation order (0-based).
    pub index: usize,
    /// Center longitude.
    pub lon: f64,
    /// Center latitude.
    pub lat: f64,
    /// Closed ring, first coordinate equal to the last.
    pub polygon: [[f64; 2]; 5],
}

impl GridCell {
    /// Builds a cell from its center and half extents in degrees.
    #[must_use]
    pub fn from_center(index: usize, lon: f64, lat: f64, half_w: f64, half_h: f64) -> Self {
        let sw = [lon - half_w, lat - half_h];
        Self {
            index,
            lon,
            lat,
            polygon: [
                sw,
                [lon + half_w, lat - half_h],
                [lon + half_w, lat + half_h],
                [lon - half_w, lat + half_h],
                sw,
            ],
        }
    }

    /// Whether the ring's first and last coordinates coincide.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn is_closed(&self) -> bool {
        self.polygon[0] == self.polygon[4]
    }

    /// Converts the ring into a [`geo::Polygon`].
    #[must_use]
    pub fn to_polygon(&self) -> Polygon<f64> {
        let exterior: LineString<f64> = self.polygon.iter().map(|&[x, y]| (x, y)).collect();
        Polygon::new(exterior, vec![])
    }
}
