//! Fixed equirectangular output grid.
//!
//! A job picks a ground resolution in kilometers; that resolution fixes the
//! size of every grid cell in degrees and the number of columns and rows
//! needed to cover the whole globe. Cells are addressed by `(col, row)`,
//! with column 0 at 180°W and row 0 at 90°N.
//!
//! ```text
//! cell_width_deg  = 360 * km / 40075       (equator)
//! cell_height_deg = 2 * 180 * km / 40008   (meridian, see note)
//! cols = ceil(360 / cell_width_deg)
//! rows = ceil(180 / cell_height_deg)
//!
//! lng(col) = col / cols * 360 - 180
//! lat(row) = 90 - row / rows * 180
//! ```
//!
//! A cell's box is built by mapping its own corner and the corner of its
//! diagonal neighbour `(col + 1, row + 1)` through the same linear formula,
//! so neighbouring boxes share their edges exactly.
//!
//! The height formula carries a factor of 2 that the width formula does not.
//! It is kept as-is: tiles produced by earlier runs of the pipeline rely on it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Equatorial circumference of the Earth in kilometers.
pub const EARTH_CIRCUMFERENCE_EQUATOR_KM: f64 = 40075.0;
/// Meridional circumference of the Earth in kilometers.
pub const EARTH_CIRCUMFERENCE_MERIDIAN_KM: f64 = 40008.0;

#[derive(Error, Debug, PartialEq)]
pub enum GridError {
    #[error("grid resolution must be a finite number of kilometers > 0, got {0}")]
    InvalidResolution(f64),
    #[error("grid resolution {0} km is too fine: the grid would exceed {max} cells per axis", max = u32::MAX)]
    TooFine(f64),
}

/// Geographic bounding box in degrees (EPSG:4326).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl Bounds {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    /// True when the two boxes share some area. Touching edges do not count.
    pub fn intersects(&self, other: &Bounds) -> bool {
        self.west < other.east
            && other.west < self.east
            && self.south < other.north
            && other.south < self.north
    }

    /// Smallest box covering both.
    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            west: self.west.min(other.west),
            south: self.south.min(other.south),
            east: self.east.max(other.east),
            north: self.north.max(other.north),
        }
    }
}

/// One cell of the grid. `col` grows eastward, `row` grows southward.
///
/// Job descriptions spell the fields `x` and `y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridCell {
    #[serde(rename = "x")]
    pub col: u32,
    #[serde(rename = "y")]
    pub row: u32,
}

impl GridCell {
    pub fn new(col: u32, row: u32) -> Self {
        Self { col, row }
    }
}

impl std::fmt::Display for GridCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.col, self.row)
    }
}

/// Resolution-derived grid constants. Built once per job.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GridSpec {
    pub resolution_km: f64,
    pub cell_width_deg: f64,
    pub cell_height_deg: f64,
    pub cols: u32,
    pub rows: u32,
}

impl GridSpec {
    /// Derive the grid for a ground resolution in kilometers.
    ///
    /// Non-positive or non-finite resolutions are rejected; they would yield
    /// a degenerate or infinite grid.
    pub fn from_resolution_km(resolution_km: f64) -> Result<Self, GridError> {
        if !resolution_km.is_finite() || resolution_km <= 0.0 {
            return Err(GridError::InvalidResolution(resolution_km));
        }

        let cell_width_deg = 360.0 * resolution_km / EARTH_CIRCUMFERENCE_EQUATOR_KM;
        let cell_height_deg = 180.0 * resolution_km / EARTH_CIRCUMFERENCE_MERIDIAN_KM * 2.0;

        let cols = (360.0 / cell_width_deg).ceil();
        let rows = (180.0 / cell_height_deg).ceil();
        if cols > u32::MAX as f64 || rows > u32::MAX as f64 {
            return Err(GridError::TooFine(resolution_km));
        }

        Ok(Self {
            resolution_km,
            cell_width_deg,
            cell_height_deg,
            cols: cols as u32,
            rows: rows as u32,
        })
    }

    /// Total number of cells covering the globe.
    pub fn cell_count(&self) -> u64 {
        self.cols as u64 * self.rows as u64
    }

    pub fn contains(&self, cell: GridCell) -> bool {
        cell.col < self.cols && cell.row < self.rows
    }

    /// Longitude/latitude of the north-west corner of `(col, row)`.
    ///
    /// Defined for `col == cols` and `row == rows` too, which is what lets
    /// the last column and row close their boxes.
    pub fn corner(&self, col: u64, row: u64) -> (f64, f64) {
        let lng = (col as f64 / self.cols as f64) * 360.0 - 180.0;
        let lat = 90.0 - (row as f64 / self.rows as f64) * 180.0;
        (lng, lat)
    }

    /// Bounding box of a cell.
    pub fn cell_bounds(&self, cell: GridCell) -> Bounds {
        let (west, north) = self.corner(cell.col as u64, cell.row as u64);
        let (east, south) = self.corner(cell.col as u64 + 1, cell.row as u64 + 1);
        Bounds {
            west,
            south,
            east,
            north,
        }
    }
}
