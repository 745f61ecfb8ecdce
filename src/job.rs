//! Job description loading and validation.
//!
//! A job description is a JSON document produced by the catalogue search
//! that precedes a mosaic run. It names the grid resolution, the cells to
//! produce, and the candidate scenes in preference order:
//!
//! ```json
//! {
//!   "resolution": 10.0,
//!   "tiles": [{"x": 17, "y": 4}],
//!   "scenes": [{
//!     "bandMapper": {"Red": "B4", "Green": "B3", "Blue": "B2", "NIR": "B5"},
//!     "bbox": {"type": "Feature", "geometry": {"type": "Polygon", "coordinates": [[[..]]]}},
//!     "bucket": "landsat",
//!     "cloud": 12,
//!     "images": [{"band": "B4", "bucket": "landsat", "tifPath": "LC08/B4.TIF"}],
//!     "productName": "L2SP",
//!     "sceneId": "LC08_L2SP_123032",
//!     "sceneTime": "2024-05-01T02:33:10Z",
//!     "sensorName": "Landsat 8 OLI",
//!     "cloudPath": "LC08/QA_PIXEL.TIF"
//!   }]
//! }
//! ```
//!
//! `cells` is accepted in place of `tiles`. The description is loaded once
//! and never mutated; every worker sees the same read-only copy.

use crate::grid::{Bounds, GridCell, GridError, GridSpec};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Malformed job description: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid grid: {0}")]
    Grid(#[from] GridError),
    #[error("Cell {cell} lies outside the {cols}x{rows} grid")]
    CellOutOfGrid { cell: GridCell, cols: u32, rows: u32 },
    #[error("Cell {0} is listed more than once")]
    DuplicateCell(GridCell),
}

/// Sensor family of a scene, resolved once from its free-text label.
///
/// The label decides how the pixel-level cloud band is decoded. Matching is
/// by substring, in this order: `Landsat` (or the historical misspelling
/// `Landset`), `MODIS`, `GF`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum SensorFamily {
    Landsat,
    Modis,
    Gaofen,
    Unsupported(String),
}

impl SensorFamily {
    pub fn from_label(label: &str) -> Self {
        if label.contains("Landsat") || label.contains("Landset") {
            SensorFamily::Landsat
        } else if label.contains("MODIS") {
            SensorFamily::Modis
        } else if label.contains("GF") {
            SensorFamily::Gaofen
        } else {
            SensorFamily::Unsupported(label.to_string())
        }
    }
}

impl From<String> for SensorFamily {
    fn from(label: String) -> Self {
        Self::from_label(&label)
    }
}

impl std::fmt::Display for SensorFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorFamily::Landsat => f.write_str("Landsat"),
            SensorFamily::Modis => f.write_str("MODIS"),
            SensorFamily::Gaofen => f.write_str("GF"),
            SensorFamily::Unsupported(label) => write!(f, "{label}"),
        }
    }
}

/// Spectral role a band plays in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandRole {
    Red,
    Green,
    Blue,
    Nir,
}

impl std::fmt::Display for BandRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            BandRole::Red => "Red",
            BandRole::Green => "Green",
            BandRole::Blue => "Blue",
            BandRole::Nir => "NIR",
        })
    }
}

/// Which band label serves each spectral role.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BandMapper {
    #[serde(rename = "Red")]
    pub red: String,
    #[serde(rename = "Green")]
    pub green: String,
    #[serde(rename = "Blue")]
    pub blue: String,
    #[serde(rename = "NIR")]
    pub nir: String,
}

impl BandMapper {
    pub fn label(&self, role: BandRole) -> &str {
        match role {
            BandRole::Red => &self.red,
            BandRole::Green => &self.green,
            BandRole::Blue => &self.blue,
            BandRole::Nir => &self.nir,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Geometry {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: Vec<Vec<Vec<f64>>>,
}

/// GeoJSON feature describing the area a scene covers.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Footprint {
    #[serde(rename = "type")]
    pub kind: String,
    pub geometry: Geometry,
}

impl Footprint {
    /// Bounding box of every polygon vertex, or `None` for an empty geometry.
    pub fn bounds(&self) -> Option<Bounds> {
        let mut points = self
            .geometry
            .coordinates
            .iter()
            .flatten()
            .filter(|p| p.len() >= 2);
        let first = points.next()?;
        let seed = Bounds::new(first[0], first[1], first[0], first[1]);
        Some(points.fold(seed, |b, p| b.union(&Bounds::new(p[0], p[1], p[0], p[1]))))
    }
}

/// One band file of a scene.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneImage {
    pub band: String,
    pub bucket: String,
    pub tif_path: String,
}

/// A candidate acquisition.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub band_mapper: BandMapper,
    #[serde(rename = "bbox")]
    pub footprint: Footprint,
    pub bucket: String,
    /// Whole-scene cloud percentage from the catalogue.
    pub cloud: i64,
    pub images: Vec<SceneImage>,
    pub product_name: String,
    pub scene_id: String,
    pub scene_time: String,
    #[serde(rename = "sensorName")]
    pub sensor: SensorFamily,
    /// Pixel-level cloud classification band, when the product ships one.
    #[serde(default)]
    pub cloud_path: Option<String>,
}

impl Scene {
    /// Object path of the band serving `role`, if the scene ships it.
    pub fn band_path(&self, role: BandRole) -> Option<&str> {
        let label = self.band_mapper.label(role);
        self.images
            .iter()
            .find(|img| img.band == label)
            .map(|img| img.tif_path.as_str())
    }
}

/// Parsed job description.
#[derive(Debug, Clone, Deserialize)]
pub struct JobDescription {
    /// Grid resolution in kilometers.
    pub resolution: f64,
    #[serde(default, alias = "cells")]
    pub tiles: Vec<GridCell>,
    #[serde(default)]
    pub scenes: Vec<Scene>,
}

impl JobDescription {
    pub fn from_json(json: &str) -> Result<Self, JobError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Derive the grid and check every cell against it.
    ///
    /// Cells outside the grid and repeated cells are configuration errors:
    /// each cell owns an exclusive output directory.
    pub fn validate(&self) -> Result<GridSpec, JobError> {
        let grid = GridSpec::from_resolution_km(self.resolution)?;
        let mut seen = HashSet::with_capacity(self.tiles.len());
        for &cell in &self.tiles {
            if !grid.contains(cell) {
                return Err(JobError::CellOutOfGrid {
                    cell,
                    cols: grid.cols,
                    rows: grid.rows,
                });
            }
            if !seen.insert(cell) {
                return Err(JobError::DuplicateCell(cell));
            }
        }
        Ok(grid)
    }
}

/// Read and parse a job description from disk.
pub fn load_job(path: &Path) -> Result<JobDescription, JobError> {
    let content = std::fs::read_to_string(path).map_err(|source| JobError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    JobDescription::from_json(&content)
}
