//! Per-cell tile production.
//!
//! One call produces one cell, start to finish:
//!
//! 1. Rank the candidate scenes over the cell's bounds ([`crate::cloud`]).
//! 2. Resolve the winner's red, green and blue band paths.
//! 3. Read band 1 of each over the cell and stack them R, G, B.
//! 4. Write `tile.tif` georeferenced to exactly the cell's bounds.
//! 5. Write the zero-byte `done` marker.
//!
//! Failures never escape: they come back as [`CellOutcome::Skipped`] and
//! leave neither tile nor marker behind. Every reader opened for the cell,
//! cloud bands included, is dropped before the call returns.

use crate::cloud::{CloudBandContext, CloudError, select_scene};
use crate::grid::{Bounds, GridCell, GridSpec};
use crate::job::{BandRole, Scene};
use crate::raster::{
    BandWindow, EncodeOptions, GeoTransform, RasterAddress, RasterBackend, RasterError,
    RasterImage, RasterReader, SampleKind, write_geotiff,
};
use crate::workspace::{DONE_MARKER, TILE_FILE};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

const RGB: [BandRole; 3] = [BandRole::Red, BandRole::Green, BandRole::Blue];

/// Tile value marking pixels with no data.
pub const TILE_NODATA: u16 = 0;

#[derive(Error, Debug)]
pub enum CellError {
    #[error("No viable scene among {candidates} candidates")]
    NoViableScene { candidates: usize },
    #[error("Scene {scene} has no image for the {role} band")]
    MissingBand { scene: String, role: BandRole },
    #[error("Band read failed: {0}")]
    Raster(#[from] RasterError),
    #[error("Band shapes differ: red {red:?}, green {green:?}, blue {blue:?}")]
    ShapeMismatch {
        red: (u32, u32),
        green: (u32, u32),
        blue: (u32, u32),
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CellOptions {
    /// Drop candidates whose footprint box misses the cell before scoring.
    pub footprint_filter: bool,
    pub encode: EncodeOptions,
}

/// What happened to one cell.
#[derive(Debug)]
pub enum CellOutcome {
    Produced {
        cell: GridCell,
        scene_id: String,
        score: f64,
        tile: PathBuf,
    },
    Skipped {
        cell: GridCell,
        reason: CellError,
    },
}

impl CellOutcome {
    pub fn cell(&self) -> GridCell {
        match self {
            CellOutcome::Produced { cell, .. } | CellOutcome::Skipped { cell, .. } => *cell,
        }
    }

    pub fn is_produced(&self) -> bool {
        matches!(self, CellOutcome::Produced { .. })
    }
}

/// Produce the tile for `cell` into `output_dir`.
pub fn process_cell<B: RasterBackend>(
    backend: &B,
    cell: GridCell,
    scenes: &[Scene],
    grid: &GridSpec,
    output_dir: &Path,
    options: &CellOptions,
) -> CellOutcome {
    match produce_tile(backend, cell, scenes, grid, output_dir, options) {
        Ok((scene_id, score, tile)) => {
            info!(col = cell.col, row = cell.row, scene = %scene_id, score, "tile written");
            CellOutcome::Produced {
                cell,
                scene_id,
                score,
                tile,
            }
        }
        Err(reason) => {
            warn!(col = cell.col, row = cell.row, %reason, "cell skipped");
            CellOutcome::Skipped { cell, reason }
        }
    }
}

fn produce_tile<B: RasterBackend>(
    backend: &B,
    cell: GridCell,
    scenes: &[Scene],
    grid: &GridSpec,
    output_dir: &Path,
    options: &CellOptions,
) -> Result<(String, f64, PathBuf), CellError> {
    let bounds = grid.cell_bounds(cell);

    let winner = {
        let mut context = CloudBandContext::new(backend);
        select_scene(scenes, |scene| {
            if options.footprint_filter && !reaches(scene, &bounds) {
                return Err(CloudError::OutsideFootprint);
            }
            context.score(scene, &bounds)
        })
    }
    .ok_or(CellError::NoViableScene {
        candidates: scenes.len(),
    })?;
    let scene = winner.scene;

    // All three paths must resolve before any band is opened
    let mut paths = Vec::with_capacity(RGB.len());
    for role in RGB {
        let path = scene.band_path(role).ok_or_else(|| CellError::MissingBand {
            scene: scene.scene_id.clone(),
            role,
        })?;
        paths.push(path);
    }

    let mut bands = Vec::with_capacity(RGB.len());
    for path in paths {
        let mut reader = backend.open(&RasterAddress::new(&scene.bucket, path))?;
        bands.push(reader.read_window(&bounds, 1)?);
    }

    let image = stack_rgb(&bands[0], &bands[1], &bands[2])?;
    let tile = write_tile(output_dir, &image, &bounds, &options.encode)?;
    Ok((scene.scene_id.clone(), winner.score, tile))
}

/// Whether the scene's footprint box touches `bounds`. Scenes without a
/// usable footprint are kept.
fn reaches(scene: &Scene, bounds: &Bounds) -> bool {
    scene
        .footprint
        .bounds()
        .is_none_or(|footprint| footprint.intersects(bounds))
}

/// Interleave three equally shaped bands into one RGB raster.
///
/// The result is 8-bit only when all three bands are.
pub fn stack_rgb(red: &BandWindow, green: &BandWindow, blue: &BandWindow) -> Result<RasterImage, CellError> {
    if red.shape() != green.shape() || red.shape() != blue.shape() {
        return Err(CellError::ShapeMismatch {
            red: red.shape(),
            green: green.shape(),
            blue: blue.shape(),
        });
    }

    let kind = [green.kind, blue.kind]
        .into_iter()
        .fold(red.kind, SampleKind::widest);
    let data = red
        .data
        .iter()
        .zip(&green.data)
        .zip(&blue.data)
        .flat_map(|((&r, &g), &b)| [r, g, b])
        .collect();
    Ok(RasterImage::new(red.width, red.height, 3, kind, data)?)
}

/// Write the tile, then its marker.
///
/// The tile goes to a temporary name first and is renamed into place, so a
/// crash never leaves a truncated `tile.tif` behind.
fn write_tile(
    output_dir: &Path,
    image: &RasterImage,
    bounds: &Bounds,
    options: &EncodeOptions,
) -> Result<PathBuf, CellError> {
    let transform = GeoTransform::from_bounds(bounds, image.width, image.height);
    let tile = output_dir.join(TILE_FILE);
    let partial = output_dir.join(format!("{TILE_FILE}.part"));

    std::fs::create_dir_all(output_dir)?;
    write_geotiff(&partial, image, &transform, Some(TILE_NODATA), options)?;
    std::fs::rename(&partial, &tile)?;
    std::fs::File::create(output_dir.join(DONE_MARKER))?;
    Ok(tile)
}
