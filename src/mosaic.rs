//! Job orchestration: fan cells out, then merge what they produced.
//!
//! ```text
//! job.json ──► validate ──► prepare workspace ──► cells (parallel) ──► merge ──► MERGE_COG.tif
//! ```
//!
//! Configuration errors (malformed description, bad resolution, cells off
//! the grid) abort before the workspace is touched. After that nothing
//! aborts the job: each cell ends produced or skipped, and a failed merge
//! is reported in the returned [`JobSummary`] rather than as an error.
//!
//! ## Parallel Processing
//!
//! Cells run on a dedicated [rayon](https://docs.rs/rayon) pool sized to the
//! worker count. Each cell writes only its own directory and shares nothing
//! mutable with its siblings, so completion order does not matter. The merge
//! starts only after every cell has finished.

use crate::cell::{CellOptions, CellOutcome, TILE_NODATA, process_cell};
use crate::config::{MosaicConfig, effective_workers};
use crate::grid::GridCell;
use crate::job::{JobDescription, JobError, load_job};
use crate::raster::{MergeOptions, RasterBackend, RasterError, merge, write_geotiff};
use crate::workspace::Workspace;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
pub enum MosaicError {
    #[error("Job error: {0}")]
    Job(#[from] JobError),
    #[error("IO error preparing workspace: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// How a run is carried out.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub workers: usize,
    pub resume: bool,
    pub cell: CellOptions,
    pub merge: MergeOptions,
}

impl RunOptions {
    /// Options from `config`, with command-line overrides applied.
    pub fn from_config(config: &MosaicConfig, workers: Option<usize>, resume: bool) -> Self {
        Self {
            workers: effective_workers(&config.processing, workers),
            resume: resume || config.processing.resume,
            cell: config.cell_options(),
            merge: config.merge_options(),
        }
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from_config(&MosaicConfig::default(), None, false)
    }
}

/// Progress event emitted as each cell finishes.
#[derive(Debug, Clone)]
pub struct CellEvent {
    pub cell: GridCell,
    pub status: CellStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CellStatus {
    Produced { scene_id: String, score: f64 },
    Skipped { reason: String },
    /// Already complete from an earlier run; left as is.
    Resumed,
}

/// Result of the merge step.
#[derive(Debug, Clone, PartialEq)]
pub enum MosaicOutcome {
    Written(PathBuf),
    /// No cell produced a tile, so there was nothing to merge.
    NoTiles,
    Failed { detail: String },
}

/// Aggregate outcome of a job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSummary {
    pub total: usize,
    pub produced: usize,
    pub resumed: usize,
    pub skipped: usize,
    pub mosaic: MosaicOutcome,
}

/// Load the job description at `description` and run it.
pub fn run<B: RasterBackend>(
    description: &Path,
    workspace: &Workspace,
    backend: &B,
    options: &RunOptions,
    events: Option<Sender<CellEvent>>,
) -> Result<JobSummary, MosaicError> {
    let job = load_job(description)?;
    run_job(&job, workspace, backend, options, events)
}

/// Run an already-loaded job.
///
/// When `events` is set, one [`CellEvent`] is sent per cell as it finishes.
pub fn run_job<B: RasterBackend>(
    job: &JobDescription,
    workspace: &Workspace,
    backend: &B,
    options: &RunOptions,
    events: Option<Sender<CellEvent>>,
) -> Result<JobSummary, MosaicError> {
    let grid = job.validate()?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.workers)
        .build()?;

    info!(
        cells = job.tiles.len(),
        scenes = job.scenes.len(),
        cols = grid.cols,
        rows = grid.rows,
        workers = options.workers,
        "starting job"
    );
    workspace.prepare(&job.tiles, options.resume)?;

    let statuses: Vec<CellStatus> = pool.install(|| {
        job.tiles
            .par_iter()
            .map_with(events, |events, &cell| {
                let status = if options.resume && workspace.is_done(cell) {
                    info!(col = cell.col, row = cell.row, "cell already done");
                    CellStatus::Resumed
                } else {
                    let outcome = process_cell(
                        backend,
                        cell,
                        &job.scenes,
                        &grid,
                        &workspace.cell_dir(cell),
                        &options.cell,
                    );
                    status_of(outcome)
                };
                if let Some(tx) = events {
                    tx.send(CellEvent {
                        cell,
                        status: status.clone(),
                    })
                    .ok();
                }
                status
            })
            .collect()
    });

    let count = |pred: fn(&CellStatus) -> bool| statuses.iter().filter(|s| pred(s)).count();
    let produced = count(|s| matches!(s, CellStatus::Produced { .. }));
    let resumed = count(|s| matches!(s, CellStatus::Resumed));
    let skipped = count(|s| matches!(s, CellStatus::Skipped { .. }));

    let tiles = collect_tiles(workspace, &job.tiles);
    let mosaic = finalize(workspace, &tiles, options);

    Ok(JobSummary {
        total: job.tiles.len(),
        produced,
        resumed,
        skipped,
        mosaic,
    })
}

fn status_of(outcome: CellOutcome) -> CellStatus {
    match outcome {
        CellOutcome::Produced {
            scene_id, score, ..
        } => CellStatus::Produced { scene_id, score },
        CellOutcome::Skipped { reason, .. } => CellStatus::Skipped {
            reason: reason.to_string(),
        },
    }
}

/// Tile paths of `cells` that exist on disk, in job order.
fn collect_tiles(workspace: &Workspace, cells: &[GridCell]) -> Vec<PathBuf> {
    cells
        .iter()
        .filter_map(|&cell| {
            let tile = workspace.tile_path(cell);
            if tile.is_file() {
                Some(tile)
            } else {
                warn!(path = %tile.display(), "tile not found, skipping");
                None
            }
        })
        .collect()
}

fn finalize(workspace: &Workspace, tiles: &[PathBuf], options: &RunOptions) -> MosaicOutcome {
    if tiles.is_empty() {
        info!("no tiles to merge");
        return MosaicOutcome::NoTiles;
    }

    info!(tiles = tiles.len(), "merging tiles");
    let target = workspace.mosaic_path();
    match write_mosaic(&target, tiles, options) {
        Ok(()) => {
            info!(path = %target.display(), "mosaic written");
            MosaicOutcome::Written(target)
        }
        Err(e) => {
            error!(error = %e, "merge failed, no mosaic written");
            MosaicOutcome::Failed {
                detail: e.to_string(),
            }
        }
    }
}

fn write_mosaic(target: &Path, tiles: &[PathBuf], options: &RunOptions) -> Result<(), RasterError> {
    let merged = merge(tiles, &options.merge)?;
    let partial = target.with_extension("tif.part");
    let written = write_geotiff(
        &partial,
        &merged.image,
        &merged.transform,
        Some(TILE_NODATA),
        &options.cell.encode,
    )
    .and_then(|()| Ok(std::fs::rename(&partial, target)?));
    if written.is_err() {
        std::fs::remove_file(&partial).ok();
    }
    written
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::SensorFamily;
    use crate::raster::GeoTiff;
    use crate::raster::backend::tests::{MockBackend, window};
    use crate::test_helpers::{TempDir, pixel_scene, scene};

    fn job(cells: &[(u32, u32)], scenes: Vec<crate::job::Scene>) -> JobDescription {
        JobDescription {
            resolution: 4000.0,
            tiles: cells.iter().map(|&(c, r)| GridCell::new(c, r)).collect(),
            scenes,
        }
    }

    fn backend() -> MockBackend {
        MockBackend::new()
            .with_window("a/B4.TIF", window(2, 2, vec![1, 2, 3, 4]))
            .with_window("a/B3.TIF", window(2, 2, vec![5, 6, 7, 8]))
            .with_window("a/B2.TIF", window(2, 2, vec![9, 10, 11, 12]))
    }

    fn options(workers: usize) -> RunOptions {
        RunOptions {
            workers,
            ..Default::default()
        }
    }

    #[test]
    fn produces_every_cell_and_a_mosaic() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::new(tmp.path());
        let job = job(&[(0, 0), (1, 0), (0, 1)], vec![scene("a", 0)]);

        let summary = run_job(&job, &ws, &backend(), &options(2), None).unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.produced, 3);
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.mosaic, MosaicOutcome::Written(ws.mosaic_path()));

        for &(c, r) in &[(0, 0), (1, 0), (0, 1)] {
            assert!(ws.is_done(GridCell::new(c, r)));
        }
        let mosaic = GeoTiff::open(&ws.mosaic_path()).unwrap();
        assert_eq!(mosaic.band_count(), 3);
        assert!(tmp.path().join("grid_num_3").is_file());
    }

    #[test]
    fn events_are_sent_per_cell() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::new(tmp.path());
        let job = job(&[(0, 0), (1, 0)], vec![scene("a", 0)]);

        let (tx, rx) = std::sync::mpsc::channel();
        run_job(&job, &ws, &backend(), &options(2), Some(tx)).unwrap();
        let mut events: Vec<CellEvent> = rx.iter().collect();
        events.sort_by_key(|e| (e.cell.col, e.cell.row));

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].cell, GridCell::new(0, 0));
        assert_eq!(
            events[1].status,
            CellStatus::Produced {
                scene_id: "a".into(),
                score: 0.0
            }
        );
    }

    #[test]
    fn unproducible_cells_leave_gaps_not_failures() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::new(tmp.path());
        let scenes = vec![pixel_scene("s2", SensorFamily::Unsupported("Sentinel-2".into()))];
        let job = job(&[(0, 0), (1, 0)], scenes);

        let summary = run_job(&job, &ws, &backend(), &options(2), None).unwrap();
        assert_eq!(summary.produced, 0);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.mosaic, MosaicOutcome::NoTiles);
        assert!(!ws.mosaic_path().exists());
        assert!(!ws.done_path(GridCell::new(0, 0)).exists());
    }

    #[test]
    fn configuration_errors_abort_before_the_workspace_exists() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::new(tmp.path().join("ws"));

        let mut bad = job(&[(0, 0)], vec![scene("a", 0)]);
        bad.resolution = 0.0;
        assert!(matches!(
            run_job(&bad, &ws, &backend(), &options(1), None),
            Err(MosaicError::Job(JobError::Grid(_)))
        ));

        let off_grid = job(&[(99, 0)], vec![scene("a", 0)]);
        assert!(matches!(
            run_job(&off_grid, &ws, &backend(), &options(1), None),
            Err(MosaicError::Job(JobError::CellOutOfGrid { .. }))
        ));
        assert!(!ws.root().exists());
    }

    #[test]
    fn resume_keeps_finished_cells() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::new(tmp.path());
        let job = job(&[(0, 0), (1, 0)], vec![scene("a", 0)]);
        run_job(&job, &ws, &backend(), &options(1), None).unwrap();

        let fresh = backend();
        let resume = RunOptions {
            resume: true,
            ..options(1)
        };
        let summary = run_job(&job, &ws, &fresh, &resume, None).unwrap();
        assert_eq!(summary.resumed, 2);
        assert_eq!(summary.produced, 0);
        assert_eq!(fresh.opens(), 0);
        assert!(matches!(summary.mosaic, MosaicOutcome::Written(_)));
    }

    #[test]
    fn merge_failure_is_reported_not_raised() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::new(tmp.path());
        let cell = GridCell::new(0, 0);
        // A finished cell whose tile is corrupt
        std::fs::create_dir_all(ws.cell_dir(cell)).unwrap();
        std::fs::write(ws.tile_path(cell), b"not a tiff").unwrap();
        std::fs::write(ws.done_path(cell), b"").unwrap();

        let job = job(&[(0, 0)], vec![]);
        let resume = RunOptions {
            resume: true,
            ..options(1)
        };
        let summary = run_job(&job, &ws, &MockBackend::new(), &resume, None).unwrap();
        assert!(matches!(summary.mosaic, MosaicOutcome::Failed { .. }));
        assert!(!ws.mosaic_path().exists());
        assert!(!tmp.path().join("MERGE_COG.tif.part").exists());
    }

    #[test]
    fn empty_job_completes_without_mosaic() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::new(tmp.path());
        let summary = run_job(&job(&[], vec![]), &ws, &MockBackend::new(), &options(1), None).unwrap();
        assert_eq!(summary.total, 0);
        assert_eq!(summary.mosaic, MosaicOutcome::NoTiles);
    }

    #[test]
    fn run_options_from_config() {
        let mut config = MosaicConfig::default();
        config.processing.workers = Some(3);
        config.processing.resume = true;
        let opts = RunOptions::from_config(&config, None, false);
        assert_eq!(opts.workers, 3);
        assert!(opts.resume);
        assert_eq!(RunOptions::from_config(&config, Some(7), false).workers, 7);
    }
}
