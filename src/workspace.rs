//! On-disk workspace layout and progress polling.
//!
//! ```text
//! <workspace>/
//! ├── grid_num_<N>          # zero-byte marker; N = cells in the job
//! ├── MERGE_COG.tif         # final mosaic
//! └── output/
//!     └── <col>_<row>/
//!         ├── tile.tif      # per-cell tile
//!         └── done          # zero-byte completion marker
//! ```
//!
//! A cell directory is touched only by the task producing that cell. The
//! `done` marker appears strictly after `tile.tif` is complete, so pollers
//! never see a marker for a partial tile.

use crate::grid::GridCell;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

pub const OUTPUT_DIR: &str = "output";
pub const TILE_FILE: &str = "tile.tif";
pub const DONE_MARKER: &str = "done";
pub const MOSAIC_FILE: &str = "MERGE_COG.tif";
pub const GRID_NUM_PREFIX: &str = "grid_num_";

/// Paths inside one workspace directory.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join(OUTPUT_DIR)
    }

    pub fn cell_dir(&self, cell: GridCell) -> PathBuf {
        self.output_dir().join(cell.to_string())
    }

    pub fn tile_path(&self, cell: GridCell) -> PathBuf {
        self.cell_dir(cell).join(TILE_FILE)
    }

    pub fn done_path(&self, cell: GridCell) -> PathBuf {
        self.cell_dir(cell).join(DONE_MARKER)
    }

    pub fn mosaic_path(&self) -> PathBuf {
        self.root.join(MOSAIC_FILE)
    }

    pub fn grid_num_path(&self, total: usize) -> PathBuf {
        self.root.join(format!("{GRID_NUM_PREFIX}{total}"))
    }

    pub fn is_done(&self, cell: GridCell) -> bool {
        self.done_path(cell).is_file()
    }

    /// Create the layout for `cells` and declare their count.
    ///
    /// Any earlier `grid_num_*` marker and mosaic are removed so progress and
    /// output always describe this run. Unless `resume` is set, earlier
    /// tiles and markers in these cells' directories are removed too.
    pub fn prepare(&self, cells: &[GridCell], resume: bool) -> std::io::Result<()> {
        std::fs::create_dir_all(self.output_dir())?;

        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.is_file() && is_grid_num_marker(&path) {
                debug!(path = %path.display(), "removing stale grid marker");
                std::fs::remove_file(&path)?;
            }
        }
        remove_if_present(&self.mosaic_path())?;

        for &cell in cells {
            std::fs::create_dir_all(self.cell_dir(cell))?;
            if !resume {
                remove_if_present(&self.done_path(cell))?;
                remove_if_present(&self.tile_path(cell))?;
            }
        }

        std::fs::File::create(self.grid_num_path(cells.len()))?;
        Ok(())
    }
}

fn is_grid_num_marker(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(GRID_NUM_PREFIX))
}

fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Completed fraction of the job in `workspace`.
///
/// Counts `output/*/done` markers against the total declared by the
/// `grid_num_<N>` marker. Returns 0 when the marker is missing, unparsable,
/// or declares no cells.
pub fn progress(workspace: &Path) -> f64 {
    let Some(total) = declared_total(workspace) else {
        return 0.0;
    };
    if total <= 0.0 {
        return 0.0;
    }

    let completed = WalkDir::new(workspace.join(OUTPUT_DIR))
        .min_depth(2)
        .max_depth(2)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && e.file_name() == DONE_MARKER)
        .count();

    completed as f64 / total
}

fn declared_total(workspace: &Path) -> Option<f64> {
    let mut markers: Vec<PathBuf> = std::fs::read_dir(workspace)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| is_grid_num_marker(p))
        .collect();
    markers.sort();

    let name = markers.first()?.file_name()?.to_str()?.to_string();
    name.rsplit('_').next()?.parse().ok()
}
