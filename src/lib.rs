//! # Cloudless Mosaic
//!
//! Builds a seamless, cloud-free satellite mosaic over a fixed
//! longitude/latitude grid. For every requested grid cell the least cloudy
//! usable scene among the overlapping candidates is picked, its red, green
//! and blue bands are cut to the cell, and all cell tiles are merged into
//! one raster.
//!
//! # Architecture: Fan Out, Then Merge
//!
//! ```text
//! job.json ─► grid + scenes ─┬─► cell 0_0: rank scenes ─► read RGB ─► tile.tif + done
//!                            ├─► cell 1_0: ...
//!                            └─► cell N:   ...
//!                                        (parallel, independent)
//!                                                 │
//!                                                 ▼
//!                                  merge produced tiles ─► MERGE_COG.tif
//! ```
//!
//! Cells share nothing mutable. Each writes its own directory, so the only
//! synchronisation point is the wait before the merge. A cell that cannot be
//! produced leaves a gap in the mosaic; it never fails the job.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`grid`] | Resolution → fixed equirectangular grid; cell ↔ geographic bounds |
//! | [`job`] | Job description: cells, candidate scenes, sensor families |
//! | [`cloud`] | Cloud scoring (catalogue value or pixel cloud band) and scene selection |
//! | [`cell`] | Per-cell pipeline: select, read RGB, write tile and marker |
//! | [`mosaic`] | Orchestration: workspace, bounded worker pool, final merge |
//! | [`workspace`] | On-disk layout and the progress query |
//! | [`raster`] | Raster collaborators: windowed reads, GeoTIFF encode, merge |
//! | [`config`] | `config.toml` loading and validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## One Backend Seam
//!
//! All source reads go through [`raster::RasterBackend`]. Production reads
//! GeoTIFFs from a local directory or an HTTP object store; tests swap in a
//! recording mock, so scoring, handle release and the whole pipeline are
//! exercised without a network.
//!
//! ## Markers Over State
//!
//! Progress lives on disk: a `grid_num_<N>` file declares the total and a
//! zero-byte `done` file marks each finished cell. Any process can poll a
//! running job with [`workspace::progress`], and an interrupted job can be
//! resumed from the same markers.
//!
//! ## Pure-Rust Rasters
//!
//! GeoTIFF decoding and encoding use the `tiff` crate and resampling uses
//! `image`. No GDAL install is needed; the output carries standard GeoTIFF
//! tags that GDAL-based tools read as-is.

pub mod cell;
pub mod cloud;
pub mod config;
pub mod grid;
pub mod job;
pub mod mosaic;
pub mod output;
pub mod raster;
pub mod workspace;

#[cfg(test)]
pub(crate) mod test_helpers;
