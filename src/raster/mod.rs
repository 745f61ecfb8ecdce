//! Raster collaborators: windowed reads, GeoTIFF encoding, tile merging.
//!
//! | Capability | Entry point |
//! |---|---|
//! | **Windowed read** | [`RasterBackend::open`] + [`RasterReader::read_window`] |
//! | **Sources** | [`GeoTiffBackend`]: local directory or HTTP object store |
//! | **Encode** | [`write_geotiff`]: 1- or 3-sample `u8`/`u16` GeoTIFF, EPSG:4326 |
//! | **Merge** | [`merge`]: union of georeferenced tiles, bilinear or nearest |
//!
//! The module is split into:
//! - **Transform**: pure georeferencing math (unit testable)
//! - **Parameters**: resampling and compression choices
//! - **Backend**: the [`RasterBackend`] seam the pipeline reads through
//! - **GeoTIFF**: decoding, the production backend, and encoding
//! - **Merge**: mosaicking produced tiles into one raster

pub mod backend;
pub mod encode;
pub mod geotiff;
pub mod merge;
mod params;
pub mod transform;

pub use backend::{BandWindow, RasterAddress, RasterBackend, RasterError, RasterReader, SampleKind};
pub use encode::{RasterImage, write_geotiff};
pub use geotiff::{GeoTiff, GeoTiffBackend};
pub use merge::{MergedRaster, merge};
pub use params::{Compression, EncodeOptions, MergeOptions, Resampling};
pub use transform::{GeoTransform, PixelWindow};
