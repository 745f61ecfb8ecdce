//! Raster access seam and shared types.
//!
//! The pipeline reads every band through [`RasterBackend`]: open a source by
//! address, read a single-band window for a geographic box, drop the reader.
//! Readers are plain owned values. Dropping one releases whatever it holds,
//! so a cell's sources are released on every exit path without bookkeeping.
//!
//! The production implementation is
//! [`GeoTiffBackend`](super::geotiff::GeoTiffBackend).

use crate::grid::Bounds;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RasterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Cannot open {address}: {reason}")]
    Open { address: String, reason: String },
    #[error("Missing georeferencing tags in {0}")]
    MissingGeoreference(String),
    #[error("Unsupported sample format: {0}")]
    UnsupportedSampleFormat(String),
    #[error("Band {band} out of range (raster has {count})")]
    BandOutOfRange { band: u16, count: u16 },
    #[error("Window of {width}x{height} pixels exceeds the read limit")]
    WindowTooLarge { width: u32, height: u32 },
    #[error("Raster shape mismatch: {0}")]
    ShapeMismatch(String),
    #[error("Nothing to merge")]
    EmptyMerge,
}

/// Bit depth of the samples a raster was stored with.
///
/// Samples are carried as `u16` regardless; the kind decides how they are
/// written back out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    U8,
    U16,
}

impl SampleKind {
    /// The narrowest kind able to hold samples of both inputs.
    pub fn widest(self, other: SampleKind) -> SampleKind {
        match (self, other) {
            (SampleKind::U8, SampleKind::U8) => SampleKind::U8,
            _ => SampleKind::U16,
        }
    }
}

/// Location of a raster object: a bucket and a path inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RasterAddress {
    pub bucket: String,
    pub path: String,
}

impl RasterAddress {
    pub fn new(bucket: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            path: path.into(),
        }
    }
}

impl std::fmt::Display for RasterAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.bucket, self.path)
    }
}

/// A single band read over a geographic window.
///
/// `data` and `valid` are row-major with `width * height` entries. Pixels
/// outside the source or equal to its no-data value are not valid and read
/// as 0.
#[derive(Debug, Clone, PartialEq)]
pub struct BandWindow {
    pub width: u32,
    pub height: u32,
    pub kind: SampleKind,
    pub data: Vec<u16>,
    pub valid: Vec<bool>,
}

impl BandWindow {
    pub fn shape(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// An open raster source.
pub trait RasterReader {
    /// Read band `band` (1-based) windowed to `bounds`.
    fn read_window(&mut self, bounds: &Bounds, band: u16) -> Result<BandWindow, RasterError>;
}

/// Opens raster sources by address.
///
/// Every call returns an independent reader; nothing is shared between
/// readers, so concurrent cell tasks never contend on a handle.
pub trait RasterBackend: Sync {
    type Reader: RasterReader;

    fn open(&self, address: &RasterAddress) -> Result<Self::Reader, RasterError>;
}
