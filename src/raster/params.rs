//! Parameter types for raster encoding and merging.
//!
//! These describe *what* to do; [`encode`](super::encode) and
//! [`merge`](super::merge) do it.

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

/// Resampling used when a tile is scaled onto the mosaic pixel grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resampling {
    Nearest,
    #[default]
    Bilinear,
}

impl Resampling {
    pub(crate) fn filter(self) -> FilterType {
        match self {
            Resampling::Nearest => FilterType::Nearest,
            Resampling::Bilinear => FilterType::Triangle,
        }
    }
}

/// Compression of written GeoTIFFs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    #[default]
    Deflate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EncodeOptions {
    pub compression: Compression,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MergeOptions {
    pub resampling: Resampling,
    /// Output pixel size in degrees. `None` uses the finest input pixel size.
    pub pixel_size_deg: Option<f64>,
}
