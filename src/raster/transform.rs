//! Pure georeferencing math for north-up rasters.
//!
//! All functions here are pure and testable without any I/O.

use crate::grid::Bounds;

/// Affine transform of a north-up raster: origin at the north-west corner,
/// square-or-not pixels, no rotation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub west: f64,
    pub north: f64,
    /// Degrees per pixel along x. Always positive.
    pub pixel_width: f64,
    /// Degrees per pixel along y. Always positive; rows run southward.
    pub pixel_height: f64,
}

/// Integer pixel window into a raster. Offsets may be negative or run past
/// the raster when the requested box extends beyond it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub col_off: i64,
    pub row_off: i64,
    pub width: u32,
    pub height: u32,
}

impl GeoTransform {
    /// Transform that maps a `width` x `height` raster exactly onto `bounds`.
    pub fn from_bounds(bounds: &Bounds, width: u32, height: u32) -> Self {
        Self {
            west: bounds.west,
            north: bounds.north,
            pixel_width: bounds.width() / width.max(1) as f64,
            pixel_height: bounds.height() / height.max(1) as f64,
        }
    }

    /// Geographic extent of a `width` x `height` raster.
    pub fn bounds(&self, width: u32, height: u32) -> Bounds {
        Bounds {
            west: self.west,
            south: self.north - height as f64 * self.pixel_height,
            east: self.west + width as f64 * self.pixel_width,
            north: self.north,
        }
    }

    /// Pixel window covering `bounds`, snapped to the nearest pixel edges.
    ///
    /// A box narrower than half a pixel still yields a 1x1 window.
    pub fn pixel_window(&self, bounds: &Bounds) -> PixelWindow {
        let col_off = ((bounds.west - self.west) / self.pixel_width).round() as i64;
        let col_end = ((bounds.east - self.west) / self.pixel_width).round() as i64;
        let row_off = ((self.north - bounds.north) / self.pixel_height).round() as i64;
        let row_end = ((self.north - bounds.south) / self.pixel_height).round() as i64;
        PixelWindow {
            col_off,
            row_off,
            width: (col_end - col_off).max(1) as u32,
            height: (row_end - row_off).max(1) as u32,
        }
    }
}

impl PixelWindow {
    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}
