//! Mosaicking georeferenced RGB tiles into one raster.
//!
//! The output covers the union of the input bounds. Each tile is scaled
//! onto the pixel rectangle its bounds occupy on the output grid and pasted
//! in input order, so where tiles overlap the later one wins. Grid tiles
//! never overlap; they only share edges.
//!
//! Areas no tile covers stay 0, which is also the declared no-data value.

use super::backend::{RasterError, SampleKind};
use super::encode::RasterImage;
use super::geotiff::GeoTiff;
use super::params::MergeOptions;
use super::transform::GeoTransform;
use image::{ImageBuffer, Rgb, imageops};
use std::path::PathBuf;

/// Largest mosaic this process will allocate.
const MAX_MOSAIC_PIXELS: u64 = 1 << 30;

type Rgb16Buffer = ImageBuffer<Rgb<u16>, Vec<u16>>;

/// Merge result: the combined pixels and where they sit on the globe.
#[derive(Debug, Clone)]
pub struct MergedRaster {
    pub image: RasterImage,
    pub transform: GeoTransform,
}

/// Merge the 3-band GeoTIFFs at `paths` into one raster.
pub fn merge(paths: &[PathBuf], options: &MergeOptions) -> Result<MergedRaster, RasterError> {
    let tiles = paths
        .iter()
        .map(|path| GeoTiff::open(path))
        .collect::<Result<Vec<_>, _>>()?;
    merge_rasters(&tiles, options)
}

/// Merge already-decoded tiles. See [`merge`].
pub fn merge_rasters(tiles: &[GeoTiff], options: &MergeOptions) -> Result<MergedRaster, RasterError> {
    let first = tiles.first().ok_or(RasterError::EmptyMerge)?;

    if let Some(tile) = tiles.iter().find(|t| t.band_count() != 3) {
        return Err(RasterError::ShapeMismatch(format!(
            "expected 3-band tiles, found {} bands",
            tile.band_count()
        )));
    }

    let union = tiles
        .iter()
        .skip(1)
        .fold(first.bounds(), |acc, t| acc.union(&t.bounds()));

    let pixel_size = match options.pixel_size_deg {
        Some(size) if size > 0.0 && size.is_finite() => size,
        Some(size) => {
            return Err(RasterError::ShapeMismatch(format!(
                "invalid mosaic pixel size {size}"
            )));
        }
        None => finest_pixel_size(tiles),
    };

    let width = ((union.width() / pixel_size).round() as u32).max(1);
    let height = ((union.height() / pixel_size).round() as u32).max(1);
    if width as u64 * height as u64 > MAX_MOSAIC_PIXELS {
        return Err(RasterError::WindowTooLarge { width, height });
    }
    let transform = GeoTransform::from_bounds(&union, width, height);

    let kind = tiles
        .iter()
        .map(GeoTiff::kind)
        .fold(first.kind(), SampleKind::widest);
    let filter = options.resampling.filter();
    let mut canvas = Rgb16Buffer::new(width, height);

    for tile in tiles {
        let (tw, th) = tile.dimensions();
        let source = Rgb16Buffer::from_raw(tw, th, tile.samples().to_vec()).ok_or_else(|| {
            RasterError::ShapeMismatch(format!("tile buffer does not match {tw}x{th}"))
        })?;

        let target = transform.pixel_window(&tile.bounds());
        let placed = if (target.width, target.height) == (tw, th) {
            source
        } else {
            imageops::resize(&source, target.width, target.height, filter)
        };
        imageops::replace(&mut canvas, &placed, target.col_off, target.row_off);
    }

    let image = RasterImage::new(width, height, 3, kind, canvas.into_raw())?;
    Ok(MergedRaster { image, transform })
}

fn finest_pixel_size(tiles: &[GeoTiff]) -> f64 {
    tiles
        .iter()
        .map(|t| {
            let tr = t.transform();
            tr.pixel_width.min(tr.pixel_height)
        })
        .fold(f64::INFINITY, f64::min)
}
