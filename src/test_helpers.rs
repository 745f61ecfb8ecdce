//! Shared test utilities for the mosaic test suite.
//!
//! Builds synthetic scenes and writes small GeoTIFF fixtures so module tests
//! can exercise scoring, cell production and merging without a catalogue or
//! an object store.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! let s = scene("LC08_A", 0);
//! write_scene_bands(tmp.path(), &s, &Bounds::new(-180.0, 0.0, 0.0, 90.0), 36, 18);
//! ```

use std::path::Path;

use crate::grid::Bounds;
use crate::job::{BandMapper, Footprint, Geometry, Scene, SceneImage, SensorFamily};
use crate::raster::{EncodeOptions, GeoTransform, RasterImage, SampleKind, write_geotiff};

pub use tempfile::TempDir;

// =========================================================================
// Scenes
// =========================================================================

/// A Landsat scene in metadata mode with whole-scene cloud `cloud`.
///
/// Bands B4/B3/B2/B5 live at `<id>/<band>.TIF` in bucket `bucket`; the
/// footprint covers the whole globe.
pub fn scene(id: &str, cloud: i64) -> Scene {
    let images = ["B4", "B3", "B2", "B5"]
        .iter()
        .map(|band| SceneImage {
            band: band.to_string(),
            bucket: "bucket".to_string(),
            tif_path: format!("{id}/{band}.TIF"),
        })
        .collect();

    Scene {
        band_mapper: BandMapper {
            red: "B4".into(),
            green: "B3".into(),
            blue: "B2".into(),
            nir: "B5".into(),
        },
        footprint: footprint(&Bounds::new(-180.0, -90.0, 180.0, 90.0)),
        bucket: "bucket".to_string(),
        cloud,
        images,
        product_name: "L2SP".to_string(),
        scene_id: id.to_string(),
        scene_time: "2024-05-01T02:33:10Z".to_string(),
        sensor: SensorFamily::Landsat,
        cloud_path: None,
    }
}

/// A pixel-mode scene of `sensor` whose cloud band is `<id>/QA.TIF`.
pub fn pixel_scene(id: &str, sensor: SensorFamily) -> Scene {
    Scene {
        sensor,
        cloud_path: Some(format!("{id}/QA.TIF")),
        ..scene(id, 100)
    }
}

/// Rectangular GeoJSON footprint for `bounds`.
pub fn footprint(bounds: &Bounds) -> Footprint {
    let ring = vec![
        vec![bounds.west, bounds.south],
        vec![bounds.east, bounds.south],
        vec![bounds.east, bounds.north],
        vec![bounds.west, bounds.north],
        vec![bounds.west, bounds.south],
    ];
    Footprint {
        kind: "Feature".to_string(),
        geometry: Geometry {
            kind: "Polygon".to_string(),
            coordinates: vec![ring],
        },
    }
}

// =========================================================================
// GeoTIFF fixtures
// =========================================================================

/// Write a single-band raster over `bounds` where every pixel is `value`.
pub fn write_band(path: &Path, bounds: &Bounds, width: u32, height: u32, value: u16, kind: SampleKind) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let data = vec![value; (width * height) as usize];
    let image = RasterImage::new(width, height, 1, kind, data).unwrap();
    let transform = GeoTransform::from_bounds(bounds, width, height);
    write_geotiff(path, &image, &transform, None, &EncodeOptions::default()).unwrap();
}

/// Write the red, green and blue bands of `scene` under `root/<bucket>/`.
///
/// Red reads 100, green 150, blue 200.
pub fn write_scene_bands(root: &Path, scene: &Scene, bounds: &Bounds, width: u32, height: u32) {
    let bucket = root.join(&scene.bucket);
    for (label, value) in [
        (&scene.band_mapper.red, 100),
        (&scene.band_mapper.green, 150),
        (&scene.band_mapper.blue, 200),
    ] {
        let image = scene
            .images
            .iter()
            .find(|img| &img.band == label)
            .unwrap_or_else(|| panic!("scene '{}' has no band {label}", scene.scene_id));
        write_band(&bucket.join(&image.tif_path), bounds, width, height, value, SampleKind::U8);
    }
}
