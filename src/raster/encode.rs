//! GeoTIFF encoding.
//!
//! Writes 1- or 3-sample rasters as `u8` or `u16` GeoTIFFs in EPSG:4326.
//! Georeferencing goes in the standard `ModelPixelScale`, `ModelTiepoint`
//! and `GeoKeyDirectory` tags, and the optional no-data value in
//! `GDAL_NODATA`, so GDAL-based tools read the output as-is.

use super::backend::{RasterError, SampleKind};
use super::params::{Compression, EncodeOptions};
use super::transform::GeoTransform;
use std::io::{Seek, Write};
use std::path::Path;
use tiff::encoder::colortype::{ColorType, Gray8, Gray16, RGB8, RGB16};
use tiff::encoder::compression::{Compression as TiffCompression, Deflate, Uncompressed};
use tiff::encoder::{DirectoryEncoder, TiffEncoder, TiffKind, TiffValue};
use tiff::tags::Tag;

/// GeoKeyDirectory for a geographic WGS 84 raster with pixel-is-area.
const GEO_KEYS_EPSG_4326: [u16; 16] = [
    1, 1, 0, 3, // version 1.1.0, 3 keys
    1024, 0, 1, 2, // GTModelType = Geographic
    1025, 0, 1, 1, // GTRasterType = PixelIsArea
    2048, 0, 1, 4326, // GeographicType = WGS 84
];

/// An in-memory raster ready for encoding.
///
/// Samples are chunky (pixel-interleaved), row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    pub width: u32,
    pub height: u32,
    pub bands: u16,
    pub kind: SampleKind,
    pub data: Vec<u16>,
}

impl RasterImage {
    /// Checked constructor: `data` must hold `width * height * bands` samples.
    pub fn new(
        width: u32,
        height: u32,
        bands: u16,
        kind: SampleKind,
        data: Vec<u16>,
    ) -> Result<Self, RasterError> {
        let expected = width as usize * height as usize * bands as usize;
        if data.len() != expected {
            return Err(RasterError::ShapeMismatch(format!(
                "{} samples for {width}x{height}x{bands}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            bands,
            kind,
            data,
        })
    }
}

/// Write `image` to `path` georeferenced by `transform`.
pub fn write_geotiff(
    path: &Path,
    image: &RasterImage,
    transform: &GeoTransform,
    nodata: Option<u16>,
    options: &EncodeOptions,
) -> Result<(), RasterError> {
    let file = std::fs::File::create(path)?;
    let mut encoder = TiffEncoder::new(std::io::BufWriter::new(file))?;
    match options.compression {
        Compression::None => write_image(&mut encoder, image, transform, nodata, Uncompressed),
        Compression::Deflate => write_image(&mut encoder, image, transform, nodata, Deflate::default()),
    }
}

fn write_image<W, D>(
    encoder: &mut TiffEncoder<W>,
    image: &RasterImage,
    transform: &GeoTransform,
    nodata: Option<u16>,
    compression: D,
) -> Result<(), RasterError>
where
    W: Write + Seek,
    D: TiffCompression,
{
    let tags = GeoTags::new(transform, nodata);
    let narrow = || image.data.iter().map(|&v| v as u8).collect::<Vec<u8>>();
    match (image.bands, image.kind) {
        (1, SampleKind::U8) => encode::<W, Gray8, D>(encoder, image, &narrow(), &tags, compression),
        (1, SampleKind::U16) => encode::<W, Gray16, D>(encoder, image, &image.data, &tags, compression),
        (3, SampleKind::U8) => encode::<W, RGB8, D>(encoder, image, &narrow(), &tags, compression),
        (3, SampleKind::U16) => encode::<W, RGB16, D>(encoder, image, &image.data, &tags, compression),
        (bands, _) => Err(RasterError::UnsupportedSampleFormat(format!(
            "cannot encode {bands} bands"
        ))),
    }
}

fn encode<W, C, D>(
    encoder: &mut TiffEncoder<W>,
    image: &RasterImage,
    samples: &[C::Inner],
    tags: &GeoTags,
    compression: D,
) -> Result<(), RasterError>
where
    W: Write + Seek,
    C: ColorType,
    D: TiffCompression,
    [C::Inner]: TiffValue,
{
    let mut tiff = encoder.new_image_with_compression::<C, D>(image.width, image.height, compression)?;
    tags.write(tiff.encoder())?;
    tiff.write_data(samples)?;
    Ok(())
}

struct GeoTags {
    pixel_scale: [f64; 3],
    tiepoint: [f64; 6],
    nodata: Option<String>,
}

impl GeoTags {
    fn new(transform: &GeoTransform, nodata: Option<u16>) -> Self {
        Self {
            pixel_scale: [transform.pixel_width, transform.pixel_height, 0.0],
            tiepoint: [0.0, 0.0, 0.0, transform.west, transform.north, 0.0],
            nodata: nodata.map(|v| v.to_string()),
        }
    }

    fn write<W: Write + Seek, K: TiffKind>(
        &self,
        dir: &mut DirectoryEncoder<'_, W, K>,
    ) -> Result<(), RasterError> {
        dir.write_tag(Tag::ModelPixelScaleTag, &self.pixel_scale[..])?;
        dir.write_tag(Tag::ModelTiepointTag, &self.tiepoint[..])?;
        dir.write_tag(Tag::GeoKeyDirectoryTag, &GEO_KEYS_EPSG_4326[..])?;
        if let Some(nodata) = &self.nodata {
            dir.write_tag(Tag::GdalNodata, nodata.as_str())?;
        }
        Ok(())
    }
}
