//! GeoTIFF decoding and the production raster backend.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode samples | `tiff::decoder::Decoder::read_image` (`u8`/`u16`, chunky) |
//! | Georeferencing | `ModelPixelScale` + `ModelTiepoint` tags |
//! | No-data value | `GDAL_NODATA` ASCII tag |
//! | Remote fetch | `reqwest::blocking` GET of the whole object |
//!
//! A source is addressed as `<endpoint>/<bucket>/<path>`. An `http://` or
//! `https://` endpoint is an object store (MinIO, S3 website endpoints);
//! anything else is a local directory laid out the same way.

use super::backend::{
    BandWindow, RasterAddress, RasterBackend, RasterError, RasterReader, SampleKind,
};
use super::transform::GeoTransform;
use crate::grid::Bounds;
use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tiff::ColorType;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;

/// Largest window a single read may produce.
const MAX_WINDOW_PIXELS: u64 = 1 << 28;

/// A decoded, georeferenced raster held in memory.
#[derive(Debug, Clone)]
pub struct GeoTiff {
    width: u32,
    height: u32,
    samples_per_pixel: u16,
    kind: SampleKind,
    /// Chunky (pixel-interleaved) samples, row-major.
    data: Vec<u16>,
    transform: GeoTransform,
    nodata: Option<f64>,
}

impl GeoTiff {
    /// Decode a GeoTIFF from any seekable reader.
    ///
    /// `name` only feeds error messages.
    pub fn decode<R: Read + Seek>(reader: R, name: &str) -> Result<Self, RasterError> {
        let mut limits = Limits::default();
        limits.decoding_buffer_size = 1024 * 1024 * 1024;
        limits.intermediate_buffer_size = 1024 * 1024 * 1024;
        let mut decoder = Decoder::new(reader)?.with_limits(limits);

        let (width, height) = decoder.dimensions()?;
        let (kind, samples_per_pixel) = match decoder.colortype()? {
            ColorType::Gray(8) => (SampleKind::U8, 1),
            ColorType::Gray(16) => (SampleKind::U16, 1),
            ColorType::GrayA(8) => (SampleKind::U8, 2),
            ColorType::GrayA(16) => (SampleKind::U16, 2),
            ColorType::RGB(8) => (SampleKind::U8, 3),
            ColorType::RGB(16) => (SampleKind::U16, 3),
            ColorType::RGBA(8) => (SampleKind::U8, 4),
            ColorType::RGBA(16) => (SampleKind::U16, 4),
            other => {
                return Err(RasterError::UnsupportedSampleFormat(format!(
                    "{other:?} in {name}"
                )));
            }
        };

        let transform = read_geotransform(&mut decoder, width, height)
            .ok_or_else(|| RasterError::MissingGeoreference(name.to_string()))?;

        let nodata = decoder
            .get_tag_ascii_string(Tag::GdalNodata)
            .ok()
            .and_then(|s| s.trim_matches(|c: char| c.is_whitespace() || c == '\0').parse().ok());

        let data = match decoder.read_image()? {
            DecodingResult::U8(samples) => samples.into_iter().map(u16::from).collect(),
            DecodingResult::U16(samples) => samples,
            _ => {
                return Err(RasterError::UnsupportedSampleFormat(format!(
                    "non-unsigned samples in {name}"
                )));
            }
        };

        let expected = width as usize * height as usize * samples_per_pixel as usize;
        if data.len() != expected {
            return Err(RasterError::ShapeMismatch(format!(
                "{name}: decoded {} samples, expected {expected}",
                data.len()
            )));
        }

        Ok(Self {
            width,
            height,
            samples_per_pixel,
            kind,
            data,
            transform,
            nodata,
        })
    }

    /// Decode a GeoTIFF file from disk.
    pub fn open(path: &Path) -> Result<Self, RasterError> {
        let file = std::fs::File::open(path).map_err(|e| RasterError::Open {
            address: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::decode(std::io::BufReader::new(file), &path.display().to_string())
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn band_count(&self) -> u16 {
        self.samples_per_pixel
    }

    pub fn kind(&self) -> SampleKind {
        self.kind
    }

    pub fn transform(&self) -> GeoTransform {
        self.transform
    }

    pub fn bounds(&self) -> Bounds {
        self.transform.bounds(self.width, self.height)
    }

    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    /// Chunky samples, `width * height * band_count` entries.
    pub fn samples(&self) -> &[u16] {
        &self.data
    }

    /// Read band `band` (1-based) over `bounds`.
    ///
    /// The window is snapped to source pixel edges. Pixels outside the
    /// source, and pixels equal to the no-data value, come back as 0 and
    /// are flagged invalid.
    pub fn read_window(&self, bounds: &Bounds, band: u16) -> Result<BandWindow, RasterError> {
        if band == 0 || band > self.samples_per_pixel {
            return Err(RasterError::BandOutOfRange {
                band,
                count: self.samples_per_pixel,
            });
        }

        let window = self.transform.pixel_window(bounds);
        if window.pixel_count() > MAX_WINDOW_PIXELS {
            return Err(RasterError::WindowTooLarge {
                width: window.width,
                height: window.height,
            });
        }

        let spp = self.samples_per_pixel as usize;
        let offset = (band - 1) as usize;
        let capacity = window.pixel_count() as usize;
        let mut data = Vec::with_capacity(capacity);
        let mut valid = Vec::with_capacity(capacity);

        for r in 0..window.height as i64 {
            let src_row = window.row_off + r;
            for c in 0..window.width as i64 {
                let src_col = window.col_off + c;
                let inside = (0..self.height as i64).contains(&src_row)
                    && (0..self.width as i64).contains(&src_col);
                if !inside {
                    data.push(0);
                    valid.push(false);
                    continue;
                }
                let idx = (src_row as usize * self.width as usize + src_col as usize) * spp + offset;
                let value = self.data[idx];
                if self.nodata.is_some_and(|nd| value as f64 == nd) {
                    data.push(0);
                    valid.push(false);
                } else {
                    data.push(value);
                    valid.push(true);
                }
            }
        }

        Ok(BandWindow {
            width: window.width,
            height: window.height,
            kind: self.kind,
            data,
            valid,
        })
    }
}

/// Read the transform from `ModelPixelScale` + `ModelTiepoint`.
///
/// The tiepoint may anchor any pixel; it is moved back to the raster's
/// north-west corner.
fn read_geotransform<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    width: u32,
    height: u32,
) -> Option<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(Tag::ModelPixelScaleTag).ok()?;
    let tiepoint = decoder.get_tag_f64_vec(Tag::ModelTiepointTag).ok()?;
    if scale.len() < 2 || tiepoint.len() < 6 || scale[0] <= 0.0 || scale[1] <= 0.0 {
        return None;
    }
    let (i, j, x, y) = (tiepoint[0], tiepoint[1], tiepoint[3], tiepoint[4]);
    let transform = GeoTransform {
        west: x - i * scale[0],
        north: y + j * scale[1],
        pixel_width: scale[0],
        pixel_height: scale[1],
    };
    (width > 0 && height > 0).then_some(transform)
}

/// Where source objects live.
#[derive(Debug, Clone)]
enum Endpoint {
    Http {
        base: String,
        client: reqwest::blocking::Client,
    },
    Local(PathBuf),
}

/// Production backend: GeoTIFFs from a local directory or an HTTP object store.
///
/// Each [`open`](RasterBackend::open) fetches and decodes the object afresh;
/// readers never share state.
#[derive(Debug, Clone)]
pub struct GeoTiffBackend {
    endpoint: Endpoint,
}

impl GeoTiffBackend {
    /// Build a backend for `endpoint`. HTTP requests time out after `timeout`.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, RasterError> {
        let endpoint = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            let client = reqwest::blocking::Client::builder()
                .timeout(timeout)
                .build()?;
            Endpoint::Http {
                base: endpoint.trim_end_matches('/').to_string(),
                client,
            }
        } else {
            Endpoint::Local(PathBuf::from(endpoint))
        };
        Ok(Self { endpoint })
    }

    /// Local-directory backend, mostly useful for tests and mirrored data.
    pub fn local(root: impl Into<PathBuf>) -> Self {
        Self {
            endpoint: Endpoint::Local(root.into()),
        }
    }

    /// Full location of an address, as a URL or a filesystem path.
    pub fn locate(&self, address: &RasterAddress) -> String {
        match &self.endpoint {
            Endpoint::Http { base, .. } => format!("{base}/{}/{}", address.bucket, address.path),
            Endpoint::Local(root) => root
                .join(&address.bucket)
                .join(&address.path)
                .display()
                .to_string(),
        }
    }
}

/// An open GeoTIFF source.
#[derive(Debug)]
pub struct GeoTiffReader {
    raster: GeoTiff,
}

impl GeoTiffReader {
    pub fn raster(&self) -> &GeoTiff {
        &self.raster
    }
}

impl RasterReader for GeoTiffReader {
    fn read_window(&mut self, bounds: &Bounds, band: u16) -> Result<BandWindow, RasterError> {
        self.raster.read_window(bounds, band)
    }
}

impl RasterBackend for GeoTiffBackend {
    type Reader = GeoTiffReader;

    fn open(&self, address: &RasterAddress) -> Result<GeoTiffReader, RasterError> {
        let location = self.locate(address);
        let raster = match &self.endpoint {
            Endpoint::Http { client, .. } => {
                let bytes = client
                    .get(&location)
                    .send()
                    .and_then(|resp| resp.error_for_status())
                    .and_then(|resp| resp.bytes())
                    .map_err(|e| RasterError::Open {
                        address: location.clone(),
                        reason: e.to_string(),
                    })?;
                GeoTiff::decode(Cursor::new(bytes), &location)?
            }
            Endpoint::Local(_) => GeoTiff::open(Path::new(&location))?,
        };
        Ok(GeoTiffReader { raster })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::encode::{RasterImage, write_geotiff};
    use crate::raster::params::EncodeOptions;
    use tempfile::TempDir;

    /// 4x3 single-band raster over 0..4°E, 0..3°N, values = row * 10 + col.
    fn write_small(dir: &Path, nodata_value: Option<u16>) -> PathBuf {
        let mut data: Vec<u16> = (0..3)
            .flat_map(|r| (0..4).map(move |c| (r * 10 + c) as u16))
            .collect();
        if let Some(nd) = nodata_value {
            data[5] = nd;
        }
        let image = RasterImage::new(4, 3, 1, SampleKind::U16, data).unwrap();
        let path = dir.join("small.tif");
        let transform = GeoTransform::from_bounds(&Bounds::new(0.0, 0.0, 4.0, 3.0), 4, 3);
        write_geotiff(&path, &image, &transform, nodata_value, &EncodeOptions::default()).unwrap();
        path
    }

    #[test]
    fn decode_reads_georeferencing() {
        let tmp = TempDir::new().unwrap();
        let raster = GeoTiff::open(&write_small(tmp.path(), None)).unwrap();
        assert_eq!(raster.dimensions(), (4, 3));
        assert_eq!(raster.band_count(), 1);
        assert_eq!(raster.kind(), SampleKind::U16);
        assert_eq!(raster.bounds(), Bounds::new(0.0, 0.0, 4.0, 3.0));
        assert_eq!(raster.nodata(), None);
    }

    #[test]
    fn window_inside_source() {
        let tmp = TempDir::new().unwrap();
        let raster = GeoTiff::open(&write_small(tmp.path(), None)).unwrap();
        let w = raster
            .read_window(&Bounds::new(1.0, 1.0, 3.0, 3.0), 1)
            .unwrap();
        assert_eq!(w.shape(), (2, 2));
        assert_eq!(w.data, vec![1, 2, 11, 12]);
        assert!(w.valid.iter().all(|&v| v));
    }

    #[test]
    fn window_outside_source_is_invalid() {
        let tmp = TempDir::new().unwrap();
        let raster = GeoTiff::open(&write_small(tmp.path(), None)).unwrap();
        let w = raster
            .read_window(&Bounds::new(3.0, 2.0, 5.0, 4.0), 1)
            .unwrap();
        assert_eq!(w.shape(), (2, 2));
        // Only the bottom-left pixel (row 0, col 3) lies inside
        assert_eq!(w.valid, vec![false, false, true, false]);
        assert_eq!(w.data, vec![0, 0, 3, 0]);
    }

    #[test]
    fn nodata_pixels_are_invalid() {
        let tmp = TempDir::new().unwrap();
        let raster = GeoTiff::open(&write_small(tmp.path(), Some(9999))).unwrap();
        assert_eq!(raster.nodata(), Some(9999.0));
        let w = raster
            .read_window(&Bounds::new(0.0, 0.0, 4.0, 3.0), 1)
            .unwrap();
        assert!(!w.valid[5]);
        assert_eq!(w.data[5], 0);
        assert_eq!(w.valid.iter().filter(|&&v| v).count(), 11);
    }

    #[test]
    fn band_out_of_range() {
        let tmp = TempDir::new().unwrap();
        let raster = GeoTiff::open(&write_small(tmp.path(), None)).unwrap();
        let bounds = Bounds::new(0.0, 0.0, 1.0, 1.0);
        assert!(matches!(
            raster.read_window(&bounds, 2),
            Err(RasterError::BandOutOfRange { band: 2, count: 1 })
        ));
        assert!(raster.read_window(&bounds, 0).is_err());
    }

    #[test]
    fn local_backend_resolves_bucket_and_path() {
        let tmp = TempDir::new().unwrap();
        let bucket_dir = tmp.path().join("bucket").join("scene");
        std::fs::create_dir_all(&bucket_dir).unwrap();
        write_small(&bucket_dir, None);

        let backend = GeoTiffBackend::local(tmp.path());
        let address = RasterAddress::new("bucket", "scene/small.tif");
        let mut reader = backend.open(&address).unwrap();
        assert_eq!(reader.raster().dimensions(), (4, 3));
        let w = reader
            .read_window(&Bounds::new(0.0, 2.0, 1.0, 3.0), 1)
            .unwrap();
        assert_eq!(w.data, vec![0]);
    }

    #[test]
    fn local_backend_missing_object() {
        let tmp = TempDir::new().unwrap();
        let backend = GeoTiffBackend::local(tmp.path());
        let err = backend.open(&RasterAddress::new("bucket", "nope.tif")).unwrap_err();
        assert!(matches!(err, RasterError::Open { .. }));
        assert!(err.to_string().contains("nope.tif"));
    }

    #[test]
    fn http_endpoint_locations() {
        let backend =
            GeoTiffBackend::new("http://127.0.0.1:9000/", Duration::from_secs(5)).unwrap();
        let address = RasterAddress::new("landsat", "LC08/B4.TIF");
        assert_eq!(
            backend.locate(&address),
            "http://127.0.0.1:9000/landsat/LC08/B4.TIF"
        );
    }

    #[test]
    fn missing_georeference_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("plain.tif");
        let file = std::fs::File::create(&path).unwrap();
        let mut encoder = tiff::encoder::TiffEncoder::new(file).unwrap();
        encoder
            .write_image::<tiff::encoder::colortype::Gray8>(2, 2, &[1, 2, 3, 4])
            .unwrap();
        assert!(matches!(
            GeoTiff::open(&path),
            Err(RasterError::MissingGeoreference(_))
        ));
    }
}
