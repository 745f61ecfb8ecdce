//! Cloud scoring and scene selection.
//!
//! Every candidate scene gets a score for a cell; lower is better and 0
//! means clear. A scene without a cloud band scores its catalogue cloud
//! percentage. A scene with one is scored from the pixels of that band
//! over the cell:
//!
//! ```text
//! cloud    = sensor rule applied to the raw value
//! valid    = !cloud && !no-data
//! score    = count(valid) / sum(raw) * 100
//! ```
//!
//! Sensor rules:
//!
//! | Sensor | Cloud when |
//! |---|---|
//! | Landsat | bit 3 set |
//! | MODIS | bit 0 set |
//! | GF | value == 2 |
//!
//! The score is a valid-pixel count over a sum of raw values, not a
//! fraction. Rankings depend on it exactly as written, so it is kept as is.
//!
//! ## Selection
//!
//! [`select_scene`] walks candidates in order. The first exact 0 wins
//! immediately and no later candidate is scored; otherwise the strictly
//! lowest score wins, ties going to the earlier candidate. A candidate
//! whose scoring fails is left out of the ranking for that cell only.

use crate::grid::Bounds;
use crate::job::{Scene, SensorFamily};
use crate::raster::{BandWindow, RasterAddress, RasterBackend, RasterError, RasterReader};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Cloud decoding not implemented for sensor: {0}")]
    UnsupportedSensor(String),
    #[error("Cloud band read failed: {0}")]
    Raster(#[from] RasterError),
    #[error("Cloud band window sums to zero")]
    DegenerateScore,
    #[error("Scene footprint does not reach the cell")]
    OutsideFootprint,
}

/// Per-sensor decoding of the cloud flag from a raw cloud-band value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudRule {
    /// Landsat QA_PIXEL: bit 3 is the cloud bit.
    Bit3,
    /// MODIS state flags: bit 0.
    Bit0,
    /// Gaofen classification: class 2 is cloud.
    ClassTwo,
}

impl CloudRule {
    pub fn for_sensor(sensor: &SensorFamily) -> Result<Self, CloudError> {
        match sensor {
            SensorFamily::Landsat => Ok(CloudRule::Bit3),
            SensorFamily::Modis => Ok(CloudRule::Bit0),
            SensorFamily::Gaofen => Ok(CloudRule::ClassTwo),
            SensorFamily::Unsupported(label) => Err(CloudError::UnsupportedSensor(label.clone())),
        }
    }

    pub fn is_cloud(self, raw: u16) -> bool {
        match self {
            CloudRule::Bit3 => raw & (1 << 3) != 0,
            CloudRule::Bit0 => raw & 1 != 0,
            CloudRule::ClassTwo => raw == 2,
        }
    }
}

/// Score from the catalogue's whole-scene cloud percentage. No I/O.
pub fn metadata_score(scene: &Scene) -> f64 {
    scene.cloud as f64
}

/// Score a cloud-band window under `rule`.
pub fn pixel_score(window: &BandWindow, rule: CloudRule) -> Result<f64, CloudError> {
    let mut valid = 0u64;
    let mut sum = 0u64;
    for (&raw, &has_data) in window.data.iter().zip(&window.valid) {
        sum += raw as u64;
        if has_data && !rule.is_cloud(raw) {
            valid += 1;
        }
    }
    if sum == 0 {
        return Err(CloudError::DegenerateScore);
    }
    Ok(valid as f64 / sum as f64 * 100.0)
}

/// Cloud-band readers for one cell task, keyed by scene id.
///
/// Readers open lazily on a scene's first pixel-mode score and are all
/// released when the context drops. A context belongs to exactly one
/// task and is never shared.
pub struct CloudBandContext<'a, B: RasterBackend> {
    backend: &'a B,
    readers: HashMap<String, B::Reader>,
}

impl<'a, B: RasterBackend> CloudBandContext<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self {
            backend,
            readers: HashMap::new(),
        }
    }

    /// Number of cloud bands currently held open.
    pub fn open_count(&self) -> usize {
        self.readers.len()
    }

    /// Score `scene` over `bounds`.
    pub fn score(&mut self, scene: &Scene, bounds: &Bounds) -> Result<f64, CloudError> {
        let Some(cloud_path) = scene.cloud_path.as_deref() else {
            return Ok(metadata_score(scene));
        };

        // Unsupported sensors fail before anything is fetched
        let rule = CloudRule::for_sensor(&scene.sensor)?;

        let reader = match self.readers.entry(scene.scene_id.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let address = RasterAddress::new(&scene.bucket, cloud_path);
                entry.insert(self.backend.open(&address)?)
            }
        };
        let window = reader.read_window(bounds, 1)?;
        pixel_score(&window, rule)
    }
}

/// The winning candidate of a selection.
#[derive(Debug, Clone, Copy)]
pub struct Ranked<'a> {
    pub scene: &'a Scene,
    /// Position in the candidate list.
    pub index: usize,
    pub score: f64,
}

/// Pick the best candidate using `score`. See the module docs for the policy.
///
/// Returns `None` when the list is empty or every candidate fails scoring.
pub fn select_scene<'a, F>(scenes: &'a [Scene], mut score: F) -> Option<Ranked<'a>>
where
    F: FnMut(&Scene) -> Result<f64, CloudError>,
{
    let mut best: Option<Ranked<'a>> = None;
    for (index, scene) in scenes.iter().enumerate() {
        let value = match score(scene) {
            Ok(value) => value,
            Err(e) => {
                debug!(scene = %scene.scene_id, error = %e, "candidate excluded");
                continue;
            }
        };
        debug!(scene = %scene.scene_id, score = value, "candidate scored");

        let ranked = Ranked {
            scene,
            index,
            score: value,
        };
        if value == 0.0 {
            return Some(ranked);
        }
        if best.is_none_or(|b| value < b.score) {
            best = Some(ranked);
        }
    }
    best
}
