// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Per-laser calibration and raw-to-Cartesian point conversion.
//!
//! A [`Calibration`] is built once from the per-laser correction coefficients
//! and is read-only afterwards. Construction derives everything the per-point
//! transform needs so that [`Calibration::to_point`] performs no trigonometry:
//!
//! - cosine/sine tables over the full 0..36000 rotation domain (0.01° steps)
//! - cached cosine/sine of every laser's rotational and vertical correction
//! - the scan order, lasers sorted by vertical angle from bottom to top
//!
//! # Coordinate system
//!
//! Right-handed with X to the right and Y to the front of the sensor, Z up.
//! Output distances are in centimetres (raw distance units of 2 mm times
//! [`DISTANCE_RESOLUTION`]).
//!
//! # Calibration file
//!
//! ```json
//! {
//!   "lasers": [
//!     { "rot_correction": -5.08, "vert_correction": -7.25,
//!       "dist_correction": 111.0, "vert_offset_correction": 20.3,
//!       "horiz_offset_correction": 2.6, "min_intensity": 10,
//!       "max_intensity": 240, "focal_distance": 1500.0, "focal_slope": 1.2 }
//!   ]
//! }
//! ```

use crate::{
    lidar::{Error, LASERS_PER_BLOCK, RawFrame},
    velodyne::ROTATION_STEPS,
};
use serde::Deserialize;
use std::{fs::File, io::BufReader, path::Path};
use tracing::debug;

/// Centimetres per raw distance unit
pub const DISTANCE_RESOLUTION: f64 = 0.2;

/// Largest laser table a data packet can address (two banks of 32)
pub const MAX_LASERS: usize = 2 * LASERS_PER_BLOCK;

/// Reference ranges of the two-point distance correction along X
const TWO_POINT_X: (f64, f64) = (240.0, 2504.0);

/// Reference ranges of the two-point distance correction along Y
const TWO_POINT_Y: (f64, f64) = (193.0, 2504.0);

/// Focal distance the intensity model is normalized to
const FOCAL_REFERENCE: f64 = 13100.0;

/// Raw distance at which the detector saturates
const SATURATION_DISTANCE: f64 = 65535.0;

fn default_max_intensity() -> i32 {
    255
}

/// Calibration coefficients of one laser.
///
/// Angles are in degrees, offsets in centimetres. The cached trigonometry is
/// filled in by [`Calibration::new`].
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct LaserCorrection {
    /// Azimuth offset of the laser
    #[serde(default)]
    pub rot_correction: f64,
    /// Elevation of the laser
    #[serde(default)]
    pub vert_correction: f64,
    #[serde(default)]
    pub dist_correction: f64,
    /// Near-range distance offset along X for the two-point correction
    #[serde(default)]
    pub dist_correction_x: f64,
    /// Near-range distance offset along Y for the two-point correction
    #[serde(default)]
    pub dist_correction_y: f64,
    #[serde(default)]
    pub vert_offset_correction: f64,
    #[serde(default)]
    pub horiz_offset_correction: f64,
    #[serde(default = "default_max_intensity")]
    pub max_intensity: i32,
    #[serde(default)]
    pub min_intensity: i32,
    #[serde(default)]
    pub focal_distance: f64,
    #[serde(default)]
    pub focal_slope: f64,
    #[serde(default)]
    pub two_pt_correction_available: bool,

    #[serde(skip)]
    pub cos_rot_correction: f64,
    #[serde(skip)]
    pub sin_rot_correction: f64,
    #[serde(skip)]
    pub cos_vert_correction: f64,
    #[serde(skip)]
    pub sin_vert_correction: f64,
}

impl LaserCorrection {
    fn cache_trig(&mut self) {
        let rot = self.rot_correction.to_radians();
        let vert = self.vert_correction.to_radians();
        self.cos_rot_correction = rot.cos();
        self.sin_rot_correction = rot.sin();
        self.cos_vert_correction = vert.cos();
        self.sin_vert_correction = vert.sin();
    }
}

/// Position of a laser in the scan order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScanOrderEntry {
    pub laser_id: usize,
    /// Vertical angle in degrees
    pub vert_correction: f64,
}

/// One calibrated measurement.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CalibratedPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub intensity: u8,
}

/// The on-disk calibration document.
#[derive(Debug, Deserialize)]
struct CalibrationFile {
    lasers: Vec<LaserCorrection>,
}

/// Immutable calibration tables for one sensor.
#[derive(Clone, Debug)]
pub struct Calibration {
    lasers: Vec<LaserCorrection>,
    cos_rot_table: Box<[f64]>,
    sin_rot_table: Box<[f64]>,
    /// Lasers sorted by vertical angle, bottom to top
    scan_order: Vec<ScanOrderEntry>,
}

impl Calibration {
    /// Build the calibration tables from per-laser coefficients indexed by
    /// laser id.
    pub fn new(mut lasers: Vec<LaserCorrection>) -> Result<Self, Error> {
        if lasers.is_empty() {
            return Err(Error::Config("calibration has no lasers".to_string()));
        }
        if lasers.len() > MAX_LASERS {
            return Err(Error::Config(format!(
                "calibration has {} lasers, at most {} supported",
                lasers.len(),
                MAX_LASERS
            )));
        }
        for (id, laser) in lasers.iter_mut().enumerate() {
            if laser.min_intensity > laser.max_intensity {
                return Err(Error::Config(format!(
                    "laser {}: min_intensity {} above max_intensity {}",
                    id, laser.min_intensity, laser.max_intensity
                )));
            }
            laser.cache_trig();
        }

        let (cos_rot_table, sin_rot_table): (Vec<f64>, Vec<f64>) = (0..ROTATION_STEPS)
            .map(|i| (f64::from(i) / 100.0).to_radians().sin_cos())
            .map(|(sin, cos)| (cos, sin))
            .unzip();

        // Equal vertical angles keep no particular order
        let mut scan_order: Vec<_> = lasers
            .iter()
            .enumerate()
            .map(|(laser_id, laser)| ScanOrderEntry {
                laser_id,
                vert_correction: laser.vert_correction,
            })
            .collect();
        scan_order.sort_unstable_by(|a, b| a.vert_correction.total_cmp(&b.vert_correction));

        debug!(lasers = lasers.len(), "calibration tables built");

        Ok(Self {
            lasers,
            cos_rot_table: cos_rot_table.into_boxed_slice(),
            sin_rot_table: sin_rot_table.into_boxed_slice(),
            scan_order,
        })
    }

    /// Load a JSON calibration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let file = File::open(path.as_ref())?;
        let doc: CalibrationFile = serde_json::from_reader(BufReader::new(file))?;
        Self::new(doc.lasers)
    }

    /// Parse a JSON calibration document.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let doc: CalibrationFile = serde_json::from_str(json)?;
        Self::new(doc.lasers)
    }

    /// Number of calibrated lasers.
    pub fn laser_count(&self) -> usize {
        self.lasers.len()
    }

    /// Coefficients of laser `laser_id`.
    pub fn laser(&self, laser_id: usize) -> Option<&LaserCorrection> {
        self.lasers.get(laser_id)
    }

    /// Lasers sorted by vertical angle, bottom to top.
    pub fn scan_order(&self) -> &[ScanOrderEntry] {
        &self.scan_order
    }

    /// Laser id of the `n`-th laser counted from the top, `n` starting at 1.
    pub fn rank_from_top(&self, n: usize) -> Option<usize> {
        if n == 0 {
            return None;
        }
        let index = self.scan_order.len().checked_sub(n)?;
        Some(self.scan_order[index].laser_id)
    }

    /// Vertical angle of the laser ranked `upper` minus that of the laser
    /// ranked `lower`, ranks counted from the bottom starting at 1.
    pub fn angular_gap(&self, upper: usize, lower: usize) -> Option<f64> {
        let a = self.scan_order.get(upper.checked_sub(1)?)?;
        let b = self.scan_order.get(lower.checked_sub(1)?)?;
        Some(a.vert_correction - b.vert_correction)
    }

    /// Convert one raw measurement into a calibrated point.
    ///
    /// Returns `None` for a zero distance (no return), an unknown laser id or
    /// a rotation outside 0..36000.
    pub fn to_point(
        &self,
        laser_id: usize,
        rotation: u16,
        distance: u16,
        intensity: u8,
    ) -> Option<CalibratedPoint> {
        if distance == 0 {
            return None;
        }
        let c = self.lasers.get(laser_id)?;
        let cos_table = *self.cos_rot_table.get(rotation as usize)?;
        let sin_table = self.sin_rot_table[rotation as usize];

        let range = f64::from(distance) * DISTANCE_RESOLUTION + c.dist_correction;

        // rotation - rot_correction by angle addition
        let cos_rot = cos_table * c.cos_rot_correction + sin_table * c.sin_rot_correction;
        let sin_rot = sin_table * c.cos_rot_correction - cos_table * c.sin_rot_correction;

        let cos_vert = c.cos_vert_correction;
        let sin_vert = c.sin_vert_correction;
        let horiz_offset = c.horiz_offset_correction;
        let vert_offset = c.vert_offset_correction;

        let planar = |d: f64| d * cos_vert - vert_offset * sin_vert;

        let xy = planar(range);
        let xx = (xy * sin_rot - horiz_offset * cos_rot).abs();
        let yy = (xy * cos_rot + horiz_offset * sin_rot).abs();

        let (corr_x, corr_y) = if c.two_pt_correction_available {
            (
                two_point(c.dist_correction, c.dist_correction_x, xx, TWO_POINT_X),
                two_point(c.dist_correction, c.dist_correction_y, yy, TWO_POINT_Y),
            )
        } else {
            (0.0, 0.0)
        };

        let range_x = range + corr_x;
        let x = planar(range_x) * sin_rot - horiz_offset * cos_rot;

        let range_y = range + corr_y;
        let y = planar(range_y) * cos_rot + horiz_offset * sin_rot;

        // Z follows the Y corrected range, as the sensor manual does
        let z = range_y * sin_vert + vert_offset * cos_vert;

        Some(CalibratedPoint {
            x,
            y,
            z,
            intensity: correct_intensity(c, distance, intensity),
        })
    }

    /// Lazily convert every return of `frame` into calibrated points.
    ///
    /// Blocks with an unknown bank flag and lasers missing from the table
    /// produce no points. The iterator borrows the frame and can be created
    /// again to restart.
    pub fn frame_points<'a>(
        &'a self,
        frame: &'a RawFrame,
    ) -> impl Iterator<Item = CalibratedPoint> + 'a {
        frame.blocks.iter().flat_map(move |block| {
            let first = block.bank().first_laser();
            block
                .returns
                .iter()
                .enumerate()
                .filter_map(move |(i, ret)| {
                    self.to_point(first? + i, block.rotation, ret.distance, ret.intensity)
                })
        })
    }
}

/// Extra distance offset along one axis, interpolated between the near
/// offset at `range.0` and the far offset `dist_correction` at `range.1`.
fn two_point(dist_correction: f64, near: f64, magnitude: f64, range: (f64, f64)) -> f64 {
    (dist_correction - near) * (magnitude - range.0) / (range.1 - range.0) + near - dist_correction
}

/// Focal-distance intensity correction clamped to the laser's limits.
///
/// The upper clamp is applied when the raw intensity exceeds the maximum,
/// not the corrected one.
fn correct_intensity(c: &LaserCorrection, distance: u16, raw: u8) -> u8 {
    let focal = 1.0 - c.focal_distance / FOCAL_REFERENCE;
    let focal_offset = 256.0 * focal * focal;
    let falloff = 1.0 - f64::from(distance) / SATURATION_DISTANCE;
    let response = (focal_offset - 256.0 * falloff * falloff).abs();

    let mut intensity = (f64::from(raw) + c.focal_slope * response) as i32;
    if intensity < c.min_intensity {
        intensity = c.min_intensity;
    }
    if i32::from(raw) > c.max_intensity {
        intensity = c.max_intensity;
    }

    intensity.clamp(0, u8::MAX as i32) as u8
}
