// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Calibrated point cloud buffer.
//!
//! [`PointCloud`] stores the points of one frame in a structure-of-arrays
//! layout. The buffer keeps its allocation between frames so a consumer that
//! refills it with [`PointCloud::fill`] stops allocating once it has seen the
//! largest frame.
//!
//! ```text
//! ┌─────────────────────────────────┐
//! │ PointCloud (frame_id, timestamp)│
//! │   x:         [f32]              │
//! │   y:         [f32]              │
//! │   z:         [f32]              │
//! │   intensity: [u8]               │
//! │   range:     [f32]              │
//! └─────────────────────────────────┘
//! ```
//!
//! Coordinates are in metres, converted from the centimetres produced by
//! [`Calibration::to_point`].

use crate::{
    calibration::{CalibratedPoint, Calibration},
    lidar::RawFrame,
};

const CM_TO_M: f64 = 0.01;

/// Point cloud of one frame in structure-of-arrays layout.
#[derive(Debug, Clone, Default)]
pub struct PointCloud {
    /// Id of the frame the points were computed from
    pub frame_id: u32,
    /// Host timestamp of the frame in nanoseconds
    pub timestamp: u64,
    x: Vec<f32>,
    y: Vec<f32>,
    z: Vec<f32>,
    intensity: Vec<u8>,
    range: Vec<f32>,
}

impl PointCloud {
    /// Create an empty cloud with room for `capacity` points.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            frame_id: 0,
            timestamp: 0,
            x: Vec::with_capacity(capacity),
            y: Vec::with_capacity(capacity),
            z: Vec::with_capacity(capacity),
            intensity: Vec::with_capacity(capacity),
            range: Vec::with_capacity(capacity),
        }
    }

    /// Convert `frame` into a new cloud.
    pub fn from_frame(calibration: &Calibration, frame: &RawFrame) -> Self {
        let mut cloud = Self::default();
        cloud.fill(calibration, frame);
        cloud
    }

    /// Replace the contents with the calibrated points of `frame`.
    pub fn fill(&mut self, calibration: &Calibration, frame: &RawFrame) {
        self.clear();
        self.frame_id = frame.frame_id;
        self.timestamp = frame.timestamp;
        for point in calibration.frame_points(frame) {
            self.push(&point);
        }
    }

    /// Append one calibrated point.
    #[inline]
    pub fn push(&mut self, point: &CalibratedPoint) {
        let x = (point.x * CM_TO_M) as f32;
        let y = (point.y * CM_TO_M) as f32;
        let z = (point.z * CM_TO_M) as f32;
        self.x.push(x);
        self.y.push(y);
        self.z.push(z);
        self.intensity.push(point.intensity);
        self.range.push((x * x + y * y + z * z).sqrt());
    }

    /// Remove all points, keeping the allocation.
    pub fn clear(&mut self) {
        self.x.clear();
        self.y.clear();
        self.z.clear();
        self.intensity.clear();
        self.range.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.x.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Number of points the cloud holds without reallocating.
    pub fn capacity(&self) -> usize {
        self.x.capacity()
    }

    #[inline]
    pub fn x(&self) -> &[f32] {
        &self.x
    }

    #[inline]
    pub fn y(&self) -> &[f32] {
        &self.y
    }

    #[inline]
    pub fn z(&self) -> &[f32] {
        &self.z
    }

    #[inline]
    pub fn intensity(&self) -> &[u8] {
        &self.intensity
    }

    /// Distance of every point from the sensor origin, in metres.
    #[inline]
    pub fn range(&self) -> &[f32] {
        &self.range
    }

    /// Axis-aligned bounds as `(min, max)` corners, `None` when empty.
    pub fn bounds(&self) -> Option<([f32; 3], [f32; 3])> {
        if self.is_empty() {
            return None;
        }
        let mut min = [f32::INFINITY; 3];
        let mut max = [f32::NEG_INFINITY; 3];
        for i in 0..self.len() {
            for (axis, value) in [self.x[i], self.y[i], self.z[i]].into_iter().enumerate() {
                min[axis] = min[axis].min(value);
                max[axis] = max[axis].max(value);
            }
        }
        Some((min, max))
    }
}
