// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Calibrated Cartesian points and point sweeps.

use crate::{
    angles::{AngleLookup, to_radians},
    calibration::LaserCorrection,
    packet::LaserReturn,
};

/// Meters per raw distance unit.
pub const DISTANCE_RESOLUTION: f64 = 0.002;

/// A calibrated point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub intensity: u8,
    pub laser_id: u8,
    /// Raw azimuth in hundredths of a degree
    pub azimuth: u16,
    /// Corrected slant distance in meters
    pub distance: f64,
    /// Hardware timestamp, microseconds since the top of the hour
    pub timestamp: u32,
}

impl Point {
    /// Compute the Cartesian point for a laser return.
    ///
    /// Lasers without an azimuth correction take cos/sin from `angles`; a
    /// non-zero correction shifts the effective angle, so it is computed
    /// directly.
    pub fn from_return(
        laser_return: &LaserReturn,
        azimuth: u16,
        timestamp: u32,
        correction: &LaserCorrection,
        angles: &AngleLookup,
    ) -> Self {
        let (cos_az, sin_az) = if correction.azimuth_correction() == 0.0 {
            angles.cos_sin(azimuth)
        } else {
            let rad = to_radians(azimuth as f64 / 100.0 - correction.azimuth_correction());
            (rad.cos(), rad.sin())
        };

        let distance =
            laser_return.distance as f64 * DISTANCE_RESOLUTION + correction.distance_correction();
        let xy_distance = distance * correction.cos_vert_correction()
            - correction.sin_vert_offset_correction();
        let horizontal_offset = correction.horizontal_offset_correction();

        Self {
            x: xy_distance * sin_az - horizontal_offset * cos_az,
            y: xy_distance * cos_az + horizontal_offset * sin_az,
            z: distance * correction.sin_vert_correction() + correction.cos_vert_offset_correction(),
            intensity: laser_return.intensity,
            laser_id: laser_return.laser_id,
            azimuth,
            distance,
            timestamp,
        }
    }
}

/// Decoded points of one revolution, in arrival order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PointSweep {
    points: Vec<Point>,
}

impl PointSweep {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty sweep with room for `capacity` points.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn push(&mut self, point: Point) {
        self.points.push(point);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Point> {
        self.points.iter()
    }

    pub fn into_points(self) -> Vec<Point> {
        self.points
    }
}

impl<'a> IntoIterator for &'a PointSweep {
    type Item = &'a Point;
    type IntoIter = std::slice::Iter<'a, Point>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}
