// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Precomputed azimuth trigonometry.
//!
//! The sensor reports azimuth in hundredths of a degree, so a table of
//! 36,000 cosine/sine pairs covers every value it can emit. The table is
//! built once and is immutable afterwards, which makes it safe to share
//! between pipelines through an [`std::sync::Arc`].

use crate::lidar::NUM_ROT_ANGLES;

/// Convert degrees to radians.
#[inline]
pub(crate) fn to_radians(degrees: f64) -> f64 {
    degrees * std::f64::consts::PI / 180.0
}

/// Cosine and sine for every centidegree azimuth in [0, 36000).
#[derive(Debug, Clone)]
pub struct AngleLookup {
    cos: Vec<f64>,
    sin: Vec<f64>,
}

impl AngleLookup {
    /// Build the lookup tables.
    pub fn new() -> Self {
        let (cos, sin) = (0..NUM_ROT_ANGLES)
            .map(|i| {
                let rad = to_radians(i as f64 / 100.0);
                (rad.cos(), rad.sin())
            })
            .unzip();
        Self { cos, sin }
    }

    /// Returns `(cos, sin)` of the azimuth given in centidegrees.
    ///
    /// # Panics
    ///
    /// Panics if `azimuth >= 36000`. Datagram parsing rejects such blocks
    /// before they reach point synthesis.
    #[inline]
    pub fn cos_sin(&self, azimuth: u16) -> (f64, f64) {
        let i = azimuth as usize;
        (self.cos[i], self.sin[i])
    }

    /// Number of entries in each table.
    #[inline]
    pub fn len(&self) -> usize {
        self.cos.len()
    }

    /// Whether the tables hold no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cos.is_empty()
    }
}

impl Default for AngleLookup {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_table_size() {
        let lookup = AngleLookup::new();
        assert_eq!(lookup.len(), 36_000);
        assert!(!lookup.is_empty());
    }

    #[test]
    fn test_cardinal_angles() {
        let lookup = AngleLookup::new();

        let (c, s) = lookup.cos_sin(0);
        assert_eq!(c, 1.0);
        assert_eq!(s, 0.0);

        let (c, s) = lookup.cos_sin(9000);
        assert_abs_diff_eq!(c, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(s, 1.0, epsilon = 1e-12);

        let (c, s) = lookup.cos_sin(18000);
        assert_abs_diff_eq!(c, -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(s, 0.0, epsilon = 1e-12);

        let (c, s) = lookup.cos_sin(35999);
        assert_abs_diff_eq!(c, to_radians(359.99).cos(), epsilon = 1e-15);
        assert_abs_diff_eq!(s, to_radians(359.99).sin(), epsilon = 1e-15);
    }

    #[test]
    fn test_matches_direct_computation() {
        let lookup = AngleLookup::new();
        for az in [1u16, 1234, 4500, 27013] {
            let rad = to_radians(az as f64 / 100.0);
            assert_eq!(lookup.cos_sin(az), (rad.cos(), rad.sin()));
        }
    }
}
