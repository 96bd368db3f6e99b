// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Per-laser calibration corrections.
//!
//! A [`CalibrationTable`] holds one [`LaserCorrection`] for each of the 64
//! laser slots. Tables come either from the built-in HDL-32 factory values or
//! from a calibration database XML file (`db.xml`) as shipped with the sensor.
//!
//! # Calibration file structure
//!
//! ```text
//! boost_serialization
//! └── DB
//!     └── points_
//!         └── item (one per laser)
//!             └── px
//!                 ├── id_
//!                 ├── rotCorrection_          degrees
//!                 ├── vertCorrection_         degrees
//!                 ├── distCorrection_         centimeters
//!                 ├── vertOffsetCorrection_   centimeters
//!                 └── horizOffsetCorrection_  centimeters
//! ```

use crate::{
    angles::to_radians,
    lidar::{Error, LASERS_PER_FIRING, MAX_NUM_LASERS},
};
use log::{debug, warn};
use std::path::{Path, PathBuf};

/// Vertical angle in degrees of each HDL-32 laser, indexed by laser id.
const HDL32_VERTICAL_CORRECTIONS: [f64; LASERS_PER_FIRING] = [
    -30.67, -9.3299999, -29.33, -8.0, -28.0, -6.6700001, -26.67, -5.3299999, -25.33, -4.0, -24.0,
    -2.6700001, -22.67, -1.33, -21.33, 0.0, -20.0, 1.33, -18.67, 2.6700001, -17.33, 4.0, -16.0,
    5.3299999, -14.67, 6.6700001, -13.33, 8.0, -12.0, 9.3299999, -10.67, 10.67,
];

/// Calibration file values for distances and offsets are in centimeters.
const CENTIMETERS_PER_METER: f64 = 100.0;

/// Calibration parameters of a single laser.
///
/// The trigonometric fields are derived from the raw values at construction
/// and the raw values cannot be changed afterwards, so the derived values are
/// never stale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LaserCorrection {
    azimuth_correction: f64,
    vertical_correction: f64,
    distance_correction: f64,
    vertical_offset_correction: f64,
    horizontal_offset_correction: f64,
    sin_vert_correction: f64,
    cos_vert_correction: f64,
    sin_vert_offset_correction: f64,
    cos_vert_offset_correction: f64,
}

impl LaserCorrection {
    /// Create a correction from raw values.
    ///
    /// # Arguments
    ///
    /// * `azimuth_correction` - Rotational correction in degrees
    /// * `vertical_correction` - Vertical angle in degrees
    /// * `distance_correction` - Distance offset in meters
    /// * `vertical_offset_correction` - Vertical mounting offset in meters
    /// * `horizontal_offset_correction` - Horizontal mounting offset in meters
    pub fn new(
        azimuth_correction: f64,
        vertical_correction: f64,
        distance_correction: f64,
        vertical_offset_correction: f64,
        horizontal_offset_correction: f64,
    ) -> Self {
        let vertical = to_radians(vertical_correction);
        let sin_vert_correction = vertical.sin();
        let cos_vert_correction = vertical.cos();

        Self {
            azimuth_correction,
            vertical_correction,
            distance_correction,
            vertical_offset_correction,
            horizontal_offset_correction,
            sin_vert_correction,
            cos_vert_correction,
            sin_vert_offset_correction: vertical_offset_correction * sin_vert_correction,
            cos_vert_offset_correction: vertical_offset_correction * cos_vert_correction,
        }
    }

    /// Correction for a laser slot that is not populated (vertical angle 0°).
    pub fn neutral() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0, 0.0)
    }

    pub fn azimuth_correction(&self) -> f64 {
        self.azimuth_correction
    }

    pub fn vertical_correction(&self) -> f64 {
        self.vertical_correction
    }

    pub fn distance_correction(&self) -> f64 {
        self.distance_correction
    }

    pub fn vertical_offset_correction(&self) -> f64 {
        self.vertical_offset_correction
    }

    pub fn horizontal_offset_correction(&self) -> f64 {
        self.horizontal_offset_correction
    }

    pub fn sin_vert_correction(&self) -> f64 {
        self.sin_vert_correction
    }

    pub fn cos_vert_correction(&self) -> f64 {
        self.cos_vert_correction
    }

    /// Vertical offset scaled by the sine of the vertical angle.
    pub fn sin_vert_offset_correction(&self) -> f64 {
        self.sin_vert_offset_correction
    }

    /// Vertical offset scaled by the cosine of the vertical angle.
    pub fn cos_vert_offset_correction(&self) -> f64 {
        self.cos_vert_offset_correction
    }
}

impl Default for LaserCorrection {
    fn default() -> Self {
        Self::neutral()
    }
}

/// Where the active calibration came from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum CalibrationSource {
    /// Built-in HDL-32 factory values
    #[default]
    Factory,
    /// Calibration database XML file
    File(PathBuf),
}

impl CalibrationSource {
    /// Map an optional path to a source; `None` or an empty path selects the
    /// factory values.
    pub fn from_path(path: Option<&Path>) -> Self {
        match path {
            Some(p) if !p.as_os_str().is_empty() => CalibrationSource::File(p.to_path_buf()),
            _ => CalibrationSource::Factory,
        }
    }
}

/// Calibration for all 64 laser slots.
#[derive(Clone, Debug, PartialEq)]
pub struct CalibrationTable {
    corrections: [LaserCorrection; MAX_NUM_LASERS],
    source: CalibrationSource,
}

impl CalibrationTable {
    /// Create a table holding the HDL-32 factory values.
    ///
    /// Lasers 0-31 get the factory vertical angles with no other corrections;
    /// lasers 32-63 are neutral.
    pub fn factory() -> Self {
        let mut corrections = [LaserCorrection::neutral(); MAX_NUM_LASERS];
        for (correction, &vertical) in corrections.iter_mut().zip(&HDL32_VERTICAL_CORRECTIONS) {
            *correction = LaserCorrection::new(0.0, vertical, 0.0, 0.0, 0.0);
        }

        Self {
            corrections,
            source: CalibrationSource::Factory,
        }
    }

    /// Load a table from a calibration database XML file.
    ///
    /// Lasers not described by the file keep their factory values.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let corrections = parse_corrections(&text)?;
        Ok(Self {
            corrections,
            source: CalibrationSource::File(path.to_path_buf()),
        })
    }

    /// Load a table from any [`CalibrationSource`].
    pub fn from_source(source: &CalibrationSource) -> Result<Self, Error> {
        match source {
            CalibrationSource::Factory => Ok(Self::factory()),
            CalibrationSource::File(path) => Self::from_file(path),
        }
    }

    /// Install the factory values.
    ///
    /// Returns `false` if the factory values were already active, in which
    /// case nothing changes.
    pub fn load_default(&mut self) -> bool {
        if self.source == CalibrationSource::Factory {
            return false;
        }
        *self = Self::factory();
        debug!("installed factory calibration");
        true
    }

    /// Replace the table with the contents of a calibration file.
    ///
    /// # Returns
    /// - `Ok(true)` if the calibration changed; accumulated sweeps built with
    ///   the previous calibration should be discarded
    /// - `Ok(false)` if `path` is already the active source (no-op)
    /// - `Err` if the file cannot be read or parsed; the table is untouched
    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<bool, Error> {
        let path = path.as_ref();
        if matches!(&self.source, CalibrationSource::File(active) if active == path) {
            return Ok(false);
        }

        match Self::from_file(path) {
            Ok(table) => {
                *self = table;
                debug!("loaded calibration from {}", path.display());
                Ok(true)
            }
            Err(err) => {
                warn!("failed to load calibration {}: {}", path.display(), err);
                Err(err)
            }
        }
    }

    /// Switch to `source`, dispatching to [`Self::load_default`] or
    /// [`Self::load_from_file`].
    pub fn load(&mut self, source: &CalibrationSource) -> Result<bool, Error> {
        match source {
            CalibrationSource::Factory => Ok(self.load_default()),
            CalibrationSource::File(path) => self.load_from_file(path),
        }
    }

    /// Correction for `laser_id`.
    ///
    /// # Panics
    ///
    /// Panics if `laser_id >= 64`.
    #[inline]
    pub fn correction(&self, laser_id: u8) -> &LaserCorrection {
        &self.corrections[laser_id as usize]
    }

    /// All 64 corrections, indexed by laser id.
    pub fn corrections(&self) -> &[LaserCorrection] {
        &self.corrections
    }

    /// Source of the active calibration.
    pub fn source(&self) -> &CalibrationSource {
        &self.source
    }
}

impl Default for CalibrationTable {
    fn default() -> Self {
        Self::factory()
    }
}

/// Parse the `points_` section of a calibration database.
fn parse_corrections(text: &str) -> Result<[LaserCorrection; MAX_NUM_LASERS], Error> {
    // db.xml files carry a <!DOCTYPE boost_serialization> declaration
    let options = roxmltree::ParsingOptions {
        allow_dtd: true,
        ..Default::default()
    };
    let doc = roxmltree::Document::parse_with_options(text, options)?;

    let root = doc.root_element();
    if !root.has_tag_name("boost_serialization") {
        return Err(Error::Calibration(format!(
            "unexpected root element <{}>",
            root.tag_name().name()
        )));
    }

    let points = child(root, "DB")
        .and_then(|db| child(db, "points_"))
        .ok_or_else(|| Error::Calibration("missing DB.points_".to_string()))?;

    let mut corrections = CalibrationTable::factory().corrections;
    let mut n_records = 0;

    for px in points
        .children()
        .filter(|n| n.has_tag_name("item"))
        .flat_map(|item| item.children().filter(|n| n.has_tag_name("px")))
    {
        let Some(id) = field(px, "id_") else {
            continue;
        };
        let id: usize = id
            .parse()
            .map_err(|_| Error::Calibration(format!("invalid laser id '{}'", id)))?;
        if id >= MAX_NUM_LASERS {
            return Err(Error::Calibration(format!("laser id {} out of range", id)));
        }

        corrections[id] = LaserCorrection::new(
            number(px, "rotCorrection_")?,
            number(px, "vertCorrection_")?,
            number(px, "distCorrection_")? / CENTIMETERS_PER_METER,
            number(px, "vertOffsetCorrection_")? / CENTIMETERS_PER_METER,
            number(px, "horizOffsetCorrection_")? / CENTIMETERS_PER_METER,
        );
        n_records += 1;
    }

    if n_records == 0 {
        return Err(Error::Calibration("no laser records found".to_string()));
    }

    Ok(corrections)
}

fn child<'a, 'i>(node: roxmltree::Node<'a, 'i>, name: &str) -> Option<roxmltree::Node<'a, 'i>> {
    node.children().find(|n| n.has_tag_name(name))
}

fn field<'a>(node: roxmltree::Node<'a, '_>, name: &str) -> Option<&'a str> {
    child(node, name).map(|n| n.text().unwrap_or("").trim())
}

/// Numeric field; missing fields read as zero.
fn number(node: roxmltree::Node<'_, '_>, name: &str) -> Result<f64, Error> {
    match field(node, name) {
        None => Ok(0.0),
        Some(text) => text
            .parse()
            .map_err(|_| Error::Calibration(format!("invalid {} value '{}'", name, text))),
    }
}
