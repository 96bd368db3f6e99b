// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Streaming datagram decoder.
//!
//! [`PacketDecoder`] turns datagrams into calibrated [`PointSweep`]s one
//! datagram at a time and keeps the most recent sweeps in a bounded history.
//!
//! # Example
//!
//! ```ignore
//! use edgefirst_velodyne::{LidarDriver, decoder::PacketDecoder};
//!
//! let mut decoder = PacketDecoder::new();
//! loop {
//!     let len = socket.recv(&mut buf)?;
//!     if decoder.decode_packet(&buf[..len])?.sweeps_closed > 0 {
//!         if let Some(sweep) = decoder.take_latest() {
//!             println!("{} points", sweep.len());
//!         }
//!     }
//! }
//! ```

use crate::{
    angles::AngleLookup,
    calibration::{CalibrationSource, CalibrationTable},
    history::HistoryBuffer,
    lidar::{DEFAULT_MAX_SWEEPS, Error, LidarDriver, PacketOutcome},
    point::PointSweep,
    sweep::{PointSynthesis, SweepAccumulator},
};
use log::debug;
use std::sync::Arc;

/// Datagram-at-a-time point decoder.
#[derive(Debug)]
pub struct PacketDecoder {
    accumulator: SweepAccumulator<PointSynthesis>,
    history: HistoryBuffer<PointSweep>,
}

impl PacketDecoder {
    /// Create a decoder with factory calibration and the default history
    /// capacity.
    pub fn new() -> Self {
        Self::with_tables(
            Arc::new(CalibrationTable::factory()),
            Arc::new(AngleLookup::new()),
        )
    }

    /// Create a decoder sharing existing calibration and angle tables.
    pub fn with_tables(calibration: Arc<CalibrationTable>, angles: Arc<AngleLookup>) -> Self {
        Self {
            accumulator: SweepAccumulator::new(PointSynthesis::new(calibration, angles)),
            history: HistoryBuffer::new(DEFAULT_MAX_SWEEPS),
        }
    }

    /// Decode one datagram.
    pub fn decode_packet(&mut self, data: &[u8]) -> Result<PacketOutcome, Error> {
        self.accumulator.process(data, &mut self.history)
    }

    /// Change the history capacity; zero is ignored.
    pub fn set_max_sweeps(&mut self, max_sweeps: usize) {
        self.history.set_capacity(max_sweeps);
    }

    /// Switch calibration.
    ///
    /// # Returns
    /// - `Ok(true)` if the calibration changed; history, the open sweep and
    ///   boundary state are discarded
    /// - `Ok(false)` if `source` is already active
    /// - `Err` if loading failed; calibration and sweeps are untouched
    pub fn set_calibration(&mut self, source: &CalibrationSource) -> Result<bool, Error> {
        let changed = self
            .accumulator
            .strategy_mut()
            .calibration_mut()
            .load(source)?;
        if changed {
            debug!("calibration changed to {:?}, discarding sweeps", source);
            self.accumulator.reset();
            self.history.clear();
        }
        Ok(changed)
    }

    /// Active calibration.
    pub fn calibration(&self) -> &CalibrationTable {
        self.accumulator.strategy().calibration()
    }

    /// Completed sweeps, oldest first, without removing them.
    pub fn sweeps(&self) -> &HistoryBuffer<PointSweep> {
        &self.history
    }

    /// Newest completed sweep; older sweeps are discarded.
    pub fn take_latest(&mut self) -> Option<PointSweep> {
        self.history.take_latest()
    }

    /// All completed sweeps, oldest first.
    pub fn drain_sweeps(&mut self) -> Vec<PointSweep> {
        self.history.drain_all()
    }

    pub fn clear_sweeps(&mut self) {
        self.history.clear();
    }

    /// Sweep currently being filled.
    pub fn open_sweep(&self) -> &PointSweep {
        self.accumulator.open_sweep()
    }
}

impl Default for PacketDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl LidarDriver for PacketDecoder {
    type Sweep = PointSweep;

    fn process_packet(&mut self, data: &[u8]) -> Result<PacketOutcome, Error> {
        self.decode_packet(data)
    }

    fn history(&self) -> &HistoryBuffer<PointSweep> {
        &self.history
    }

    fn history_mut(&mut self) -> &mut HistoryBuffer<PointSweep> {
        &mut self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::DatagramBuilder;
    use std::io::Write as _;

    const CALIBRATION: &str = r#"<?xml version="1.0" ?>
<!DOCTYPE boost_serialization>
<boost_serialization>
<DB>
<points_>
<item><px><id_>0</id_><rotCorrection_>0</rotCorrection_><vertCorrection_>0</vertCorrection_>
<distCorrection_>100</distCorrection_><vertOffsetCorrection_>0</vertOffsetCorrection_>
<horizOffsetCorrection_>0</horizOffsetCorrection_></px></item>
</points_>
</DB>
</boost_serialization>"#;

    fn sweep_pair() -> (Vec<u8>, Vec<u8>) {
        let first = DatagramBuilder::new()
            .azimuths(std::array::from_fn(|i| 30000 + i as u16 * 100))
            .fill_returns(1000, 1)
            .build();
        let second = DatagramBuilder::new()
            .azimuths(std::array::from_fn(|i| i as u16 * 100))
            .fill_returns(1000, 2)
            .build();
        (first, second)
    }

    #[test]
    fn test_decode_and_take_latest() {
        let mut decoder = PacketDecoder::new();
        let (first, second) = sweep_pair();

        decoder.decode_packet(&first).unwrap();
        assert!(decoder.take_latest().is_none());
        assert_eq!(decoder.open_sweep().len(), 384);

        let outcome = decoder.decode_packet(&second).unwrap();
        assert_eq!(outcome.sweeps_closed, 1);
        assert_eq!(decoder.sweeps().len(), 1);

        let sweep = decoder.take_latest().unwrap();
        assert_eq!(sweep.len(), 384);
        assert!(decoder.sweeps().is_empty());
    }

    #[test]
    fn test_max_sweeps() {
        let mut decoder = PacketDecoder::new();
        decoder.set_max_sweeps(2);
        let (first, second) = sweep_pair();

        for _ in 0..5 {
            decoder.decode_packet(&first).unwrap();
            decoder.decode_packet(&second).unwrap();
        }
        assert_eq!(decoder.sweeps().len(), 2);

        decoder.set_max_sweeps(0);
        assert_eq!(decoder.sweeps().capacity(), 2);

        decoder.set_max_sweeps(1);
        assert_eq!(decoder.drain_sweeps().len(), 1);
    }

    #[test]
    fn test_calibration_change_discards_sweeps() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CALIBRATION.as_bytes()).unwrap();
        let source = CalibrationSource::File(file.path().to_path_buf());

        let mut decoder = PacketDecoder::new();
        let (first, second) = sweep_pair();
        decoder.decode_packet(&first).unwrap();
        decoder.decode_packet(&second).unwrap();
        assert_eq!(decoder.sweeps().len(), 1);

        assert!(decoder.set_calibration(&source).unwrap());
        assert!(decoder.sweeps().is_empty());
        assert!(decoder.open_sweep().is_empty());
        assert_eq!(decoder.calibration().correction(0).distance_correction(), 1.0);

        // Same source again keeps accumulated data
        decoder.decode_packet(&first).unwrap();
        assert!(!decoder.set_calibration(&source).unwrap());
        assert_eq!(decoder.open_sweep().len(), 384);

        assert!(decoder.set_calibration(&CalibrationSource::Factory).unwrap());
        assert_eq!(decoder.calibration(), &CalibrationTable::factory());
    }

    #[test]
    fn test_failed_calibration_keeps_sweeps() {
        let mut decoder = PacketDecoder::new();
        let (first, second) = sweep_pair();
        decoder.decode_packet(&first).unwrap();
        decoder.decode_packet(&second).unwrap();

        let source = CalibrationSource::File("/nonexistent/db.xml".into());
        assert!(decoder.set_calibration(&source).is_err());
        assert_eq!(decoder.sweeps().len(), 1);
        assert_eq!(decoder.open_sweep().len(), 384);
        assert_eq!(decoder.calibration(), &CalibrationTable::factory());
    }

    #[test]
    fn test_shared_tables_are_not_mutated() {
        let calibration = Arc::new(CalibrationTable::factory());
        let angles = Arc::new(AngleLookup::new());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CALIBRATION.as_bytes()).unwrap();

        let mut a = PacketDecoder::with_tables(calibration.clone(), angles.clone());
        let b = PacketDecoder::with_tables(calibration.clone(), angles);

        a.set_calibration(&CalibrationSource::File(file.path().to_path_buf()))
            .unwrap();
        assert_eq!(a.calibration().correction(0).distance_correction(), 1.0);
        assert_eq!(b.calibration().correction(0).distance_correction(), 0.0);
        assert_eq!(calibration.correction(0).distance_correction(), 0.0);
    }
}
