// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Revolution boundary detection and sweep accumulation.
//!
//! A revolution ends when a firing block's azimuth is strictly less than the
//! previous block's azimuth. [`SweepAccumulator`] applies this rule once per
//! firing block and hands the block to a [`SweepStrategy`], which decides
//! what the open sweep accumulates:
//!
//! - [`RawBundling`]: whole datagram bytes ([`RawSweep`])
//! - [`PointSynthesis`]: calibrated points ([`PointSweep`])
//!
//! The wraparound rule is a heuristic; azimuth jitter near zero can produce a
//! false or missed split and is not smoothed.

use crate::{
    angles::AngleLookup,
    calibration::CalibrationTable,
    history::HistoryBuffer,
    lidar::{DATAGRAM_SIZE, Error, PacketOutcome},
    packet::{DataPacketSlice, FiringBlockSlice},
    point::{Point, PointSweep},
};
use log::{debug, trace, warn};
use std::sync::Arc;

/// What the open sweep accumulates.
pub trait SweepStrategy {
    type Sweep: Default;

    /// Called for every valid firing block, after boundary detection.
    fn accumulate_block(&self, sweep: &mut Self::Sweep, block: &FiringBlockSlice<'_>, timestamp: u32);

    /// Called once per datagram, after all of its blocks were scanned.
    fn accumulate_packet(&self, sweep: &mut Self::Sweep, packet: &DataPacketSlice<'_>);
}

/// Concatenated raw datagrams of one revolution.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawSweep {
    bytes: Vec<u8>,
}

impl RawSweep {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Number of datagrams in the sweep.
    pub fn packet_count(&self) -> usize {
        self.bytes.len() / DATAGRAM_SIZE
    }

    /// Iterate over the datagrams in arrival order.
    pub fn packets(&self) -> std::slice::Chunks<'_, u8> {
        self.bytes.chunks(DATAGRAM_SIZE)
    }
}

/// Accumulates raw datagram bytes without decoding.
#[derive(Clone, Copy, Debug, Default)]
pub struct RawBundling;

impl SweepStrategy for RawBundling {
    type Sweep = RawSweep;

    #[inline]
    fn accumulate_block(&self, _sweep: &mut RawSweep, _block: &FiringBlockSlice<'_>, _timestamp: u32) {}

    fn accumulate_packet(&self, sweep: &mut RawSweep, packet: &DataPacketSlice<'_>) {
        sweep.bytes.extend_from_slice(packet.as_bytes());
    }
}

/// Synthesizes calibrated points from every return with an echo.
///
/// Calibration and angle tables are shared read-only; several pipelines may
/// hold the same tables.
#[derive(Clone, Debug)]
pub struct PointSynthesis {
    calibration: Arc<CalibrationTable>,
    angles: Arc<AngleLookup>,
}

impl PointSynthesis {
    pub fn new(calibration: Arc<CalibrationTable>, angles: Arc<AngleLookup>) -> Self {
        Self {
            calibration,
            angles,
        }
    }

    pub fn calibration(&self) -> &Arc<CalibrationTable> {
        &self.calibration
    }

    /// Mutable access for calibration reloads.
    ///
    /// Copy-on-write: a table shared with other pipelines is cloned first, so
    /// they keep their calibration.
    pub fn calibration_mut(&mut self) -> &mut CalibrationTable {
        Arc::make_mut(&mut self.calibration)
    }

    pub fn angles(&self) -> &Arc<AngleLookup> {
        &self.angles
    }
}

impl Default for PointSynthesis {
    fn default() -> Self {
        Self::new(
            Arc::new(CalibrationTable::factory()),
            Arc::new(AngleLookup::new()),
        )
    }
}

impl SweepStrategy for PointSynthesis {
    type Sweep = PointSweep;

    fn accumulate_block(&self, sweep: &mut PointSweep, block: &FiringBlockSlice<'_>, timestamp: u32) {
        let azimuth = block.azimuth();
        for laser_return in block.returns().filter(|r| r.is_valid()) {
            sweep.push(Point::from_return(
                &laser_return,
                azimuth,
                timestamp,
                self.calibration.correction(laser_return.laser_id),
                &self.angles,
            ));
        }
    }

    #[inline]
    fn accumulate_packet(&self, _sweep: &mut PointSweep, _packet: &DataPacketSlice<'_>) {}
}

/// Detects revolution boundaries and fills the open sweep.
#[derive(Debug)]
pub struct SweepAccumulator<S: SweepStrategy> {
    strategy: S,
    last_azimuth: u16,
    open: S::Sweep,
}

impl<S: SweepStrategy> SweepAccumulator<S> {
    pub fn new(strategy: S) -> Self {
        Self {
            strategy,
            last_azimuth: 0,
            open: S::Sweep::default(),
        }
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    pub fn strategy_mut(&mut self) -> &mut S {
        &mut self.strategy
    }

    /// Azimuth of the most recently processed firing block.
    pub fn last_azimuth(&self) -> u16 {
        self.last_azimuth
    }

    /// The sweep currently being filled.
    pub fn open_sweep(&self) -> &S::Sweep {
        &self.open
    }

    /// Process one datagram, moving completed sweeps into `history`.
    ///
    /// Blocks with an unknown marker or an out-of-range azimuth are skipped
    /// and counted; they do not take part in boundary detection. A datagram
    /// of the wrong length is rejected before any state changes.
    pub fn process(
        &mut self,
        data: &[u8],
        history: &mut HistoryBuffer<S::Sweep>,
    ) -> Result<PacketOutcome, Error> {
        let packet = DataPacketSlice::from_slice(data)?;
        let timestamp = packet.timestamp();
        let mut outcome = PacketOutcome::default();

        for (index, block) in packet.blocks().enumerate() {
            let block = match block {
                Ok(block) => block,
                Err(err) => {
                    warn!("skipping firing block {}: {}", index, err);
                    outcome.blocks_skipped += 1;
                    continue;
                }
            };

            let azimuth = block.azimuth();
            if azimuth < self.last_azimuth {
                self.close_sweep(history);
                outcome.sweeps_closed += 1;
            }
            self.last_azimuth = azimuth;

            self.strategy
                .accumulate_block(&mut self.open, &block, timestamp);
        }

        self.strategy.accumulate_packet(&mut self.open, &packet);

        trace!(
            "datagram ts={} last_azimuth={} closed={}",
            timestamp, self.last_azimuth, outcome.sweeps_closed
        );
        Ok(outcome)
    }

    /// Move the open sweep into `history` and start a new one.
    ///
    /// A revolution without a single echo still closes an (empty) sweep.
    fn close_sweep(&mut self, history: &mut HistoryBuffer<S::Sweep>) {
        let sweep = std::mem::take(&mut self.open);
        if history.push(sweep).is_some() {
            debug!("history full, evicted oldest sweep");
        }
    }

    /// Forget the open sweep and boundary state.
    pub fn reset(&mut self) {
        self.last_azimuth = 0;
        self.open = S::Sweep::default();
    }
}

impl<S: SweepStrategy + Default> Default for SweepAccumulator<S> {
    fn default() -> Self {
        Self::new(S::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::DatagramBuilder;

    fn increasing(start: u16) -> [u16; 12] {
        std::array::from_fn(|i| start + i as u16 * 20)
    }

    #[test]
    fn test_no_split_on_increasing_azimuth() {
        let mut acc = SweepAccumulator::new(PointSynthesis::default());
        let mut history = HistoryBuffer::new(10);

        let data = DatagramBuilder::new()
            .azimuths(increasing(100))
            .fill_returns(1000, 10)
            .laser_return(4, 7, 0, 0)
            .build();

        let outcome = acc.process(&data, &mut history).unwrap();
        assert_eq!(outcome, PacketOutcome::default());
        assert!(history.is_empty());
        assert_eq!(acc.open_sweep().len(), 12 * 32 - 1);
        assert_eq!(acc.last_azimuth(), 320);
    }

    #[test]
    fn test_split_on_wrap() {
        let mut acc = SweepAccumulator::new(PointSynthesis::default());
        let mut history = HistoryBuffer::new(10);

        let first = DatagramBuilder::new()
            .azimuths(increasing(35000))
            .fill_returns(1000, 10)
            .build();
        let second = DatagramBuilder::new()
            .azimuths(increasing(50))
            .fill_returns(2000, 20)
            .build();

        acc.process(&first, &mut history).unwrap();
        let outcome = acc.process(&second, &mut history).unwrap();

        assert_eq!(outcome.sweeps_closed, 1);
        assert_eq!(history.len(), 1);
        let closed = history.latest().unwrap();
        assert_eq!(closed.len(), 12 * 32);
        assert!(closed.iter().all(|p| p.intensity == 10));
        assert!(acc.open_sweep().iter().all(|p| p.intensity == 20));
        assert_eq!(acc.open_sweep().len(), 12 * 32);
    }

    #[test]
    fn test_split_mid_datagram() {
        let mut acc = SweepAccumulator::new(PointSynthesis::default());
        let mut history = HistoryBuffer::new(10);

        let mut azimuths = increasing(35800);
        for (i, az) in azimuths.iter_mut().enumerate().skip(5) {
            *az = (i as u16 - 5) * 20;
        }
        let data = DatagramBuilder::new()
            .azimuths(azimuths)
            .fill_returns(1000, 10)
            .build();

        let outcome = acc.process(&data, &mut history).unwrap();
        assert_eq!(outcome.sweeps_closed, 1);
        assert_eq!(history.latest().unwrap().len(), 5 * 32);
        assert_eq!(acc.open_sweep().len(), 7 * 32);
    }

    #[test]
    fn test_raw_bundle_keeps_datagram_whole() {
        let mut acc = SweepAccumulator::new(RawBundling);
        let mut history = HistoryBuffer::new(10);

        let first = DatagramBuilder::new().azimuths(increasing(35000)).build();
        let mut azimuths = increasing(35600);
        for (i, az) in azimuths.iter_mut().enumerate().skip(6) {
            *az = (i as u16 - 6) * 20;
        }
        let wrapping = DatagramBuilder::new().azimuths(azimuths).build();

        acc.process(&first, &mut history).unwrap();
        let outcome = acc.process(&wrapping, &mut history).unwrap();

        // The wrapping datagram goes entirely into the new bundle
        assert_eq!(outcome.sweeps_closed, 1);
        assert_eq!(history.latest().unwrap().as_bytes(), first.as_slice());
        assert_eq!(acc.open_sweep().as_bytes(), wrapping.as_slice());
        assert_eq!(acc.open_sweep().packet_count(), 1);
    }

    #[test]
    fn test_invalid_length_leaves_state() {
        let mut acc = SweepAccumulator::new(PointSynthesis::default());
        let mut history = HistoryBuffer::new(10);

        let data = DatagramBuilder::new()
            .azimuths(increasing(1000))
            .fill_returns(500, 1)
            .build();
        acc.process(&data, &mut history).unwrap();
        let before = acc.open_sweep().clone();

        // Would wrap if it were parsed
        let mut short = DatagramBuilder::new().fill_returns(500, 1).build();
        short.truncate(1205);
        assert!(matches!(
            acc.process(&short, &mut history),
            Err(Error::InvalidLength(1205))
        ));
        assert_eq!(acc.last_azimuth(), 1220);
        assert_eq!(acc.open_sweep(), &before);
        assert!(history.is_empty());
    }

    #[test]
    fn test_bad_block_skipped() {
        let mut acc = SweepAccumulator::new(PointSynthesis::default());
        let mut history = HistoryBuffer::new(10);

        // Block 3 has a bad marker and a low azimuth; it must not split
        let data = DatagramBuilder::new()
            .azimuths(increasing(1000))
            .azimuth(3, 0)
            .block_marker(3, 0xbeef)
            .fill_returns(500, 1)
            .build();

        let outcome = acc.process(&data, &mut history).unwrap();
        assert_eq!(outcome.blocks_skipped, 1);
        assert_eq!(outcome.sweeps_closed, 0);
        assert_eq!(acc.open_sweep().len(), 11 * 32);
    }

    #[test]
    fn test_wrap_over_empty_sweep_pushes_empty() {
        let mut acc = SweepAccumulator::new(PointSynthesis::default());
        let mut history = HistoryBuffer::new(10);

        // Middle revolution has no echoes at all
        let packets = [
            DatagramBuilder::new()
                .azimuths(increasing(30000))
                .fill_returns(800, 1)
                .build(),
            DatagramBuilder::new().azimuths(increasing(100)).build(),
            DatagramBuilder::new()
                .azimuths(increasing(50))
                .fill_returns(800, 3)
                .build(),
        ];

        let closed: Vec<usize> = packets
            .iter()
            .map(|p| acc.process(p, &mut history).unwrap().sweeps_closed)
            .collect();
        assert_eq!(closed, [0, 1, 1]);
        assert_eq!(history.len(), 2);
        assert_eq!(history.iter().map(|s| s.len()).collect::<Vec<_>>(), [384, 0]);
        assert_eq!(acc.open_sweep().len(), 384);
    }

    #[test]
    fn test_raw_wrap_before_first_append() {
        let mut acc = SweepAccumulator::new(RawBundling);
        let mut history = HistoryBuffer::new(10);

        // The first datagram ever wraps before anything was bundled
        let mut azimuths = increasing(35000);
        azimuths[6] = 10;
        let data = DatagramBuilder::new().azimuths(azimuths).build();

        let outcome = acc.process(&data, &mut history).unwrap();
        assert_eq!(outcome.sweeps_closed, 1);
        assert!(history.latest().unwrap().is_empty());
        assert_eq!(acc.open_sweep().packet_count(), 1);
    }

    #[test]
    fn test_reset() {
        let mut acc = SweepAccumulator::new(RawBundling);
        let mut history = HistoryBuffer::new(10);
        let data = DatagramBuilder::new().azimuths(increasing(500)).build();
        acc.process(&data, &mut history).unwrap();

        acc.reset();
        assert_eq!(acc.last_azimuth(), 0);
        assert!(acc.open_sweep().is_empty());
    }
}
