// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Deferred decoding of raw bundles.
//!
//! A bundle produced by [`crate::bundler::PacketBundler`] is a whole number
//! of concatenated datagrams. [`BundleDecoder`] decodes one bundle per call:
//! every datagram goes through the same boundary detection and point
//! synthesis as [`crate::decoder::PacketDecoder`].
//!
//! Boundary state and the open sweep carry over from one bundle to the next.
//! The bundler keeps the datagram holding a wrap whole and starts the next
//! bundle with it, so the revolution a bundle holds is closed while decoding
//! the following bundle. Decoding bundles in order yields exactly the sweeps
//! of decoding their datagrams one at a time.

use crate::{
    angles::AngleLookup,
    calibration::{CalibrationSource, CalibrationTable},
    history::HistoryBuffer,
    lidar::{DATAGRAM_SIZE, DEFAULT_MAX_SWEEPS, Error, PacketOutcome},
    point::PointSweep,
    sweep::{PointSynthesis, SweepAccumulator},
};
use log::{debug, trace};
use std::sync::Arc;

/// Decodes whole bundles into point sweeps.
#[derive(Debug)]
pub struct BundleDecoder {
    accumulator: SweepAccumulator<PointSynthesis>,
    history: HistoryBuffer<PointSweep>,
}

impl BundleDecoder {
    /// Create a decoder with factory calibration.
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

    /// Decode a bundle of concatenated datagrams.
    ///
    /// Fails with [`Error::InvalidBundle`] without touching the history if
    /// the bundle length is not a multiple of the datagram size.
    pub fn decode_bundle(&mut self, bundle: &[u8]) -> Result<PacketOutcome, Error> {
        if bundle.len() % DATAGRAM_SIZE != 0 {
            return Err(Error::InvalidBundle(bundle.len()));
        }

        let mut outcome = PacketOutcome::default();
        for packet in bundle.chunks_exact(DATAGRAM_SIZE) {
            outcome.merge(self.accumulator.process(packet, &mut self.history)?);
        }

        trace!(
            "decoded bundle of {} datagrams into {} sweeps",
            bundle.len() / DATAGRAM_SIZE,
            outcome.sweeps_closed
        );
        Ok(outcome)
    }

    /// Change the history capacity; zero is ignored.
    pub fn set_max_sweeps(&mut self, max_sweeps: usize) {
        self.history.set_capacity(max_sweeps);
    }

    /// Switch calibration; on change the open sweep, boundary state and
    /// history are discarded as in
    /// [`crate::decoder::PacketDecoder::set_calibration`].
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

    pub fn calibration(&self) -> &CalibrationTable {
        self.accumulator.strategy().calibration()
    }

    /// Decoded sweeps, oldest first, without removing them.
    pub fn sweeps(&self) -> &HistoryBuffer<PointSweep> {
        &self.history
    }

    /// Newest decoded sweep; older sweeps are discarded.
    pub fn take_latest(&mut self) -> Option<PointSweep> {
        self.history.take_latest()
    }

    /// All decoded sweeps, oldest first.
    pub fn drain_sweeps(&mut self) -> Vec<PointSweep> {
        self.history.drain_all()
    }

    pub fn clear_sweeps(&mut self) {
        self.history.clear();
    }

    /// Sweep still open after the last decoded bundle.
    pub fn open_sweep(&self) -> &PointSweep {
        self.accumulator.open_sweep()
    }
}

impl Default for BundleDecoder {
    fn default() -> Self {
        Self::new()
    }
}
