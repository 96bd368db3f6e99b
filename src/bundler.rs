// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Raw datagram bundling.
//!
//! [`PacketBundler`] groups datagrams into one [`RawSweep`] per revolution
//! without decoding any points. Only the azimuth of each firing block is
//! read, which keeps the ingestion path cheap; bundles can be decoded later
//! with [`crate::bundle_decoder::BundleDecoder`].

use crate::{
    history::HistoryBuffer,
    lidar::{DEFAULT_MAX_SWEEPS, Error, LidarDriver, PacketOutcome},
    sweep::{RawBundling, RawSweep, SweepAccumulator},
};

/// Datagram-at-a-time raw bundler.
#[derive(Debug)]
pub struct PacketBundler {
    accumulator: SweepAccumulator<RawBundling>,
    history: HistoryBuffer<RawSweep>,
}

impl PacketBundler {
    pub fn new() -> Self {
        Self {
            accumulator: SweepAccumulator::new(RawBundling),
            history: HistoryBuffer::new(DEFAULT_MAX_SWEEPS),
        }
    }

    /// Add one datagram to the open bundle.
    ///
    /// A datagram is never split: if the revolution wraps inside it, the
    /// previous bundle is closed and the whole datagram starts the next one.
    pub fn bundle_packet(&mut self, data: &[u8]) -> Result<PacketOutcome, Error> {
        self.accumulator.process(data, &mut self.history)
    }

    /// Change the history capacity; zero is ignored.
    pub fn set_max_bundles(&mut self, max_bundles: usize) {
        self.history.set_capacity(max_bundles);
    }

    /// Completed bundles, oldest first, without removing them.
    pub fn bundles(&self) -> &HistoryBuffer<RawSweep> {
        &self.history
    }

    /// Newest completed bundle; older bundles are discarded.
    pub fn take_latest(&mut self) -> Option<RawSweep> {
        self.history.take_latest()
    }

    /// All completed bundles, oldest first.
    pub fn drain_bundles(&mut self) -> Vec<RawSweep> {
        self.history.drain_all()
    }

    pub fn clear_bundles(&mut self) {
        self.history.clear();
    }

    /// Bundle currently being filled.
    pub fn open_bundle(&self) -> &RawSweep {
        self.accumulator.open_sweep()
    }
}

impl Default for PacketBundler {
    fn default() -> Self {
        Self::new()
    }
}

impl LidarDriver for PacketBundler {
    type Sweep = RawSweep;

    fn process_packet(&mut self, data: &[u8]) -> Result<PacketOutcome, Error> {
        self.bundle_packet(data)
    }

    fn history(&self) -> &HistoryBuffer<RawSweep> {
        &self.history
    }

    fn history_mut(&mut self) -> &mut HistoryBuffer<RawSweep> {
        &mut self.history
    }
}
