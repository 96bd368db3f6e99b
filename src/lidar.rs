// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Common types shared by the Velodyne pipelines.
//!
//! This module provides the crate-wide [`Error`] type, the per-datagram
//! [`PacketOutcome`] report, and the [`LidarDriver`] trait implemented by the
//! streaming pipelines ([`crate::decoder::PacketDecoder`] and
//! [`crate::bundler::PacketBundler`]).

use crate::history::HistoryBuffer;
use std::fmt;

/// Size of a single HDL data datagram in bytes.
pub const DATAGRAM_SIZE: usize = 1206;

/// Number of firing blocks per datagram.
pub const FIRINGS_PER_PACKET: usize = 12;

/// Number of laser returns per firing block.
pub const LASERS_PER_FIRING: usize = 32;

/// Number of laser slots in a calibration table (upper and lower block).
pub const MAX_NUM_LASERS: usize = 64;

/// Number of distinct azimuth values (hundredths of a degree).
pub const NUM_ROT_ANGLES: usize = 36_000;

/// UDP port on which the sensor publishes data datagrams.
pub const DATA_PORT: u16 = 2368;

/// Default number of closed sweeps retained in history.
pub const DEFAULT_MAX_SWEEPS: usize = 10;

/// Common error type for datagram parsing, calibration and I/O.
#[derive(Debug)]
pub enum Error {
    /// I/O error (socket, file operations)
    Io(std::io::Error),
    /// Datagram is not exactly [`DATAGRAM_SIZE`] bytes
    InvalidLength(usize),
    /// Bundle is not a whole number of datagrams
    InvalidBundle(usize),
    /// Firing block carries an unrecognized block marker
    UnknownBlockId(u16),
    /// Firing block azimuth outside [0, 36000)
    AzimuthOutOfRange(u16),
    /// Calibration file is well-formed XML but not a calibration database
    Calibration(String),
    /// Calibration file is not valid XML
    Xml(roxmltree::Error),
    /// Invalid capture data (pcap/pcapng parsing)
    InvalidPacket(String),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::InvalidLength(len) => write!(
                f,
                "invalid datagram length: {} bytes, expected {}",
                len, DATAGRAM_SIZE
            ),
            Error::InvalidBundle(len) => write!(
                f,
                "invalid bundle length: {} bytes is not a multiple of {}",
                len, DATAGRAM_SIZE
            ),
            Error::UnknownBlockId(id) => write!(f, "unknown block identifier: {:#06x}", id),
            Error::AzimuthOutOfRange(az) => write!(f, "azimuth out of range: {}", az),
            Error::Calibration(msg) => write!(f, "calibration error: {}", msg),
            Error::Xml(err) => write!(f, "calibration xml error: {}", err),
            Error::InvalidPacket(msg) => write!(f, "invalid packet: {}", msg),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<roxmltree::Error> for Error {
    fn from(err: roxmltree::Error) -> Self {
        Error::Xml(err)
    }
}

/// Summary of what a single datagram did to a pipeline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PacketOutcome {
    /// Sweeps closed and moved into history by this datagram
    pub sweeps_closed: usize,
    /// Firing blocks skipped because of a format error
    pub blocks_skipped: usize,
}

impl PacketOutcome {
    /// Fold another outcome into this one.
    pub fn merge(&mut self, other: PacketOutcome) {
        self.sweeps_closed += other.sweeps_closed;
        self.blocks_skipped += other.blocks_skipped;
    }
}

/// Trait for streaming pipelines fed one datagram at a time.
///
/// Implementations detect revolution boundaries and move completed sweeps
/// into their [`HistoryBuffer`], which the caller drains.
pub trait LidarDriver {
    /// Completed sweep type held in history
    type Sweep;

    /// Process a single datagram.
    ///
    /// # Returns
    /// - `Ok(outcome)` describing closed sweeps and skipped blocks
    /// - `Err(Error::InvalidLength)` if the datagram is not 1206 bytes; the
    ///   pipeline state is unchanged
    fn process_packet(&mut self, data: &[u8]) -> Result<PacketOutcome, Error>;

    /// Completed sweeps, oldest first.
    fn history(&self) -> &HistoryBuffer<Self::Sweep>;

    /// Mutable access to completed sweeps for draining reads.
    fn history_mut(&mut self) -> &mut HistoryBuffer<Self::Sweep>;
}
