// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! EdgeFirst Velodyne Library
//!
//! This library decodes the 1206-byte data datagrams of Velodyne HDL sensors
//! into calibrated 3-D point sweeps, one per sensor revolution.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐     ┌─────────────────┐
//! │  PacketSource   │ ──► │ SweepAccumulator │ ──► │  HistoryBuffer  │
//! │  (UDP/pcap/test)│     │  (wraparound)    │     │  (bounded FIFO) │
//! └─────────────────┘     └──────────────────┘     └─────────────────┘
//!                                  │
//!                 ┌────────────────┴────────────────┐
//!                 ▼                                 ▼
//!         ┌───────────────┐                ┌─────────────────┐
//!         │  RawBundling  │                │ PointSynthesis  │
//!         │  (RawSweep)   │                │  (PointSweep)   │
//!         └───────────────┘                └─────────────────┘
//!                                            │            │
//!                                  CalibrationTable   AngleLookup
//! ```
//!
//! A revolution ends whenever a firing block's azimuth is lower than the
//! previous block's. The same rule drives both pipelines:
//!
//! 1. [`decoder::PacketDecoder`] decodes points as datagrams arrive
//! 2. [`bundler::PacketBundler`] only groups raw bytes per revolution, and
//!    [`bundle_decoder::BundleDecoder`] decodes those bundles later
//!
//! Calibration and angle tables are shared read-only through [`std::sync::Arc`]
//! so several pipelines can use the same tables.
//!
//! # Modules
//!
//! - [`lidar`]: Error type, constants and the [`LidarDriver`] trait
//! - [`angles`]: Azimuth cosine/sine lookup
//! - [`calibration`]: Per-laser corrections and `db.xml` loading
//! - [`packet`]: Zero-copy datagram parsing
//! - [`point`]: Calibrated points and point synthesis
//! - [`sweep`]: Boundary detection and accumulation strategies
//! - [`history`]: Bounded sweep history
//! - [`decoder`], [`bundler`], [`bundle_decoder`]: Pipelines
//! - [`packet_source`]: Datagram source abstraction
//! - `pcap_source`: Capture replay and recording (feature `pcap`)
//!
//! # Example
//!
//! ```ignore
//! use edgefirst_velodyne::decoder::PacketDecoder;
//!
//! let mut decoder = PacketDecoder::new();
//! loop {
//!     let len = socket.recv(&mut buf)?;
//!     if decoder.decode_packet(&buf[..len])?.sweeps_closed > 0 {
//!         let sweep = decoder.take_latest().unwrap();
//!         for p in sweep.iter() {
//!             // p.x, p.y, p.z, p.intensity, p.laser_id, ...
//!         }
//!     }
//! }
//! ```

pub mod angles;
pub mod bundle_decoder;
pub mod bundler;
pub mod calibration;
pub mod decoder;
pub mod history;
pub mod lidar;
pub mod packet;
pub mod packet_source;
#[cfg(feature = "pcap")]
pub mod pcap_source;
pub mod point;
pub mod sweep;

// Re-exports for convenience
pub use angles::AngleLookup;
pub use bundle_decoder::BundleDecoder;
pub use bundler::PacketBundler;
pub use calibration::{CalibrationSource, CalibrationTable, LaserCorrection};
pub use decoder::PacketDecoder;
pub use history::HistoryBuffer;
pub use lidar::{Error, LidarDriver, PacketOutcome};
pub use packet_source::{MemorySource, PacketSource, SourceStats, UdpSource};
#[cfg(feature = "pcap")]
pub use pcap_source::{PcapSource, PcapWriter};
pub use point::{Point, PointSweep};
pub use sweep::RawSweep;
