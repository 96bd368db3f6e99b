// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Where datagrams come from.
//!
//! The pipelines are fed one datagram at a time by a [`PacketSource`]:
//!
//! - [`UdpSource`]: the sensor's data port
//! - [`MemorySource`]: datagrams held in memory, such as the contents of a
//!   [`RawSweep`] bundle
//! - `PcapSource`: a capture file (feature `pcap`)
//!
//! Sources hand over every payload unchanged, including ones that are not
//! 1206 bytes long; the pipelines reject those. [`SourceStats`] counts them
//! so a misconfigured port (position datagrams on 8308, say) shows up in the
//! logs.

use crate::{
    lidar::{DATAGRAM_SIZE, Error},
    sweep::RawSweep,
};
use log::{info, trace, warn};
use std::{collections::VecDeque, future::Future, net::SocketAddr, pin::Pin};

/// Receive buffer size; larger than any Ethernet MTU payload.
pub const RECV_BUFFER_SIZE: usize = 1500;

/// Counters kept by every source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    /// Payloads delivered
    pub datagrams: u64,
    /// Bytes delivered
    pub bytes: u64,
    /// Payloads whose length is not [`DATAGRAM_SIZE`]
    pub wrong_size: u64,
}

impl SourceStats {
    /// Count one delivered payload; returns whether it had the wrong size.
    pub(crate) fn record(&mut self, len: usize) -> bool {
        self.datagrams += 1;
        self.bytes += len as u64;
        let wrong = len != DATAGRAM_SIZE;
        if wrong {
            self.wrong_size += 1;
        }
        wrong
    }
}

/// A stream of datagrams.
pub trait PacketSource: Send {
    /// Copy the next datagram into `buf` and return its length.
    ///
    /// Finite sources fail with an `UnexpectedEof` I/O error once exhausted.
    fn recv<'a>(
        &'a mut self,
        buf: &'a mut [u8],
    ) -> Pin<Box<dyn Future<Output = Result<usize, Error>> + Send + 'a>>;

    /// Whether another datagram can be received. Live sources never run dry.
    fn has_more(&self) -> bool;

    /// Counters for the datagrams delivered so far.
    fn stats(&self) -> SourceStats;
}

pub(crate) fn exhausted() -> Error {
    Error::Io(std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        "no more datagrams",
    ))
}

/// Live datagrams from the sensor's data port.
pub struct UdpSource {
    socket: tokio::net::UdpSocket,
    sensor: Option<SocketAddr>,
    stats: SourceStats,
}

impl UdpSource {
    pub fn new(socket: tokio::net::UdpSocket) -> Self {
        Self {
            socket,
            sensor: None,
            stats: SourceStats::default(),
        }
    }

    /// Bind the data port, e.g. `0.0.0.0:2368`.
    pub async fn bind(addr: &str) -> Result<Self, Error> {
        Ok(Self::new(tokio::net::UdpSocket::bind(addr).await?))
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.socket.local_addr()?)
    }

    /// Address of the last sender, once anything was received.
    pub fn sensor(&self) -> Option<SocketAddr> {
        self.sensor
    }
}

impl PacketSource for UdpSource {
    fn recv<'a>(
        &'a mut self,
        buf: &'a mut [u8],
    ) -> Pin<Box<dyn Future<Output = Result<usize, Error>> + Send + 'a>> {
        Box::pin(async move {
            let (len, peer) = self.socket.recv_from(buf).await?;
            if self.sensor != Some(peer) {
                info!("receiving datagrams from {}", peer);
                self.sensor = Some(peer);
            }

            if self.stats.record(len) {
                // Only the first one is worth a warning
                if self.stats.wrong_size == 1 {
                    warn!(
                        "{} sent a {} byte datagram, expected {}",
                        peer, len, DATAGRAM_SIZE
                    );
                } else {
                    trace!("{} byte datagram from {}", len, peer);
                }
            }
            Ok(len)
        })
    }

    fn has_more(&self) -> bool {
        true
    }

    fn stats(&self) -> SourceStats {
        self.stats
    }
}

/// Datagrams replayed from memory, in order.
#[derive(Debug, Default)]
pub struct MemorySource {
    datagrams: VecDeque<Vec<u8>>,
    stats: SourceStats,
}

impl MemorySource {
    pub fn new<I>(datagrams: I) -> Self
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        Self {
            datagrams: datagrams.into_iter().collect(),
            stats: SourceStats::default(),
        }
    }

    /// Replay the datagrams of a bundle one at a time.
    pub fn from_bundle(bundle: &RawSweep) -> Self {
        Self::new(bundle.packets().map(<[u8]>::to_vec))
    }

    /// Datagrams not yet received.
    pub fn remaining(&self) -> usize {
        self.datagrams.len()
    }
}

impl PacketSource for MemorySource {
    fn recv<'a>(
        &'a mut self,
        buf: &'a mut [u8],
    ) -> Pin<Box<dyn Future<Output = Result<usize, Error>> + Send + 'a>> {
        Box::pin(async move {
            let datagram = self.datagrams.pop_front().ok_or_else(exhausted)?;
            if datagram.len() > buf.len() {
                return Err(Error::InvalidLength(datagram.len()));
            }
            buf[..datagram.len()].copy_from_slice(&datagram);
            self.stats.record(datagram.len());
            Ok(datagram.len())
        })
    }

    fn has_more(&self) -> bool {
        !self.datagrams.is_empty()
    }

    fn stats(&self) -> SourceStats {
        self.stats
    }
}
