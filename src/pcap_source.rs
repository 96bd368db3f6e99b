// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! PCAP capture replay and recording.
//!
//! [`PcapSource`] is a [`PacketSource`] that reads UDP payloads from
//! PCAP/PCAPNG files, enabling offline replay and integration tests without
//! a sensor. [`PcapWriter`] records datagrams into a legacy PCAP file, each
//! wrapped in Ethernet/IPv4/UDP headers so standard tools can open it.
//!
//! # Example
//!
//! ```ignore
//! use edgefirst_velodyne::PcapSource;
//! use edgefirst_velodyne::packet_source::PacketSource;
//!
//! // Load capture, keeping only the sensor data port
//! let mut source = PcapSource::from_file("hdl32.pcap", Some(2368))?;
//!
//! let mut buf = [0u8; 1500];
//! while source.has_more() {
//!     let len = source.recv(&mut buf).await?;
//!     decoder.decode_packet(&buf[..len])?;
//! }
//! ```

use crate::{
    lidar::{DATA_PORT, Error},
    packet_source::{PacketSource, SourceStats, exhausted},
};
use pcap_parser::{ToVec, traits::PcapReaderIterator};
use std::{
    fs::File,
    future::Future,
    io::{BufWriter, Write},
    path::Path,
    pin::Pin,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// PCAP file source for testing and offline replay.
///
/// Loads the entire capture into memory and provides UDP payloads via the
/// [`PacketSource`] trait. Supports both legacy PCAP and PCAPNG formats.
pub struct PcapSource {
    /// Pre-extracted UDP payloads
    packets: Vec<Vec<u8>>,
    /// Current packet index
    index: usize,
    stats: SourceStats,
}

impl PcapSource {
    /// Load a capture from disk, optionally filtering by port.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to PCAP or PCAPNG file
    /// * `port` - Optional port filter (matches source OR destination)
    pub fn from_file<P: AsRef<Path>>(path: P, port: Option<u16>) -> Result<Self, Error> {
        let data = std::fs::read(path.as_ref()).map_err(Error::Io)?;
        Self::from_bytes(&data, port)
    }

    /// Load a capture from bytes, optionally filtering by port.
    pub fn from_bytes(data: &[u8], port: Option<u16>) -> Result<Self, Error> {
        let packets = Self::extract_packets(data, port)?;
        Ok(Self {
            packets,
            index: 0,
            stats: SourceStats::default(),
        })
    }

    /// Extract UDP payloads from capture data.
    fn extract_packets(data: &[u8], port: Option<u16>) -> Result<Vec<Vec<u8>>, Error> {
        let mut packets = Vec::new();

        // PCAPNG starts with the Section Header Block magic
        if data.len() >= 4 && data[0..4] == [0x0a, 0x0d, 0x0d, 0x0a] {
            Self::extract_pcapng(data, port, &mut packets)?;
        } else {
            Self::extract_legacy_pcap(data, port, &mut packets)?;
        }

        Ok(packets)
    }

    /// Extract packets from legacy PCAP format.
    fn extract_legacy_pcap(
        data: &[u8],
        port: Option<u16>,
        packets: &mut Vec<Vec<u8>>,
    ) -> Result<(), Error> {
        use pcap_parser::*;

        // Buffer size must cover the whole capture to avoid Incomplete errors
        let mut reader = LegacyPcapReader::new(data.len().max(65536), data)
            .map_err(|e| Error::InvalidPacket(format!("Failed to create PCAP reader: {:?}", e)))?;

        loop {
            match reader.next() {
                Ok((offset, block)) => {
                    if let PcapBlockOwned::Legacy(packet) = block {
                        packets.extend(Self::extract_udp_payload(packet.data, port));
                    }
                    reader.consume(offset);
                }
                Err(PcapError::Eof) => break,
                Err(PcapError::Incomplete(_)) => break,
                Err(e) => {
                    return Err(Error::InvalidPacket(format!("PCAP parse error: {:?}", e)));
                }
            }
        }

        Ok(())
    }

    /// Extract packets from PCAPNG format.
    fn extract_pcapng(
        data: &[u8],
        port: Option<u16>,
        packets: &mut Vec<Vec<u8>>,
    ) -> Result<(), Error> {
        use pcap_parser::*;

        let mut reader = PcapNGReader::new(data.len().max(65536), data).map_err(|e| {
            Error::InvalidPacket(format!("Failed to create PCAPNG reader: {:?}", e))
        })?;

        loop {
            match reader.next() {
                Ok((offset, block)) => {
                    match block {
                        PcapBlockOwned::NG(Block::EnhancedPacket(epb)) => {
                            packets.extend(Self::extract_udp_payload(epb.data, port));
                        }
                        PcapBlockOwned::NG(Block::SimplePacket(spb)) => {
                            packets.extend(Self::extract_udp_payload(spb.data, port));
                        }
                        _ => {}
                    }
                    reader.consume(offset);
                }
                Err(PcapError::Eof) => break,
                Err(PcapError::Incomplete(_)) => break,
                Err(e) => {
                    return Err(Error::InvalidPacket(format!("PCAPNG parse error: {:?}", e)));
                }
            }
        }

        Ok(())
    }

    /// Extract the UDP payload of an Ethernet frame.
    fn extract_udp_payload(data: &[u8], port: Option<u16>) -> Option<Vec<u8>> {
        use etherparse::SlicedPacket;

        let packet = SlicedPacket::from_ethernet(data).ok()?;

        let udp = match packet.transport {
            Some(etherparse::TransportSlice::Udp(udp)) => udp,
            _ => return None,
        };

        if let Some(filter_port) = port {
            if udp.source_port() != filter_port && udp.destination_port() != filter_port {
                return None;
            }
        }

        let payload = udp.payload();
        if payload.is_empty() {
            return None;
        }

        Some(payload.to_vec())
    }

    /// Reset source to beginning for replay.
    pub fn reset(&mut self) {
        self.index = 0;
        self.stats = SourceStats::default();
    }

    /// Get the total number of packets.
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    /// Check if the source contains no packets.
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Get the current packet index.
    pub fn current_index(&self) -> usize {
        self.index
    }

    /// Get remaining packet count.
    pub fn remaining(&self) -> usize {
        self.packets.len().saturating_sub(self.index)
    }
}

impl PacketSource for PcapSource {
    fn recv<'a>(
        &'a mut self,
        buf: &'a mut [u8],
    ) -> Pin<Box<dyn Future<Output = Result<usize, Error>> + Send + 'a>> {
        Box::pin(async move {
            let packet = self.packets.get(self.index).ok_or_else(exhausted)?;
            let len = packet.len().min(buf.len());
            buf[..len].copy_from_slice(&packet[..len]);
            self.index += 1;
            self.stats.record(len);
            Ok(len)
        })
    }

    fn has_more(&self) -> bool {
        self.index < self.packets.len()
    }

    fn stats(&self) -> SourceStats {
        self.stats
    }
}

/// Snap length written to the global header; covers any Ethernet frame.
const SNAPLEN: u32 = 65535;

fn serialize_error<E: std::fmt::Debug>(err: E) -> Error {
    Error::InvalidPacket(format!("failed to serialize PCAP record: {:?}", err))
}

/// Legacy PCAP global header (v2.4, microsecond timestamps, Ethernet).
fn global_header() -> Result<Vec<u8>, Error> {
    let header = pcap_parser::PcapHeader {
        magic_number: 0xa1b2_c3d4,
        version_major: 2,
        version_minor: 4,
        thiszone: 0,
        sigfigs: 0,
        snaplen: SNAPLEN,
        network: pcap_parser::Linktype::ETHERNET,
    };
    header.to_vec_raw().map_err(serialize_error)
}

/// Records datagrams into a legacy PCAP stream.
///
/// Each datagram is framed as UDP from the sensor's default address
/// (192.168.1.201) to the broadcast address on the data port.
pub struct PcapWriter<W: Write> {
    writer: W,
    port: u16,
}

impl PcapWriter<BufWriter<File>> {
    /// Create (or truncate) a capture file.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let file = File::create(path.as_ref())?;
        Self::new(BufWriter::new(file))
    }
}

impl<W: Write> PcapWriter<W> {
    /// Wrap a writer and emit the PCAP global header.
    pub fn new(mut writer: W) -> Result<Self, Error> {
        writer.write_all(&global_header()?)?;
        Ok(Self {
            writer,
            port: DATA_PORT,
        })
    }

    /// Use `port` as the UDP source and destination port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Record a datagram stamped with the current system time.
    pub fn write_packet(&mut self, payload: &[u8]) -> Result<(), Error> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        self.write_packet_at(payload, now)
    }

    /// Record a datagram with an explicit capture time since the Unix epoch.
    pub fn write_packet_at(&mut self, payload: &[u8], time: Duration) -> Result<(), Error> {
        let builder = etherparse::PacketBuilder::ethernet2(
            [0x60, 0x76, 0x88, 0x00, 0x00, 0x00],
            [0xff, 0xff, 0xff, 0xff, 0xff, 0xff],
        )
        .ipv4([192, 168, 1, 201], [255, 255, 255, 255], 64)
        .udp(self.port, self.port);

        let mut frame = Vec::with_capacity(builder.size(payload.len()));
        builder
            .write(&mut frame, payload)
            .map_err(|e| Error::InvalidPacket(format!("failed to frame datagram: {:?}", e)))?;

        let record = pcap_parser::LegacyPcapBlock {
            ts_sec: time.as_secs() as u32,
            ts_usec: time.subsec_micros(),
            caplen: frame.len() as u32,
            origlen: frame.len() as u32,
            data: &frame,
        };
        self.writer
            .write_all(&record.to_vec_raw().map_err(serialize_error)?)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), Error> {
        Ok(self.writer.flush()?)
    }

    /// Flush and return the inner writer.
    pub fn into_inner(mut self) -> Result<W, Error> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lidar::DATAGRAM_SIZE, packet::DatagramBuilder};

    /// A capture holding one data datagram and one position datagram.
    fn data_and_position_capture() -> Vec<u8> {
        let data = DatagramBuilder::new().timestamp(7).build();
        let mut writer = PcapWriter::new(Vec::new()).unwrap();
        writer.write_packet_at(&data, Duration::ZERO).unwrap();

        // Position datagrams arrive on their own port
        let mut writer = writer.with_port(8308);
        writer
            .write_packet_at(&[0x55; 512], Duration::from_millis(1))
            .unwrap();
        writer.into_inner().unwrap()
    }

    #[test]
    fn test_global_header_layout() {
        let header = global_header().unwrap();
        assert_eq!(header.len(), 24);
        assert_eq!(&header[0..4], &[0xd4, 0xc3, 0xb2, 0xa1]);
        assert_eq!(&header[20..24], &1u32.to_le_bytes());
    }

    #[test]
    fn test_extract_udp_payload_port_filter() {
        let builder = etherparse::PacketBuilder::ethernet2([0; 6], [0xff; 6])
            .ipv4([192, 168, 1, 201], [192, 168, 1, 2], 64)
            .udp(DATA_PORT, DATA_PORT);
        let mut frame = Vec::new();
        builder.write(&mut frame, b"data").unwrap();

        assert_eq!(
            PcapSource::extract_udp_payload(&frame, Some(DATA_PORT)).unwrap(),
            b"data"
        );
        assert!(PcapSource::extract_udp_payload(&frame, Some(8308)).is_none());
        assert!(PcapSource::extract_udp_payload(&frame, None).is_some());
        assert!(PcapSource::extract_udp_payload(&frame[..20], None).is_none());
    }

    #[tokio::test]
    async fn test_pcap_source_port_filter() {
        let capture = data_and_position_capture();

        let source = PcapSource::from_bytes(&capture, Some(DATA_PORT)).unwrap();
        assert_eq!(source.len(), 1);

        let mut source = PcapSource::from_bytes(&capture, None).unwrap();
        assert_eq!(source.len(), 2);

        // Unfiltered, the position datagram is delivered and counted
        let mut buf = [0u8; 1500];
        while source.has_more() {
            source.recv(&mut buf).await.unwrap();
        }
        assert_eq!(source.stats().wrong_size, 1);
        assert_eq!(source.stats().bytes, (DATAGRAM_SIZE + 512) as u64);
    }

    #[test]
    fn test_pcap_source_empty() {
        let source = PcapSource::from_bytes(&global_header().unwrap(), None).unwrap();
        assert!(source.is_empty());
        assert!(!source.has_more());
    }

    #[tokio::test]
    async fn test_writer_output_is_readable() {
        let first = DatagramBuilder::new().timestamp(1).build();
        let second = DatagramBuilder::new().timestamp(2).build();

        let mut writer = PcapWriter::new(Vec::new()).unwrap();
        writer
            .write_packet_at(&first, Duration::from_micros(1_500_000))
            .unwrap();
        writer.write_packet(&second).unwrap();
        let capture = writer.into_inner().unwrap();

        let mut source = PcapSource::from_bytes(&capture, Some(DATA_PORT)).unwrap();
        assert_eq!(source.len(), 2);

        let mut buf = [0u8; 1500];
        let len = source.recv(&mut buf).await.unwrap();
        assert_eq!(len, DATAGRAM_SIZE);
        assert_eq!(&buf[..len], first.as_slice());

        let len = source.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], second.as_slice());
        assert_eq!(source.remaining(), 0);
        assert_eq!(source.stats().datagrams, 2);
        assert_eq!(source.stats().wrong_size, 0);

        source.reset();
        assert_eq!(source.current_index(), 0);
        assert!(source.has_more());
    }

    #[tokio::test]
    async fn test_pcap_source_exhausted() {
        let mut source = PcapSource::from_bytes(&global_header().unwrap(), None).unwrap();
        let mut buf = [0u8; 100];
        assert!(source.recv(&mut buf).await.is_err());
    }
}
