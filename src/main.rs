// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

mod args;

use args::{Args, Command, InputArgs};
use clap::Parser;
use edgefirst_velodyne::{
    BundleDecoder, CalibrationSource, Error, LidarDriver, PacketBundler, PacketDecoder,
    PacketSource, PcapSource, PcapWriter,
    lidar::DATAGRAM_SIZE,
    packet::DataPacketSlice,
    packet_source::{RECV_BUFFER_SIZE, UdpSource},
};
use log::{debug, info, warn};
use std::time::Duration;
use tokio::time::Instant;

/// Hardware timestamps wrap at the top of every hour.
const MICROS_PER_HOUR: u64 = 3_600_000_000;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    env_logger::Builder::new()
        .filter_level(args.rust_log)
        .parse_default_env()
        .init();

    match args.command {
        Command::Decode {
            input,
            calibration,
            max_sweeps,
        } => {
            let mut decoder = PacketDecoder::new();
            decoder.set_max_sweeps(max_sweeps);
            decoder.set_calibration(&CalibrationSource::from_path(calibration.as_deref()))?;

            let mut source = open_source(&input).await?;
            run(&mut decoder, source.as_mut(), |sweep| {
                info!("sweep: {} points", sweep.len());
            })
            .await?;
        }
        Command::Bundle {
            input,
            max_bundles,
            decode,
            calibration,
        } => {
            let mut bundler = PacketBundler::new();
            bundler.set_max_bundles(max_bundles);

            let mut bundle_decoder = if decode {
                let mut d = BundleDecoder::new();
                d.set_calibration(&CalibrationSource::from_path(calibration.as_deref()))?;
                Some(d)
            } else {
                None
            };

            let mut source = open_source(&input).await?;
            run(&mut bundler, source.as_mut(), |bundle| {
                info!(
                    "bundle: {} bytes, {} datagrams",
                    bundle.len(),
                    bundle.packet_count()
                );
                if let Some(d) = bundle_decoder.as_mut() {
                    match d.decode_bundle(bundle.as_bytes()) {
                        Ok(_) => {
                            for sweep in d.drain_sweeps() {
                                info!("decoded bundle sweep: {} points", sweep.len());
                            }
                        }
                        Err(e) => warn!("could not decode bundle: {}", e),
                    }
                }
            })
            .await?;
        }
        Command::Record {
            bind,
            output,
            count,
        } => record(&bind, &output, count).await?,
        Command::Replay {
            pcap,
            destination,
            port,
        } => replay(&pcap, &destination, port).await?,
    }

    Ok(())
}

/// Open the pcap file if one was given, otherwise bind the UDP socket.
async fn open_source(input: &InputArgs) -> Result<Box<dyn PacketSource>, Error> {
    match &input.pcap {
        Some(path) => {
            let source = PcapSource::from_file(path, Some(input.port))?;
            info!("loaded {} datagrams from {}", source.len(), path.display());
            Ok(Box::new(source))
        }
        None => {
            let source = UdpSource::bind(&input.bind).await?;
            info!("listening on {}", source.local_addr()?);
            Ok(Box::new(source))
        }
    }
}

/// Feed datagrams to `driver` until the source is exhausted or Ctrl-C,
/// handing every completed sweep to `on_sweep`.
async fn run<D, F>(driver: &mut D, source: &mut dyn PacketSource, mut on_sweep: F) -> Result<(), Error>
where
    D: LidarDriver,
    F: FnMut(D::Sweep),
{
    let mut buf = [0u8; RECV_BUFFER_SIZE];
    let mut n_packets = 0usize;

    while source.has_more() {
        let len = tokio::select! {
            res = source.recv(&mut buf) => res?,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        };
        n_packets += 1;

        match driver.process_packet(&buf[..len]) {
            Ok(outcome) => {
                if outcome.blocks_skipped > 0 {
                    debug!("datagram {}: skipped {} blocks", n_packets, outcome.blocks_skipped);
                }
                if outcome.sweeps_closed > 0 {
                    driver.history_mut().drain_all().into_iter().for_each(&mut on_sweep);
                }
            }
            Err(e) => warn!("dropping datagram {}: {}", n_packets, e),
        }
    }

    let stats = source.stats();
    info!(
        "processed {} datagrams ({} bytes), {} of unexpected size",
        stats.datagrams, stats.bytes, stats.wrong_size
    );
    Ok(())
}

/// Record live datagrams into a pcap file.
async fn record(bind: &str, output: &std::path::Path, count: Option<usize>) -> Result<(), Error> {
    let mut source = UdpSource::bind(bind).await?;
    let mut writer = PcapWriter::create(output)?;
    info!("recording {} to {}", source.local_addr()?, output.display());

    let mut buf = [0u8; RECV_BUFFER_SIZE];
    let mut n_packets = 0usize;

    while count.is_none_or(|count| n_packets < count) {
        let len = tokio::select! {
            res = source.recv(&mut buf) => res?,
            _ = tokio::signal::ctrl_c() => break,
        };
        writer.write_packet(&buf[..len])?;
        n_packets += 1;

        if n_packets % 500 == 0 {
            info!("recorded {} datagrams", n_packets);
        }
    }

    writer.flush()?;
    info!("recorded {} datagrams total", n_packets);
    Ok(())
}

/// Send the datagrams of a capture to `destination`, reproducing the
/// original spacing from their hardware timestamps.
async fn replay(pcap: &std::path::Path, destination: &str, port: u16) -> Result<(), Error> {
    let mut source = PcapSource::from_file(pcap, Some(port))?;
    let socket = tokio::net::UdpSocket::bind("0.0.0.0:0").await?;
    info!(
        "replaying {} datagrams from {} to {}",
        source.len(),
        pcap.display(),
        destination
    );

    let mut buf = [0u8; RECV_BUFFER_SIZE];
    let mut deadline = Instant::now();
    let mut last_timestamp: Option<u32> = None;
    let mut n_sent = 0usize;

    while source.has_more() {
        let len = source.recv(&mut buf).await?;
        if len != DATAGRAM_SIZE {
            continue;
        }

        let timestamp = DataPacketSlice::from_slice(&buf[..len])?.timestamp();
        if let Some(last) = last_timestamp {
            deadline += timestamp_delta(last, timestamp);
            tokio::time::sleep_until(deadline).await;
        }
        last_timestamp = Some(timestamp);

        socket.send_to(&buf[..len], destination).await?;
        n_sent += 1;
        if n_sent % 500 == 0 {
            info!("total sent packets: {}", n_sent);
        }
    }

    info!("end of packet file, sent {} datagrams", n_sent);
    Ok(())
}

/// Time between two hardware timestamps, allowing for the hourly wrap.
fn timestamp_delta(previous: u32, current: u32) -> Duration {
    let (previous, current) = (previous as u64, current as u64);
    let micros = if current >= previous {
        current - previous
    } else {
        current + MICROS_PER_HOUR - previous
    };
    // A gap of more than a second is a discontinuity in the capture
    Duration::from_micros(micros.min(1_000_000))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_delta() {
        assert_eq!(timestamp_delta(1000, 1553), Duration::from_micros(553));
        assert_eq!(
            timestamp_delta(3_599_999_900, 100),
            Duration::from_micros(200)
        );
        assert_eq!(timestamp_delta(0, 5_000_000), Duration::from_secs(1));
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "velodyne",
            "decode",
            "--pcap",
            "hdl32.pcap",
            "--max-sweeps",
            "3",
        ])
        .unwrap();
        match args.command {
            Command::Decode {
                input, max_sweeps, ..
            } => {
                assert_eq!(input.pcap.unwrap().to_str(), Some("hdl32.pcap"));
                assert_eq!(input.port, 2368);
                assert_eq!(max_sweeps, 3);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
