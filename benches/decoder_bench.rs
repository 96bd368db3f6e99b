// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Benchmarks for HDL datagram decoding and sweep bundling.
//!
//! Measures:
//! - Point synthesis with factory and corrected calibration
//! - Raw per-revolution bundling
//! - Deferred decoding of bundles
//!
//! Run with: cargo bench --bench decoder_bench

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use edgefirst_velodyne::{
    AngleLookup, BundleDecoder, CalibrationTable, PacketBundler, PacketDecoder,
    lidar::{FIRINGS_PER_PACKET, LASERS_PER_FIRING},
    packet::DatagramBuilder,
};
use std::{hint::black_box, io::Write as _};

/// Datagrams per HDL-32 revolution at 10 Hz.
const DATAGRAMS_PER_REVOLUTION: usize = 180;

/// Synthetic revolutions; every laser returns, so each datagram yields 384
/// points.
fn revolutions(count: usize) -> Vec<Vec<u8>> {
    let step = (36000 / (DATAGRAMS_PER_REVOLUTION * FIRINGS_PER_PACKET)) as u16;
    let mut packets = Vec::with_capacity(count * DATAGRAMS_PER_REVOLUTION);
    let mut timestamp = 0u32;

    for _ in 0..count {
        for n in 0..DATAGRAMS_PER_REVOLUTION {
            let start = (n * FIRINGS_PER_PACKET) as u16 * step;
            let mut builder = DatagramBuilder::new()
                .azimuths(std::array::from_fn(|i| start + i as u16 * step))
                .timestamp(timestamp);
            for block in 0..FIRINGS_PER_PACKET {
                for laser in 0..LASERS_PER_FIRING {
                    let distance = 2000 + ((n * 31 + block * 7 + laser * 13) % 20000) as u16;
                    builder = builder.laser_return(block, laser, distance, laser as u8);
                }
            }
            packets.push(builder.build());
            timestamp = timestamp.wrapping_add(553);
        }
    }

    packets
}

/// A calibration database with a non-zero azimuth correction on every laser,
/// which forces the direct trigonometry path.
fn corrected_calibration() -> CalibrationTable {
    let factory = CalibrationTable::factory();
    let items: String = factory
        .corrections()
        .iter()
        .enumerate()
        .map(|(id, c)| {
            format!(
                "<item><px><id_>{}</id_><rotCorrection_>{}</rotCorrection_>\
                 <vertCorrection_>{}</vertCorrection_><distCorrection_>120</distCorrection_>\
                 <vertOffsetCorrection_>20</vertOffsetCorrection_>\
                 <horizOffsetCorrection_>-2.6</horizOffsetCorrection_></px></item>",
                id,
                -4.0 + id as f64 * 0.125,
                c.vertical_correction()
            )
        })
        .collect();
    let xml = format!(
        "<?xml version=\"1.0\"?>\n<!DOCTYPE boost_serialization>\n\
         <boost_serialization><DB><points_>{}</points_></DB></boost_serialization>",
        items
    );

    let mut file = tempfile::NamedTempFile::new().expect("Failed to create calibration file");
    file.write_all(xml.as_bytes())
        .expect("Failed to write calibration file");
    CalibrationTable::from_file(file.path()).expect("Failed to load calibration")
}

fn bench_decoder(c: &mut Criterion) {
    let packets = revolutions(4);
    let total_bytes: usize = packets.iter().map(|p| p.len()).sum();

    let mut group = c.benchmark_group("decoder");
    group.throughput(Throughput::Bytes(total_bytes as u64));

    let tables = [
        ("factory", CalibrationTable::factory()),
        ("corrected", corrected_calibration()),
    ];
    let angles = std::sync::Arc::new(AngleLookup::new());

    for (name, table) in tables {
        let table = std::sync::Arc::new(table);
        group.bench_with_input(BenchmarkId::new("decode_packet", name), &packets, |b, packets| {
            b.iter_with_setup(
                || PacketDecoder::with_tables(table.clone(), angles.clone()),
                |mut decoder| {
                    for packet in packets {
                        let _ = decoder.decode_packet(black_box(packet));
                    }
                    decoder.drain_sweeps().len()
                },
            );
        });
    }

    group.finish();
}

fn bench_bundler(c: &mut Criterion) {
    let packets = revolutions(4);
    let total_bytes: usize = packets.iter().map(|p| p.len()).sum();

    let mut group = c.benchmark_group("bundler");
    group.throughput(Throughput::Bytes(total_bytes as u64));

    group.bench_function("bundle_packet", |b| {
        b.iter_with_setup(PacketBundler::new, |mut bundler| {
            for packet in &packets {
                let _ = bundler.bundle_packet(black_box(packet));
            }
            bundler.drain_bundles().len()
        });
    });

    // Close one bundle to decode later
    let mut bundler = PacketBundler::new();
    for packet in packets.iter().take(DATAGRAMS_PER_REVOLUTION + 1) {
        let _ = bundler.bundle_packet(packet);
    }
    let Some(bundle) = bundler.take_latest() else {
        eprintln!("Skipping bundle decoding: no bundle completed");
        group.finish();
        return;
    };

    group.throughput(Throughput::Bytes(bundle.len() as u64));
    group.bench_function("decode_bundle", |b| {
        let mut decoder = BundleDecoder::new();
        b.iter(|| {
            let _ = decoder.decode_bundle(black_box(bundle.as_bytes()));
            decoder.take_latest()
        });
    });

    group.finish();
}

criterion_group!(benches, bench_decoder, bench_bundler);
criterion_main!(benches);
