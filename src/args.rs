// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use clap::{Parser, Subcommand};
use log::LevelFilter;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Application log level
    #[arg(long, env, global = true, default_value = "info")]
    pub rust_log: LevelFilter,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Decode datagrams into calibrated point sweeps.
    Decode {
        #[command(flatten)]
        input: InputArgs,

        /// Calibration database (db.xml).  Without it the HDL-32 factory
        /// calibration is used.
        #[arg(long, env)]
        calibration: Option<PathBuf>,

        /// Number of completed sweeps retained in history
        #[arg(long, env, default_value = "10")]
        max_sweeps: usize,
    },

    /// Bundle raw datagrams per revolution without decoding.
    Bundle {
        #[command(flatten)]
        input: InputArgs,

        /// Number of completed bundles retained in history
        #[arg(long, env, default_value = "10")]
        max_bundles: usize,

        /// Also decode every completed bundle into points
        #[arg(long, env)]
        decode: bool,

        /// Calibration database used with --decode
        #[arg(long, env)]
        calibration: Option<PathBuf>,
    },

    /// Record live datagrams into a pcap file.
    Record {
        /// Address to bind for live datagrams
        #[arg(long, env, default_value = "0.0.0.0:2368")]
        bind: String,

        /// Output pcap file
        #[arg(long, env)]
        output: PathBuf,

        /// Stop after this many datagrams
        #[arg(long, env)]
        count: Option<usize>,
    },

    /// Send the datagrams of a pcap file over UDP, paced by their hardware
    /// timestamps.
    Replay {
        /// Input pcap file
        #[arg(env)]
        pcap: PathBuf,

        /// Destination address
        #[arg(long, env, default_value = "127.0.0.1:2368")]
        destination: String,

        /// UDP port filter applied to the capture
        #[arg(long, env, default_value = "2368")]
        port: u16,
    },
}

#[derive(clap::Args, Debug, Clone)]
pub struct InputArgs {
    /// Read datagrams from a pcap file instead of the network
    #[arg(long, env)]
    pub pcap: Option<PathBuf>,

    /// Address to bind for live datagrams
    #[arg(long, env, default_value = "0.0.0.0:2368")]
    pub bind: String,

    /// UDP port filter applied to pcap input
    #[arg(long, env, default_value = "2368")]
    pub port: u16,
}
