// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use clap::Parser;
use edgefirst_velopub::{
    driver::DriverConfig,
    frame::MAX_BLOCKS,
    velodyne::DATA_PORT,
};
use std::{net::IpAddr, path::PathBuf, time::Duration};
use tracing::level_filters::LevelFilter;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// UDP port the sensor sends data packets to
    #[arg(long, env, default_value_t = DATA_PORT)]
    pub port: u16,

    /// Address of the sensor.  Packets from any other sender are reported but
    /// still processed.
    #[arg(long, env)]
    pub device: Option<IpAddr>,

    /// Local address to bind the data socket to
    #[arg(long, env, default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// Receive timeout in milliseconds before reporting a silent sensor
    #[arg(long, env, default_value_t = 1000)]
    pub timeout_ms: u64,

    /// Maximum number of blocks held by one frame
    #[arg(long, env, default_value_t = MAX_BLOCKS)]
    pub max_blocks: usize,

    /// Calibration file (JSON).  When given, frames are converted to points.
    #[arg(long, env)]
    pub calibration: Option<PathBuf>,

    /// Directory to record every received frame into
    #[arg(long, env)]
    pub output: Option<PathBuf>,

    /// Application log level
    #[arg(long, env, default_value = "info")]
    pub rust_log: LevelFilter,
}

impl From<&Args> for DriverConfig {
    fn from(args: &Args) -> Self {
        DriverConfig {
            port: args.port,
            bind_addr: args.bind,
            device_addr: args.device,
            poll_timeout: Duration::from_millis(args.timeout_ms),
            max_blocks: args.max_blocks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_driver_config() {
        let args = Args::parse_from(["velopub"]);
        let config = DriverConfig::from(&args);
        let defaults = DriverConfig::default();
        assert_eq!(config.poll_timeout, defaults.poll_timeout);
        assert_eq!(config.max_blocks, defaults.max_blocks);
    }

    #[test]
    fn test_overrides() {
        let args = Args::parse_from([
            "velopub",
            "--port",
            "2400",
            "--device",
            "192.168.1.201",
            "--timeout-ms",
            "250",
            "--max-blocks",
            "100",
            "--calibration",
            "hdl64.json",
            "--rust-log",
            "debug",
        ]);
        let config = DriverConfig::from(&args);
        assert_eq!(config.port, 2400);
        assert_eq!(config.device_addr, Some("192.168.1.201".parse().unwrap()));
        assert_eq!(config.poll_timeout, Duration::from_millis(250));
        assert_eq!(config.max_blocks, 100);
        assert_eq!(args.calibration, Some(PathBuf::from("hdl64.json")));
        assert_eq!(args.rust_log, LevelFilter::DEBUG);
    }
}
