// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

mod args;

use args::Args;
use clap::Parser;
use edgefirst_velopub::{
    calibration::Calibration,
    cloud::PointCloud,
    driver::{DriverConfig, spawn_udp},
    lidar::{Error, RawFrame},
    writer::FrameWriter,
};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};
use tracing::{error, info, warn};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(args.rust_log)
        .init();

    let config = DriverConfig::from(&args);

    let calibration = match &args.calibration {
        Some(path) => {
            let calibration = Calibration::from_file(path)?;
            info!(
                lasers = calibration.laser_count(),
                path = %path.display(),
                "loaded calibration"
            );
            Some(calibration)
        }
        None => None,
    };

    let mut writer = match &args.output {
        Some(dir) => Some(FrameWriter::new(dir)?),
        None => None,
    };

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let (handle, subscriber) = spawn_udp(&config)?;
    let mut cloud = PointCloud::default();
    let mut last_frame = Instant::now();

    while running.load(Ordering::SeqCst) {
        let frame = match subscriber.take_timeout(config.poll_timeout) {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            Err(Error::ReceiverStopped) => {
                warn!("receiver stopped");
                break;
            }
            Err(err) => return Err(err.into()),
        };

        let elapsed = last_frame.elapsed();
        last_frame = Instant::now();

        if let Some(calibration) = &calibration {
            cloud.fill(calibration, &frame);
        }
        report(&frame, calibration.as_ref().map(|_| cloud.len()), elapsed.as_secs_f64());

        if let Some(writer) = writer.as_mut() {
            if let Err(err) = writer.write(&frame) {
                error!(frame_id = frame.frame_id, "failed to record frame: {}", err);
            }
        }
    }

    let stats = handle.join()?;
    info!(
        datagrams = stats.datagrams,
        frames = stats.frames,
        replaced = stats.replaced,
        timeouts = stats.timeouts,
        invalid = stats.invalid,
        foreign = stats.foreign,
        overflows = stats.overflows,
        "done"
    );
    if let Some(writer) = &writer {
        info!(frames = writer.written(), dir = %writer.dir().display(), "recorded");
    }

    Ok(())
}

fn report(frame: &RawFrame, points: Option<usize>, interval: f64) {
    match points {
        Some(points) => info!(
            frame_id = frame.frame_id,
            blocks = frame.block_count(),
            dropped = frame.dropped,
            points,
            "frame {:.1} Hz",
            1.0 / interval.max(f64::EPSILON)
        ),
        None => info!(
            frame_id = frame.frame_id,
            blocks = frame.block_count(),
            dropped = frame.dropped,
            "frame {:.1} Hz",
            1.0 / interval.max(f64::EPSILON)
        ),
    }
}
