// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! EdgeFirst Velodyne Driver Library
//!
//! Receives the UDP data stream of a Velodyne HDL-32E/64E class sensor, cuts
//! it into one frame per rotation and hands the newest frame to consumers.
//! Consumers convert frames into Cartesian points with a per-laser
//! [`Calibration`].
//!
//! # Architecture
//!
//! ```text
//!        velodyne-rx thread                          consumer thread(s)
//! ┌──────────────┐   ┌──────────────┐   ┌──────┐   ┌──────────────────────┐
//! │ PacketSource │─► │FrameAssembler│─► │ slot │─► │ FrameSubscriber      │
//! │ (UDP/test)   │   │ (180° cut)   │   │ (1)  │   │  └► Calibration      │
//! └──────────────┘   └──────────────┘   └──────┘   │      └► PointCloud   │
//!                                                  └──────────────────────┘
//! ```
//!
//! The receive side never blocks on consumers: the slot holds at most one
//! frame and publishing replaces a frame nobody took.
//!
//! # Modules
//!
//! - [`lidar`]: Common types and error handling
//! - [`velodyne`]: Data packet layout and block decoding
//! - [`frame`]: Rotation-based frame assembly
//! - [`handoff`]: Latest-wins frame handoff
//! - [`packet_source`]: Packet source abstraction for testing
//! - [`driver`]: Receive loop, thread lifecycle and configuration
//! - [`calibration`]: Per-laser calibration and point conversion
//! - [`cloud`]: Structure-of-arrays point cloud buffer
//! - [`writer`]: Frame recording
//!
//! # Example
//!
//! ```ignore
//! use edgefirst_velopub::{Calibration, DriverConfig, PointCloud, spawn_udp};
//!
//! let calibration = Calibration::from_file("hdl64.json")?;
//! let (handle, frames) = spawn_udp(&DriverConfig::default())?;
//! let mut cloud = PointCloud::default();
//!
//! for _ in 0..100 {
//!     let frame = frames.take()?;
//!     cloud.fill(&calibration, &frame);
//!     println!("frame {} has {} points", frame.frame_id, cloud.len());
//! }
//!
//! let stats = handle.join()?;
//! ```

pub mod calibration;
pub mod cloud;
pub mod driver;
pub mod frame;
pub mod handoff;
pub mod lidar;
pub mod packet_source;
pub mod velodyne;
pub mod writer;

// Re-exports for convenience
pub use calibration::{CalibratedPoint, Calibration, LaserCorrection};
pub use cloud::PointCloud;
pub use driver::{DriverConfig, DriverHandle, DriverStats, VelodyneDriver, spawn_udp};
pub use frame::FrameAssembler;
pub use handoff::{FramePublisher, FrameSubscriber, mailbox};
pub use lidar::{Error, LaserReturn, MeasurementBlock, RawFrame};
pub use packet_source::PacketSource;
pub use writer::{FrameWriter, read_frame};
