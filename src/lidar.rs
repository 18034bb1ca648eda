// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Common Velodyne types and the crate-wide error type.
//!
//! These are the plain data records that flow between the decoder, the frame
//! assembler and the consumers of completed frames.

use std::fmt;

/// Number of laser returns fired together in one measurement block.
pub const LASERS_PER_BLOCK: usize = 32;

/// One laser's raw measurement within a block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LaserReturn {
    /// Distance in raw units (2 mm per unit), zero means no return.
    pub distance: u16,
    /// Raw reflectivity.
    pub intensity: u8,
}

/// One firing group of 32 lasers sharing a rotation angle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MeasurementBlock {
    /// Upper/lower bank flag as sent by the device (`0xEEFF` or `0xDDFF`).
    pub flag: u16,
    /// Position of the block within its datagram (0..12).
    pub index: u8,
    /// Rotation angle in 0.01° units, always below 36000.
    pub rotation: u16,
    pub returns: [LaserReturn; LASERS_PER_BLOCK],
    /// Device timestamp in microseconds, shared by the whole datagram.
    pub timestamp: u32,
    pub status_type: u8,
    pub status_value: u8,
}

impl Default for MeasurementBlock {
    fn default() -> Self {
        Self {
            flag: 0,
            index: 0,
            rotation: 0,
            returns: [LaserReturn::default(); LASERS_PER_BLOCK],
            timestamp: 0,
            status_type: 0,
            status_value: 0,
        }
    }
}

/// All blocks of one device rotation, cut at the 180° crossing.
///
/// The frame owns its blocks; it is moved from the assembler into the handoff
/// slot and from there to exactly one consumer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawFrame {
    /// Sequence number assigned at cut time, starting at 0.
    pub frame_id: u32,
    /// Host monotonic timestamp in nanoseconds taken when the frame was cut.
    pub timestamp: u64,
    /// Blocks in arrival order.
    pub blocks: Vec<MeasurementBlock>,
    /// Blocks discarded because the frame was already at capacity.
    pub dropped: usize,
}

impl RawFrame {
    /// Number of blocks held by the frame.
    #[inline]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Common error type for driver, handoff and calibration operations.
#[derive(Debug)]
pub enum Error {
    /// I/O error (socket, file operations)
    Io(std::io::Error),
    /// Datagram contents violate the protocol
    InvalidPacket(String),
    /// Datagram length differs from the fixed packet size
    PacketSize(usize),
    /// Frame accumulator reached its block capacity without a cut
    FrameOverflow(usize),
    /// Malformed calibration document
    Json(serde_json::Error),
    /// Configuration error
    Config(String),
    /// The receive context has terminated, no more frames will arrive
    ReceiverStopped,
    /// The receive thread could not be started or panicked
    Thread(String),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::InvalidPacket(msg) => write!(f, "invalid packet: {}", msg),
            Error::PacketSize(len) => write!(
                f,
                "unexpected packet size: {} bytes, expected {}",
                len,
                crate::velodyne::PACKET_SIZE
            ),
            Error::FrameOverflow(capacity) => {
                write!(f, "frame overflow: more than {} blocks without a cut", capacity)
            }
            Error::Json(err) => write!(f, "calibration parse error: {}", err),
            Error::Config(msg) => write!(f, "configuration error: {}", msg),
            Error::ReceiverStopped => write!(f, "receiver stopped"),
            Error::Thread(msg) => write!(f, "receive thread error: {}", msg),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

/// Get current timestamp in nanoseconds.
///
/// On Linux, uses `CLOCK_MONOTONIC_RAW` for best accuracy.
/// On other platforms, falls back to `SystemTime`.
#[cfg(target_os = "linux")]
pub fn timestamp() -> Result<u64, Error> {
    let mut tp = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    let err = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC_RAW, &mut tp) };
    if err != 0 {
        return Err(std::io::Error::last_os_error().into());
    }

    Ok(tp.tv_sec as u64 * 1_000_000_000 + tp.tv_nsec as u64)
}

#[cfg(not(target_os = "linux"))]
pub fn timestamp() -> Result<u64, Error> {
    let now = std::time::SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|e| Error::Config(e.to_string()))?;
    Ok(duration.as_nanos() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::PacketSize(100).to_string(),
            "unexpected packet size: 100 bytes, expected 1206"
        );
        assert_eq!(
            Error::FrameOverflow(5000).to_string(),
            "frame overflow: more than 5000 blocks without a cut"
        );
        assert_eq!(Error::ReceiverStopped.to_string(), "receiver stopped");
    }

    #[test]
    fn test_timestamp_monotonic() {
        let a = timestamp().unwrap();
        let b = timestamp().unwrap();
        assert!(b >= a);
    }

    #[test]
    fn test_raw_frame_counts() {
        let mut frame = RawFrame::default();
        assert!(frame.is_empty());
        frame.blocks.push(MeasurementBlock::default());
        assert_eq!(frame.block_count(), 1);
    }
}
