// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Frame assembly from the continuous block stream.
//!
//! A Velodyne sensor streams blocks continuously with a wrapping rotation
//! angle. The [`FrameAssembler`] cuts this stream into frames each time the
//! angle crosses 180° upward, which happens exactly once per revolution:
//!
//! ```text
//!  rotation ─┐        ┌──────────┐        ┌──────────┐
//!   36000    │      ╱ │        ╱ │      ╱ │        ╱
//!   18000 ---│----╳---│------╱---│----╳---│------╱---
//!       0    └──╱─────┘────╱─────┘──╱─────┘────╱─────
//!                ▲ cut             ▲ cut
//! ```
//!
//! The block that crosses the threshold opens the new frame.

use crate::lidar::{Error, MeasurementBlock, RawFrame, timestamp};
use tracing::trace;

/// Rotation at which frames are cut (180.00°)
pub const CUT_ROTATION: u16 = 18000;

/// Default block capacity of one frame
pub const MAX_BLOCKS: usize = 5000;

/// Accumulates blocks and emits a [`RawFrame`] on every 180° crossing.
#[derive(Debug)]
pub struct FrameAssembler {
    /// Next frame id to assign
    frame_id: u32,
    /// Rotation of the previous block, 0 before any block was seen
    last_rotation: u16,
    /// Blocks of the frame in progress
    blocks: Vec<MeasurementBlock>,
    /// Blocks rejected for the frame in progress
    dropped: usize,
    capacity: usize,
}

impl FrameAssembler {
    /// Create an assembler holding at most `capacity` blocks per frame.
    pub fn new(capacity: usize) -> Self {
        Self {
            frame_id: 0,
            last_rotation: 0,
            blocks: Vec::with_capacity(capacity),
            dropped: 0,
            capacity,
        }
    }

    /// Maximum number of blocks per frame.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of blocks in the frame in progress.
    pub fn pending(&self) -> usize {
        self.blocks.len()
    }

    /// Id the next completed frame will carry.
    pub fn next_frame_id(&self) -> u32 {
        self.frame_id
    }

    fn is_frame_boundary(&self, rotation: u16) -> bool {
        self.last_rotation != 0 && rotation >= CUT_ROTATION && self.last_rotation < CUT_ROTATION
    }

    fn finalize_frame(&mut self) -> RawFrame {
        let blocks = std::mem::replace(&mut self.blocks, Vec::with_capacity(self.capacity));
        let frame = RawFrame {
            frame_id: self.frame_id,
            timestamp: timestamp().unwrap_or_default(),
            blocks,
            dropped: std::mem::take(&mut self.dropped),
        };
        self.frame_id = self.frame_id.wrapping_add(1);
        frame
    }

    /// Add one block, returning the completed frame when this block starts a
    /// new rotation.
    ///
    /// When the frame in progress is already full the block is dropped and
    /// [`Error::FrameOverflow`] is returned; the assembler stays usable and
    /// the eventual frame records the loss in [`RawFrame::dropped`].
    pub fn ingest(&mut self, block: MeasurementBlock) -> Result<Option<RawFrame>, Error> {
        let completed = if self.is_frame_boundary(block.rotation) {
            let frame = self.finalize_frame();
            trace!(
                frame_id = frame.frame_id,
                blocks = frame.block_count(),
                "frame cut"
            );
            Some(frame)
        } else {
            None
        };

        self.last_rotation = block.rotation;

        if self.blocks.len() >= self.capacity {
            self.dropped += 1;
            return Err(Error::FrameOverflow(self.capacity));
        }
        self.blocks.push(block);

        Ok(completed)
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new(MAX_BLOCKS)
    }
}
