// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Velodyne HDL-32E/64E data packet decoder.
//!
//! # Packet Structure
//!
//! Data packets are exactly 1206 bytes, sent to UDP port 2368:
//! - Data: 12 blocks × 100 bytes = 1200 bytes
//!   - Flag: 2 bytes, little-endian (`0xEEFF` upper bank, `0xDDFF` lower bank)
//!   - Rotation: 2 bytes, little-endian, 0.01° units (0..36000)
//!   - Returns: 32 × {distance: u16 LE in 2 mm units, intensity: u8}
//! - Timestamp: 4 bytes, little-endian, microseconds
//! - Status type: 1 byte
//! - Status value: 1 byte
//!
//! Decoding is zero-copy through [`PacketSlice`] and [`BlockSlice`]; owned
//! [`MeasurementBlock`] records are only produced when a block is handed to
//! the frame assembler.

use crate::lidar::{Error, LASERS_PER_BLOCK, LaserReturn, MeasurementBlock};

/// Data packet total size in bytes
pub const PACKET_SIZE: usize = 1206;

/// Number of blocks per data packet
pub const BLOCKS_PER_PACKET: usize = 12;

/// Size of each block in bytes (4 byte header + 32 × 3 byte returns)
pub const BLOCK_SIZE: usize = 4 + LASERS_PER_BLOCK * RETURN_SIZE;

/// Size of one laser return in bytes
const RETURN_SIZE: usize = 3;

/// Offset of the trailing timestamp
const TIMESTAMP_OFFSET: usize = BLOCKS_PER_PACKET * BLOCK_SIZE;

/// Rotation angle range in 0.01° units
pub const ROTATION_STEPS: u16 = 36000;

/// Block flag for lasers 0..32
pub const UPPER_BANK: u16 = 0xEEFF;

/// Block flag for lasers 32..64
pub const LOWER_BANK: u16 = 0xDDFF;

/// Default destination port for data packets
pub const DATA_PORT: u16 = 2368;

/// Laser bank a block belongs to, derived from its flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LaserBank {
    Upper,
    Lower,
    Unknown(u16),
}

impl From<u16> for LaserBank {
    fn from(flag: u16) -> Self {
        match flag {
            UPPER_BANK => LaserBank::Upper,
            LOWER_BANK => LaserBank::Lower,
            other => LaserBank::Unknown(other),
        }
    }
}

impl LaserBank {
    /// Laser id of the first return in a block of this bank.
    pub fn first_laser(&self) -> Option<usize> {
        match self {
            LaserBank::Upper => Some(0),
            LaserBank::Lower => Some(LASERS_PER_BLOCK),
            LaserBank::Unknown(_) => None,
        }
    }
}

impl MeasurementBlock {
    pub fn bank(&self) -> LaserBank {
        LaserBank::from(self.flag)
    }
}

/// Validated view over one data packet.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PacketSlice<'a> {
    slice: &'a [u8],
}

impl<'a> PacketSlice<'a> {
    /// Validate the packet length and block rotations.
    pub fn from_slice(slice: &'a [u8]) -> Result<PacketSlice<'a>, Error> {
        if slice.len() != PACKET_SIZE {
            return Err(Error::PacketSize(slice.len()));
        }

        let packet = PacketSlice { slice };
        for i in 0..BLOCKS_PER_PACKET {
            let rotation = packet.block(i).rotation();
            if rotation >= ROTATION_STEPS {
                return Err(Error::InvalidPacket(format!(
                    "block {} rotation {} out of range",
                    i, rotation
                )));
            }
        }

        Ok(packet)
    }

    /// Device timestamp in microseconds.
    pub fn timestamp(&self) -> u32 {
        let t = &self.slice[TIMESTAMP_OFFSET..TIMESTAMP_OFFSET + 4];
        u32::from_le_bytes([t[0], t[1], t[2], t[3]])
    }

    pub fn status_type(&self) -> u8 {
        self.slice[TIMESTAMP_OFFSET + 4]
    }

    pub fn status_value(&self) -> u8 {
        self.slice[TIMESTAMP_OFFSET + 5]
    }

    /// Block `i` of the packet, `i < BLOCKS_PER_PACKET`.
    pub fn block(&self, i: usize) -> BlockSlice<'a> {
        let start = i * BLOCK_SIZE;
        BlockSlice {
            slice: &self.slice[start..start + BLOCK_SIZE],
        }
    }

    /// Owned blocks stamped with the packet timestamp and status bytes.
    pub fn blocks(&self) -> impl Iterator<Item = MeasurementBlock> + 'a {
        let packet = *self;
        (0..BLOCKS_PER_PACKET).map(move |i| packet.block(i).to_block(i as u8, &packet))
    }
}

/// View over one 100 byte block.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BlockSlice<'a> {
    slice: &'a [u8],
}

impl BlockSlice<'_> {
    pub fn flag(&self) -> u16 {
        u16::from_le_bytes([self.slice[0], self.slice[1]])
    }

    pub fn rotation(&self) -> u16 {
        u16::from_le_bytes([self.slice[2], self.slice[3]])
    }

    /// Raw return of laser `i` within the block.
    pub fn laser(&self, i: usize) -> LaserReturn {
        let at = 4 + i * RETURN_SIZE;
        LaserReturn {
            distance: u16::from_le_bytes([self.slice[at], self.slice[at + 1]]),
            intensity: self.slice[at + 2],
        }
    }

    fn to_block(self, index: u8, packet: &PacketSlice) -> MeasurementBlock {
        MeasurementBlock {
            flag: self.flag(),
            index,
            rotation: self.rotation(),
            returns: std::array::from_fn(|i| self.laser(i)),
            timestamp: packet.timestamp(),
            status_type: packet.status_type(),
            status_value: packet.status_value(),
        }
    }
}

/// Decode one datagram into its 12 measurement blocks.
pub fn decode(data: &[u8]) -> Result<Vec<MeasurementBlock>, Error> {
    Ok(PacketSlice::from_slice(data)?.blocks().collect())
}

/// Build a data packet from blocks, used to synthesize traffic in tests and
/// benchmarks.
///
/// Only the first [`BLOCKS_PER_PACKET`] blocks are encoded; timestamp and
/// status bytes are taken from the first block.
pub fn encode(blocks: &[MeasurementBlock]) -> Vec<u8> {
    let mut data = vec![0u8; PACKET_SIZE];

    for (block, out) in blocks
        .iter()
        .take(BLOCKS_PER_PACKET)
        .zip(data.chunks_exact_mut(BLOCK_SIZE))
    {
        out[0..2].copy_from_slice(&block.flag.to_le_bytes());
        out[2..4].copy_from_slice(&block.rotation.to_le_bytes());
        for (ret, raw) in block.returns.iter().zip(out[4..].chunks_exact_mut(RETURN_SIZE)) {
            raw[0..2].copy_from_slice(&ret.distance.to_le_bytes());
            raw[2] = ret.intensity;
        }
    }

    if let Some(first) = blocks.first() {
        data[TIMESTAMP_OFFSET..TIMESTAMP_OFFSET + 4].copy_from_slice(&first.timestamp.to_le_bytes());
        data[TIMESTAMP_OFFSET + 4] = first.status_type;
        data[TIMESTAMP_OFFSET + 5] = first.status_value;
    }

    data
}
