// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Frame recording.
//!
//! [`FrameWriter`] stores each completed [`RawFrame`] as `<dir>/<frame_id>.bin`
//! with the id zero-padded to six digits. [`read_frame`] loads such a file
//! back. All fields are little-endian.
//!
//! ```text
//! header (28 bytes)
//!   0  magic "VFRM"
//!   4  u16 version (1)
//!   6  u16 reserved
//!   8  u32 frame_id
//!  12  u64 host timestamp (ns)
//!  20  u32 dropped blocks
//!  24  u32 block count
//! block (105 bytes, repeated)
//!   0  u16 flag
//!   2  u16 rotation
//!   4  u32 device timestamp (µs)
//!   8  u8  index
//!   9  u8  status type
//!  10  u8  status value
//!  11  32 × (u16 distance, u8 intensity)
//! ```

use crate::lidar::{Error, LASERS_PER_BLOCK, LaserReturn, MeasurementBlock, RawFrame};
use std::{
    fs::{self, File},
    io::{self, BufWriter, ErrorKind, Write},
    path::{Path, PathBuf},
};
use tracing::debug;

const MAGIC: &[u8; 4] = b"VFRM";
const VERSION: u16 = 1;
const HEADER_SIZE: usize = 28;
const RECORD_SIZE: usize = 11 + LASERS_PER_BLOCK * 3;

/// Writes completed frames into a directory, one file per frame.
#[derive(Debug)]
pub struct FrameWriter {
    dir: PathBuf,
    written: usize,
}

impl FrameWriter {
    /// Create the writer, creating `dir` if it does not exist.
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self, Error> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, written: 0 })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of frames written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    /// File a frame with `frame_id` is written to.
    pub fn path_for(&self, frame_id: u32) -> PathBuf {
        self.dir.join(format!("{:06}.bin", frame_id))
    }

    /// Write `frame`, replacing an existing file of the same id.
    pub fn write(&mut self, frame: &RawFrame) -> Result<PathBuf, Error> {
        let path = self.path_for(frame.frame_id);
        let tmp = path.with_extension("bin.tmp");
        {
            let mut out = BufWriter::new(File::create(&tmp)?);
            write_frame(&mut out, frame)?;
            out.flush()?;
        }
        fs::rename(&tmp, &path)?;

        self.written += 1;
        debug!(
            frame_id = frame.frame_id,
            blocks = frame.block_count(),
            path = %path.display(),
            "frame written"
        );
        Ok(path)
    }
}

/// Serialize `frame` into `out`.
pub fn write_frame<W: Write>(out: &mut W, frame: &RawFrame) -> Result<(), Error> {
    let block_count = u32::try_from(frame.blocks.len())
        .map_err(|_| Error::Config(format!("frame has {} blocks", frame.blocks.len())))?;

    out.write_all(MAGIC)?;
    out.write_all(&VERSION.to_le_bytes())?;
    out.write_all(&0u16.to_le_bytes())?;
    out.write_all(&frame.frame_id.to_le_bytes())?;
    out.write_all(&frame.timestamp.to_le_bytes())?;
    out.write_all(&(frame.dropped.min(u32::MAX as usize) as u32).to_le_bytes())?;
    out.write_all(&block_count.to_le_bytes())?;

    let mut record = [0u8; RECORD_SIZE];
    for block in &frame.blocks {
        record[0..2].copy_from_slice(&block.flag.to_le_bytes());
        record[2..4].copy_from_slice(&block.rotation.to_le_bytes());
        record[4..8].copy_from_slice(&block.timestamp.to_le_bytes());
        record[8] = block.index;
        record[9] = block.status_type;
        record[10] = block.status_value;
        for (ret, raw) in block.returns.iter().zip(record[11..].chunks_exact_mut(3)) {
            raw[0..2].copy_from_slice(&ret.distance.to_le_bytes());
            raw[2] = ret.intensity;
        }
        out.write_all(&record)?;
    }
    Ok(())
}

fn invalid(msg: String) -> Error {
    Error::Io(io::Error::new(ErrorKind::InvalidData, msg))
}

/// Parse a frame previously produced by [`write_frame`].
pub fn parse_frame(data: &[u8]) -> Result<RawFrame, Error> {
    if data.len() < HEADER_SIZE {
        return Err(invalid(format!("frame file too short: {} bytes", data.len())));
    }
    if &data[0..4] != MAGIC {
        return Err(invalid("not a frame file".to_string()));
    }
    let version = u16::from_le_bytes([data[4], data[5]]);
    if version != VERSION {
        return Err(invalid(format!("unsupported frame file version {}", version)));
    }

    let u32_at = |at: usize| u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]);
    let frame_id = u32_at(8);
    let mut ts = [0u8; 8];
    ts.copy_from_slice(&data[12..20]);
    let timestamp = u64::from_le_bytes(ts);
    let dropped = u32_at(20) as usize;
    let block_count = u32_at(24) as usize;

    let body = &data[HEADER_SIZE..];
    if body.len() != block_count * RECORD_SIZE {
        return Err(invalid(format!(
            "frame file holds {} bytes of blocks, header announces {}",
            body.len(),
            block_count
        )));
    }

    let blocks = body
        .chunks_exact(RECORD_SIZE)
        .map(|r| MeasurementBlock {
            flag: u16::from_le_bytes([r[0], r[1]]),
            rotation: u16::from_le_bytes([r[2], r[3]]),
            timestamp: u32::from_le_bytes([r[4], r[5], r[6], r[7]]),
            index: r[8],
            status_type: r[9],
            status_value: r[10],
            returns: std::array::from_fn(|i| {
                let raw = &r[11 + i * 3..14 + i * 3];
                LaserReturn {
                    distance: u16::from_le_bytes([raw[0], raw[1]]),
                    intensity: raw[2],
                }
            }),
        })
        .collect();

    Ok(RawFrame {
        frame_id,
        timestamp,
        blocks,
        dropped,
    })
}

/// Load a frame file written by [`FrameWriter`].
pub fn read_frame<P: AsRef<Path>>(path: P) -> Result<RawFrame, Error> {
    let data = fs::read(path)?;
    parse_frame(&data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::velodyne::{LOWER_BANK, UPPER_BANK};

    fn sample_frame(frame_id: u32) -> RawFrame {
        let blocks = (0..24u16)
            .map(|i| {
                let mut block = MeasurementBlock {
                    flag: if i % 2 == 0 { UPPER_BANK } else { LOWER_BANK },
                    index: (i % 12) as u8,
                    rotation: i * 1500,
                    timestamp: 1_000_000 + u32::from(i / 12),
                    status_type: b'V',
                    status_value: 0x33,
                    ..Default::default()
                };
                for (l, ret) in block.returns.iter_mut().enumerate() {
                    ret.distance = i * 100 + l as u16;
                    ret.intensity = l as u8;
                }
                block
            })
            .collect();
        RawFrame {
            frame_id,
            timestamp: 123_456_789_000,
            blocks,
            dropped: 2,
        }
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = FrameWriter::new(dir.path().join("frames")).unwrap();

        let frame = sample_frame(17);
        let path = writer.write(&frame).unwrap();
        assert_eq!(path.file_name().unwrap(), "000017.bin");
        assert_eq!(writer.written(), 1);

        let size = fs::metadata(&path).unwrap().len() as usize;
        assert_eq!(size, HEADER_SIZE + 24 * RECORD_SIZE);
        assert_eq!(read_frame(&path).unwrap(), frame);

        // No temporary file left behind
        let entries = fs::read_dir(writer.dir()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_empty_frame() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = FrameWriter::new(dir.path()).unwrap();
        let frame = RawFrame {
            frame_id: 3,
            ..Default::default()
        };
        let path = writer.write(&frame).unwrap();
        assert_eq!(read_frame(path).unwrap(), frame);
    }

    #[test]
    fn test_rejects_corrupt_files() {
        let mut data = Vec::new();
        write_frame(&mut data, &sample_frame(1)).unwrap();

        assert!(parse_frame(&data[..10]).is_err());
        assert!(parse_frame(&data[..data.len() - 1]).is_err());

        let mut bad_magic = data.clone();
        bad_magic[0] = b'X';
        assert!(matches!(parse_frame(&bad_magic), Err(Error::Io(_))));

        let mut bad_version = data;
        bad_version[4] = 9;
        assert!(parse_frame(&bad_version).is_err());
    }

    #[test]
    fn test_read_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_frame(dir.path().join("000000.bin")).is_err());
    }
}
