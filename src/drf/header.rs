//! DRF fixed header and block index (§3, §4.1).
//!
//! Byte-exact: little-endian scalars, no padding between fields, same
//! spirit as `Sample::parse`/`serialize` in `rustradio`'s `lib.rs` (manual
//! `from_le_bytes`, no external byteorder crate).

use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::{Result, SeismuxError};
use crate::width::Width;

/// Maximum number of block descriptors the fixed-capacity index holds,
/// matching the original's `MAX_FILE_INFO`.
pub const MAX_BLOCKS: usize = 2000;

/// `fileVersionFlags, sampleRate, numSamples, numChannels, numBlocks,
/// lastBlockSize, startTime, lastTime, lastBlockOffset`: 9 four-byte
/// fields, no padding.
const HEADER_FIXED_LEN: usize = 4 * 9;
/// `startTime, filePos, blockSize, julianDay`: 4 four-byte fields.
const BLOCK_DESC_LEN: usize = 4 * 4;

/// One entry in the fixed-capacity block index.
///
/// On disk every field is a 4-byte little-endian word, matching the
/// original's all-`ULONG`/`int` `FileInfo` struct; `start_time` and
/// `file_offset` are widened to `i64`/`u64` in memory for ergonomic
/// arithmetic elsewhere, narrowing back to `u32` on serialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockDescriptor {
    /// Block start time, unix seconds.
    pub start_time: i64,
    /// Byte offset of this block in the day file.
    pub file_offset: u64,
    /// Size of this block in bytes.
    pub block_size: u32,
    /// Julian day-of-year this block belongs to.
    pub julian_day: u32,
}

impl BlockDescriptor {
    fn read(data: &[u8]) -> BlockDescriptor {
        BlockDescriptor {
            start_time: u32::from_le_bytes(data[0..4].try_into().unwrap()) as i64,
            file_offset: u32::from_le_bytes(data[4..8].try_into().unwrap()) as u64,
            block_size: u32::from_le_bytes(data[8..12].try_into().unwrap()),
            julian_day: u32::from_le_bytes(data[12..16].try_into().unwrap()),
        }
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.start_time as u32).to_le_bytes());
        out.extend_from_slice(&(self.file_offset as u32).to_le_bytes());
        out.extend_from_slice(&self.block_size.to_le_bytes());
        out.extend_from_slice(&self.julian_day.to_le_bytes());
    }
}

/// The fixed DRF day-file header.
#[derive(Debug, Clone, PartialEq)]
pub struct DrfHeader {
    /// Feature-flag word; `SDR24_DATA | VM_DATA` selects 24-bit samples.
    pub feature_flags: u32,
    /// Samples per second per channel.
    pub sample_rate: u32,
    /// Samples per block per channel (normally `sample_rate * 60`).
    pub samples_per_block: u32,
    /// Channel count; must equal [`crate::drf::config::Config::num_channels`].
    pub num_channels: u32,
    /// Number of populated block descriptors.
    pub num_blocks: u32,
    /// Size in bytes of the last block (may be short if the file is
    /// still being written).
    pub last_block_size: u32,
    /// Start time of the first block, unix seconds. On disk a 4-byte
    /// word, widened here for ergonomic arithmetic.
    pub first_block_start_time: i64,
    /// Start time of the last block, unix seconds. On disk a 4-byte
    /// word, widened here for ergonomic arithmetic.
    pub last_block_start_time: i64,
    /// Byte offset of the last block. On disk a 4-byte word, widened
    /// here for ergonomic arithmetic.
    pub last_block_offset: u64,
    /// Ordered (ascending `start_time`) block index, length `num_blocks`.
    pub index: Vec<BlockDescriptor>,
}

impl DrfHeader {
    /// Total on-disk size of the fixed header region.
    #[must_use]
    pub fn on_disk_len() -> usize {
        HEADER_FIXED_LEN + MAX_BLOCKS * BLOCK_DESC_LEN
    }

    /// Sample width implied by the feature-flag word.
    #[must_use]
    pub fn width(&self) -> Width {
        Width::from_header_flags(self.feature_flags)
    }

    fn parse(data: &[u8]) -> Result<DrfHeader> {
        if data.len() < Self::on_disk_len() {
            return Err(SeismuxError::format(format!(
                "short header: got {} bytes, want {}",
                data.len(),
                Self::on_disk_len()
            )));
        }
        let feature_flags = u32::from_le_bytes(data[0..4].try_into().unwrap());
        let sample_rate = u32::from_le_bytes(data[4..8].try_into().unwrap());
        let samples_per_block = u32::from_le_bytes(data[8..12].try_into().unwrap());
        let num_channels = u32::from_le_bytes(data[12..16].try_into().unwrap());
        let num_blocks = u32::from_le_bytes(data[16..20].try_into().unwrap());
        let last_block_size = u32::from_le_bytes(data[20..24].try_into().unwrap());
        let first_block_start_time = u32::from_le_bytes(data[24..28].try_into().unwrap()) as i64;
        let last_block_start_time = u32::from_le_bytes(data[28..32].try_into().unwrap()) as i64;
        let last_block_offset = u32::from_le_bytes(data[32..36].try_into().unwrap()) as u64;

        if num_blocks as usize > MAX_BLOCKS {
            return Err(SeismuxError::format(format!(
                "num_blocks {num_blocks} exceeds fixed capacity {MAX_BLOCKS}"
            )));
        }

        let mut index = Vec::with_capacity(num_blocks as usize);
        let mut pos = HEADER_FIXED_LEN;
        for _ in 0..num_blocks {
            index.push(BlockDescriptor::read(&data[pos..pos + BLOCK_DESC_LEN]));
            pos += BLOCK_DESC_LEN;
        }

        Ok(DrfHeader {
            feature_flags,
            sample_rate,
            samples_per_block,
            num_channels,
            num_blocks,
            last_block_size,
            first_block_start_time,
            last_block_start_time,
            last_block_offset,
            index,
        })
    }

    /// Serialize back to the on-disk layout (used by tests to build
    /// synthetic day files).
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::on_disk_len());
        out.extend_from_slice(&self.feature_flags.to_le_bytes());
        out.extend_from_slice(&self.sample_rate.to_le_bytes());
        out.extend_from_slice(&self.samples_per_block.to_le_bytes());
        out.extend_from_slice(&self.num_channels.to_le_bytes());
        out.extend_from_slice(&self.num_blocks.to_le_bytes());
        out.extend_from_slice(&self.last_block_size.to_le_bytes());
        out.extend_from_slice(&(self.first_block_start_time as u32).to_le_bytes());
        out.extend_from_slice(&(self.last_block_start_time as u32).to_le_bytes());
        out.extend_from_slice(&(self.last_block_offset as u32).to_le_bytes());
        for bd in &self.index {
            bd.write(&mut out);
        }
        for _ in self.index.len()..MAX_BLOCKS {
            BlockDescriptor {
                start_time: 0,
                file_offset: 0,
                block_size: 0,
                julian_day: 0,
            }
            .write(&mut out);
        }
        out
    }
}

/// An opened day file: header, index, and the file handle positioned
/// right after the fixed header.
pub struct DrfFile {
    /// Parsed fixed header and block index.
    pub header: DrfHeader,
    /// Path this was opened from (used for diagnostics and day-spanning).
    pub path: std::path::PathBuf,
    pub(crate) file: std::fs::File,
}

impl DrfFile {
    /// Open `path`, parse its header, and validate `num_channels` against
    /// `expected_channels` (§4.1 contract).
    pub fn open(path: &Path, expected_channels: usize) -> Result<DrfFile> {
        let mut file = std::fs::File::open(path)?;
        let mut buf = vec![0u8; DrfHeader::on_disk_len()];
        file.read_exact(&mut buf).map_err(|e| {
            SeismuxError::format(format!("{}: short header read: {e}", path.display()))
        })?;
        let header = DrfHeader::parse(&buf)?;
        if header.num_channels as usize != expected_channels {
            return Err(SeismuxError::contract(format!(
                "{}: header has {} channels, config expects {}",
                path.display(),
                header.num_channels,
                expected_channels
            )));
        }
        Ok(DrfFile { header, path: path.to_path_buf(), file })
    }

    /// Read one block's raw bytes, validating the §3 `fileOffset`
    /// invariant: the file position right before reading must equal the
    /// descriptor's recorded offset, or the file is corrupt.
    pub fn read_block(&mut self, desc: &BlockDescriptor) -> Result<Vec<u8>> {
        let pos = self.file.seek(SeekFrom::Start(desc.file_offset))?;
        if pos != desc.file_offset {
            return Err(SeismuxError::format(format!(
                "{}: could not seek to block offset {}",
                self.path.display(),
                desc.file_offset
            )));
        }
        let mut buf = vec![0u8; desc.block_size as usize];
        self.file.read_exact(&mut buf).map_err(|e| {
            SeismuxError::format(format!(
                "{}: short read at offset {}: {e}",
                self.path.display(),
                desc.file_offset
            ))
        })?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::width::{SDR24_DATA, VM_DATA};

    fn sample_header() -> DrfHeader {
        DrfHeader {
            feature_flags: 0,
            sample_rate: 50,
            samples_per_block: 50 * 60,
            num_channels: 3,
            num_blocks: 2,
            last_block_size: 123,
            first_block_start_time: 1_000_000,
            last_block_start_time: 1_000_060,
            last_block_offset: 999,
            index: vec![
                BlockDescriptor { start_time: 1_000_000, file_offset: 100, block_size: 500, julian_day: 1 },
                BlockDescriptor { start_time: 1_000_060, file_offset: 600, block_size: 500, julian_day: 1 },
            ],
        }
    }

    #[test]
    fn serialize_parse_round_trip() {
        let hdr = sample_header();
        let bytes = hdr.serialize();
        let parsed = DrfHeader::parse(&bytes).unwrap();
        assert_eq!(parsed, hdr);
    }

    #[test]
    fn width_from_flags() {
        let mut hdr = sample_header();
        assert_eq!(hdr.width(), Width::Bits16);
        hdr.feature_flags = SDR24_DATA | VM_DATA;
        assert_eq!(hdr.width(), Width::Bits24);
    }

    #[test]
    fn open_rejects_channel_mismatch() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), sample_header().serialize()).unwrap();
        let err = DrfFile::open(tmp.path(), 7).unwrap_err();
        assert!(matches!(err, SeismuxError::Contract(_)));
    }

    #[test]
    fn open_accepts_matching_channels() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), sample_header().serialize()).unwrap();
        let f = DrfFile::open(tmp.path(), 3).unwrap();
        assert_eq!(f.header.num_blocks, 2);
    }

    #[test]
    fn open_rejects_short_file() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), [0u8; 10]).unwrap();
        assert!(DrfFile::open(tmp.path(), 3).is_err());
    }

    #[test]
    fn read_block_at_recorded_offset() {
        let mut hdr = sample_header();
        let offset = DrfHeader::on_disk_len() as u64;
        hdr.index[0].file_offset = offset;
        hdr.index[0].block_size = 7;

        let mut bytes = hdr.serialize();
        bytes.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7]);

        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), &bytes).unwrap();
        let mut f = DrfFile::open(tmp.path(), 3).unwrap();
        let block = f.read_block(&f.header.index[0].clone()).unwrap();
        assert_eq!(block, vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn read_block_rejects_offset_past_eof() {
        let mut hdr = sample_header();
        hdr.index[0].file_offset = DrfHeader::on_disk_len() as u64 + 1000;
        hdr.index[0].block_size = 10;
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), hdr.serialize()).unwrap();
        let mut f = DrfFile::open(tmp.path(), 3).unwrap();
        assert!(f.read_block(&f.header.index[0].clone()).is_err());
    }
}
