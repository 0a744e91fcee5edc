//! Per-block info header and the 16-bit/24-bit decompressors (§4.2).
//!
//! `samples_per_block` (the header's `numSamples` field) is already a
//! samples-per-second-across-all-channels count, not a per-channel one:
//! the source's `MakeOutputFile` sizes its unpack buffer as
//! `60 * hdrBlock.numSamples` and its `Unblock16BitData`/`Unblock24BitData`
//! consume exactly `60 * sampleRate * numChannels` values, so
//! `numSamples == sampleRate * numChannels` by construction. A block's
//! total flat-array length is therefore `samples_per_block * 60`, with no
//! separate `num_channels` factor.

use crate::error::{Result, SeismuxError};
use crate::width::{sign_extend_24, Width};

/// Block magic number, must open every data block.
pub const BLOCK_MAGIC: u16 = 0xA55A;

const INFO_HEADER_LEN: usize = 2 + 2 + 8 + 4 + 4 + 4;

/// Per-block info header, immediately preceding the bitmap/packed stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Must equal [`BLOCK_MAGIC`].
    pub magic: u16,
    /// Block-level flags (format reserves these; unused by the decoder).
    pub flags: u16,
    /// Per-channel alarm bitmask.
    pub alarm_bits: u64,
    /// Block start time, unix seconds.
    pub start_time: i64,
    /// Sub-second start offset, milliseconds.
    pub start_tick_ms: u32,
    /// Total size of this block, bytes, including this info header.
    pub block_size: u32,
}

impl BlockInfo {
    /// Parse the info header from the start of a block's raw bytes.
    pub fn parse(data: &[u8]) -> Result<BlockInfo> {
        if data.len() < INFO_HEADER_LEN {
            return Err(SeismuxError::format("block shorter than info header"));
        }
        let magic = u16::from_le_bytes(data[0..2].try_into().unwrap());
        if magic != BLOCK_MAGIC {
            return Err(SeismuxError::format(format!(
                "bad block magic {magic:#x}, want {BLOCK_MAGIC:#x}"
            )));
        }
        Ok(BlockInfo {
            magic,
            flags: u16::from_le_bytes(data[2..4].try_into().unwrap()),
            alarm_bits: u64::from_le_bytes(data[4..12].try_into().unwrap()),
            start_time: u32::from_le_bytes(data[12..16].try_into().unwrap()) as i64,
            start_tick_ms: u32::from_le_bytes(data[16..20].try_into().unwrap()),
            block_size: u32::from_le_bytes(data[20..24].try_into().unwrap()),
        })
    }

    /// Serialize back to bytes (used to build synthetic blocks in tests).
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(INFO_HEADER_LEN);
        out.extend_from_slice(&self.magic.to_le_bytes());
        out.extend_from_slice(&self.flags.to_le_bytes());
        out.extend_from_slice(&self.alarm_bits.to_le_bytes());
        out.extend_from_slice(&(self.start_time as u32).to_le_bytes());
        out.extend_from_slice(&self.start_tick_ms.to_le_bytes());
        out.extend_from_slice(&self.block_size.to_le_bytes());
        out
    }

    /// On-disk length of the info header.
    #[must_use]
    pub fn on_disk_len() -> usize {
        INFO_HEADER_LEN
    }
}

fn bitmap_len(total_samples: usize) -> usize {
    total_samples.div_ceil(8)
}

/// Decompress one block's body (the bytes following [`BlockInfo`]) into a
/// flat, channel-interleaved array of signed values.
///
/// `samples_per_block` is `header.samples_per_block` (or fewer, for a
/// truncated final block); it is already the all-channels-included
/// samples-per-second count, so the block's total flat length is
/// `samples_per_block * 60` (§3, one minute per block).
pub fn decompress(width: Width, body: &[u8], samples_per_block: usize) -> Result<Vec<i32>> {
    match width {
        Width::Bits16 => decompress16(body, samples_per_block),
        Width::Bits24 => decompress24(body, samples_per_block),
    }
}

fn decompress16(body: &[u8], samples_per_block: usize) -> Result<Vec<i32>> {
    let total = samples_per_block * 60;
    let bmlen = bitmap_len(total);
    if body.len() < bmlen {
        return Err(SeismuxError::format("16-bit block: truncated bitmap"));
    }
    let (bitmap, mut data) = body.split_at(bmlen);

    let mut out = Vec::with_capacity(total);
    for k in 0..total {
        let wide = (bitmap[k / 8] >> (k % 8)) & 1 != 0;
        if wide {
            if data.len() < 2 {
                return Err(SeismuxError::format("16-bit block: truncated wide sample"));
            }
            out.push(i16::from_le_bytes([data[0], data[1]]) as i32);
            data = &data[2..];
        } else {
            if data.is_empty() {
                return Err(SeismuxError::format("16-bit block: truncated narrow sample"));
            }
            out.push(data[0] as i8 as i32);
            data = &data[1..];
        }
    }
    Ok(out)
}

fn decompress24(body: &[u8], samples_per_block: usize) -> Result<Vec<i32>> {
    let total = samples_per_block * 60;
    if body.len() < total * 3 {
        return Err(SeismuxError::format("24-bit block: truncated sample stream"));
    }
    let mut out = Vec::with_capacity(total);
    for k in 0..total {
        let off = k * 3;
        out.push(sign_extend_24(body[off], body[off + 1], body[off + 2]));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> BlockInfo {
        BlockInfo {
            magic: BLOCK_MAGIC,
            flags: 0,
            alarm_bits: 0,
            start_time: 1_700_000_000,
            start_tick_ms: 0,
            block_size: 0,
        }
    }

    #[test]
    fn info_round_trip() {
        let i = info();
        let bytes = i.serialize();
        let parsed = BlockInfo::parse(&bytes).unwrap();
        assert_eq!(parsed, i);
    }

    #[test]
    fn info_rejects_bad_magic() {
        let mut bytes = info().serialize();
        bytes[0] ^= 0xFF;
        assert!(BlockInfo::parse(&bytes).is_err());
    }

    #[test]
    fn decompress16_roundtrips_with_pack16() {
        use crate::codec::pack16;
        // One block (samples_per_block = 1) worth of flat scalars: two
        // channels of 30 ticks each, channel-major as pack16 writes them.
        let ch0: Vec<i32> = (0..30).map(|i| i - 15).collect();
        let ch1: Vec<i32> = (0..30).map(|i| (i * 7) % 120 - 60).collect();
        let channels = vec![ch0.clone(), ch1.clone()];
        let packed = pack16(&channels); // header(4) + bitmap + data
        let body = &packed[4..]; // strip PackUnpackHeader to get raw bitmap+data
        let flat = decompress16(body, 1).unwrap();
        // decompress16 has no channel concept; it reads the same linear
        // bit/byte order pack16 wrote (channel-major).
        let mut channel_major = Vec::new();
        channel_major.extend(ch0);
        channel_major.extend(ch1);
        assert_eq!(flat, channel_major);
    }

    #[test]
    fn decompress24_basic() {
        use crate::width::to_be24;
        let vals: Vec<i32> = (0..60).map(|i| (i * 131_071) - 1_900_000).collect();
        let mut body = Vec::new();
        for &v in &vals {
            let (b0, b1, b2) = to_be24(v).unwrap();
            body.extend_from_slice(&[b0, b1, b2]);
        }
        let out = decompress24(&body, 1).unwrap();
        assert_eq!(out, vals);
    }

    #[test]
    fn decompress16_truncated_is_format_error() {
        let err = decompress16(&[0u8; 1], 1).unwrap_err();
        assert!(matches!(err, SeismuxError::Format(_)));
    }
}
