//! Adaptive char/short (16-bit) and short/int3 (24-bit) sample packing.
//!
//! Grounded on the [`crate::width::Width`] split and on the
//! serialize/parse shape of `rustradio`'s `Sample` trait (`lib.rs`): each
//! direction is a pair of free functions rather than a stateful codec
//! object, since there's no per-call state to carry between samples other
//! than the bitmap being built.

use crate::error::{Result, SeismuxError};
use crate::width::{sign_extend_24, to_be24, Width};

/// Marker byte for a 16-bit (char/short) packed stream.
pub const DATA_SIZE_16: u8 = 0x55;
/// Marker byte for a 24-bit (short/int3) packed stream.
pub const DATA_SIZE_24: u8 = 0xAA;

/// Small header preceding the bitmap + packed data in a `Pack` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackUnpackHeader {
    /// [`DATA_SIZE_16`] or [`DATA_SIZE_24`].
    pub data_size: u8,
    /// Channel count the payload was packed for.
    pub channels: u8,
    /// Samples per channel in the payload.
    pub samples: u16,
}

impl PackUnpackHeader {
    const LEN: usize = 4;

    fn write(&self, out: &mut Vec<u8>) {
        out.push(self.data_size);
        out.push(self.channels);
        out.extend_from_slice(&self.samples.to_le_bytes());
    }

    fn read(data: &[u8]) -> Result<(Self, &[u8])> {
        if data.len() < Self::LEN {
            return Err(SeismuxError::format("packed payload too short for header"));
        }
        let hdr = Self {
            data_size: data[0],
            channels: data[1],
            samples: u16::from_le_bytes([data[2], data[3]]),
        };
        Ok((hdr, &data[Self::LEN..]))
    }
}

fn bitmap_len(total_samples: usize) -> usize {
    total_samples.div_ceil(8)
}

fn bitmap_set(bitmap: &mut [u8], k: usize) {
    bitmap[k / 8] |= 1 << (k % 8);
}

fn bitmap_get(bitmap: &[u8], k: usize) -> bool {
    (bitmap[k / 8] >> (k % 8)) & 1 != 0
}

/// Pack samples from `channels` channels, each contributing
/// `samples_per_channel` values, in channel-major order (channel 0's
/// samples, then channel 1's, ...), per §4.4.
///
/// Each sample is clamped to `[-32768, 32767]`. Values with `|d| >= 128`
/// are encoded as 16-bit little-endian and flagged "wide" in the shared
/// bitmap; smaller values are encoded as signed 8-bit.
pub fn pack16(channels: &[Vec<i32>]) -> Vec<u8> {
    let samples_per_channel = channels.first().map_or(0, Vec::len);
    let total = channels.len() * samples_per_channel;
    let mut bitmap = vec![0u8; bitmap_len(total)];
    let mut data = Vec::with_capacity(total * 2);

    let mut k = 0;
    for ch in channels {
        for &raw in ch {
            let d = raw.clamp(-32768, 32767);
            if d.abs() >= 128 {
                bitmap_set(&mut bitmap, k);
                data.extend_from_slice(&(d as i16).to_le_bytes());
            } else {
                data.push(d as i8 as u8);
            }
            k += 1;
        }
    }

    let hdr = PackUnpackHeader {
        data_size: DATA_SIZE_16,
        channels: channels.len() as u8,
        samples: samples_per_channel as u16,
    };
    let mut out = Vec::with_capacity(PackUnpackHeader::LEN + bitmap.len() + data.len());
    hdr.write(&mut out);
    out.extend_from_slice(&bitmap);
    out.extend_from_slice(&data);
    out
}

/// Inverse of [`pack16`]. Returns one `Vec<i32>` per channel.
pub fn unpack16(payload: &[u8]) -> Result<Vec<Vec<i32>>> {
    let (hdr, rest) = PackUnpackHeader::read(payload)?;
    if hdr.data_size != DATA_SIZE_16 {
        return Err(SeismuxError::format(format!(
            "unpack16: wrong data_size marker {:#x}",
            hdr.data_size
        )));
    }
    let total = hdr.channels as usize * hdr.samples as usize;
    let bmlen = bitmap_len(total);
    if rest.len() < bmlen {
        return Err(SeismuxError::format("unpack16: truncated bitmap"));
    }
    let (bitmap, mut data) = rest.split_at(bmlen);

    let mut out = vec![Vec::with_capacity(hdr.samples as usize); hdr.channels as usize];
    let mut k = 0;
    for ch in out.iter_mut() {
        for _ in 0..hdr.samples {
            let wide = bitmap_get(bitmap, k);
            k += 1;
            if wide {
                if data.len() < 2 {
                    return Err(SeismuxError::format("unpack16: truncated wide sample"));
                }
                let v = i16::from_le_bytes([data[0], data[1]]);
                data = &data[2..];
                ch.push(v as i32);
            } else {
                if data.is_empty() {
                    return Err(SeismuxError::format("unpack16: truncated narrow sample"));
                }
                let v = data[0] as i8;
                data = &data[1..];
                ch.push(v as i32);
            }
        }
    }
    Ok(out)
}

/// Pack samples using the 24-bit adaptive scheme: values outside
/// `[-32768, 32767]` are written as 3 big-endian bytes and flagged in the
/// bitmap; everything else is 16-bit little-endian.
pub fn pack24(channels: &[Vec<i32>]) -> Result<Vec<u8>> {
    let samples_per_channel = channels.first().map_or(0, Vec::len);
    let total = channels.len() * samples_per_channel;
    let mut bitmap = vec![0u8; bitmap_len(total)];
    let mut data = Vec::with_capacity(total * 3);

    let mut k = 0;
    for ch in channels {
        for &d in ch {
            if d >= 32768 || d <= -32768 {
                bitmap_set(&mut bitmap, k);
                let (b0, b1, b2) = to_be24(d)?;
                data.extend_from_slice(&[b0, b1, b2]);
            } else {
                data.extend_from_slice(&(d as i16).to_le_bytes());
            }
            k += 1;
        }
    }

    let hdr = PackUnpackHeader {
        data_size: DATA_SIZE_24,
        channels: channels.len() as u8,
        samples: samples_per_channel as u16,
    };
    let mut out = Vec::with_capacity(PackUnpackHeader::LEN + bitmap.len() + data.len());
    hdr.write(&mut out);
    out.extend_from_slice(&bitmap);
    out.extend_from_slice(&data);
    Ok(out)
}

/// Inverse of [`pack24`].
pub fn unpack24(payload: &[u8]) -> Result<Vec<Vec<i32>>> {
    let (hdr, rest) = PackUnpackHeader::read(payload)?;
    if hdr.data_size != DATA_SIZE_24 {
        return Err(SeismuxError::format(format!(
            "unpack24: wrong data_size marker {:#x}",
            hdr.data_size
        )));
    }
    let total = hdr.channels as usize * hdr.samples as usize;
    let bmlen = bitmap_len(total);
    if rest.len() < bmlen {
        return Err(SeismuxError::format("unpack24: truncated bitmap"));
    }
    let (bitmap, mut data) = rest.split_at(bmlen);

    let mut out = vec![Vec::with_capacity(hdr.samples as usize); hdr.channels as usize];
    let mut k = 0;
    for ch in out.iter_mut() {
        for _ in 0..hdr.samples {
            let wide = bitmap_get(bitmap, k);
            k += 1;
            if wide {
                if data.len() < 3 {
                    return Err(SeismuxError::format("unpack24: truncated wide sample"));
                }
                ch.push(sign_extend_24(data[0], data[1], data[2]));
                data = &data[3..];
            } else {
                if data.len() < 2 {
                    return Err(SeismuxError::format("unpack24: truncated narrow sample"));
                }
                let v = i16::from_le_bytes([data[0], data[1]]);
                data = &data[2..];
                ch.push(v as i32);
            }
        }
    }
    Ok(out)
}

/// Pack according to `width`.
pub fn pack(width: Width, channels: &[Vec<i32>]) -> Result<Vec<u8>> {
    match width {
        Width::Bits16 => Ok(pack16(channels)),
        Width::Bits24 => pack24(channels),
    }
}

/// Unpack according to `width`.
pub fn unpack(width: Width, payload: &[u8]) -> Result<Vec<Vec<i32>>> {
    match width {
        Width::Bits16 => unpack16(payload),
        Width::Bits24 => unpack24(payload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack16_round_trip() {
        let xs = vec![vec![0, 1, -1, 127, -128, 128, -129, 32767, -32768]];
        let packed = pack16(&xs);
        let got = unpack16(&packed).unwrap();
        assert_eq!(got, xs);
    }

    #[test]
    fn pack16_bitmap_boundary() {
        // |d| = 127 -> narrow, |d| = 128 -> wide.
        let xs = vec![vec![127, -127, 128, -128]];
        let packed = pack16(&xs);
        let total = 4;
        let bm_start = 4;
        let bitmap = packed[bm_start..bm_start + total.div_ceil(8)].to_vec();
        let get = |k: usize| (bitmap[k / 8] >> (k % 8)) & 1;
        assert_eq!(get(0), 0);
        assert_eq!(get(1), 0);
        assert_eq!(get(2), 1);
        assert_eq!(get(3), 1);
    }

    #[test]
    fn pack16_length_matches_flags() {
        let xs = vec![vec![0, 200, -200, 5]];
        let packed = pack16(&xs);
        // header(4) + bitmap(ceil(4/8)=1) + narrow(0,5: 1 byte each) + wide(200,-200: 2 bytes each)
        assert_eq!(packed.len(), 4 + 1 + 2 + 4);
    }

    #[test]
    fn pack24_round_trip() {
        let xs = vec![vec![0, 1, -1, 32767, -32768, 32768, -32769, (1 << 23) - 1, -(1 << 23)]];
        let packed = pack24(&xs).unwrap();
        let got = unpack24(&packed).unwrap();
        assert_eq!(got, xs);
    }

    #[test]
    fn pack24_bitmap_boundary() {
        let xs = vec![vec![32767, -32768, 32768, -32769]];
        let packed = pack24(&xs).unwrap();
        let bitmap = &packed[4..5];
        let get = |k: usize| (bitmap[0] >> k) & 1;
        assert_eq!(get(0), 0);
        assert_eq!(get(1), 0);
        assert_eq!(get(2), 1);
        assert_eq!(get(3), 1);
    }

    #[test]
    fn multi_channel_sequential() {
        let xs = vec![vec![1, 2, 3], vec![-1, -2, -3]];
        let packed = pack16(&xs);
        let got = unpack16(&packed).unwrap();
        assert_eq!(got, xs);
    }
}
