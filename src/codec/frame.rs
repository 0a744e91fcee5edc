//! Wire frame: `{preamble}{len:u16}{type:u8}{flags:u8}{payload}{crc:u8}`.
//!
//! See §4.4. The CRC is a single-byte XOR over every byte from `len`
//! through the end of the payload.

use crate::error::{Result, SeismuxError};

/// 4-byte frame preamble.
pub const PREAMBLE: [u8; 4] = [0xAA, 0x55, 0x88, 0x44];

/// Frame payload kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgType {
    /// Packed sample data.
    Data,
    /// Verbatim log text.
    Log,
}

impl MsgType {
    fn to_byte(self) -> u8 {
        match self {
            MsgType::Data => b'D',
            MsgType::Log => b'L',
        }
    }

    fn from_byte(b: u8) -> Result<Self> {
        match b {
            b'D' => Ok(MsgType::Data),
            b'L' => Ok(MsgType::Log),
            other => Err(SeismuxError::format(format!("unknown frame type {other:#x}"))),
        }
    }
}

/// Compute the XOR CRC over bytes from `len` (inclusive) through the end
/// of `payload` (inclusive).
fn crc(len_bytes: [u8; 2], type_byte: u8, flags: u8, payload: &[u8]) -> u8 {
    let mut c = len_bytes[0] ^ len_bytes[1] ^ type_byte ^ flags;
    for &b in payload {
        c ^= b;
    }
    c
}

/// Build a complete frame: preamble, length, type, flags, payload, CRC.
///
/// `len` in the header covers `type + flags + payload` (i.e. everything
/// between the length field and the CRC byte), matching the source's use
/// of `len` to delimit the CRC'd region.
#[must_use]
pub fn build_frame(msg_type: MsgType, flags: u8, payload: &[u8]) -> Vec<u8> {
    let type_byte = msg_type.to_byte();
    let len = (1 + payload.len()) as u16; // type-byte-equivalent + payload, per §3's len-1 convention
    let len_bytes = len.to_le_bytes();
    let c = crc(len_bytes, type_byte, flags, payload);

    let mut out = Vec::with_capacity(PREAMBLE.len() + 2 + 2 + payload.len() + 1);
    out.extend_from_slice(&PREAMBLE);
    out.extend_from_slice(&len_bytes);
    out.push(type_byte);
    out.push(flags);
    out.extend_from_slice(payload);
    out.push(c);
    out
}

/// A parsed frame, borrowing its payload from the input buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    /// `'D'` or `'L'`.
    pub msg_type: MsgType,
    /// Board-type-derived flags byte (see [`crate::width::Width::from_board_type`]).
    pub flags: u8,
    /// Frame payload.
    pub payload: &'a [u8],
}

/// Parse one frame from the start of `buf`. Returns the frame and the
/// number of bytes consumed.
pub fn parse_frame(buf: &[u8]) -> Result<(Frame<'_>, usize)> {
    if buf.len() < PREAMBLE.len() + 2 + 2 + 1 {
        return Err(SeismuxError::format("frame shorter than minimum size"));
    }
    if buf[..PREAMBLE.len()] != PREAMBLE {
        return Err(SeismuxError::format("bad frame preamble"));
    }
    let mut pos = PREAMBLE.len();
    let len_bytes = [buf[pos], buf[pos + 1]];
    let len = u16::from_le_bytes(len_bytes) as usize;
    pos += 2;
    let type_byte = buf[pos];
    pos += 1;
    let flags = buf[pos];
    pos += 1;

    let payload_len = len.checked_sub(1).ok_or_else(|| {
        SeismuxError::format("frame length field smaller than type byte")
    })?;
    let end = pos + payload_len;
    if buf.len() < end + 1 {
        return Err(SeismuxError::format("frame truncated before CRC"));
    }
    let payload = &buf[pos..end];
    let got_crc = buf[end];
    let want_crc = crc(len_bytes, type_byte, flags, payload);
    if got_crc != want_crc {
        return Err(SeismuxError::format(format!(
            "frame CRC mismatch: got {got_crc:#x}, want {want_crc:#x}"
        )));
    }

    Ok((
        Frame {
            msg_type: MsgType::from_byte(type_byte)?,
            flags,
            payload,
        },
        end + 1,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_then_parse() {
        let payload = b"hello frame";
        let frame = build_frame(MsgType::Data, 0x80, payload);
        let (parsed, consumed) = parse_frame(&frame).unwrap();
        assert_eq!(consumed, frame.len());
        assert_eq!(parsed.msg_type, MsgType::Data);
        assert_eq!(parsed.flags, 0x80);
        assert_eq!(parsed.payload, payload);
    }

    #[test]
    fn crc_self_check() {
        let payload = b"abc";
        let frame = build_frame(MsgType::Log, 0x00, payload);
        // XOR of every byte from len through the payload, inclusive, must
        // cancel out against the appended CRC byte.
        let region = &frame[PREAMBLE.len()..];
        let x = region.iter().fold(0u8, |a, &b| a ^ b);
        assert_eq!(x, 0);
    }

    #[test]
    fn empty_payload() {
        let frame = build_frame(MsgType::Log, 0x00, &[]);
        let (parsed, consumed) = parse_frame(&frame).unwrap();
        assert_eq!(consumed, frame.len());
        assert!(parsed.payload.is_empty());
    }

    #[test]
    fn rejects_bad_preamble() {
        let mut frame = build_frame(MsgType::Data, 0, b"x");
        frame[0] ^= 0xFF;
        assert!(parse_frame(&frame).is_err());
    }

    #[test]
    fn rejects_bad_crc() {
        let mut frame = build_frame(MsgType::Data, 0, b"x");
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        assert!(parse_frame(&frame).is_err());
    }
}
