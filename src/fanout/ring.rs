//! Ring-buffer contract and the RingReader task (§4.5).
//!
//! The ring buffer itself is out of scope (§1: "treat as external
//! collaborators, interfaces only") — [`RingSource`] is the contract this
//! crate consumes: poll a flag, copy one message non-blockingly, drain
//! stale backlog on startup.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, warn};

use crate::fanout::subscriber::SubscriberTable;
use crate::fanout::sync::CancellationToken;

/// Maximum size of one ring message, per §4.5.
pub const MAX_MESSAGE_LEN: usize = 16 * 1024;

/// What [`RingSource::get_flag`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingFlag {
    /// Nothing to report, keep running.
    Running,
    /// Shut down unconditionally.
    Terminate,
    /// Shut down if `pid` is this process's own pid.
    SelfPid(u32),
}

/// The contract a ring-buffer implementation must satisfy. A real
/// implementation wraps a shared-memory segment; this crate only ever
/// calls through the trait.
pub trait RingSource: Send {
    /// Poll the out-of-band control flag.
    fn get_flag(&mut self) -> RingFlag;

    /// Copy the oldest unread message into `buf`, non-blockingly.
    /// Returns `Ok(None)` if there is nothing new yet.
    fn copy_message(&mut self, buf: &mut [u8]) -> std::io::Result<Option<usize>>;

    /// Discard any backlog accumulated before this reader attached.
    fn drain_stale(&mut self);
}

/// `MuxHdr`: fixed prefix of every ring message (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MuxHdr {
    /// Selects the sample width and wire flags byte (§4.4 table).
    pub board_type: u8,
    /// Channel count of this message's payload.
    pub num_channels: u8,
    /// `'D'` (data) or `'L'` (log).
    pub msg_type: u8,
    /// Sample rate, samples/sec/channel.
    pub sample_rate: u16,
}

const MUX_HDR_LEN: usize = 1 + 1 + 1 + 1 + 2;

impl MuxHdr {
    /// Parse the fixed prefix from the start of a ring message.
    pub fn parse(data: &[u8]) -> crate::error::Result<MuxHdr> {
        if data.len() < MUX_HDR_LEN {
            return Err(crate::error::SeismuxError::format("ring message shorter than MuxHdr"));
        }
        Ok(MuxHdr {
            board_type: data[0],
            num_channels: data[1],
            msg_type: data[2],
            // data[3] is padding.
            sample_rate: u16::from_le_bytes([data[4], data[5]]),
        })
    }

    /// On-disk/on-wire length of the fixed prefix.
    #[must_use]
    pub fn on_disk_len() -> usize {
        MUX_HDR_LEN
    }
}

/// `DataHeader`: leads the payload of a `'D'` ring message (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataHeader {
    /// Packet time, unix seconds.
    pub packet_time_secs: i64,
    /// Sub-second part of packet time, microseconds.
    pub packet_time_micros: u32,
    /// Monotonically increasing packet sequence number.
    pub packet_id: u32,
    /// Time-reference lock status (acquisition-system specific encoding).
    pub time_ref_status: u8,
    /// Board-specific flags.
    pub flags: u8,
}

const DATA_HEADER_LEN: usize = 8 + 4 + 4 + 1 + 1;

impl DataHeader {
    /// Parse from the start of a `'D'` message's payload.
    pub fn parse(data: &[u8]) -> crate::error::Result<DataHeader> {
        if data.len() < DATA_HEADER_LEN {
            return Err(crate::error::SeismuxError::format("ring data message shorter than DataHeader"));
        }
        Ok(DataHeader {
            packet_time_secs: i64::from_le_bytes(data[0..8].try_into().unwrap()),
            packet_time_micros: u32::from_le_bytes(data[8..12].try_into().unwrap()),
            packet_id: u32::from_le_bytes(data[12..16].try_into().unwrap()),
            time_ref_status: data[16],
            flags: data[17],
        })
    }

    /// On-disk/on-wire length of this header.
    #[must_use]
    pub fn on_disk_len() -> usize {
        DATA_HEADER_LEN
    }
}

/// Single task owning the ring-buffer handle and the sole reader cursor.
pub struct RingReader<S: RingSource> {
    source: S,
    subscribers: Arc<Mutex<SubscriberTable>>,
    cancel: CancellationToken,
    self_pid: u32,
}

impl<S: RingSource> RingReader<S> {
    /// Build a new RingReader over `source`, fanning out to `subscribers`.
    pub fn new(source: S, subscribers: Arc<Mutex<SubscriberTable>>, cancel: CancellationToken, self_pid: u32) -> Self {
        RingReader {
            source,
            subscribers,
            cancel,
            self_pid,
        }
    }

    /// Run the read/fan-out loop until cancellation or a matching
    /// TERMINATE/self-pid flag (§4.5). Blocking; run on its own thread.
    pub fn run(mut self) {
        self.source.drain_stale();
        let mut buf = vec![0u8; MAX_MESSAGE_LEN];

        while !self.cancel.is_canceled() {
            match self.source.get_flag() {
                RingFlag::Terminate => {
                    debug!("RingReader: TERMINATE flag observed, exiting");
                    self.cancel.cancel();
                    break;
                }
                RingFlag::SelfPid(pid) if pid == self.self_pid => {
                    debug!("RingReader: self-pid flag observed, exiting");
                    self.cancel.cancel();
                    break;
                }
                RingFlag::SelfPid(_) | RingFlag::Running => {}
            }

            match self.source.copy_message(&mut buf) {
                Ok(Some(n)) => {
                    self.fan_out(&buf[..n]);
                }
                Ok(None) => {
                    std::thread::sleep(Duration::from_millis(100));
                }
                Err(e) => {
                    warn!("RingReader: copy_message failed: {e}");
                    std::thread::sleep(Duration::from_millis(100));
                }
            }
        }
    }

    fn fan_out(&self, message: &[u8]) {
        let table = self.subscribers.lock().expect("subscriber table poisoned");
        for sub in table.in_use_iter() {
            if sub.queue.try_push(message.to_vec()).is_err() {
                warn!(
                    "RingReader: subscriber slot {} queue full, dropping message",
                    sub.slot_index
                );
            }
        }
    }
}

/// A `RingSource` that never has data and never signals termination.
///
/// The real shared-memory ring buffer is an external collaborator (§1):
/// this crate only consumes its contract. Until a concrete binding is
/// wired up for a given deployment, this stands in so the server binary
/// links and runs (idly fanning out nothing) rather than needing a stub
/// dependency.
#[derive(Debug, Default)]
pub struct NullRingSource;

impl RingSource for NullRingSource {
    fn get_flag(&mut self) -> RingFlag {
        RingFlag::Running
    }

    fn copy_message(&mut self, _buf: &mut [u8]) -> std::io::Result<Option<usize>> {
        Ok(None)
    }

    fn drain_stale(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mux_hdr_parse() {
        let bytes = [3u8, 2, b'D', 0, 50, 0];
        let hdr = MuxHdr::parse(&bytes).unwrap();
        assert_eq!(hdr.board_type, 3);
        assert_eq!(hdr.num_channels, 2);
        assert_eq!(hdr.msg_type, b'D');
        assert_eq!(hdr.sample_rate, 50);
    }

    #[test]
    fn mux_hdr_rejects_short() {
        assert!(MuxHdr::parse(&[0u8; 3]).is_err());
    }

    #[test]
    fn data_header_round_trip_fields() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1_700_000_000i64.to_le_bytes());
        bytes.extend_from_slice(&500_000u32.to_le_bytes());
        bytes.extend_from_slice(&42u32.to_le_bytes());
        bytes.push(1);
        bytes.push(0x80);
        let hdr = DataHeader::parse(&bytes).unwrap();
        assert_eq!(hdr.packet_time_secs, 1_700_000_000);
        assert_eq!(hdr.packet_time_micros, 500_000);
        assert_eq!(hdr.packet_id, 42);
        assert_eq!(hdr.time_ref_status, 1);
        assert_eq!(hdr.flags, 0x80);
    }
}
