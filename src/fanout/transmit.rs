//! Per-subscriber Transmit task (§4.6).
//!
//! Each task owns its socket and its own packing buffers — the §5 "shared
//! buffer hazard" fix: no `outputData`/`muxData` globals, everything here
//! is task-local state on the stack/heap of [`TransmitTask::run`].

use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use log::{debug, warn};

use crate::codec::{build_frame, pack, MsgType};
use crate::drf::config::ChannelConfig;
use crate::error::Result;
use crate::fanout::queue::QueueReceiver;
use crate::fanout::ring::{DataHeader, MuxHdr};
use crate::fanout::subscriber::SubscriberTable;
use crate::fanout::sync::CancellationToken;
use crate::width::Width;

/// Non-blocking retry pause on `WouldBlock` during send, per §4.6.
const EAGAIN_RETRY_DELAY: Duration = Duration::from_millis(100);
/// Poll granularity while scanning for inbound ack bytes to discard.
const DRAIN_SCRATCH_LEN: usize = 4096;

/// Static session identity needed to build the info line and to pack each
/// `'D'` message (§4.6 step 1 and 2).
pub struct SessionInfo {
    /// `ModuleId`'s channel table, in wire order.
    pub channels: Vec<ChannelConfig>,
    /// Samples/sec/channel.
    pub sample_rate: u16,
    /// Board type, determines sample width and wire flags.
    pub board_type: u8,
}

impl SessionInfo {
    fn info_line(&self) -> Vec<u8> {
        let names: Vec<String> = self
            .channels
            .iter()
            .map(|c| {
                format!(
                    "{}={}:{}:{}:{}:{}",
                    c.station, c.component, c.network, c.location, c.adc_bits, c.gain
                )
            })
            .collect();
        let line = format!(
            "SPS: {} NumChans: {} Names: {} BrdType: {}",
            self.sample_rate,
            self.channels.len(),
            names.join("|"),
            self.board_type
        );
        let mut bytes = line.into_bytes();
        bytes.push(0);
        bytes
    }
}

/// One Transmit task's private state. Owns the socket and the slot it was
/// spawned for.
pub struct TransmitTask {
    socket: TcpStream,
    queue: QueueReceiver,
    info: SessionInfo,
    slot_index: usize,
    table: Arc<Mutex<SubscriberTable>>,
    global_cancel: CancellationToken,
    subscriber_exit: CancellationToken,
}

impl TransmitTask {
    /// Build a Transmit task for an already-accepted, already-slotted
    /// subscriber.
    pub fn new(
        socket: TcpStream,
        queue: QueueReceiver,
        info: SessionInfo,
        slot_index: usize,
        table: Arc<Mutex<SubscriberTable>>,
        global_cancel: CancellationToken,
        subscriber_exit: CancellationToken,
    ) -> Result<Self> {
        socket.set_nonblocking(true)?;
        Ok(TransmitTask {
            socket,
            queue,
            info,
            slot_index,
            table,
            global_cancel,
            subscriber_exit,
        })
    }

    /// Run until shutdown, then close the socket and release the slot
    /// (§4.6 shutdown conditions).
    pub fn run(mut self) {
        let info_line = self.info.info_line();
        if let Err(e) = self.send_all(&info_line) {
            debug!("Transmit[{}]: info line send failed: {e}", self.slot_index);
            self.teardown();
            return;
        }

        loop {
            if self.global_cancel.is_canceled() || self.subscriber_exit.is_canceled() {
                break;
            }
            self.drain_inbound();

            let Some(message) = self.queue.recv() else {
                break; // queue shutdown
            };
            if let Err(e) = self.handle_message(&message) {
                warn!("Transmit[{}]: {e}", self.slot_index);
                break;
            }
        }
        self.teardown();
    }

    fn handle_message(&mut self, message: &[u8]) -> Result<()> {
        let hdr = MuxHdr::parse(message)?;
        let payload = &message[MuxHdr::on_disk_len()..];
        match hdr.msg_type {
            b'D' => {
                let data_hdr = DataHeader::parse(payload)?;
                let samples = &payload[DataHeader::on_disk_len()..];
                let (width, flags) = Width::from_board_type(hdr.board_type);
                let channels = deinterleave(samples, hdr.num_channels as usize, width);
                let packed = pack(width, &channels)?;
                let frame = build_frame(MsgType::Data, flags, &packed);
                self.send_all(&frame)?;
                self.bump_stats();
                let _ = data_hdr; // carried for parity with the source; not retransmitted
            }
            b'L' => {
                let (_, flags) = Width::from_board_type(hdr.board_type);
                let frame = build_frame(MsgType::Log, flags, payload);
                self.send_all(&frame)?;
                self.bump_stats();
            }
            other => {
                debug!("Transmit[{}]: discarding unknown msg_type {other:#x}", self.slot_index);
            }
        }
        Ok(())
    }

    fn bump_stats(&self) {
        if let Some(sub) = self.table.lock().expect("subscriber table poisoned").get_mut(self.slot_index) {
            sub.packets_sent += 1;
            sub.last_update_time = SystemTime::now();
        }
    }

    /// Send discipline from §4.6: loop until the full frame is written;
    /// `Interrupted` retries immediately, `WouldBlock` sleeps and retries,
    /// anything else is a transport error that kills the task.
    fn send_all(&mut self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            match self.socket.write(buf) {
                Ok(0) => {
                    return Err(crate::error::SeismuxError::Transport("peer closed during send".into()));
                }
                Ok(n) => buf = &buf[n..],
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    std::thread::sleep(EAGAIN_RETRY_DELAY);
                }
                Err(e) => return Err(crate::error::SeismuxError::Transport(e.to_string())),
            }
        }
        Ok(())
    }

    /// Discard whatever inbound ack bytes the client has sent; the server
    /// never parses them (§4.6 step 3).
    fn drain_inbound(&mut self) {
        let mut scratch = [0u8; DRAIN_SCRATCH_LEN];
        loop {
            match self.socket.read(&mut scratch) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
    }

    fn teardown(&mut self) {
        let _ = self.socket.shutdown(std::net::Shutdown::Both);
        self.table.lock().expect("subscriber table poisoned").release(self.slot_index);
        debug!("Transmit[{}]: slot released", self.slot_index);
    }
}

/// De-interleave a flat `(tick, channel)` ring payload into one `Vec<i32>`
/// per channel, ready for [`crate::codec::pack`] (§4.6 step 2). This is
/// the *wire* de-interleave, distinct from [`crate::drf::block::decompress`]'s
/// on-disk flat array: the ring payload is already scalar samples, never
/// bitmap/tight-packed.
fn deinterleave(samples: &[u8], num_channels: usize, width: Width) -> Vec<Vec<i32>> {
    if num_channels == 0 {
        return Vec::new();
    }
    let sample_bytes = match width {
        Width::Bits16 => 2,
        Width::Bits24 => 4, // stored as 32-bit per §3
    };
    let total = samples.len() / sample_bytes;
    let ticks = total / num_channels;
    let mut channels = vec![Vec::with_capacity(ticks); num_channels];
    for tick in 0..ticks {
        for ch in 0..num_channels {
            let k = tick * num_channels + ch;
            let off = k * sample_bytes;
            let v = match width {
                Width::Bits16 => i16::from_le_bytes([samples[off], samples[off + 1]]) as i32,
                Width::Bits24 => i32::from_le_bytes([samples[off], samples[off + 1], samples[off + 2], samples[off + 3]]),
            };
            channels[ch].push(v);
        }
    }
    channels
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chans() -> Vec<ChannelConfig> {
        vec![ChannelConfig {
            station: "STA1".into(),
            component: "CH1".into(),
            network: "NT".into(),
            location: "00".into(),
            adc_bits: 24,
            adc_volts: 5.0,
            gain: 1.0,
        }]
    }

    #[test]
    fn info_line_is_nul_terminated() {
        let info = SessionInfo {
            channels: chans(),
            sample_rate: 50,
            board_type: 3,
        };
        let line = info.info_line();
        assert_eq!(*line.last().unwrap(), 0);
        let text = std::str::from_utf8(&line[..line.len() - 1]).unwrap();
        assert!(text.starts_with("SPS: 50 NumChans: 1 Names: STA1=CH1:NT:00:24:1"));
        assert!(text.ends_with("BrdType: 3"));
    }

    #[test]
    fn deinterleave_two_channel_16bit() {
        let mut bytes = Vec::new();
        for v in [1i16, -2, 3, -4] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let channels = deinterleave(&bytes, 2, Width::Bits16);
        assert_eq!(channels, vec![vec![1, 3], vec![-2, -4]]);
    }

    #[test]
    fn deinterleave_24bit_stored_as_i32() {
        let mut bytes = Vec::new();
        for v in [100i32, -200] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let channels = deinterleave(&bytes, 1, Width::Bits24);
        assert_eq!(channels, vec![vec![100, -200]]);
    }
}
