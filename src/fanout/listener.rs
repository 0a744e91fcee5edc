//! Listener & subscriber allocator (§4.7).

use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{info, warn};

use crate::error::Result;
use crate::fanout::queue::bounded;
use crate::fanout::subscriber::SubscriberTable;
use crate::fanout::sync::CancellationToken;
use crate::fanout::transmit::{SessionInfo, TransmitTask};

/// Accept-loop poll interval; stands in for the source's 2-second
/// `select` timeout on the listening socket (§4.7), letting the loop
/// re-check `cancel` promptly without a platform-specific `select` call.
const ACCEPT_POLL_TIMEOUT: Duration = Duration::from_millis(2000);

/// Owns the listening socket and spawns one [`TransmitTask`] per accepted
/// connection.
pub struct Listener {
    listener: TcpListener,
    table: Arc<Mutex<SubscriberTable>>,
    cancel: CancellationToken,
    channels: Vec<crate::drf::config::ChannelConfig>,
    sample_rate: u16,
    board_type: u8,
}

impl Listener {
    /// Bind `host:port` and prepare to accept, per the config's `Host`
    /// and `Port` keys (§6).
    pub fn bind(
        host: &str,
        port: u16,
        table: Arc<Mutex<SubscriberTable>>,
        cancel: CancellationToken,
        channels: Vec<crate::drf::config::ChannelConfig>,
        sample_rate: u16,
        board_type: u8,
    ) -> Result<Self> {
        let bind_addr = if host.is_empty() { "0.0.0.0" } else { host };
        let listener = TcpListener::bind((bind_addr, port))?;
        listener.set_nonblocking(true)?;
        Ok(Listener {
            listener,
            table,
            cancel,
            channels,
            sample_rate,
            board_type,
        })
    }

    /// Accept loop. Blocking; run on its own thread. Exits when `cancel`
    /// is signaled.
    pub fn run(self) {
        while !self.cancel.is_canceled() {
            match self.listener.accept() {
                Ok((socket, addr)) => self.on_accept(socket, addr.ip(), addr.port()),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(ACCEPT_POLL_TIMEOUT.min(Duration::from_millis(200)));
                }
                Err(e) => {
                    warn!("Listener: accept failed: {e}");
                    std::thread::sleep(Duration::from_millis(100));
                }
            }
        }
    }

    fn on_accept(&self, socket: TcpStream, ip: std::net::IpAddr, port: u16) {
        let (sender, receiver) = bounded();
        let slot = {
            let mut table = self.table.lock().expect("subscriber table poisoned");
            table.allocate(ip, port, sender)
        };
        let Some(slot_index) = slot else {
            warn!("Listener: subscriber table full, rejecting {ip}:{port}");
            let _ = socket.shutdown(std::net::Shutdown::Both);
            return;
        };

        info!("Listener: accepted {ip}:{port} into slot {slot_index}");
        let subscriber_exit = {
            let mut table = self.table.lock().expect("subscriber table poisoned");
            table.get_mut(slot_index).expect("just allocated").exit.clone()
        };
        let info = SessionInfo {
            channels: self.channels.clone(),
            sample_rate: self.sample_rate,
            board_type: self.board_type,
        };
        let table = self.table.clone();
        let cancel = self.cancel.clone();
        match TransmitTask::new(socket, receiver, info, slot_index, table.clone(), cancel, subscriber_exit) {
            Ok(task) => {
                let name = format!("transmit-{slot_index}");
                if std::thread::Builder::new().name(name).spawn(move || task.run()).is_err() {
                    warn!("Listener: failed to spawn transmit task for slot {slot_index}");
                    table.lock().expect("subscriber table poisoned").release(slot_index);
                }
            }
            Err(e) => {
                warn!("Listener: failed to prepare transmit task: {e}");
                table.lock().expect("subscriber table poisoned").release(slot_index);
            }
        }
    }
}
