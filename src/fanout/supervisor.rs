//! Supervisor (§4.8): heartbeat, status-timer, shutdown propagation.
//!
//! Console status rendering itself is an out-of-scope external collaborator
//! (§1); what lives here is the timing/poll loop and the shutdown sequence
//! that actually belongs to this crate.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::fanout::ring::RingFlag;
use crate::fanout::subscriber::SubscriberTable;
use crate::fanout::sync::CancellationToken;

/// Upper bound on how long shutdown waits for tasks to acknowledge (§4.8).
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
/// Main supervisor loop poll granularity.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Supervisor configuration, derived from `HeartbeatInt`, `RefreshTime`,
/// `CheckStdin` (§6).
pub struct SupervisorConfig {
    /// Seconds between heartbeats (at most once per second regardless).
    pub heartbeat_interval: Duration,
    /// Seconds between status-report renders.
    pub refresh_interval: Duration,
    /// Whether to read stdin for an interactive status-log reset.
    pub check_stdin: bool,
}

/// Something external the supervisor polls for a shutdown signal — the
/// ring buffer's flag, per §4.8. Kept generic over the concrete ring
/// binding the same way [`crate::fanout::ring::RingSource`] is.
pub trait TerminationSource: Send {
    /// Poll for a termination request.
    fn poll(&mut self) -> RingFlag;
}

/// Drives heartbeat/status timers, watches for shutdown, and joins the
/// other tasks when it's time to stop.
pub struct Supervisor<T: TerminationSource> {
    table: Arc<Mutex<SubscriberTable>>,
    cancel: CancellationToken,
    config: SupervisorConfig,
    termination: T,
    self_pid: u32,
}

impl<T: TerminationSource> Supervisor<T> {
    /// Build a new supervisor.
    pub fn new(table: Arc<Mutex<SubscriberTable>>, cancel: CancellationToken, config: SupervisorConfig, termination: T, self_pid: u32) -> Self {
        Supervisor {
            table,
            cancel,
            config,
            termination,
            self_pid,
        }
    }

    /// Run until cancellation, then join `handles` (listener + RingReader)
    /// with a bounded grace period before returning.
    pub fn run(mut self, handles: Vec<JoinHandle<()>>) {
        if self.config.check_stdin {
            spawn_stdin_watcher();
        }

        let mut last_heartbeat = Instant::now();
        let mut last_refresh = Instant::now();

        while !self.cancel.is_canceled() {
            match self.termination.poll() {
                RingFlag::Terminate => {
                    info!("Supervisor: TERMINATE observed");
                    break;
                }
                RingFlag::SelfPid(pid) if pid == self.self_pid => {
                    info!("Supervisor: self-pid termination observed");
                    break;
                }
                RingFlag::SelfPid(_) | RingFlag::Running => {}
            }

            let now = Instant::now();
            if now.duration_since(last_heartbeat) >= self.config.heartbeat_interval.max(Duration::from_secs(1)) {
                debug!("Supervisor: heartbeat");
                last_heartbeat = now;
            }
            if now.duration_since(last_refresh) >= self.config.refresh_interval {
                self.render_status();
                last_refresh = now;
            }

            std::thread::sleep(POLL_INTERVAL);
        }

        self.shutdown(handles);
    }

    fn render_status(&self) {
        let table = self.table.lock().expect("subscriber table poisoned");
        info!("Supervisor: {}/{} subscriber slots active", table.active_count(), table.capacity());
    }

    fn shutdown(&mut self, handles: Vec<JoinHandle<()>>) {
        info!("Supervisor: shutting down");
        self.cancel.cancel();
        self.table.lock().expect("subscriber table poisoned").cancel_all();

        let deadline = Instant::now() + SHUTDOWN_GRACE;
        for handle in handles {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if !join_with_timeout(handle, remaining) {
                warn!("Supervisor: a task did not acknowledge shutdown within the grace period");
            }
        }
        info!("Supervisor: detached from ring, exiting");
    }
}

/// A [`TerminationSource`] that never fires. Process shutdown is driven
/// entirely by the shared [`CancellationToken`] (SIGINT, or the
/// RingReader observing its own TERMINATE/self-pid flag) — this is what
/// a deployment reaches for when the ring's flag is already being
/// watched elsewhere and the supervisor only needs the timer loop.
pub struct NullTermination;

impl TerminationSource for NullTermination {
    fn poll(&mut self) -> RingFlag {
        RingFlag::Running
    }
}

fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration) -> bool {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let _ = handle.join();
        let _ = tx.send(());
    });
    rx.recv_timeout(timeout).is_ok()
}

fn spawn_stdin_watcher() {
    std::thread::Builder::new()
        .name("stdin-watcher".to_string())
        .spawn(|| {
            let mut line = String::new();
            while std::io::stdin().read_line(&mut line).unwrap_or(0) > 0 {
                debug!("Supervisor: stdin command {:?}, resetting status log", line.trim());
                line.clear();
            }
        })
        .ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysRunning;
    impl TerminationSource for AlwaysRunning {
        fn poll(&mut self) -> RingFlag {
            RingFlag::Running
        }
    }

    struct FireAfter {
        remaining: u32,
    }
    impl TerminationSource for FireAfter {
        fn poll(&mut self) -> RingFlag {
            if self.remaining == 0 {
                RingFlag::Terminate
            } else {
                self.remaining -= 1;
                RingFlag::Running
            }
        }
    }

    #[test]
    fn shuts_down_on_terminate_flag() {
        let table = Arc::new(Mutex::new(SubscriberTable::new(2)));
        let cancel = CancellationToken::new();
        let cfg = SupervisorConfig {
            heartbeat_interval: Duration::from_millis(10),
            refresh_interval: Duration::from_millis(10),
            check_stdin: false,
        };
        let sup = Supervisor::new(table, cancel.clone(), cfg, FireAfter { remaining: 1 }, 1);
        sup.run(Vec::new());
        assert!(cancel.is_canceled());
    }

    #[test]
    fn external_cancel_stops_the_loop() {
        let table = Arc::new(Mutex::new(SubscriberTable::new(2)));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let cfg = SupervisorConfig {
            heartbeat_interval: Duration::from_secs(1),
            refresh_interval: Duration::from_secs(1),
            check_stdin: false,
        };
        let sup = Supervisor::new(table, cancel, cfg, AlwaysRunning, 1);
        sup.run(Vec::new());
    }
}
