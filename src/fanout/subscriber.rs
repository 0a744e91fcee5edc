//! Subscriber entity and the fixed-capacity slot table (§3, §4.7, §9).
//!
//! `UserInfo[MAX_CONNECT_USERS]` becomes a `Vec<Option<Subscriber>>` sized
//! once at startup — fixed capacity, index-addressable, in-use bit per
//! slot, exactly as §9 asks ("do not replace with unbounded dynamic
//! allocation — the cap is an intentional admission-control knob").

use std::net::IpAddr;
use std::time::SystemTime;

use crate::fanout::queue::QueueSender;
use crate::fanout::sync::CancellationToken;

/// Default subscriber table size (`MAX_CONNECT_USERS`, §4.7).
pub const DEFAULT_MAX_CONNECT_USERS: usize = 8;

/// Connection lifecycle state of one subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
    /// Accepted, info line not yet sent.
    Connecting,
    /// Info line sent, framed traffic flowing.
    Connected,
    /// Slot is being torn down and will be released.
    Restarting,
}

/// One connected TCP subscriber (§3). Allocated by the listener, owned by
/// its `Transmit` task.
pub struct Subscriber {
    /// Index into the slot table; stable for the subscriber's lifetime.
    pub slot_index: usize,
    /// Peer address, recorded at accept time.
    pub remote_ip: IpAddr,
    /// Peer port, recorded at accept time.
    pub remote_port: u16,
    /// When this slot was allocated.
    pub connect_time: SystemTime,
    /// Last time a message was sent to this subscriber.
    pub last_update_time: SystemTime,
    /// Total packets transmitted (status-report counter).
    pub packets_sent: u64,
    /// Send side of the subscriber's bounded message queue; the
    /// RingReader pushes here, the Transmit task pops.
    pub queue: QueueSender,
    /// Lifecycle state.
    pub state: SubscriberState,
    /// Cooperative per-subscriber shutdown flag, checked by the Transmit
    /// task alongside the process-wide token (§5 cancellation model).
    pub exit: CancellationToken,
}

/// Fixed-capacity pool of subscriber slots, guarded by the caller's mutex
/// (`userMx` in the source; here, whatever `Mutex<SubscriberTable>` the
/// caller wraps this in).
pub struct SubscriberTable {
    slots: Vec<Option<Subscriber>>,
}

impl SubscriberTable {
    /// Create a table with `capacity` slots, all initially free.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        SubscriberTable { slots }
    }

    /// Allocate the first free slot, an O(n) linear scan (§4.7). Returns
    /// `None` if the table is full.
    pub fn allocate(&mut self, remote_ip: IpAddr, remote_port: u16, queue: QueueSender) -> Option<usize> {
        let idx = self.slots.iter().position(Option::is_none)?;
        let now = SystemTime::now();
        self.slots[idx] = Some(Subscriber {
            slot_index: idx,
            remote_ip,
            remote_port,
            connect_time: now,
            last_update_time: now,
            packets_sent: 0,
            queue,
            state: SubscriberState::Connecting,
            exit: CancellationToken::new(),
        });
        Some(idx)
    }

    /// Release a slot, freeing it for reuse.
    pub fn release(&mut self, slot_index: usize) {
        self.slots[slot_index] = None;
    }

    /// Mutable access to one slot's subscriber, if occupied.
    pub fn get_mut(&mut self, slot_index: usize) -> Option<&mut Subscriber> {
        self.slots[slot_index].as_mut()
    }

    /// Iterate over all in-use subscribers (fan-out enqueue loop, §4.5).
    pub fn in_use_iter(&self) -> impl Iterator<Item = &Subscriber> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    /// Number of occupied slots (status reporting).
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Total slot capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Signal every in-use subscriber's exit token (supervisor shutdown).
    pub fn cancel_all(&self) {
        for sub in self.in_use_iter() {
            sub.exit.cancel();
            sub.queue.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fanout::queue::bounded;
    use std::net::Ipv4Addr;

    fn mk_queue() -> QueueSender {
        bounded().0
    }

    #[test]
    fn allocate_and_release_reuses_slot() {
        let mut table = SubscriberTable::new(2);
        let a = table.allocate(IpAddr::V4(Ipv4Addr::LOCALHOST), 1, mk_queue()).unwrap();
        let b = table.allocate(IpAddr::V4(Ipv4Addr::LOCALHOST), 2, mk_queue()).unwrap();
        assert_ne!(a, b);
        assert!(table.allocate(IpAddr::V4(Ipv4Addr::LOCALHOST), 3, mk_queue()).is_none());
        table.release(a);
        let c = table.allocate(IpAddr::V4(Ipv4Addr::LOCALHOST), 4, mk_queue()).unwrap();
        assert_eq!(c, a);
    }

    #[test]
    fn active_count_tracks_occupancy() {
        let mut table = SubscriberTable::new(DEFAULT_MAX_CONNECT_USERS);
        assert_eq!(table.active_count(), 0);
        table.allocate(IpAddr::V4(Ipv4Addr::LOCALHOST), 1, mk_queue());
        assert_eq!(table.active_count(), 1);
    }

    #[test]
    fn cancel_all_marks_every_subscriber_exit_token() {
        let mut table = SubscriberTable::new(2);
        let a = table.allocate(IpAddr::V4(Ipv4Addr::LOCALHOST), 1, mk_queue()).unwrap();
        table.cancel_all();
        assert!(table.get_mut(a).unwrap().exit.is_canceled());
    }
}
