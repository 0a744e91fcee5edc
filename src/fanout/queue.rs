//! Bounded per-subscriber queue + wake signal (§4.5, §5).
//!
//! Grounded on `NCReadStream`/`NCWriteStream` in `stream.rs`
//! (`Mutex<VecDeque<T>>` + `Condvar`, `capacity` field, `notify_all` on
//! push/pop): unlike that stream, which documents capacity but doesn't
//! enforce it on push, this queue's `try_push` is the admission-control
//! point required here (full queue → drop + log, not grow).

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::error::{Result, SeismuxError};

/// Queue capacity, in messages (§5).
pub const QUEUE_CAPACITY: usize = 32;
/// Largest single element the queue accepts, bytes (§4.5).
pub const MAX_ELEMENT_LEN: usize = 16 * 1024;

struct Inner {
    items: Mutex<VecDeque<Vec<u8>>>,
    cv: Condvar,
    shutdown: Mutex<bool>,
}

/// The write half: `RingReader` enqueues onto this.
#[derive(Clone)]
pub struct QueueSender {
    inner: Arc<Inner>,
}

/// The read half: a subscriber's `Transmit` task dequeues from this.
pub struct QueueReceiver {
    inner: Arc<Inner>,
}

/// Create a new bounded queue pair.
#[must_use]
pub fn bounded() -> (QueueSender, QueueReceiver) {
    let inner = Arc::new(Inner {
        items: Mutex::new(VecDeque::new()),
        cv: Condvar::new(),
        shutdown: Mutex::new(false),
    });
    (
        QueueSender { inner: inner.clone() },
        QueueReceiver { inner },
    )
}

impl QueueSender {
    /// Non-blocking push. Fails (and the caller should drop + log) if the
    /// queue is at capacity or the element exceeds [`MAX_ELEMENT_LEN`].
    pub fn try_push(&self, item: Vec<u8>) -> Result<()> {
        if item.len() > MAX_ELEMENT_LEN {
            return Err(SeismuxError::Capacity(format!(
                "message of {} bytes exceeds the {MAX_ELEMENT_LEN}-byte element limit",
                item.len()
            )));
        }
        let mut items = self.inner.items.lock().expect("queue poisoned");
        if items.len() >= QUEUE_CAPACITY {
            return Err(SeismuxError::Capacity("subscriber queue full".into()));
        }
        items.push_back(item);
        self.inner.cv.notify_all();
        Ok(())
    }

    /// Signal shutdown; a blocked [`QueueReceiver::recv`] wakes and
    /// returns `None`.
    pub fn shutdown(&self) {
        *self.inner.shutdown.lock().expect("queue poisoned") = true;
        self.inner.cv.notify_all();
    }
}

impl QueueReceiver {
    /// Block (with a bounded poll interval, so shutdown is observed
    /// promptly) until a message is available, shutdown is signaled, or
    /// the queue is dropped. Returns `None` on shutdown/drop.
    pub fn recv(&self) -> Option<Vec<u8>> {
        let mut items = self.inner.items.lock().expect("queue poisoned");
        loop {
            if let Some(item) = items.pop_front() {
                return Some(item);
            }
            if *self.inner.shutdown.lock().expect("queue poisoned") {
                return None;
            }
            let (guard, _timeout) = self
                .inner
                .cv
                .wait_timeout(items, Duration::from_millis(100))
                .expect("queue poisoned");
            items = guard;
        }
    }

    /// Current queued message count (used by status reporting).
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.items.lock().expect("queue poisoned").len()
    }

    /// True if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_then_recv_preserves_order() {
        let (tx, rx) = bounded();
        tx.try_push(vec![1]).unwrap();
        tx.try_push(vec![2]).unwrap();
        assert_eq!(rx.recv(), Some(vec![1]));
        assert_eq!(rx.recv(), Some(vec![2]));
    }

    #[test]
    fn rejects_oversize_element() {
        let (tx, _rx) = bounded();
        let big = vec![0u8; MAX_ELEMENT_LEN + 1];
        assert!(tx.try_push(big).is_err());
    }

    #[test]
    fn drops_when_full() {
        let (tx, _rx) = bounded();
        for i in 0..QUEUE_CAPACITY {
            tx.try_push(vec![i as u8]).unwrap();
        }
        assert!(tx.try_push(vec![99]).is_err());
    }

    #[test]
    fn shutdown_unblocks_recv() {
        let (tx, rx) = bounded();
        let handle = std::thread::spawn(move || rx.recv());
        std::thread::sleep(Duration::from_millis(20));
        tx.shutdown();
        assert_eq!(handle.join().unwrap(), None);
    }
}
