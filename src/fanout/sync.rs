//! Cooperative cancellation, grounded on the `CancellationToken` usage in
//! `mtgraph.rs` (`.new()`, `.clone()`, `.cancel()`, `.is_canceled()`):
//! an `Arc<AtomicBool>` rather than a condvar, since every checker here
//! polls on its own schedule (sleep loop, accept timeout) instead of
//! blocking on cancellation specifically.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cheap, cloneable "please stop" flag shared across tasks.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new, not-yet-canceled token.
    #[must_use]
    pub fn new() -> Self {
        CancellationToken {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether [`Self::cancel`] has been called on this token or a clone.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_shares_state() {
        let t1 = CancellationToken::new();
        let t2 = t1.clone();
        assert!(!t1.is_canceled());
        t2.cancel();
        assert!(t1.is_canceled());
    }
}
