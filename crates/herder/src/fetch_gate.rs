//! Pending-callback registry keyed by content hash.
//!
//! Validation of a statement often depends on content (a transaction set,
//! a quorum set) that has not arrived yet. The gate parks the continuation
//! under the content hash; when the content arrives, [`release`] drains the
//! entry and runs every continuation in registration order, exactly once.
//!
//! Continuations may enqueue further work but must not block.
//!
//! [`release`]: FetchGate::release

use corral_common::Hash256;
use dashmap::DashMap;
use tracing::trace;

/// A parked continuation awaiting content.
pub type Continuation<V> = Box<dyn FnOnce(V) + Send + Sync>;

/// Hash-keyed waiter queues for one content type.
pub struct FetchGate<V> {
    waiters: DashMap<Hash256, Vec<Continuation<V>>>,
}

impl<V: Clone> FetchGate<V> {
    pub fn new() -> Self {
        Self {
            waiters: DashMap::new(),
        }
    }

    /// Park a continuation until content with this hash arrives.
    pub fn wait_on(&self, hash: Hash256, continuation: Continuation<V>) {
        self.waiters.entry(hash).or_default().push(continuation);
    }

    /// Content arrived: drain the entry and run each continuation with a
    /// clone of the value, in registration order. Does nothing when nobody
    /// is waiting. Returns the number of continuations released.
    pub fn release(&self, hash: &Hash256, value: V) -> usize {
        let Some((_, continuations)) = self.waiters.remove(hash) else {
            return 0;
        };
        let released = continuations.len();
        trace!(item = %hash.to_hex_prefix(), waiters = released, "releasing fetch gate");
        for continuation in continuations {
            continuation(value.clone());
        }
        released
    }

    /// Number of waiters parked under a hash.
    pub fn waiting_on(&self, hash: &Hash256) -> usize {
        self.waiters.get(hash).map_or(0, |entry| entry.len())
    }

    /// Drop all waiters without running them.
    pub fn clear(&self) {
        self.waiters.clear();
    }
}

impl<V: Clone> Default for FetchGate<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_release_runs_in_registration_order() {
        let gate: FetchGate<u32> = FetchGate::new();
        let hash = Hash256::hash(b"content");

        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = Arc::clone(&order);
            gate.wait_on(
                hash,
                Box::new(move |value| {
                    order.lock().push((i, value));
                }),
            );
        }

        assert_eq!(gate.release(&hash, 9), 3);
        assert_eq!(*order.lock(), vec![(0, 9), (1, 9), (2, 9)]);
    }

    #[test]
    fn test_release_fires_exactly_once() {
        let gate: FetchGate<u32> = FetchGate::new();
        let hash = Hash256::hash(b"content");
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&fired);
        gate.wait_on(
            hash,
            Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert_eq!(gate.release(&hash, 1), 1);
        assert_eq!(gate.release(&hash, 1), 0);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_release_without_waiters_is_noop() {
        let gate: FetchGate<u32> = FetchGate::new();
        assert_eq!(gate.release(&Hash256::hash(b"nobody"), 1), 0);
    }

    #[test]
    fn test_clear_drops_waiters_silently() {
        let gate: FetchGate<u32> = FetchGate::new();
        let hash = Hash256::hash(b"content");
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&fired);
        gate.wait_on(
            hash,
            Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        gate.clear();
        assert_eq!(gate.release(&hash, 1), 0);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
