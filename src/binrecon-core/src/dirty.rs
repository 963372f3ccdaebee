//! Snapshot-swap publication of the set of offsets modified by a script run.
//!
//! The writer mutates a private set while a run executes, then atomically
//! publishes a new immutable reference. Readers (the UI renderer) read the
//! published reference once per frame — lock-free, and they see either the
//! old or the new set, never a torn intermediate state.

use arc_swap::ArcSwap;
use std::collections::HashSet;
use std::sync::Arc;

/// A lock-free, snapshot-readable set of dirty file offsets.
pub struct DirtySet {
    published: ArcSwap<HashSet<u64>>,
}

impl Default for DirtySet {
    fn default() -> Self {
        Self::new()
    }
}

impl DirtySet {
    pub fn new() -> Self {
        DirtySet {
            published: ArcSwap::from_pointee(HashSet::new()),
        }
    }

    /// A lock-free read of the most recently published set.
    pub fn snapshot(&self) -> Arc<HashSet<u64>> {
        self.published.load_full()
    }

    /// Start a private working copy seeded from the last published set — use
    /// this at the start of a run, mutate it locally, and call [`Self::publish`]
    /// once at the end.
    pub fn begin(&self) -> HashSet<u64> {
        (*self.snapshot()).clone()
    }

    /// Atomically publish `offsets` as the new snapshot.
    pub fn publish(&self, offsets: HashSet<u64>) {
        self.published.store(Arc::new(offsets));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_is_visible_to_later_snapshots() {
        let dirty = DirtySet::new();
        assert!(dirty.snapshot().is_empty());

        let mut working = dirty.begin();
        working.insert(0x1000);
        working.insert(0x1004);
        dirty.publish(working);

        let snapshot = dirty.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.contains(&0x1000));
    }

    #[test]
    fn concurrent_readers_never_observe_a_torn_set() {
        use std::sync::Barrier;
        use std::thread;

        let dirty = Arc::new(DirtySet::new());
        let mut initial = dirty.begin();
        initial.insert(1);
        dirty.publish(initial);

        let barrier = Arc::new(Barrier::new(2));
        let reader_dirty = Arc::clone(&dirty);
        let reader_barrier = Arc::clone(&barrier);
        let reader = thread::spawn(move || {
            reader_barrier.wait();
            for _ in 0..1000 {
                let snap = reader_dirty.snapshot();
                assert!(snap.len() == 1 || snap.len() == 2);
            }
        });

        barrier.wait();
        let mut next = dirty.begin();
        next.insert(2);
        dirty.publish(next);

        reader.join().unwrap();
    }
}
