use crate::transaction::Generation;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// A source of monotonically increasing delta generations.
///
/// - `next`: allocates the generation a commit writes under (commit lock held).
/// - `publish`: makes a fully written generation visible to readers.
/// - `read`: the newest published generation, i.e. the snapshot a new reader sees.
#[derive(Debug)]
pub struct TimestampOracle {
    /// Last allocated generation.
    next_gen: AtomicU64,
    /// Last generation whose deltas are completely appended.
    published: AtomicU64,
}

impl TimestampOracle {
    /// Create a new oracle whose first allocation is `start + 1`.
    pub fn new(start: u64) -> Self {
        Self {
            next_gen: AtomicU64::new(start),
            published: AtomicU64::new(start),
        }
    }

    /// Allocate and return the next generation.
    pub fn next(&self) -> Generation {
        Generation(self.next_gen.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Publish a generation; never moves the watermark backwards.
    pub fn publish(&self, generation: Generation) {
        self.published.fetch_max(generation.0, Ordering::SeqCst);
    }

    /// Newest published generation.
    pub fn read(&self) -> Generation {
        Generation(self.published.load(Ordering::SeqCst))
    }

    /// Fast-forward after journal replay.
    pub(crate) fn advance_to(&self, generation: Generation) {
        self.next_gen.fetch_max(generation.0, Ordering::SeqCst);
        self.publish(generation);
    }
}

impl Default for TimestampOracle {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Snapshots held by open cursors and in-flight reads.
///
/// Compaction keeps every delta a registered snapshot can still observe.
#[derive(Debug, Default)]
pub struct SnapshotRegistry {
    /// Active snapshots: token -> generation
    active: DashMap<u64, Generation>,
    next_token: AtomicU64,
    /// Serializes "read published + register" against compaction's watermark scan.
    gate: Mutex<()>,
}

impl SnapshotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the oracle's current published generation as a snapshot.
    pub fn acquire(self: &Arc<Self>, oracle: &TimestampOracle) -> SnapshotGuard {
        let _gate = self.gate.lock();
        let generation = oracle.read();
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.active.insert(token, generation);
        SnapshotGuard {
            registry: Arc::clone(self),
            token,
            generation,
        }
    }

    /// Registered snapshots plus the current published generation.
    pub fn protected(&self, oracle: &TimestampOracle) -> Vec<Generation> {
        let _gate = self.gate.lock();
        let mut out: Vec<Generation> = self.active.iter().map(|e| *e.value()).collect();
        out.push(oracle.read());
        out.sort();
        out.dedup();
        out
    }

    /// Get the minimum active snapshot.
    pub fn min_active(&self) -> Option<Generation> {
        self.active.iter().map(|e| *e.value()).min()
    }

    /// Get the number of active snapshots.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

/// RAII registration of a reader snapshot.
#[derive(Debug)]
pub struct SnapshotGuard {
    registry: Arc<SnapshotRegistry>,
    token: u64,
    generation: Generation,
}

impl SnapshotGuard {
    pub fn generation(&self) -> Generation {
        self.generation
    }
}

impl Drop for SnapshotGuard {
    fn drop(&mut self) {
        self.registry.active.remove(&self.token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_is_invisible_until_published() {
        let oracle = TimestampOracle::default();
        let g1 = oracle.next();
        let g2 = oracle.next();
        assert_eq!(g1, Generation(1));
        assert_eq!(g2, Generation(2));
        assert_eq!(oracle.read(), Generation(0));
        oracle.publish(g2);
        oracle.publish(g1);
        assert_eq!(oracle.read(), g2);
    }

    #[test]
    fn guards_deregister_on_drop() {
        let oracle = TimestampOracle::default();
        let registry = Arc::new(SnapshotRegistry::new());
        let g = oracle.next();
        oracle.publish(g);
        let guard = registry.acquire(&oracle);
        assert_eq!(guard.generation(), g);
        oracle.publish(oracle.next());
        assert_eq!(registry.min_active(), Some(g));
        assert_eq!(registry.protected(&oracle), vec![Generation(1), Generation(2)]);
        drop(guard);
        assert_eq!(registry.active_count(), 0);
        assert_eq!(registry.min_active(), None);
    }
}
