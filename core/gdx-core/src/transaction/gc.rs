//! Delta compaction.
//!
//! Removes deltas that no reader can observe any more. For one row in one
//! version layer, a delta is observable at point `P` when it is the latest
//! delta with generation ≤ `P`. Observation points of a layer are:
//!
//! 1. every registered reader snapshot and the current published generation
//! 2. every base (and pinned base) recorded by the layer's direct children
//!
//! Everything else is superseded and dropped. The newest delta of each group
//! is always kept.

use crate::storage::delta_store::{DeltaKey, DeltaStore};
use crate::transaction::{Generation, VersionId};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionStats {
    pub tables: usize,
    pub examined: usize,
    pub removed: usize,
}

/// Observation points per version layer; `global` applies to every layer.
#[derive(Debug, Default)]
pub struct ObservationPoints {
    pub global: Vec<Generation>,
    pub per_version: HashMap<VersionId, Vec<Generation>>,
}

impl ObservationPoints {
    fn observed(&self, version: VersionId, from: Generation, until: Option<Generation>) -> bool {
        let in_window = |p: &Generation| *p >= from && until.is_none_or(|u| *p < u);
        self.global.iter().any(in_window)
            || self
                .per_version
                .get(&version)
                .is_some_and(|points| points.iter().any(in_window))
    }
}

#[derive(Debug, Default)]
pub struct DeltaCompactor;

impl DeltaCompactor {
    pub fn new() -> Self {
        Self
    }

    /// Compact every table. Caller holds the commit lock.
    pub fn collect(&self, store: &DeltaStore, points: &ObservationPoints) -> CompactionStats {
        let mut stats = CompactionStats::default();
        for table in store.table_ids() {
            let Some(map) = store.table(table) else {
                continue;
            };
            stats.tables += 1;

            let keys: Vec<DeltaKey> = map.iter().map(|e| *e.key()).collect();
            stats.examined += keys.len();

            let mut doomed = Vec::new();
            for (i, key) in keys.iter().enumerate() {
                let next = keys
                    .get(i + 1)
                    .filter(|n| n.row_id == key.row_id && n.version == key.version);
                let Some(next) = next else {
                    continue;
                };
                if !points.observed(key.version, key.generation, Some(next.generation)) {
                    doomed.push(*key);
                }
            }
            for key in doomed {
                if map.remove(&key).is_some() {
                    stats.removed += 1;
                }
            }
        }
        debug!(
            tables = stats.tables,
            examined = stats.examined,
            removed = stats.removed,
            "delta compaction finished"
        );
        stats
    }
}
