//! Delta Store — append-only versioned row deltas backed by SkipList and DashMap.
//!
//! Every committed change is stored under `(row_id, version, generation)`.
//! Keys of one row sit next to each other, so resolving a row through a
//! shadow chain is a handful of O(log N) range probes. Entries are never
//! mutated in place; compaction only removes deltas no reader can observe.

use crate::error::{GdxError, GdxResult};
use crate::schema::{FieldId, RowId, TableId, Value};
use crate::transaction::{Generation, VersionId};
use crossbeam_skiplist::SkipMap;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Stored field values of one row, keyed by stable field id.
pub type Record = BTreeMap<FieldId, Value>;

/// One row-level change inside a delta generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Change {
    Upsert(Record),
    /// Tombstone; shadows every ancestor value of the row.
    Delete,
}

impl Change {
    pub fn record(&self) -> Option<&Record> {
        match self {
            Change::Upsert(r) => Some(r),
            Change::Delete => None,
        }
    }

    pub fn from_state(state: Option<Record>) -> Self {
        state.map_or(Change::Delete, Change::Upsert)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeltaKey {
    pub row_id: RowId,
    pub version: VersionId,
    pub generation: Generation,
}

impl DeltaKey {
    pub fn new(row_id: RowId, version: VersionId, generation: Generation) -> Self {
        Self {
            row_id,
            version,
            generation,
        }
    }

    fn row_start(row_id: RowId) -> Self {
        Self::new(row_id, VersionId(0), Generation::ZERO)
    }
}

/// Ordered deltas of one table.
pub type TableDeltas = SkipMap<DeltaKey, Arc<Change>>;

/// Latest delta of `row_id` in `version` with generation ≤ `cutoff`.
pub fn latest_in(
    map: &TableDeltas,
    row_id: RowId,
    version: VersionId,
    cutoff: Generation,
) -> Option<Arc<Change>> {
    let lo = DeltaKey::new(row_id, version, Generation::ZERO);
    let hi = DeltaKey::new(row_id, version, cutoff);
    map.range(lo..=hi).next_back().map(|e| e.value().clone())
}

/// Smallest row id ≥ `from` that has any delta at all.
pub fn next_row_in(map: &TableDeltas, from: RowId) -> Option<RowId> {
    map.range(DeltaKey::row_start(from)..)
        .next()
        .map(|e| e.key().row_id)
}

/// Rows with at least one delta in `version` whose generation satisfies `gen_filter`.
pub fn rows_in_layer(
    map: &TableDeltas,
    version: VersionId,
    gen_filter: impl Fn(Generation) -> bool,
) -> BTreeSet<RowId> {
    map.iter()
        .filter(|e| e.key().version == version && gen_filter(e.key().generation))
        .map(|e| e.key().row_id)
        .collect()
}

/// Tier 1: concurrent in-memory delta storage, one `SkipMap` per table.
#[derive(Debug, Default)]
pub struct DeltaStore {
    #[allow(clippy::type_complexity)]
    tables: DashMap<TableId, Arc<TableDeltas>>,
}

impl DeltaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ensure_table(&self, table: TableId) -> Arc<TableDeltas> {
        self.tables
            .entry(table)
            .or_insert_with(|| Arc::new(SkipMap::new()))
            .value()
            .clone()
    }

    pub fn table(&self, table: TableId) -> Option<Arc<TableDeltas>> {
        self.tables.get(&table).map(|t| t.value().clone())
    }

    /// Drops every delta of a table across all versions; returns the count removed.
    pub fn drop_table(&self, table: TableId) -> usize {
        self.tables
            .remove(&table)
            .map(|(_, map)| map.len())
            .unwrap_or(0)
    }

    pub fn append(&self, table: TableId, key: DeltaKey, change: Change) -> GdxResult<()> {
        let map = self
            .table(table)
            .ok_or_else(|| GdxError::Storage(format!("no delta layer for table {}", table)))?;
        map.insert(key, Arc::new(change));
        Ok(())
    }

    /// Removes a version's whole layer; returns the count removed.
    pub fn purge_version(&self, version: VersionId) -> usize {
        let mut removed = 0;
        for entry in self.tables.iter() {
            let keys: Vec<DeltaKey> = entry
                .value()
                .iter()
                .filter(|e| e.key().version == version)
                .map(|e| *e.key())
                .collect();
            for key in keys {
                if entry.value().remove(&key).is_some() {
                    removed += 1;
                }
            }
        }
        removed
    }

    pub fn table_ids(&self) -> Vec<TableId> {
        let mut ids: Vec<TableId> = self.tables.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }

    /// Total delta count across all tables.
    pub fn entry_count(&self) -> usize {
        self.tables.iter().map(|e| e.value().len()).sum()
    }

    /// Highest row id ever written to a table.
    pub fn max_row_id(&self, table: TableId) -> Option<RowId> {
        self.table(table)
            .and_then(|map| map.back().map(|e| e.key().row_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(v: i64) -> Change {
        let mut r = Record::new();
        r.insert(FieldId(1), Value::Integer(v));
        Change::Upsert(r)
    }

    #[test]
    fn latest_respects_cutoff_and_version() {
        let store = DeltaStore::new();
        let t = TableId(1);
        store.ensure_table(t);
        let v0 = VersionId::DEFAULT;
        let v1 = VersionId(1);
        store.append(t, DeltaKey::new(5, v0, Generation(2)), rec(1)).unwrap();
        store.append(t, DeltaKey::new(5, v0, Generation(4)), rec(2)).unwrap();
        store.append(t, DeltaKey::new(5, v1, Generation(3)), Change::Delete).unwrap();

        let map = store.table(t).unwrap();
        assert_eq!(latest_in(&map, 5, v0, Generation(1)), None);
        assert_eq!(*latest_in(&map, 5, v0, Generation(3)).unwrap(), rec(1));
        assert_eq!(*latest_in(&map, 5, v0, Generation(9)).unwrap(), rec(2));
        assert_eq!(*latest_in(&map, 5, v1, Generation(9)).unwrap(), Change::Delete);
        assert_eq!(latest_in(&map, 6, v0, Generation(9)), None);
    }

    #[test]
    fn next_row_skips_gaps() {
        let store = DeltaStore::new();
        let t = TableId(1);
        store.ensure_table(t);
        for row in [2, 7, 9] {
            store
                .append(t, DeltaKey::new(row, VersionId::DEFAULT, Generation(1)), rec(row))
                .unwrap();
        }
        let map = store.table(t).unwrap();
        assert_eq!(next_row_in(&map, 0), Some(2));
        assert_eq!(next_row_in(&map, 3), Some(7));
        assert_eq!(next_row_in(&map, 10), None);
        assert_eq!(store.max_row_id(t), Some(9));
    }

    #[test]
    fn purge_and_drop() {
        let store = DeltaStore::new();
        let t = TableId(1);
        store.ensure_table(t);
        store.append(t, DeltaKey::new(1, VersionId(3), Generation(1)), rec(1)).unwrap();
        store.append(t, DeltaKey::new(1, VersionId::DEFAULT, Generation(1)), rec(1)).unwrap();
        assert_eq!(store.purge_version(VersionId(3)), 1);
        assert_eq!(store.entry_count(), 1);
        assert_eq!(store.drop_table(t), 1);
        assert!(store.append(t, DeltaKey::new(1, VersionId(0), Generation(2)), rec(1)).is_err());
    }
}
