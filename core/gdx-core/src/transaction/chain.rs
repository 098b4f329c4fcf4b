//! Shadow Chain — 버전 조상 체인 기반 행 가시성 해석
//!
//! A reader of version `v` at snapshot `S` sees, for each row, the first delta
//! found walking `v → parent → … → DEFAULT`, where each link only considers
//! deltas up to its cutoff:
//!
//! ```text
//! link 0: (v,       S)
//! link 1: (parent,  base_at(v, S))
//! link 2: (grand,   base_at(parent, base_at(v, S)))
//! ```
//!
//! `base_at` reads the version's base history: every reconcile appends an
//! entry recording which parent generation the version is now based on.
//! Rows left in conflict by a `Continue` reconcile are pinned to their old
//! base so the next reconcile sees the same ancestor state.

use crate::schema::{RowId, TableId};
use crate::storage::delta_store::{Change, Record, TableDeltas, latest_in};
use crate::transaction::{Generation, VersionId};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Per-row base overrides left by unresolved conflicts.
pub type PinSet = BTreeMap<(TableId, RowId), Generation>;

/// One step of a version's base history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseEntry {
    /// Generation from which this entry applies.
    pub since: Generation,
    /// Parent generation the version reads through.
    pub base: Generation,
    pub pins: PinSet,
}

impl BaseEntry {
    pub fn new(since: Generation, base: Generation) -> Self {
        Self {
            since,
            base,
            pins: PinSet::new(),
        }
    }

    /// Parent cutoff for one row.
    pub fn cutoff_for(&self, table: TableId, row_id: RowId) -> Generation {
        self.pins
            .get(&(table, row_id))
            .copied()
            .unwrap_or(self.base)
    }
}

/// Entry in effect at generation `at`; the oldest entry when `at` predates them all.
pub fn entry_at(history: &[Arc<BaseEntry>], at: Generation) -> Option<&Arc<BaseEntry>> {
    let idx = history.partition_point(|e| e.since <= at);
    if idx == 0 {
        history.first()
    } else {
        history.get(idx - 1)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ChainLink {
    pub(crate) version: VersionId,
    pub(crate) cutoff: Generation,
    /// Base history of `version`, consulted when a pin diverts the walk.
    pub(crate) history: Arc<[Arc<BaseEntry>]>,
    /// Entry that produced the next link's cutoff.
    pub(crate) step: Option<Arc<BaseEntry>>,
}

/// Shadow-resolution order of one version at one snapshot.
#[derive(Debug, Clone)]
pub struct ShadowChain {
    pub(crate) links: SmallVec<[ChainLink; 4]>,
    pub(crate) has_pins: bool,
}

impl ShadowChain {
    pub(crate) fn new(links: SmallVec<[ChainLink; 4]>) -> Self {
        let has_pins = links
            .iter()
            .any(|l| l.step.as_ref().is_some_and(|s| !s.pins.is_empty()));
        Self { links, has_pins }
    }

    pub fn version(&self) -> VersionId {
        self.links[0].version
    }

    pub fn snapshot(&self) -> Generation {
        self.links[0].cutoff
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Versions from the reading version up to the root.
    pub fn versions(&self) -> impl Iterator<Item = VersionId> + '_ {
        self.links.iter().map(|l| l.version)
    }

    pub fn contains(&self, version: VersionId) -> bool {
        self.links.iter().any(|l| l.version == version)
    }

    /// Per-link cutoffs for one row, honoring pins.
    pub fn cutoffs(&self, table: TableId, row_id: RowId) -> SmallVec<[Generation; 4]> {
        let mut out = SmallVec::new();
        let mut diverted: Option<Generation> = None;
        for (i, link) in self.links.iter().enumerate() {
            let cutoff = diverted.unwrap_or(link.cutoff);
            out.push(cutoff);
            if i + 1 == self.links.len() {
                break;
            }
            let entry = match diverted {
                Some(at) => entry_at(&link.history, at).cloned(),
                None => link.step.clone(),
            };
            if let Some(entry) = entry {
                match entry.pins.get(&(table, row_id)) {
                    Some(pinned) => diverted = Some(*pinned),
                    None if diverted.is_some() => diverted = Some(entry.base),
                    None => {}
                }
            }
        }
        out
    }

    /// Visible change of a row, skipping the first `skip` links.
    ///
    /// `skip = 1` yields the ancestor state the version diverged from.
    pub fn resolve_from(
        &self,
        map: &TableDeltas,
        table: TableId,
        row_id: RowId,
        skip: usize,
    ) -> Option<Arc<Change>> {
        if !self.has_pins {
            return self
                .links
                .iter()
                .skip(skip)
                .find_map(|l| latest_in(map, row_id, l.version, l.cutoff));
        }
        let cutoffs = self.cutoffs(table, row_id);
        self.links
            .iter()
            .zip(cutoffs)
            .skip(skip)
            .find_map(|(l, cutoff)| latest_in(map, row_id, l.version, cutoff))
    }

    pub fn resolve(&self, map: &TableDeltas, table: TableId, row_id: RowId) -> Option<Arc<Change>> {
        self.resolve_from(map, table, row_id, 0)
    }

    /// Visible record of a row; `None` when absent or deleted.
    pub fn state(&self, map: &TableDeltas, table: TableId, row_id: RowId) -> Option<Record> {
        self.resolve(map, table, row_id)
            .and_then(|c| c.record().cloned())
    }

    pub fn state_from(
        &self,
        map: &TableDeltas,
        table: TableId,
        row_id: RowId,
        skip: usize,
    ) -> Option<Record> {
        self.resolve_from(map, table, row_id, skip)
            .and_then(|c| c.record().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldId, Value};
    use crate::storage::delta_store::DeltaKey;
    use crossbeam_skiplist::SkipMap;

    fn upsert(v: i64) -> Arc<Change> {
        let mut r = Record::new();
        r.insert(FieldId(1), Value::Integer(v));
        Arc::new(Change::Upsert(r))
    }

    fn value(c: Option<Arc<Change>>) -> Option<i64> {
        c.and_then(|c| c.record().and_then(|r| r.get(&FieldId(1)).and_then(Value::as_i64)))
    }

    fn link(version: u64, cutoff: u64, history: Vec<BaseEntry>, step: Option<usize>) -> ChainLink {
        let history: Vec<Arc<BaseEntry>> = history.into_iter().map(Arc::new).collect();
        let step = step.map(|i| Arc::clone(&history[i]));
        ChainLink {
            version: VersionId(version),
            cutoff: Generation(cutoff),
            history: history.into(),
            step,
        }
    }

    #[test]
    fn closer_version_shadows_ancestor() {
        let map = SkipMap::new();
        let t = TableId(1);
        map.insert(DeltaKey::new(1, VersionId(0), Generation(1)), upsert(10));
        map.insert(DeltaKey::new(1, VersionId(1), Generation(3)), upsert(11));
        map.insert(DeltaKey::new(2, VersionId(0), Generation(5)), upsert(20));

        let chain = ShadowChain::new(
            [
                link(1, 9, vec![BaseEntry::new(Generation(2), Generation(2))], Some(0)),
                link(0, 2, vec![], None),
            ]
            .into_iter()
            .collect(),
        );
        assert_eq!(value(chain.resolve(&map, t, 1)), Some(11));
        assert_eq!(value(chain.resolve_from(&map, t, 1, 1)), Some(10));
        // row 2 was inserted into the parent after the child's base
        assert_eq!(value(chain.resolve(&map, t, 2)), None);
    }

    #[test]
    fn pins_divert_ancestor_cutoff() {
        let map = SkipMap::new();
        let t = TableId(1);
        map.insert(DeltaKey::new(1, VersionId(0), Generation(1)), upsert(1));
        map.insert(DeltaKey::new(1, VersionId(0), Generation(4)), upsert(4));
        let mut entry = BaseEntry::new(Generation(6), Generation(6));
        entry.pins.insert((t, 1), Generation(2));

        let chain = ShadowChain::new(
            [link(1, 9, vec![entry], Some(0)), link(0, 6, vec![], None)]
                .into_iter()
                .collect(),
        );
        assert!(chain.has_pins);
        assert_eq!(value(chain.resolve_from(&map, t, 1, 1)), Some(1));
        assert_eq!(chain.cutoffs(t, 1).as_slice(), &[Generation(9), Generation(2)]);
        assert_eq!(chain.cutoffs(t, 2).as_slice(), &[Generation(9), Generation(6)]);
    }

    #[test]
    fn entry_at_picks_latest_applicable() {
        let history: Vec<Arc<BaseEntry>> = vec![
            Arc::new(BaseEntry::new(Generation(2), Generation(2))),
            Arc::new(BaseEntry::new(Generation(7), Generation(6))),
        ];
        assert_eq!(entry_at(&history, Generation(1)).unwrap().base, Generation(2));
        assert_eq!(entry_at(&history, Generation(6)).unwrap().base, Generation(2));
        assert_eq!(entry_at(&history, Generation(7)).unwrap().base, Generation(6));
    }
}
