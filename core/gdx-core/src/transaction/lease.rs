//! Writer leases and schema usage tracking.
//!
//! A version has at most one writer: an edit session or a reconcile. Leases
//! are acquired without waiting and released on drop. Tables touched by an
//! edit session are registered in [`SchemaUsage`] so DDL on them fails fast.

use crate::error::{GdxError, GdxResult};
use crate::schema::TableId;
use crate::transaction::VersionId;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseHolder {
    EditSession,
    Reconcile,
    Post,
    /// Version delete or alter.
    Maintenance,
}

#[derive(Debug, Default)]
pub struct LeaseTable {
    holders: DashMap<VersionId, LeaseHolder>,
}

impl LeaseTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the writer lease of `version` or fails immediately.
    ///
    /// `label` names the version in the error.
    pub fn acquire(
        self: &Arc<Self>,
        version: VersionId,
        holder: LeaseHolder,
        label: &str,
    ) -> GdxResult<WriterLease> {
        match self.holders.entry(version) {
            Entry::Occupied(existing) => Err(match (holder, *existing.get()) {
                (LeaseHolder::EditSession, LeaseHolder::EditSession | LeaseHolder::Reconcile) => {
                    GdxError::SessionAlreadyOpen {
                        version: label.to_string(),
                    }
                }
                (_, current) => GdxError::VersionBusy {
                    version: label.to_string(),
                    reason: match current {
                        LeaseHolder::EditSession => "an edit session is open".to_string(),
                        LeaseHolder::Reconcile => "a reconcile is in progress".to_string(),
                        LeaseHolder::Post => "a post into this version is in progress".to_string(),
                        LeaseHolder::Maintenance => {
                            "the version is being altered or deleted".to_string()
                        }
                    },
                },
            }),
            Entry::Vacant(slot) => {
                slot.insert(holder);
                Ok(WriterLease {
                    table: Arc::clone(self),
                    version,
                })
            }
        }
    }
}

/// RAII writer lease.
#[derive(Debug)]
pub struct WriterLease {
    table: Arc<LeaseTable>,
    version: VersionId,
}

impl WriterLease {
    pub fn version(&self) -> VersionId {
        self.version
    }
}

impl Drop for WriterLease {
    fn drop(&mut self) {
        self.table.holders.remove(&self.version);
    }
}

/// Open edit sessions per table.
#[derive(Debug, Default)]
pub struct SchemaUsage {
    sessions: DashMap<TableId, usize>,
}

impl SchemaUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_in_use(&self, table: TableId) -> bool {
        self.sessions.get(&table).is_some_and(|n| *n > 0)
    }

    fn register(&self, table: TableId) {
        *self.sessions.entry(table).or_insert(0) += 1;
    }

    fn release(&self, table: TableId) {
        if let Entry::Occupied(mut slot) = self.sessions.entry(table) {
            *slot.get_mut() -= 1;
            if *slot.get() == 0 {
                slot.remove();
            }
        }
    }
}

/// Tables registered by one session; released together on drop.
#[derive(Debug)]
pub struct TableRegistration {
    usage: Arc<SchemaUsage>,
    tables: HashSet<TableId>,
}

impl TableRegistration {
    pub fn new(usage: Arc<SchemaUsage>) -> Self {
        Self {
            usage,
            tables: HashSet::new(),
        }
    }

    /// Registers `table` once per session. Caller holds the DDL gate.
    pub fn touch(&mut self, table: TableId) {
        if self.tables.insert(table) {
            self.usage.register(table);
        }
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableId> {
        self.tables.iter()
    }
}

impl Drop for TableRegistration {
    fn drop(&mut self) {
        for table in self.tables.drain() {
            self.usage.release(table);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_session_fails_fast() {
        let leases = Arc::new(LeaseTable::new());
        let v = VersionId(4);
        let first = leases.acquire(v, LeaseHolder::EditSession, "edits").unwrap();
        let err = leases
            .acquire(v, LeaseHolder::EditSession, "edits")
            .unwrap_err();
        assert!(matches!(err, GdxError::SessionAlreadyOpen { .. }));
        let err = leases.acquire(v, LeaseHolder::Reconcile, "edits").unwrap_err();
        assert!(matches!(err, GdxError::VersionBusy { .. }));
        let reconcile = leases.acquire(VersionId(6), LeaseHolder::Reconcile, "merge").unwrap();
        let err = leases
            .acquire(VersionId(6), LeaseHolder::EditSession, "merge")
            .unwrap_err();
        assert!(matches!(err, GdxError::SessionAlreadyOpen { .. }));
        drop(reconcile);

        // other versions are independent
        let _other = leases
            .acquire(VersionId(5), LeaseHolder::EditSession, "other")
            .unwrap();
        drop(first);
        assert!(leases.acquire(v, LeaseHolder::EditSession, "edits").is_ok());
    }

    #[test]
    fn registration_counts_sessions() {
        let usage = Arc::new(SchemaUsage::new());
        let mut a = TableRegistration::new(Arc::clone(&usage));
        let mut b = TableRegistration::new(Arc::clone(&usage));
        a.touch(TableId(1));
        a.touch(TableId(1));
        b.touch(TableId(1));
        assert!(usage.is_in_use(TableId(1)));
        drop(a);
        assert!(usage.is_in_use(TableId(1)));
        drop(b);
        assert!(!usage.is_in_use(TableId(1)));
    }
}
