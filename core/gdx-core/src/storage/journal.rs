//! Journal — sled-backed log of committed generations and version changes.
//!
//! The in-memory delta store is rebuilt on open by replaying the journal in
//! sequence order. Each record is bincode-encoded under a big-endian `u64`
//! sequence key, so sled's key order is replay order.
//!
//! # Trees
//!
//! - `journal`: sequence → [`JournalRecord`]
//! - `__meta__`: catalog and other metadata blobs (serde_json)

use crate::error::{GdxError, GdxResult};
use crate::schema::{RowId, TableId};
use crate::storage::delta_store::Change;
use crate::transaction::{BaseEntry, Generation, VersionAccess, VersionId, VersionInfo};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

const JOURNAL_TREE: &str = "journal";
const META_TREE: &str = "__meta__";

/// Attempts at taking sled's file lock before giving up.
const LOCK_ATTEMPTS: u32 = 8;

/// One row change inside a journaled generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalWrite {
    pub table: TableId,
    pub version: VersionId,
    pub row_id: RowId,
    pub change: Change,
}

/// Journal record types, replayed in order on open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JournalRecord {
    /// One committed generation: row writes plus base advances (reconcile/post).
    Generation {
        generation: Generation,
        writes: Vec<JournalWrite>,
        bases: Vec<(VersionId, BaseEntry)>,
    },
    CreateVersion {
        info: VersionInfo,
        base: BaseEntry,
    },
    AlterVersion {
        id: VersionId,
        name: String,
        description: Option<String>,
        access: VersionAccess,
    },
    DeleteVersion {
        id: VersionId,
    },
    DropTable {
        table: TableId,
    },
}

/// Durable log plus metadata store.
pub struct Journal {
    db: sled::Db,
    log: sled::Tree,
    meta: sled::Tree,
    sequence: AtomicU64,
}

impl Journal {
    /// Opens or creates the journal in `path`.
    ///
    /// A handle dropped just before may still hold the file lock while its
    /// flusher thread exits, so a held lock is retried with backoff.
    pub fn open(path: &Path) -> GdxResult<Self> {
        let mut delay = Duration::from_millis(5);
        let mut attempt = 1;
        let db = loop {
            match sled::open(path) {
                Ok(db) => break db,
                Err(e) if is_lock_contention(&e) && attempt < LOCK_ATTEMPTS => {
                    debug!(attempt, "journal lock busy, retrying");
                    std::thread::sleep(delay);
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        };
        Self::from_db(db)
    }

    /// Temporary journal, deleted on drop (tests).
    pub fn open_temporary() -> GdxResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> GdxResult<Self> {
        let log = db.open_tree(JOURNAL_TREE)?;
        let meta = db.open_tree(META_TREE)?;
        let last = match log.last()? {
            Some((key, _)) => decode_sequence(&key)?,
            None => 0,
        };
        Ok(Self {
            db,
            log,
            meta,
            sequence: AtomicU64::new(last),
        })
    }

    /// Appends a record; returns its sequence number.
    pub fn append(&self, record: &JournalRecord) -> GdxResult<u64> {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let bytes = bincode::serialize(record)?;
        self.log.insert(seq.to_be_bytes(), bytes)?;
        Ok(seq)
    }

    /// fsync everything written so far.
    pub fn flush(&self) -> GdxResult<()> {
        self.db.flush()?;
        Ok(())
    }

    /// All records in sequence order.
    pub fn replay(&self) -> GdxResult<Vec<JournalRecord>> {
        let mut records = Vec::with_capacity(self.log.len());
        for item in self.log.iter() {
            let (_, value) = item?;
            records.push(bincode::deserialize(&value)?);
        }
        debug!(records = records.len(), "journal read");
        Ok(records)
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    pub fn put_meta(&self, key: &str, value: &[u8]) -> GdxResult<()> {
        self.meta.insert(key.as_bytes(), value)?;
        Ok(())
    }

    pub fn get_meta(&self, key: &str) -> GdxResult<Option<Vec<u8>>> {
        Ok(self.meta.get(key.as_bytes())?.map(|v| v.to_vec()))
    }
}

impl Drop for Journal {
    fn drop(&mut self) {
        if let Err(e) = self.db.flush() {
            warn!(error = %e, "journal flush on close failed");
        }
    }
}

/// sled reports a held file lock as an `Other` I/O error wrapping `WouldBlock`.
fn is_lock_contention(error: &sled::Error) -> bool {
    match error {
        sled::Error::Io(e) => {
            e.kind() == std::io::ErrorKind::WouldBlock
                || e.to_string().contains("could not acquire lock")
        }
        _ => false,
    }
}

fn decode_sequence(key: &[u8]) -> GdxResult<u64> {
    let bytes: [u8; 8] = key
        .try_into()
        .map_err(|_| GdxError::Storage(format!("malformed journal key of {} bytes", key.len())))?;
    Ok(u64::from_be_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldId, Value};
    use crate::storage::delta_store::Record;

    fn write(row_id: RowId) -> JournalWrite {
        let mut record = Record::new();
        record.insert(FieldId(1), Value::from("Pine"));
        JournalWrite {
            table: TableId(1),
            version: VersionId::DEFAULT,
            row_id,
            change: Change::Upsert(record),
        }
    }

    #[test]
    fn records_replay_in_order() -> GdxResult<()> {
        let journal = Journal::open_temporary()?;
        assert!(journal.is_empty());
        let first = JournalRecord::Generation {
            generation: Generation(1),
            writes: vec![write(1), write(2)],
            bases: vec![],
        };
        let second = JournalRecord::DeleteVersion { id: VersionId(3) };
        assert_eq!(journal.append(&first)?, 1);
        assert_eq!(journal.append(&second)?, 2);
        assert_eq!(journal.replay()?, vec![first, second]);
        Ok(())
    }

    #[test]
    fn sequence_resumes_after_reopen() -> GdxResult<()> {
        let dir = tempfile::tempdir()?;
        {
            let journal = Journal::open(dir.path())?;
            journal.append(&JournalRecord::DropTable { table: TableId(2) })?;
            journal.put_meta("catalog", b"{}")?;
            journal.flush()?;
        }
        let journal = Journal::open(dir.path())?;
        assert_eq!(journal.len(), 1);
        assert_eq!(journal.append(&JournalRecord::DropTable { table: TableId(3) })?, 2);
        assert_eq!(journal.get_meta("catalog")?, Some(b"{}".to_vec()));
        Ok(())
    }

    #[test]
    fn reopens_right_after_drop() -> GdxResult<()> {
        let dir = tempfile::tempdir()?;
        for round in 0..10u64 {
            let journal = Journal::open(dir.path())?;
            assert_eq!(journal.len() as u64, round);
            journal.append(&JournalRecord::DeleteVersion { id: VersionId(round + 1) })?;
        }
        assert_eq!(Journal::open(dir.path())?.len(), 10);
        Ok(())
    }
}
