//! Storage module — in-memory delta layers, the durable journal and Arrow export.
//!
//! - [`delta_store`]: append-only `(row, version, generation)` deltas per table
//! - [`journal`]: sled-backed replay log and metadata tree
//! - [`export`]: cursor rows → Arrow `RecordBatch`

pub mod delta_store;
pub mod export;
pub mod journal;

pub use delta_store::{Change, DeltaKey, DeltaStore, Record, TableDeltas};
pub use journal::{Journal, JournalRecord, JournalWrite};
