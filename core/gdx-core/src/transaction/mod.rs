//! Transaction layer — generations, snapshots, version graph and writer leases.
//!
//! A [`Generation`] is one atomic batch of committed changes. Generations are
//! allocated by the [`TimestampOracle`] under the global commit lock and become
//! visible to readers only when published.

pub mod chain;
pub mod gc;
pub mod lease;
pub mod manager;
pub mod version_graph;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical commit timestamp of a delta generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Generation(pub u64);

impl Generation {
    pub const ZERO: Generation = Generation(0);
    pub const MAX: Generation = Generation(u64::MAX);
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// Identifier of a node in the version tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VersionId(pub u64);

impl VersionId {
    /// The root of the version tree.
    pub const DEFAULT: VersionId = VersionId(0);

    pub fn is_default(self) -> bool {
        self == Self::DEFAULT
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

// Public exports
pub use chain::{BaseEntry, ShadowChain};
pub use lease::{LeaseHolder, LeaseTable, WriterLease};
pub use manager::{SnapshotGuard, SnapshotRegistry, TimestampOracle};
pub use version_graph::{VersionAccess, VersionGraph, VersionInfo};
