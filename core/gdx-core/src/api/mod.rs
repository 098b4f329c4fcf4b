//! API 모듈 — 버전 핸들, 편집 세션, 쿼리 필터
//!
//! FromRow, TableSchema, FromValue 트레이트 제공

pub mod filter;
pub mod handles;
pub mod row;
pub mod session;
pub mod traits;

pub use filter::{QueryFilter, SortKey, SpatialFilter};
pub use handles::{TableHandle, VersionHandle};
pub use row::Row;
pub use session::{Aborted, Active, Committed, EditOp, EditSession, SessionState};
pub use traits::{FromRow, FromValue, IntoFieldType, TableSchema};
