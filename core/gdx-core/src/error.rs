//! Error types for the GDX geodatabase engine.
//!
//! All public APIs return `GdxResult<T>` — no panics in library code.
//! Every variant names the entity (table, row, version, field) that triggered it.

use thiserror::Error;

/// Unified error type for all GDX operations.
#[derive(Debug, Error)]
pub enum GdxError {
    /// Storage layer error (corruption, missing layer, etc.)
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error (journal, catalog)
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Apache Arrow error (RecordBatch export)
    #[error("arrow error: {source}")]
    Arrow {
        #[from]
        source: arrow::error::ArrowError,
    },

    /// sled embedded database error
    #[error("sled error: {source}")]
    Sled {
        #[from]
        source: sled::Error,
    },

    /// Standard I/O error
    #[error("io error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    // ════════════════════════════════════════════
    // Not found
    // ════════════════════════════════════════════
    /// Requested table does not exist
    #[error("table '{0}' not found")]
    TableNotFound(String),

    /// Row is not visible in the requested version
    #[error("row {row_id} not found in table '{table}'")]
    RowNotFound { table: String, row_id: i64 },

    /// Requested version does not exist
    #[error("version '{0}' not found")]
    VersionNotFound(String),

    /// Field does not exist on the table
    #[error("field '{field}' not found in table '{table}'")]
    FieldNotFound { table: String, field: String },

    /// Attribute domain does not exist
    #[error("domain '{0}' not found")]
    DomainNotFound(String),

    /// Relationship class does not exist
    #[error("relationship class '{0}' not found")]
    RelationshipNotFound(String),

    /// Feature dataset does not exist
    #[error("feature dataset '{0}' not found")]
    DatasetNotFound(String),

    /// Predicate, sub-field list or sort key references an unknown field
    #[error("invalid field reference '{field}' on table '{table}'")]
    InvalidFieldReference { table: String, field: String },

    // ════════════════════════════════════════════
    // Constraints & validation
    // ════════════════════════════════════════════
    /// Type, nullability, length or domain constraint violated
    #[error("constraint violation on '{table}.{field}': {message}")]
    ConstraintViolation {
        table: String,
        field: String,
        message: String,
    },

    /// Name collides with an existing sibling
    #[error("{kind} '{name}' already exists in {scope}")]
    DuplicateName {
        kind: String,
        name: String,
        scope: String,
    },

    /// Malformed filter, predicate, selection or DDL batch
    #[error("validation error: {0}")]
    Validation(String),

    /// Where-clause parse error
    #[error("where clause parse error: {message}\nclause: {clause}")]
    WhereClauseParse { message: String, clause: String },

    /// Operation not supported for this dataset or version
    #[error("unsupported operation: {operation}\nContext: {context}")]
    UnsupportedOperation { operation: String, context: String },

    // ════════════════════════════════════════════
    // Version graph
    // ════════════════════════════════════════════
    /// Version still has child versions
    #[error("version '{version}' has {children} child version(s)")]
    HasChildren { version: String, children: usize },

    /// The default version cannot be deleted, renamed or reparented
    #[error("default version cannot be {operation}")]
    DefaultVersionImmutable { operation: String },

    /// Reconcile target is not an ancestor of the version
    #[error("version '{target}' is not an ancestor of '{version}'")]
    NotAnAncestor { version: String, target: String },

    // ════════════════════════════════════════════
    // Concurrency & conflicts
    // ════════════════════════════════════════════
    /// Schema change on a table with an open edit session
    #[error("table '{table}' is locked by an open edit session")]
    SchemaLocked { table: String },

    /// Another edit session already writes to this version
    #[error("an edit session is already open on version '{version}'")]
    SessionAlreadyOpen { version: String },

    /// Version is held by an edit session or an in-flight reconcile
    #[error("version '{version}' is busy: {reason}")]
    VersionBusy { version: String, reason: String },

    /// Unresolved reconcile conflicts block the requested operation
    #[error("{count} unresolved conflict(s) on version '{version}'")]
    Conflict { version: String, count: usize },

    /// Storage location unreachable or misconfigured
    #[error("connection error for '{location}': {message}")]
    Connection { location: String, message: String },
}

/// Result type alias for all GDX operations.
pub type GdxResult<T> = Result<T, GdxError>;

/// Coarse error categories, one per failure class callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    ConstraintViolation,
    Concurrency,
    Conflict,
    Connection,
    Validation,
    Unsupported,
    Internal,
}

impl GdxError {
    /// 에러 분류 — 호출자가 재시도/보고 정책을 고를 때 사용
    pub fn kind(&self) -> ErrorKind {
        match self {
            GdxError::TableNotFound(_)
            | GdxError::RowNotFound { .. }
            | GdxError::VersionNotFound(_)
            | GdxError::FieldNotFound { .. }
            | GdxError::DomainNotFound(_)
            | GdxError::RelationshipNotFound(_)
            | GdxError::DatasetNotFound(_) => ErrorKind::NotFound,
            GdxError::ConstraintViolation { .. } => ErrorKind::ConstraintViolation,
            GdxError::SchemaLocked { .. }
            | GdxError::SessionAlreadyOpen { .. }
            | GdxError::VersionBusy { .. } => ErrorKind::Concurrency,
            GdxError::Conflict { .. } => ErrorKind::Conflict,
            GdxError::Connection { .. } => ErrorKind::Connection,
            GdxError::Validation(_)
            | GdxError::WhereClauseParse { .. }
            | GdxError::InvalidFieldReference { .. }
            | GdxError::DuplicateName { .. }
            | GdxError::HasChildren { .. }
            | GdxError::DefaultVersionImmutable { .. }
            | GdxError::NotAnAncestor { .. } => ErrorKind::Validation,
            GdxError::UnsupportedOperation { .. } => ErrorKind::Unsupported,
            GdxError::Storage(_)
            | GdxError::Serialization(_)
            | GdxError::Arrow { .. }
            | GdxError::Sled { .. }
            | GdxError::Io { .. } => ErrorKind::Internal,
        }
    }

    pub(crate) fn unsupported(operation: impl Into<String>, context: impl Into<String>) -> Self {
        GdxError::UnsupportedOperation {
            operation: operation.into(),
            context: context.into(),
        }
    }

    pub(crate) fn constraint(
        table: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        GdxError::ConstraintViolation {
            table: table.into(),
            field: field.into(),
            message: message.into(),
        }
    }
}

// From 구현들
impl From<serde_json::Error> for GdxError {
    fn from(err: serde_json::Error) -> Self {
        GdxError::Serialization(err.to_string())
    }
}

impl From<bincode::Error> for GdxError {
    fn from(err: bincode::Error) -> Self {
        GdxError::Serialization(err.to_string())
    }
}
