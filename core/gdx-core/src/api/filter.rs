//! Query Filter — Fluent 스타일 검색 조건
//!
//! ```rust
//! use gdx_core::api::{QueryFilter, SortKey};
//!
//! let filter = QueryFilter::new()
//!     .where_clause("HEIGHT > 10 AND SPECIES IN ('PI', 'OA')")
//!     .sub_fields(["NAME", "HEIGHT"])
//!     .order_by(SortKey::desc("HEIGHT"))
//!     .limit(20);
//! assert_eq!(filter.limit, Some(20));
//! ```

use crate::geometry::{Geometry, SpatialRelationship};
use crate::schema::RowId;

/// One sort key; ties fall back to row id ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
    /// Text comparison sensitivity; defaults to case-sensitive.
    pub case_sensitive: bool,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: false,
            case_sensitive: true,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            descending: true,
            ..Self::asc(field)
        }
    }

    pub fn case_insensitive(mut self) -> Self {
        self.case_sensitive = false;
        self
    }
}

/// Shape constraint of a search.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialFilter {
    pub geometry: Geometry,
    pub relationship: SpatialRelationship,
}

impl SpatialFilter {
    pub fn new(geometry: Geometry, relationship: SpatialRelationship) -> Self {
        Self {
            geometry,
            relationship,
        }
    }

    pub fn intersects(geometry: Geometry) -> Self {
        Self::new(geometry, SpatialRelationship::Intersects)
    }
}

/// Search criteria for [`Geodatabase::search`](crate::Geodatabase::search).
///
/// An empty filter selects every visible row in row-id order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryFilter {
    pub where_clause: Option<String>,
    pub object_ids: Option<Vec<RowId>>,
    /// Projection; `None` returns every field.
    pub sub_fields: Option<Vec<String>>,
    pub spatial: Option<SpatialFilter>,
    pub order_by: Vec<SortKey>,
    /// `ORDER BY ...` text, appended after `order_by`.
    pub postfix_clause: Option<String>,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl QueryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn where_clause(mut self, clause: impl Into<String>) -> Self {
        let clause = clause.into();
        self.where_clause = if clause.trim().is_empty() {
            None
        } else {
            Some(clause)
        };
        self
    }

    pub fn object_ids(mut self, ids: impl IntoIterator<Item = RowId>) -> Self {
        self.object_ids = Some(ids.into_iter().collect());
        self
    }

    pub fn sub_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sub_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn spatial(mut self, filter: SpatialFilter) -> Self {
        self.spatial = Some(filter);
        self
    }

    pub fn order_by(mut self, key: SortKey) -> Self {
        self.order_by.push(key);
        self
    }

    pub fn postfix_clause(mut self, clause: impl Into<String>) -> Self {
        self.postfix_clause = Some(clause.into());
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_where_clause_means_no_predicate() {
        let filter = QueryFilter::new().where_clause("   ");
        assert!(filter.where_clause.is_none());
        assert_eq!(filter, QueryFilter::default());
    }

    #[test]
    fn sort_keys_accumulate() {
        let filter = QueryFilter::new()
            .order_by(SortKey::asc("ZONE").case_insensitive())
            .order_by(SortKey::desc("AREA"));
        assert_eq!(filter.order_by.len(), 2);
        assert!(!filter.order_by[0].case_sensitive);
        assert!(filter.order_by[1].descending);
    }
}
