//! Cursor — 지연 평가 단방향 행 스트림
//!
//! A cursor resolves rows against the shadow chain captured when the search
//! started, so later commits never change what it returns. Unsorted searches
//! walk the delta map row by row; sorted searches materialize the matching
//! records once, sort them stably and then stream the projection.

use crate::api::filter::{QueryFilter, SortKey, SpatialFilter};
use crate::api::row::Row;
use crate::error::{GdxError, GdxResult};
use crate::schema::{FieldDefinition, FieldId, RowId, TableDefinition, Value};
use crate::sql::{Predicate, WhereClauseParser};
use crate::storage::delta_store::{Record, TableDeltas, next_row_in};
use crate::storage::export::to_record_batch;
use crate::transaction::{ShadowChain, SnapshotGuard};
use arrow::record_batch::RecordBatch;
use std::sync::Arc;

// ════════════════════════════════════════════
// Projection
// ════════════════════════════════════════════

/// Output columns of a search.
#[derive(Debug, Clone)]
pub(crate) struct Projection {
    fields: Arc<[FieldDefinition]>,
    shape: Option<usize>,
}

impl Projection {
    pub(crate) fn all(table: &TableDefinition) -> Self {
        Self::from_fields(table, table.fields.clone())
    }

    /// Sub-field projection; `*` selects every field.
    pub(crate) fn select(table: &TableDefinition, names: &[String]) -> GdxResult<Self> {
        if names.is_empty() || names.iter().any(|n| n.trim() == "*") {
            return Ok(Self::all(table));
        }
        let mut fields: Vec<FieldDefinition> = Vec::with_capacity(names.len());
        for name in names {
            let field = table.resolve_field(name.trim())?;
            if !fields.iter().any(|f| f.id == field.id) {
                fields.push(field.clone());
            }
        }
        Ok(Self::from_fields(table, fields))
    }

    fn from_fields(table: &TableDefinition, fields: Vec<FieldDefinition>) -> Self {
        let shape = table.shape().and_then(|s| fields.iter().position(|f| f.id == s.id));
        Self {
            fields: fields.into(),
            shape,
        }
    }

    pub(crate) fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    pub(crate) fn row(&self, table: &TableDefinition, row_id: RowId, record: &Record) -> Row {
        let values = self
            .fields
            .iter()
            .map(|f| table.value_of(row_id, record, f))
            .collect();
        Row::new(row_id, Arc::clone(&self.fields), values, self.shape)
    }
}

// ════════════════════════════════════════════
// Compiled filter
// ════════════════════════════════════════════

/// Where clause, spatial filter and sort keys bound to one table.
#[derive(Debug, Clone)]
pub(crate) struct CompiledFilter {
    predicate: Option<Predicate>,
    spatial: Option<(FieldId, SpatialFilter)>,
    object_ids: Option<Vec<RowId>>,
    /// (field, descending, case_sensitive)
    sort: Vec<(FieldId, bool, bool)>,
    offset: usize,
    limit: Option<usize>,
}

impl CompiledFilter {
    pub(crate) fn compile(table: &TableDefinition, filter: &QueryFilter) -> GdxResult<Self> {
        let predicate = filter
            .where_clause
            .as_deref()
            .map(|clause| Predicate::compile(clause, table))
            .transpose()?;

        let spatial = match &filter.spatial {
            Some(spatial) => {
                let shape = table.shape().ok_or_else(|| {
                    GdxError::unsupported(
                        "spatial filter",
                        format!("'{}' is a {} without a shape field", table.name, table.kind),
                    )
                })?;
                spatial.geometry.validate()?;
                Some((shape.id, spatial.clone()))
            }
            None => None,
        };

        let mut keys: Vec<SortKey> = filter.order_by.clone();
        if let Some(postfix) = &filter.postfix_clause {
            for (field, descending) in WhereClauseParser::new().parse_order_by(postfix)? {
                keys.push(SortKey {
                    field,
                    descending,
                    case_sensitive: true,
                });
            }
        }
        let sort = keys
            .iter()
            .map(|k| Ok((table.resolve_field(&k.field)?.id, k.descending, k.case_sensitive)))
            .collect::<GdxResult<Vec<_>>>()?;

        let object_ids = filter.object_ids.as_ref().map(|ids| {
            let mut ids = ids.clone();
            ids.sort_unstable();
            ids.dedup();
            ids
        });

        Ok(Self {
            predicate,
            spatial,
            object_ids,
            sort,
            offset: filter.offset,
            limit: filter.limit,
        })
    }

    /// Whether a visible record passes the where clause and spatial filter.
    pub(crate) fn matches(&self, table: &TableDefinition, row_id: RowId, record: &Record) -> GdxResult<bool> {
        if let Some(predicate) = &self.predicate {
            let lookup = |id: FieldId| {
                table
                    .field_by_id(id)
                    .map(|f| table.value_of(row_id, record, f))
                    .unwrap_or(Value::Null)
            };
            if !predicate.matches(&lookup) {
                return Ok(false);
            }
        }
        if let Some((shape, spatial)) = &self.spatial {
            let Some(Value::Geometry(geometry)) = record.get(shape) else {
                return Ok(false);
            };
            if !geometry.satisfies(&spatial.geometry, &spatial.relationship)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn sort_value(table: &TableDefinition, row_id: RowId, record: &Record, field: FieldId) -> Value {
        table
            .field_by_id(field)
            .map(|f| table.value_of(row_id, record, f))
            .unwrap_or(Value::Null)
    }
}

// ════════════════════════════════════════════
// Cursor
// ════════════════════════════════════════════

enum Source {
    Scan { next: RowId },
    Ids(std::vec::IntoIter<RowId>),
    Sorted(std::vec::IntoIter<(RowId, Record)>),
    Done,
}

/// Forward-only, single-pass iterator over the rows of one search.
///
/// Holds a snapshot registration; compaction keeps every delta the cursor
/// can still read until it is dropped.
pub struct Cursor {
    _snapshot: SnapshotGuard,
    table: Arc<TableDefinition>,
    map: Option<Arc<TableDeltas>>,
    chain: ShadowChain,
    projection: Projection,
    filter: CompiledFilter,
    source: Source,
    skip: usize,
    remaining: Option<usize>,
    batch_size: usize,
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("table", &self.table.name)
            .field("version", &self.chain.version())
            .field("snapshot", &self.chain.snapshot())
            .finish()
    }
}

impl Cursor {
    pub(crate) fn new(
        snapshot: SnapshotGuard,
        table: Arc<TableDefinition>,
        map: Option<Arc<TableDeltas>>,
        chain: ShadowChain,
        projection: Projection,
        filter: CompiledFilter,
        batch_size: usize,
    ) -> GdxResult<Self> {
        let mut cursor = Self {
            _snapshot: snapshot,
            source: Source::Done,
            skip: filter.offset,
            remaining: filter.limit,
            table,
            map,
            chain,
            projection,
            filter,
            batch_size: batch_size.max(1),
        };
        cursor.source = if cursor.map.is_none() {
            Source::Done
        } else if !cursor.filter.sort.is_empty() {
            Source::Sorted(cursor.materialize_sorted()?.into_iter())
        } else if let Some(ids) = cursor.filter.object_ids.take() {
            Source::Ids(ids.into_iter())
        } else {
            Source::Scan { next: RowId::MIN }
        };
        Ok(cursor)
    }

    /// Output fields, in row value order.
    pub fn fields(&self) -> &[FieldDefinition] {
        self.projection.fields()
    }

    pub fn table(&self) -> &TableDefinition {
        &self.table
    }

    /// Snapshot generation the cursor reads at.
    pub fn generation(&self) -> crate::transaction::Generation {
        self.chain.snapshot()
    }

    /// Up to `cursor_batch_size` rows; empty once exhausted.
    pub fn next_batch(&mut self) -> GdxResult<Vec<Row>> {
        let mut out = Vec::with_capacity(self.batch_size);
        while out.len() < self.batch_size {
            match self.next() {
                Some(row) => out.push(row?),
                None => break,
            }
        }
        Ok(out)
    }

    /// Exports the remaining rows as one Arrow batch.
    pub fn into_record_batch(mut self) -> GdxResult<RecordBatch> {
        let mut rows = Vec::new();
        for row in self.by_ref() {
            rows.push(row?.into_values());
        }
        to_record_batch(self.projection.fields(), &rows)
    }

    fn visible(&self, map: &TableDeltas, row_id: RowId) -> Option<Record> {
        self.chain.state(map, self.table.id, row_id)
    }

    fn materialize_sorted(&self) -> GdxResult<Vec<(RowId, Record)>> {
        let Some(map) = self.map.as_deref() else {
            return Ok(Vec::new());
        };
        let candidates: Vec<RowId> = match &self.filter.object_ids {
            Some(ids) => ids.clone(),
            None => {
                let mut ids = Vec::new();
                let mut next = RowId::MIN;
                while let Some(row_id) = next_row_in(map, next) {
                    ids.push(row_id);
                    match row_id.checked_add(1) {
                        Some(n) => next = n,
                        None => break,
                    }
                }
                ids
            }
        };
        let mut rows = Vec::new();
        for row_id in candidates {
            if let Some(record) = self.visible(map, row_id)
                && self.filter.matches(&self.table, row_id, &record)?
            {
                rows.push((row_id, record));
            }
        }
        let table = &self.table;
        let sort = &self.filter.sort;
        // candidates are in row-id order and sort_by is stable
        rows.sort_by(|(ra, a), (rb, b)| {
            for &(field, descending, case_sensitive) in sort {
                let va = CompiledFilter::sort_value(table, *ra, a, field);
                let vb = CompiledFilter::sort_value(table, *rb, b, field);
                let ord = va.sort_cmp(&vb, case_sensitive);
                let ord = if descending { ord.reverse() } else { ord };
                if ord.is_ne() {
                    return ord;
                }
            }
            std::cmp::Ordering::Equal
        });
        Ok(rows)
    }

    /// Next matching (row id, record) before offset/limit.
    fn advance(&mut self) -> Option<GdxResult<(RowId, Record)>> {
        let map = self.map.clone()?;
        loop {
            let row_id = match &mut self.source {
                Source::Done => return None,
                Source::Sorted(rows) => return rows.next().map(Ok),
                Source::Ids(ids) => ids.next()?,
                Source::Scan { next } => {
                    let row_id = next_row_in(&map, *next)?;
                    match row_id.checked_add(1) {
                        Some(n) => *next = n,
                        None => self.source = Source::Done,
                    }
                    row_id
                }
            };
            let Some(record) = self.visible(&map, row_id) else {
                continue;
            };
            match self.filter.matches(&self.table, row_id, &record) {
                Ok(true) => return Some(Ok((row_id, record))),
                Ok(false) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

impl Iterator for Cursor {
    type Item = GdxResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == Some(0) {
            return None;
        }
        loop {
            let item = match self.advance() {
                None => {
                    self.source = Source::Done;
                    return None;
                }
                Some(Err(e)) => {
                    self.source = Source::Done;
                    return Some(Err(e));
                }
                Some(Ok(item)) => item,
            };
            if self.skip > 0 {
                self.skip -= 1;
                continue;
            }
            if let Some(n) = &mut self.remaining {
                *n -= 1;
            }
            let (row_id, record) = item;
            return Some(Ok(self.projection.row(&self.table, row_id, &record)));
        }
    }
}

impl std::iter::FusedIterator for Cursor {}

#[cfg(test)]
mod tests {
    use crate::api::QueryFilter;
    use crate::engine::{Geodatabase, GeodatabaseConfig};
    use crate::error::GdxResult;
    use crate::schema::{FieldDescription, TableDescription};
    use crate::transaction::VersionId;

    #[test]
    fn batches_follow_the_configured_size() -> GdxResult<()> {
        let db = Geodatabase::open_in_memory_with_config(GeodatabaseConfig::new().cursor_batch_size(2))?;
        db.create_table(TableDescription::new("Poles").field(FieldDescription::integer("HEIGHT")))?;
        for height in 1..=5i64 {
            db.write_row(VersionId::DEFAULT, "Poles", None, [("HEIGHT", height)])?;
        }

        let mut cursor = db.search(VersionId::DEFAULT, "Poles", &QueryFilter::new().where_clause("HEIGHT > 0"))?;
        let sizes: Vec<usize> = std::iter::from_fn(|| match cursor.next_batch() {
            Ok(batch) if batch.is_empty() => None,
            other => Some(other.map(|b| b.len())),
        })
        .collect::<GdxResult<_>>()?;
        assert_eq!(sizes, vec![2, 2, 1]);
        assert!(cursor.next_batch()?.is_empty());
        Ok(())
    }
}
