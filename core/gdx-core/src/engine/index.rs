//! Index API — unique attribute index enforcement
//!
//! Attribute indexes are catalog metadata; lookups go through the delta
//! store. Unique indexes are checked against a version's visible rows when an
//! edit session commits and when a schema batch adds a unique index.

use crate::error::{GdxError, GdxResult};
use crate::schema::{FieldDefinition, IndexDefinition, RowId, TableDefinition, Value};
use crate::storage::delta_store::Record;
use ahash::{AHashMap, AHashSet};

/// Hash key of an index entry; `None` when any component is null.
fn index_key(table: &TableDefinition, fields: &[&FieldDefinition], row_id: RowId, record: &Record) -> Option<String> {
    let mut key = String::new();
    for field in fields {
        let value = table.value_of(row_id, record, field);
        if value.is_null() {
            return None;
        }
        match &value {
            // one canonical form per numeric value
            Value::Double(d) if d.fract() == 0.0 && d.abs() < 9.0e15 => {
                key.push_str(&format!("{:?}", Value::Integer(*d as i64)))
            }
            other => key.push_str(&format!("{:?}", other)),
        }
        key.push('\u{1f}');
    }
    Some(key)
}

/// First pair of rows sharing a key of `index`.
///
/// With `touched`, only duplicates involving one of those rows count; nulls
/// never collide.
pub(crate) fn find_duplicate<'r>(
    table: &TableDefinition,
    index: &IndexDefinition,
    rows: impl IntoIterator<Item = (RowId, &'r Record)>,
    touched: Option<&AHashSet<RowId>>,
) -> Option<(RowId, RowId)> {
    let fields: Vec<&FieldDefinition> = index.fields.iter().filter_map(|n| table.field(n)).collect();
    if fields.is_empty() {
        return None;
    }
    let mut seen: AHashMap<String, Vec<RowId>> = AHashMap::new();
    for (row_id, record) in rows {
        if let Some(key) = index_key(table, &fields, row_id, record) {
            seen.entry(key).or_default().push(row_id);
        }
    }
    let mut found: Option<(RowId, RowId)> = None;
    for ids in seen.values().filter(|ids| ids.len() > 1) {
        let involved = match touched {
            Some(touched) => ids.iter().copied().find(|id| touched.contains(id)),
            None => Some(ids[1]),
        };
        if let Some(row) = involved {
            let other = ids.iter().copied().find(|id| *id != row).unwrap_or(row);
            let pair = (other.min(row), other.max(row));
            found = Some(found.map_or(pair, |f| f.min(pair)));
        }
    }
    found
}

/// Checks every unique index of `table` over the given rows.
pub(crate) fn check_unique<'r, I>(
    table: &TableDefinition,
    rows: I,
    touched: Option<&AHashSet<RowId>>,
) -> GdxResult<()>
where
    I: IntoIterator<Item = (RowId, &'r Record)> + Clone,
{
    for index in table.indexes.iter().filter(|i| i.unique) {
        if let Some((a, b)) = find_duplicate(table, index, rows.clone(), touched) {
            return Err(GdxError::constraint(
                &table.name,
                index.fields.join(", "),
                format!(
                    "unique index '{}' violated by rows {} and {}",
                    index.name, a, b
                ),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DatasetKind, FieldId, FieldType, TableId};

    fn parcels() -> TableDefinition {
        let field = |id, name: &str, field_type| FieldDefinition {
            id: FieldId(id),
            name: name.into(),
            alias: None,
            field_type,
            nullable: true,
            length: None,
            default: None,
            domain: None,
            geometry_type: None,
        };
        TableDefinition {
            id: TableId(1),
            name: "Parcels".into(),
            alias: None,
            kind: DatasetKind::Table,
            fields: vec![
                field(0, "OBJECTID", FieldType::ObjectId),
                field(1, "APN", FieldType::Text),
            ],
            object_id_field: "OBJECTID".into(),
            shape_field: None,
            feature_dataset: None,
            indexes: vec![IndexDefinition {
                name: "apn_idx".into(),
                fields: vec!["APN".into()],
                unique: true,
            }],
            next_field_id: 2,
        }
    }

    fn rec(apn: Option<&str>) -> Record {
        let mut r = Record::new();
        r.insert(FieldId(1), apn.map_or(Value::Null, Value::from));
        r
    }

    #[test]
    fn duplicates_and_nulls() {
        let table = parcels();
        let rows = [(1, rec(Some("A"))), (2, rec(Some("B"))), (3, rec(None)), (4, rec(None))];
        let refs: Vec<(RowId, &Record)> = rows.iter().map(|(id, r)| (*id, r)).collect();
        assert!(check_unique(&table, refs.clone(), None).is_ok());

        let dup = [(1, rec(Some("A"))), (5, rec(Some("A")))];
        let refs: Vec<(RowId, &Record)> = dup.iter().map(|(id, r)| (*id, r)).collect();
        let err = check_unique(&table, refs.clone(), None).unwrap_err();
        assert!(matches!(err, GdxError::ConstraintViolation { .. }));
        assert_eq!(find_duplicate(&table, &table.indexes[0], refs.clone(), None), Some((1, 5)));

        // only touched rows are reported
        let untouched: AHashSet<RowId> = [9].into_iter().collect();
        assert!(check_unique(&table, refs, Some(&untouched)).is_ok());
    }
}
