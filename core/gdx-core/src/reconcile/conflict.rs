//! Conflict classification between a child version and its reconcile target.

use crate::api::row::Row;
use crate::reconcile::DetectionMode;
use crate::schema::{FieldId, RowId, TableDefinition, Value};
use crate::storage::delta_store::Record;
use std::collections::BTreeSet;
use std::fmt;

/// How the two sides disagree about one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConflictKind {
    /// Both sides updated the row differently.
    UpdateUpdate,
    /// The child updated a row the target deleted.
    UpdateDelete,
    /// The child deleted a row the target updated.
    DeleteUpdate,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictKind::UpdateUpdate => write!(f, "update/update"),
            ConflictKind::UpdateDelete => write!(f, "update/delete"),
            ConflictKind::DeleteUpdate => write!(f, "delete/update"),
        }
    }
}

/// One conflicting row with the three states it was judged on.
///
/// `None` means the row is absent (never existed or deleted) on that side.
#[derive(Debug, Clone, PartialEq)]
pub struct Conflict {
    pub table: String,
    pub row_id: RowId,
    pub kind: ConflictKind,
    pub ancestor: Option<Row>,
    pub parent: Option<Row>,
    pub child: Option<Row>,
    /// Fields whose values the two sides disagree on.
    pub changed_fields: Vec<String>,
}

/// Outcome of comparing one row touched on both sides.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Verdict {
    /// Both sides ended at the same state.
    Agree,
    /// Disjoint column edits combined into one record.
    Merged(Record),
    Conflict {
        kind: ConflictKind,
        fields: BTreeSet<FieldId>,
    },
}

fn field_value(record: &Record, field: FieldId) -> &Value {
    record.get(&field).unwrap_or(&Value::Null)
}

/// Fields whose stored values differ between two records.
pub(crate) fn changed_fields(a: &Record, b: &Record) -> BTreeSet<FieldId> {
    a.keys()
        .chain(b.keys())
        .copied()
        .filter(|f| field_value(a, *f) != field_value(b, *f))
        .collect()
}

/// Whether two row states are the same.
pub(crate) fn same_state(a: Option<&Record>, b: Option<&Record>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => changed_fields(a, b).is_empty(),
        _ => false,
    }
}

/// Judges a row changed by both the child and the target.
pub(crate) fn classify(
    mode: DetectionMode,
    ancestor: Option<&Record>,
    child: Option<&Record>,
    target: Option<&Record>,
) -> Verdict {
    match (child, target) {
        (None, None) => Verdict::Agree,
        (Some(c), Some(t)) => {
            let differing = changed_fields(c, t);
            if differing.is_empty() {
                return Verdict::Agree;
            }
            match (mode, ancestor) {
                (DetectionMode::ByColumn, Some(a)) => {
                    let by_child = changed_fields(a, c);
                    let by_target = changed_fields(a, t);
                    let overlap: BTreeSet<FieldId> = by_child
                        .intersection(&by_target)
                        .copied()
                        .filter(|f| differing.contains(f))
                        .collect();
                    if overlap.is_empty() {
                        let mut merged = t.clone();
                        for f in by_child {
                            merged.insert(f, field_value(c, f).clone());
                        }
                        Verdict::Merged(merged)
                    } else {
                        Verdict::Conflict {
                            kind: ConflictKind::UpdateUpdate,
                            fields: overlap,
                        }
                    }
                }
                _ => Verdict::Conflict {
                    kind: ConflictKind::UpdateUpdate,
                    fields: differing,
                },
            }
        }
        (Some(c), None) => Verdict::Conflict {
            kind: ConflictKind::UpdateDelete,
            fields: ancestor.map(|a| changed_fields(a, c)).unwrap_or_default(),
        },
        (None, Some(t)) => Verdict::Conflict {
            kind: ConflictKind::DeleteUpdate,
            fields: ancestor.map(|a| changed_fields(a, t)).unwrap_or_default(),
        },
    }
}

/// Field names in table order.
pub(crate) fn field_names(table: &TableDefinition, fields: &BTreeSet<FieldId>) -> Vec<String> {
    table
        .fields
        .iter()
        .filter(|f| fields.contains(&f.id))
        .map(|f| f.name.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(pairs: &[(u32, &str)]) -> Record {
        pairs
            .iter()
            .map(|(f, v)| (FieldId(*f), Value::from(*v)))
            .collect()
    }

    #[test]
    fn by_row_flags_any_disagreement() {
        let a = rec(&[(1, "Pine"), (2, "green")]);
        let c = rec(&[(1, "Maple"), (2, "green")]);
        let t = rec(&[(1, "Pine"), (2, "brown")]);
        let verdict = classify(DetectionMode::ByRow, Some(&a), Some(&c), Some(&t));
        assert!(matches!(
            verdict,
            Verdict::Conflict { kind: ConflictKind::UpdateUpdate, .. }
        ));
    }

    #[test]
    fn by_column_merges_disjoint_edits() {
        let a = rec(&[(1, "Pine"), (2, "green")]);
        let c = rec(&[(1, "Maple"), (2, "green")]);
        let t = rec(&[(1, "Pine"), (2, "brown")]);
        let verdict = classify(DetectionMode::ByColumn, Some(&a), Some(&c), Some(&t));
        assert_eq!(verdict, Verdict::Merged(rec(&[(1, "Maple"), (2, "brown")])));

        let t = rec(&[(1, "Oak"), (2, "green")]);
        match classify(DetectionMode::ByColumn, Some(&a), Some(&c), Some(&t)) {
            Verdict::Conflict { fields, .. } => assert_eq!(fields, [FieldId(1)].into()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn deletes_against_updates() {
        let a = rec(&[(1, "Pine")]);
        let c = rec(&[(1, "Maple")]);
        assert!(matches!(
            classify(DetectionMode::ByRow, Some(&a), Some(&c), None),
            Verdict::Conflict { kind: ConflictKind::UpdateDelete, .. }
        ));
        assert!(matches!(
            classify(DetectionMode::ByRow, Some(&a), None, Some(&c)),
            Verdict::Conflict { kind: ConflictKind::DeleteUpdate, .. }
        ));
        assert_eq!(classify(DetectionMode::ByRow, Some(&a), None, None), Verdict::Agree);
    }
}
