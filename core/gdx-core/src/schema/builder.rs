//! Schema Builder — DDL 배치 적용
//!
//! Operations are queued, then validated together against a working copy of
//! the catalog in dependency order:
//!
//! ```text
//! deletes:  relationship → index → field → table → domain → feature dataset
//! creates:  feature dataset → domain → table → field → index → relationship
//! ```
//!
//! Within a tier operations keep their queue order. `create_*` calls return a
//! [`Token`] that later operations of the same batch may use in place of the
//! name. If any operation fails, the working copy is discarded and nothing
//! is applied.

use crate::engine::Geodatabase;
use crate::error::{GdxError, GdxResult};
use crate::geometry::GeometryType;
use crate::schema::catalog::{
    Catalog, DatasetKind, Domain, FeatureDataset, FieldDefinition, FieldId, IndexDefinition,
    RelationshipDefinition, TableDefinition, TableId,
};
use crate::schema::description::{
    DEFAULT_SHAPE_FIELD, FeatureDatasetDescription, FieldDescription, IndexDescription, NameRef,
    ObjectKind, RelationshipDescription, TableDescription, Token,
};
use crate::schema::value::{FieldType, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_BUILDER_ID: AtomicU64 = AtomicU64::new(1);

/// One queued DDL operation.
#[derive(Debug, Clone)]
pub enum DdlOp {
    CreateFeatureDataset(FeatureDatasetDescription),
    RenameFeatureDataset { target: NameRef, new_name: String },
    DeleteFeatureDataset(NameRef),
    CreateDomain(Domain),
    /// Replaces the domain with the same name.
    ModifyDomain(Domain),
    RenameDomain { target: NameRef, new_name: String },
    DeleteDomain(NameRef),
    CreateTable(TableDescription),
    /// Alters alias, feature dataset, fields and indexes of the table with the same name.
    ModifyTable(TableDescription),
    RenameTable { target: NameRef, new_name: String },
    DeleteTable(NameRef),
    AddField { table: NameRef, field: FieldDescription },
    DeleteField { table: NameRef, field: String },
    RenameField { table: NameRef, field: String, new_name: String },
    CreateIndex { table: NameRef, index: IndexDescription },
    DeleteIndex { table: NameRef, index: NameRef },
    CreateRelationship(RelationshipDescription),
    DeleteRelationship(NameRef),
}

impl DdlOp {
    /// Validation tier; lower runs first.
    fn tier(&self) -> u8 {
        match self {
            DdlOp::DeleteRelationship(_) => 0,
            DdlOp::DeleteIndex { .. } => 1,
            DdlOp::DeleteField { .. } => 2,
            DdlOp::DeleteTable(_) => 3,
            DdlOp::DeleteDomain(_) => 4,
            DdlOp::DeleteFeatureDataset(_) => 5,
            DdlOp::CreateFeatureDataset(_) | DdlOp::RenameFeatureDataset { .. } => 6,
            DdlOp::CreateDomain(_) | DdlOp::ModifyDomain(_) | DdlOp::RenameDomain { .. } => 7,
            DdlOp::CreateTable(_) | DdlOp::ModifyTable(_) | DdlOp::RenameTable { .. } => 8,
            DdlOp::AddField { .. } | DdlOp::RenameField { .. } => 9,
            DdlOp::CreateIndex { .. } => 10,
            DdlOp::CreateRelationship(_) => 11,
        }
    }

    /// Existing table this operation rewrites, if it names one directly.
    fn target_table(&self) -> Option<&NameRef> {
        match self {
            DdlOp::RenameTable { target, .. } => Some(target),
            DdlOp::DeleteTable(target) => Some(target),
            DdlOp::AddField { table, .. }
            | DdlOp::DeleteField { table, .. }
            | DdlOp::RenameField { table, .. }
            | DdlOp::CreateIndex { table, .. }
            | DdlOp::DeleteIndex { table, .. } => Some(table),
            _ => None,
        }
    }
}

/// Outcome of [`SchemaBuilder::build`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildResult {
    pub success: bool,
    pub errors: Vec<String>,
}

/// Queues DDL operations and applies them as one batch.
///
/// ```rust
/// use gdx_core::Geodatabase;
/// use gdx_core::schema::{FeatureDatasetDescription, FieldDescription, TableDescription};
/// use gdx_core::geometry::GeometryType;
///
/// # fn main() -> gdx_core::GdxResult<()> {
/// let db = Geodatabase::open_in_memory()?;
/// let mut builder = db.schema_builder();
/// let parks = builder.create_feature_dataset(FeatureDatasetDescription::new("Parks"));
/// builder.create_table(
///     TableDescription::feature_class("Trees", GeometryType::Point)
///         .in_dataset(&parks)
///         .field(FieldDescription::text("NAME", 32)),
/// );
/// let result = builder.build()?;
/// assert!(result.success, "{:?}", result.errors);
/// # Ok(())
/// # }
/// ```
pub struct SchemaBuilder<'a> {
    db: &'a Geodatabase,
    id: u64,
    ops: Vec<DdlOp>,
}

impl<'a> SchemaBuilder<'a> {
    pub(crate) fn new(db: &'a Geodatabase) -> Self {
        Self {
            db,
            id: NEXT_BUILDER_ID.fetch_add(1, Ordering::Relaxed),
            ops: Vec::new(),
        }
    }

    fn push(&mut self, op: DdlOp) -> usize {
        self.ops.push(op);
        self.ops.len() - 1
    }

    fn token(&self, op: usize, kind: ObjectKind, name: &str) -> Token {
        Token {
            builder: self.id,
            op,
            kind,
            name: name.to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn operations(&self) -> &[DdlOp] {
        &self.ops
    }

    // ════════════════════════════════════════════
    // Feature datasets & domains
    // ════════════════════════════════════════════

    pub fn create_feature_dataset(&mut self, desc: FeatureDatasetDescription) -> Token {
        let name = desc.name.clone();
        let op = self.push(DdlOp::CreateFeatureDataset(desc));
        self.token(op, ObjectKind::FeatureDataset, &name)
    }

    pub fn rename_feature_dataset(&mut self, target: impl Into<NameRef>, new_name: impl Into<String>) {
        self.push(DdlOp::RenameFeatureDataset {
            target: target.into(),
            new_name: new_name.into(),
        });
    }

    pub fn delete_feature_dataset(&mut self, target: impl Into<NameRef>) {
        self.push(DdlOp::DeleteFeatureDataset(target.into()));
    }

    pub fn create_domain(&mut self, domain: Domain) -> Token {
        let name = domain.name().to_string();
        let op = self.push(DdlOp::CreateDomain(domain));
        self.token(op, ObjectKind::Domain, &name)
    }

    pub fn modify_domain(&mut self, domain: Domain) {
        self.push(DdlOp::ModifyDomain(domain));
    }

    pub fn rename_domain(&mut self, target: impl Into<NameRef>, new_name: impl Into<String>) {
        self.push(DdlOp::RenameDomain {
            target: target.into(),
            new_name: new_name.into(),
        });
    }

    pub fn delete_domain(&mut self, target: impl Into<NameRef>) {
        self.push(DdlOp::DeleteDomain(target.into()));
    }

    // ════════════════════════════════════════════
    // Tables & fields
    // ════════════════════════════════════════════

    pub fn create_table(&mut self, desc: TableDescription) -> Token {
        let name = desc.name.clone();
        let op = self.push(DdlOp::CreateTable(desc));
        self.token(op, ObjectKind::Table, &name)
    }

    pub fn modify_table(&mut self, desc: TableDescription) {
        self.push(DdlOp::ModifyTable(desc));
    }

    pub fn rename_table(&mut self, target: impl Into<NameRef>, new_name: impl Into<String>) {
        self.push(DdlOp::RenameTable {
            target: target.into(),
            new_name: new_name.into(),
        });
    }

    pub fn delete_table(&mut self, target: impl Into<NameRef>) {
        self.push(DdlOp::DeleteTable(target.into()));
    }

    pub fn add_field(&mut self, table: impl Into<NameRef>, field: FieldDescription) {
        self.push(DdlOp::AddField {
            table: table.into(),
            field,
        });
    }

    pub fn delete_field(&mut self, table: impl Into<NameRef>, field: impl Into<String>) {
        self.push(DdlOp::DeleteField {
            table: table.into(),
            field: field.into(),
        });
    }

    pub fn rename_field(
        &mut self,
        table: impl Into<NameRef>,
        field: impl Into<String>,
        new_name: impl Into<String>,
    ) {
        self.push(DdlOp::RenameField {
            table: table.into(),
            field: field.into(),
            new_name: new_name.into(),
        });
    }

    pub fn create_index(&mut self, table: impl Into<NameRef>, index: IndexDescription) -> Token {
        let name = index.name.clone();
        let op = self.push(DdlOp::CreateIndex {
            table: table.into(),
            index,
        });
        self.token(op, ObjectKind::Index, &name)
    }

    pub fn delete_index(&mut self, table: impl Into<NameRef>, index: impl Into<NameRef>) {
        self.push(DdlOp::DeleteIndex {
            table: table.into(),
            index: index.into(),
        });
    }

    // ════════════════════════════════════════════
    // Relationship classes
    // ════════════════════════════════════════════

    pub fn create_relationship_class(&mut self, desc: RelationshipDescription) -> Token {
        let name = desc.name.clone();
        let op = self.push(DdlOp::CreateRelationship(desc));
        self.token(op, ObjectKind::Relationship, &name)
    }

    pub fn delete_relationship_class(&mut self, target: impl Into<NameRef>) {
        self.push(DdlOp::DeleteRelationship(target.into()));
    }

    /// Validates and applies every queued operation as one batch.
    ///
    /// Returns `Err(SchemaLocked)` when an open edit session holds a touched
    /// table; validation failures come back as an unsuccessful [`BuildResult`].
    pub fn build(self) -> GdxResult<BuildResult> {
        self.db.apply_schema_batch(self.id, &self.ops)
    }
}

// ════════════════════════════════════════════
// Batch planning (pure; no storage access)
// ════════════════════════════════════════════

/// Result of validating a batch against a catalog.
#[derive(Debug)]
pub(crate) struct SchemaPlan {
    pub(crate) catalog: Catalog,
    pub(crate) created: Vec<TableId>,
    pub(crate) dropped: Vec<TableId>,
    /// Unique indexes added to tables that may already hold rows.
    pub(crate) new_unique: Vec<(TableId, String)>,
    pub(crate) errors: Vec<GdxError>,
}

/// Existing tables directly rewritten by the batch, for schema-lock checks.
pub(crate) fn touched_tables(current: &Catalog, ops: &[DdlOp]) -> Vec<Arc<TableDefinition>> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for op in ops {
        let name = match op {
            DdlOp::ModifyTable(desc) => Some(desc.name.as_str()),
            other => match other.target_table() {
                Some(NameRef::Name(n)) => Some(n.as_str()),
                _ => None,
            },
        };
        if let Some(table) = name.and_then(|n| current.table_by_name(n))
            && seen.insert(table.id)
        {
            out.push(Arc::clone(table));
        }
    }
    out
}

pub(crate) fn plan_batch(current: &Catalog, builder: u64, ops: &[DdlOp]) -> SchemaPlan {
    let mut order: Vec<usize> = (0..ops.len()).collect();
    order.sort_by_key(|&i| ops[i].tier());

    let mut planner = Planner {
        catalog: current.clone(),
        builder,
        resolved: HashMap::new(),
        failed: HashSet::new(),
        created: Vec::new(),
        dropped: Vec::new(),
        new_unique: Vec::new(),
    };
    let mut errors = Vec::new();
    for i in order {
        if let Err(e) = planner.apply(i, &ops[i]) {
            planner.failed.insert(i);
            errors.push(e);
        }
    }
    SchemaPlan {
        catalog: planner.catalog,
        created: planner.created,
        dropped: planner.dropped,
        new_unique: planner.new_unique,
        errors,
    }
}

struct Planner {
    catalog: Catalog,
    builder: u64,
    /// op index → (kind, current name) of the object it created
    resolved: HashMap<usize, (ObjectKind, String)>,
    failed: HashSet<usize>,
    created: Vec<TableId>,
    dropped: Vec<TableId>,
    new_unique: Vec<(TableId, String)>,
}

fn validate_name(kind: &str, name: &str) -> GdxResult<()> {
    let mut chars = name.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name.len() <= 64;
    if valid {
        Ok(())
    } else {
        Err(GdxError::Validation(format!(
            "invalid {} name '{}': use letters, digits and '_' starting with a letter",
            kind, name
        )))
    }
}

fn duplicate(kind: &str, name: &str, scope: impl Into<String>) -> GdxError {
    GdxError::DuplicateName {
        kind: kind.to_string(),
        name: name.to_string(),
        scope: scope.into(),
    }
}

/// Key fields of a relationship must compare with each other.
fn keys_compatible(a: FieldType, b: FieldType) -> bool {
    let numeric = |t| {
        matches!(
            t,
            FieldType::ObjectId | FieldType::SmallInteger | FieldType::Integer
        )
    };
    let textual = |t| matches!(t, FieldType::Text | FieldType::Guid);
    (numeric(a) && numeric(b)) || (textual(a) && textual(b))
}

impl Planner {
    fn resolve(&self, r: &NameRef, kind: ObjectKind) -> GdxResult<String> {
        match r {
            NameRef::Name(n) => Ok(n.clone()),
            NameRef::Token(t) => {
                if t.builder != self.builder {
                    return Err(GdxError::Validation(format!(
                        "token for {} '{}' belongs to another schema builder",
                        t.kind, t.name
                    )));
                }
                if t.kind != kind {
                    return Err(GdxError::Validation(format!(
                        "token for {} '{}' used where a {} is expected",
                        t.kind, t.name, kind
                    )));
                }
                match self.resolved.get(&t.op) {
                    Some((_, name)) => Ok(name.clone()),
                    None if self.failed.contains(&t.op) => Err(GdxError::Validation(format!(
                        "{} '{}' was not created because its operation failed",
                        t.kind, t.name
                    ))),
                    None => Err(GdxError::Validation(format!(
                        "{} '{}' is not created before it is referenced",
                        t.kind, t.name
                    ))),
                }
            }
        }
    }

    fn table(&self, r: &NameRef) -> GdxResult<Arc<TableDefinition>> {
        let name = self.resolve(r, ObjectKind::Table)?;
        self.catalog.require_table(&name).cloned()
    }

    fn store_table(&mut self, table: TableDefinition) {
        self.catalog.tables.insert(table.id, Arc::new(table));
    }

    /// Updates names held by tokens after a rename.
    fn renamed(&mut self, kind: ObjectKind, old: &str, new: &str) {
        for (k, name) in self.resolved.values_mut() {
            if *k == kind && name.eq_ignore_ascii_case(old) {
                *name = new.to_string();
            }
        }
    }

    fn ensure_dataset_name_free(&self, name: &str) -> GdxResult<()> {
        if self.catalog.dataset_exists(name) {
            return Err(duplicate("dataset", name, "the geodatabase"));
        }
        Ok(())
    }

    fn apply(&mut self, idx: usize, op: &DdlOp) -> GdxResult<()> {
        match op {
            DdlOp::CreateFeatureDataset(desc) => {
                validate_name("feature dataset", &desc.name)?;
                if self.catalog.feature_dataset(&desc.name).is_some() {
                    return Err(duplicate("feature dataset", &desc.name, "the geodatabase"));
                }
                self.catalog.feature_datasets.insert(
                    desc.name.to_lowercase(),
                    FeatureDataset {
                        name: desc.name.clone(),
                        spatial_reference: desc.spatial_reference,
                    },
                );
                self.resolved
                    .insert(idx, (ObjectKind::FeatureDataset, desc.name.clone()));
            }
            DdlOp::RenameFeatureDataset { target, new_name } => {
                let old = self.resolve(target, ObjectKind::FeatureDataset)?;
                validate_name("feature dataset", new_name)?;
                if !old.eq_ignore_ascii_case(new_name) && self.catalog.feature_dataset(new_name).is_some() {
                    return Err(duplicate("feature dataset", new_name, "the geodatabase"));
                }
                let mut dataset = self
                    .catalog
                    .feature_datasets
                    .remove(&old.to_lowercase())
                    .ok_or_else(|| GdxError::DatasetNotFound(old.clone()))?;
                let old_name = std::mem::replace(&mut dataset.name, new_name.clone());
                self.catalog
                    .feature_datasets
                    .insert(new_name.to_lowercase(), dataset);
                let members: Vec<TableId> = self
                    .catalog
                    .tables()
                    .filter(|t| {
                        t.feature_dataset
                            .as_deref()
                            .is_some_and(|d| d.eq_ignore_ascii_case(&old_name))
                    })
                    .map(|t| t.id)
                    .collect();
                for id in members {
                    if let Some(t) = self.catalog.tables.get_mut(&id) {
                        Arc::make_mut(t).feature_dataset = Some(new_name.clone());
                    }
                }
                self.renamed(ObjectKind::FeatureDataset, &old_name, new_name);
            }
            DdlOp::DeleteFeatureDataset(target) => {
                let name = self.resolve(target, ObjectKind::FeatureDataset)?;
                if self.catalog.feature_dataset(&name).is_none() {
                    return Err(GdxError::DatasetNotFound(name));
                }
                if let Some(member) = self.catalog.tables().find(|t| {
                    t.feature_dataset
                        .as_deref()
                        .is_some_and(|d| d.eq_ignore_ascii_case(&name))
                }) {
                    return Err(GdxError::Validation(format!(
                        "feature dataset '{}' still contains '{}'",
                        name, member.name
                    )));
                }
                self.catalog.feature_datasets.remove(&name.to_lowercase());
            }
            DdlOp::CreateDomain(domain) => {
                validate_name("domain", domain.name())?;
                if self.catalog.domain(domain.name()).is_some() {
                    return Err(duplicate("domain", domain.name(), "the geodatabase"));
                }
                let domain = validate_domain(domain.clone())?;
                self.resolved
                    .insert(idx, (ObjectKind::Domain, domain.name().to_string()));
                self.catalog
                    .domains
                    .insert(domain.name().to_lowercase(), domain);
            }
            DdlOp::ModifyDomain(domain) => {
                let key = domain.name().to_lowercase();
                let existing = self
                    .catalog
                    .domains
                    .get(&key)
                    .ok_or_else(|| GdxError::DomainNotFound(domain.name().to_string()))?;
                if existing.field_type() != domain.field_type() && self.domain_in_use(domain.name()) {
                    return Err(GdxError::Validation(format!(
                        "domain '{}' is in use; its field type cannot change",
                        domain.name()
                    )));
                }
                let mut domain = validate_domain(domain.clone())?;
                // keep the stored spelling
                domain.set_name(existing.name().to_string());
                self.catalog.domains.insert(key, domain);
            }
            DdlOp::RenameDomain { target, new_name } => {
                let old = self.resolve(target, ObjectKind::Domain)?;
                validate_name("domain", new_name)?;
                if !old.eq_ignore_ascii_case(new_name) && self.catalog.domain(new_name).is_some() {
                    return Err(duplicate("domain", new_name, "the geodatabase"));
                }
                let mut domain = self
                    .catalog
                    .domains
                    .remove(&old.to_lowercase())
                    .ok_or_else(|| GdxError::DomainNotFound(old.clone()))?;
                let old_name = domain.name().to_string();
                domain.set_name(new_name.clone());
                self.catalog.domains.insert(new_name.to_lowercase(), domain);
                let ids: Vec<TableId> = self.catalog.tables.keys().copied().collect();
                for id in ids {
                    if let Some(t) = self.catalog.tables.get_mut(&id) {
                        let uses = t.fields.iter().any(|f| {
                            f.domain
                                .as_deref()
                                .is_some_and(|d| d.eq_ignore_ascii_case(&old_name))
                        });
                        if uses {
                            for f in &mut Arc::make_mut(t).fields {
                                if f.domain
                                    .as_deref()
                                    .is_some_and(|d| d.eq_ignore_ascii_case(&old_name))
                                {
                                    f.domain = Some(new_name.clone());
                                }
                            }
                        }
                    }
                }
                self.renamed(ObjectKind::Domain, &old_name, new_name);
            }
            DdlOp::DeleteDomain(target) => {
                let name = self.resolve(target, ObjectKind::Domain)?;
                if self.catalog.domain(&name).is_none() {
                    return Err(GdxError::DomainNotFound(name));
                }
                if self.domain_in_use(&name) {
                    return Err(GdxError::Validation(format!(
                        "domain '{}' is still assigned to a field",
                        name
                    )));
                }
                self.catalog.domains.remove(&name.to_lowercase());
            }
            DdlOp::CreateTable(desc) => {
                let id = self.create_table(desc)?;
                self.created.push(id);
                self.resolved
                    .insert(idx, (ObjectKind::Table, desc.name.clone()));
            }
            DdlOp::ModifyTable(desc) => self.modify_table(desc)?,
            DdlOp::RenameTable { target, new_name } => {
                let table = self.table(target)?;
                validate_name("table", new_name)?;
                if !table.name.eq_ignore_ascii_case(new_name) {
                    self.ensure_dataset_name_free(new_name)?;
                }
                let old_name = table.name.clone();
                let mut def = (*table).clone();
                def.name = new_name.clone();
                self.store_table(def);
                for rel in self.catalog.relationships.values_mut() {
                    if rel.origin_table.eq_ignore_ascii_case(&old_name) {
                        rel.origin_table = new_name.clone();
                    }
                    if rel.destination_table.eq_ignore_ascii_case(&old_name) {
                        rel.destination_table = new_name.clone();
                    }
                }
                self.renamed(ObjectKind::Table, &old_name, new_name);
            }
            DdlOp::DeleteTable(target) => {
                let table = self.table(target)?;
                if let Some(rel) = self.catalog.relationships().find(|r| {
                    r.origin_table.eq_ignore_ascii_case(&table.name)
                        || r.destination_table.eq_ignore_ascii_case(&table.name)
                }) {
                    return Err(GdxError::Validation(format!(
                        "table '{}' participates in relationship class '{}'",
                        table.name, rel.name
                    )));
                }
                self.catalog.tables.remove(&table.id);
                self.created.retain(|id| *id != table.id);
                self.dropped.push(table.id);
            }
            DdlOp::AddField { table, field } => {
                let table = self.table(table)?;
                let mut def = (*table).clone();
                self.push_field(&mut def, field, false)?;
                self.store_table(def);
            }
            DdlOp::DeleteField { table, field } => {
                let table = self.table(table)?;
                let def_field = table
                    .field(field)
                    .ok_or_else(|| GdxError::FieldNotFound {
                        table: table.name.clone(),
                        field: field.clone(),
                    })?;
                if def_field.field_type == FieldType::ObjectId
                    || table
                        .shape_field
                        .as_deref()
                        .is_some_and(|s| s.eq_ignore_ascii_case(field))
                {
                    return Err(GdxError::Validation(format!(
                        "field '{}' of '{}' is required by the dataset",
                        def_field.name, table.name
                    )));
                }
                if let Some(index) = table
                    .indexes
                    .iter()
                    .find(|i| i.fields.iter().any(|f| f.eq_ignore_ascii_case(field)))
                {
                    return Err(GdxError::Validation(format!(
                        "field '{}' is used by index '{}'",
                        def_field.name, index.name
                    )));
                }
                if self.field_used_by_relationship(&table.name, field) {
                    return Err(GdxError::Validation(format!(
                        "field '{}' of '{}' is a relationship key",
                        def_field.name, table.name
                    )));
                }
                let removed = def_field.id;
                let mut def = (*table).clone();
                def.fields.retain(|f| f.id != removed);
                self.store_table(def);
            }
            DdlOp::RenameField {
                table,
                field,
                new_name,
            } => {
                let table = self.table(table)?;
                validate_name("field", new_name)?;
                let old_name = table
                    .field(field)
                    .ok_or_else(|| GdxError::FieldNotFound {
                        table: table.name.clone(),
                        field: field.clone(),
                    })?
                    .name
                    .clone();
                if !old_name.eq_ignore_ascii_case(new_name) && table.field(new_name).is_some() {
                    return Err(duplicate("field", new_name, format!("table '{}'", table.name)));
                }
                let mut def = (*table).clone();
                rename_field_in(&mut def, &old_name, new_name);
                let table_name = def.name.clone();
                self.store_table(def);
                for rel in self.catalog.relationships.values_mut() {
                    if rel.origin_table.eq_ignore_ascii_case(&table_name)
                        && rel.origin_primary_key.eq_ignore_ascii_case(&old_name)
                    {
                        rel.origin_primary_key = new_name.clone();
                    }
                    if rel.destination_table.eq_ignore_ascii_case(&table_name)
                        && rel.origin_foreign_key.eq_ignore_ascii_case(&old_name)
                    {
                        rel.origin_foreign_key = new_name.clone();
                    }
                }
            }
            DdlOp::CreateIndex { table, index } => {
                let table = self.table(table)?;
                let mut def = (*table).clone();
                self.add_index(&mut def, index)?;
                if index.unique && !self.created.contains(&def.id) {
                    self.new_unique.push((def.id, index.name.clone()));
                }
                self.store_table(def);
                self.resolved
                    .insert(idx, (ObjectKind::Index, index.name.clone()));
            }
            DdlOp::DeleteIndex { table, index } => {
                let table = self.table(table)?;
                let name = self.resolve(index, ObjectKind::Index)?;
                let mut def = (*table).clone();
                let before = def.indexes.len();
                def.indexes.retain(|i| !i.name.eq_ignore_ascii_case(&name));
                if def.indexes.len() == before {
                    return Err(GdxError::Validation(format!(
                        "index '{}' not found on '{}'",
                        name, def.name
                    )));
                }
                self.store_table(def);
            }
            DdlOp::CreateRelationship(desc) => {
                let rel = self.create_relationship(desc)?;
                self.resolved
                    .insert(idx, (ObjectKind::Relationship, rel.name.clone()));
                self.catalog
                    .relationships
                    .insert(rel.name.to_lowercase(), rel);
            }
            DdlOp::DeleteRelationship(target) => {
                let name = self.resolve(target, ObjectKind::Relationship)?;
                if self
                    .catalog
                    .relationships
                    .remove(&name.to_lowercase())
                    .is_none()
                {
                    return Err(GdxError::RelationshipNotFound(name));
                }
            }
        }
        Ok(())
    }

    fn domain_in_use(&self, name: &str) -> bool {
        self.catalog.tables().any(|t| {
            t.fields.iter().any(|f| {
                f.domain
                    .as_deref()
                    .is_some_and(|d| d.eq_ignore_ascii_case(name))
            })
        })
    }

    fn field_used_by_relationship(&self, table: &str, field: &str) -> bool {
        self.catalog.relationships().any(|r| {
            (r.origin_table.eq_ignore_ascii_case(table)
                && r.origin_primary_key.eq_ignore_ascii_case(field))
                || (r.destination_table.eq_ignore_ascii_case(table)
                    && r.origin_foreign_key.eq_ignore_ascii_case(field))
        })
    }

    fn resolve_feature_dataset(&self, r: &NameRef) -> GdxResult<String> {
        let name = self.resolve(r, ObjectKind::FeatureDataset)?;
        self.catalog
            .feature_dataset(&name)
            .map(|d| d.name.clone())
            .ok_or(GdxError::DatasetNotFound(name))
    }

    fn create_table(&mut self, desc: &TableDescription) -> GdxResult<TableId> {
        validate_name("table", &desc.name)?;
        self.ensure_dataset_name_free(&desc.name)?;
        if desc.kind == DatasetKind::Relationship {
            return Err(GdxError::Validation(
                "relationship classes are created with create_relationship_class".to_string(),
            ));
        }
        let feature_dataset = match &desc.feature_dataset {
            Some(r) => {
                if !desc.kind.is_spatial() {
                    return Err(GdxError::Validation(format!(
                        "'{}' is not a feature class and cannot join a feature dataset",
                        desc.name
                    )));
                }
                Some(self.resolve_feature_dataset(r)?)
            }
            None => None,
        };
        if !desc.kind.is_spatial() && desc.shape_field.is_some() {
            return Err(GdxError::Validation(format!(
                "table '{}' has no shape field",
                desc.name
            )));
        }
        validate_name("field", &desc.object_id_field)?;

        let id = TableId(self.catalog.next_table_id.max(1));
        self.catalog.next_table_id = id.0 + 1;
        let mut def = TableDefinition {
            id,
            name: desc.name.clone(),
            alias: desc.alias.clone(),
            kind: desc.kind,
            fields: vec![FieldDefinition {
                id: FieldId(0),
                name: desc.object_id_field.clone(),
                alias: None,
                field_type: FieldType::ObjectId,
                nullable: false,
                length: None,
                default: None,
                domain: None,
                geometry_type: None,
            }],
            object_id_field: desc.object_id_field.clone(),
            shape_field: None,
            feature_dataset,
            indexes: Vec::new(),
            next_field_id: 1,
        };

        if let Some(geometry_type) = desc.kind.geometry_type() {
            let shape_name = desc
                .shape_field
                .clone()
                .unwrap_or_else(|| DEFAULT_SHAPE_FIELD.to_string());
            let declared = desc
                .fields
                .iter()
                .any(|f| f.name.eq_ignore_ascii_case(&shape_name));
            def.shape_field = Some(shape_name.clone());
            if !declared {
                self.push_field(
                    &mut def,
                    &FieldDescription::geometry(shape_name, geometry_type),
                    true,
                )?;
            }
        }
        for field in &desc.fields {
            self.push_field(&mut def, field, true)?;
        }
        if def.is_spatial() && def.shape().is_none() {
            return Err(GdxError::Validation(format!(
                "feature class '{}' lacks its shape field",
                def.name
            )));
        }
        for index in &desc.indexes {
            self.add_index(&mut def, index)?;
        }
        self.store_table(def);
        Ok(id)
    }

    fn modify_table(&mut self, desc: &TableDescription) -> GdxResult<()> {
        let table = self.catalog.require_table(&desc.name)?.clone();
        if table.kind != desc.kind {
            return Err(GdxError::Validation(format!(
                "'{}' is a {}; its dataset kind cannot change",
                table.name, table.kind
            )));
        }
        let mut def = (*table).clone();
        if desc.alias.is_some() {
            def.alias = desc.alias.clone();
        }
        if let Some(r) = &desc.feature_dataset {
            def.feature_dataset = Some(self.resolve_feature_dataset(r)?);
        }
        for field in &desc.fields {
            let Some(pos) = def
                .fields
                .iter()
                .position(|f| f.name.eq_ignore_ascii_case(&field.name))
            else {
                self.push_field(&mut def, field, false)?;
                continue;
            };
            let existing = def.fields[pos].clone();
            if existing.field_type != field.field_type {
                return Err(GdxError::Validation(format!(
                    "field '{}' of '{}' is {}; its type cannot change to {}",
                    existing.name, def.name, existing.field_type, field.field_type
                )));
            }
            if existing.nullable && !field.nullable {
                return Err(GdxError::Validation(format!(
                    "field '{}' of '{}' cannot become required",
                    existing.name, def.name
                )));
            }
            let mut updated = self.describe_field(&def, field, existing.id)?;
            updated.name = existing.name.clone();
            updated.geometry_type = existing.geometry_type;
            def.fields[pos] = updated;
        }
        for index in &desc.indexes {
            if def
                .indexes
                .iter()
                .any(|i| i.name.eq_ignore_ascii_case(&index.name))
            {
                continue;
            }
            self.add_index(&mut def, index)?;
            if index.unique {
                self.new_unique.push((def.id, index.name.clone()));
            }
        }
        self.store_table(def);
        Ok(())
    }

    /// Validated definition of `field` for `table` under `id`.
    fn describe_field(
        &self,
        table: &TableDefinition,
        field: &FieldDescription,
        id: FieldId,
    ) -> GdxResult<FieldDefinition> {
        validate_name("field", &field.name)?;
        if field.field_type == FieldType::ObjectId {
            return Err(GdxError::Validation(format!(
                "object id field of '{}' is managed by the geodatabase",
                table.name
            )));
        }
        if field.length.is_some() && field.field_type != FieldType::Text {
            return Err(GdxError::Validation(format!(
                "field '{}': only text fields take a length",
                field.name
            )));
        }
        if field.length == Some(0) {
            return Err(GdxError::Validation(format!(
                "field '{}': text length must be positive",
                field.name
            )));
        }
        let geometry_type = if field.field_type == FieldType::Geometry {
            let Some(expected) = table.kind.geometry_type() else {
                return Err(GdxError::Validation(format!(
                    "'{}' is not a feature class and cannot hold geometry field '{}'",
                    table.name, field.name
                )));
            };
            let is_shape = table
                .shape_field
                .as_deref()
                .is_some_and(|s| s.eq_ignore_ascii_case(&field.name));
            if !is_shape {
                return Err(GdxError::Validation(format!(
                    "feature class '{}' has exactly one geometry field",
                    table.name
                )));
            }
            match field.geometry_type {
                Some(g) if g != expected => {
                    return Err(GdxError::Validation(format!(
                        "shape field of '{}' must be {}, not {}",
                        table.name, expected, g
                    )));
                }
                _ => Some(expected),
            }
        } else {
            None
        };
        let domain = match &field.domain {
            Some(r) => {
                let name = self.resolve(r, ObjectKind::Domain)?;
                let domain = self
                    .catalog
                    .domain(&name)
                    .ok_or_else(|| GdxError::DomainNotFound(name.clone()))?;
                if !domain_fits(domain.field_type(), field.field_type) {
                    return Err(GdxError::Validation(format!(
                        "domain '{}' is {}, field '{}' is {}",
                        domain.name(),
                        domain.field_type(),
                        field.name,
                        field.field_type
                    )));
                }
                Some(domain.name().to_string())
            }
            None => None,
        };
        let mut def = FieldDefinition {
            id,
            name: field.name.clone(),
            alias: field.alias.clone(),
            field_type: field.field_type,
            nullable: field.nullable,
            length: field.length,
            default: None,
            domain,
            geometry_type,
        };
        if let Some(default) = field.default.clone().filter(|v| !v.is_null()) {
            let checked = def.check_value(&table.name, default, &self.catalog)?;
            def.default = Some(checked);
        }
        Ok(def)
    }

    fn push_field(
        &mut self,
        table: &mut TableDefinition,
        field: &FieldDescription,
        creating: bool,
    ) -> GdxResult<()> {
        if table.field(&field.name).is_some() {
            return Err(duplicate("field", &field.name, format!("table '{}'", table.name)));
        }
        if !creating && !field.nullable && field.default.as_ref().is_none_or(Value::is_null) {
            return Err(GdxError::Validation(format!(
                "required field '{}' added to existing table '{}' needs a default value",
                field.name, table.name
            )));
        }
        let def = self.describe_field(table, field, FieldId(table.next_field_id))?;
        table.next_field_id += 1;
        table.fields.push(def);
        Ok(())
    }

    fn add_index(&self, table: &mut TableDefinition, index: &IndexDescription) -> GdxResult<()> {
        validate_name("index", &index.name)?;
        if index.fields.is_empty() {
            return Err(GdxError::Validation(format!(
                "index '{}' lists no fields",
                index.name
            )));
        }
        if table
            .indexes
            .iter()
            .any(|i| i.name.eq_ignore_ascii_case(&index.name))
        {
            return Err(duplicate("index", &index.name, format!("table '{}'", table.name)));
        }
        let mut fields = Vec::with_capacity(index.fields.len());
        for name in &index.fields {
            let field = table.field(name).ok_or_else(|| GdxError::FieldNotFound {
                table: table.name.clone(),
                field: name.clone(),
            })?;
            if matches!(field.field_type, FieldType::Geometry | FieldType::Blob) {
                return Err(GdxError::Validation(format!(
                    "{} field '{}' cannot be indexed",
                    field.field_type, field.name
                )));
            }
            fields.push(field.name.clone());
        }
        table.indexes.push(IndexDefinition {
            name: index.name.clone(),
            fields,
            unique: index.unique,
        });
        Ok(())
    }

    fn create_relationship(&self, desc: &RelationshipDescription) -> GdxResult<RelationshipDefinition> {
        validate_name("relationship class", &desc.name)?;
        self.ensure_dataset_name_free(&desc.name)?;
        let origin = self.table(&desc.origin)?;
        let destination = self.table(&desc.destination)?;
        let pk = origin
            .field(&desc.origin_primary_key)
            .ok_or_else(|| GdxError::FieldNotFound {
                table: origin.name.clone(),
                field: desc.origin_primary_key.clone(),
            })?;
        let fk = destination
            .field(&desc.origin_foreign_key)
            .ok_or_else(|| GdxError::FieldNotFound {
                table: destination.name.clone(),
                field: desc.origin_foreign_key.clone(),
            })?;
        if !keys_compatible(pk.field_type, fk.field_type) {
            return Err(GdxError::Validation(format!(
                "relationship '{}': key types {} and {} do not match",
                desc.name, pk.field_type, fk.field_type
            )));
        }
        Ok(RelationshipDefinition {
            name: desc.name.clone(),
            origin_table: origin.name.clone(),
            destination_table: destination.name.clone(),
            origin_primary_key: pk.name.clone(),
            origin_foreign_key: fk.name.clone(),
            cardinality: desc.cardinality,
            forward_label: desc.forward_label.clone(),
            backward_label: desc.backward_label.clone(),
        })
    }
}

fn domain_fits(domain: FieldType, field: FieldType) -> bool {
    domain == field
        || matches!(
            (domain, field),
            (FieldType::Integer, FieldType::SmallInteger) | (FieldType::SmallInteger, FieldType::Integer)
        )
}

fn validate_domain(domain: Domain) -> GdxResult<Domain> {
    let field_type = domain.field_type();
    if matches!(
        field_type,
        FieldType::ObjectId | FieldType::Geometry | FieldType::Blob
    ) {
        return Err(GdxError::Validation(format!(
            "domain '{}' cannot constrain {} fields",
            domain.name(),
            field_type
        )));
    }
    let coerce = |v: Value| {
        let shown = v.to_string();
        field_type
            .coerce(v)
            .filter(|v| !v.is_null())
            .ok_or_else(|| {
                GdxError::Validation(format!(
                    "domain '{}': '{}' is not a {} value",
                    domain.name(),
                    shown,
                    field_type
                ))
            })
    };
    match domain.clone() {
        Domain::Coded {
            name,
            field_type,
            codes,
        } => {
            if codes.is_empty() {
                return Err(GdxError::Validation(format!(
                    "coded domain '{}' has no codes",
                    name
                )));
            }
            let mut checked: Vec<(Value, String)> = Vec::with_capacity(codes.len());
            for (code, description) in codes {
                let code = coerce(code)?;
                if checked.iter().any(|(c, _)| c == &code) {
                    return Err(duplicate("code", &code.to_string(), format!("domain '{}'", name)));
                }
                checked.push((code, description));
            }
            Ok(Domain::Coded {
                name,
                field_type,
                codes: checked,
            })
        }
        Domain::Range {
            name,
            field_type,
            min,
            max,
        } => {
            let (min, max) = (coerce(min)?, coerce(max)?);
            if min.compare(&max, true).is_none_or(|o| o.is_gt()) {
                return Err(GdxError::Validation(format!(
                    "range domain '{}': minimum {} exceeds maximum {}",
                    name, min, max
                )));
            }
            Ok(Domain::Range {
                name,
                field_type,
                min,
                max,
            })
        }
    }
}

fn rename_field_in(def: &mut TableDefinition, old: &str, new: &str) {
    if let Some(f) = def
        .fields
        .iter_mut()
        .find(|f| f.name.eq_ignore_ascii_case(old))
    {
        f.name = new.to_string();
    }
    if def.object_id_field.eq_ignore_ascii_case(old) {
        def.object_id_field = new.to_string();
    }
    if def
        .shape_field
        .as_deref()
        .is_some_and(|s| s.eq_ignore_ascii_case(old))
    {
        def.shape_field = Some(new.to_string());
    }
    for index in &mut def.indexes {
        for f in &mut index.fields {
            if f.eq_ignore_ascii_case(old) {
                *f = new.to_string();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::catalog::Cardinality;

    fn plan(catalog: &Catalog, ops: Vec<DdlOp>) -> SchemaPlan {
        plan_batch(catalog, 7, &ops)
    }

    fn token(op: usize, kind: ObjectKind, name: &str) -> Token {
        Token {
            builder: 7,
            op,
            kind,
            name: name.to_string(),
        }
    }

    fn trees() -> TableDescription {
        TableDescription::feature_class("Trees", GeometryType::Point)
            .field(FieldDescription::text("NAME", 32).required())
            .field(FieldDescription::double("HEIGHT"))
    }

    #[test]
    fn create_table_adds_object_id_and_shape() {
        let p = plan(&Catalog::default(), vec![DdlOp::CreateTable(trees())]);
        assert!(p.errors.is_empty(), "{:?}", p.errors);
        let t = p.catalog.require_table("trees").unwrap();
        assert_eq!(t.field_names(), vec!["OBJECTID", "SHAPE", "NAME", "HEIGHT"]);
        assert_eq!(t.object_id(), FieldId(0));
        assert_eq!(t.shape().unwrap().geometry_type, Some(GeometryType::Point));
        assert_eq!(p.created, vec![t.id]);
    }

    #[test]
    fn forward_tokens_resolve_out_of_queue_order() {
        // table queued before the dataset and domain it references
        let ops = vec![
            DdlOp::CreateTable(
                trees()
                    .in_dataset(token(1, ObjectKind::FeatureDataset, "Parks"))
                    .field(FieldDescription::integer("AGE").domain(token(2, ObjectKind::Domain, "Age"))),
            ),
            DdlOp::CreateFeatureDataset(FeatureDatasetDescription::new("Parks")),
            DdlOp::CreateDomain(Domain::Range {
                name: "Age".into(),
                field_type: FieldType::Integer,
                min: Value::Integer(0),
                max: Value::Integer(5000),
            }),
        ];
        let p = plan(&Catalog::default(), ops);
        assert!(p.errors.is_empty(), "{:?}", p.errors);
        let t = p.catalog.require_table("Trees").unwrap();
        assert_eq!(t.feature_dataset.as_deref(), Some("Parks"));
        assert_eq!(t.field("AGE").unwrap().domain.as_deref(), Some("Age"));
    }

    #[test]
    fn tokens_follow_renames_and_reject_foreign_builders() {
        let ops = vec![
            DdlOp::CreateFeatureDataset(FeatureDatasetDescription::new("Parks")),
            DdlOp::RenameFeatureDataset {
                target: token(0, ObjectKind::FeatureDataset, "Parks").into(),
                new_name: "Greenways".into(),
            },
            DdlOp::CreateTable(trees().in_dataset(token(0, ObjectKind::FeatureDataset, "Parks"))),
        ];
        let p = plan(&Catalog::default(), ops);
        assert!(p.errors.is_empty(), "{:?}", p.errors);
        let t = p.catalog.require_table("Trees").unwrap();
        assert_eq!(t.feature_dataset.as_deref(), Some("Greenways"));

        let mut foreign = token(0, ObjectKind::FeatureDataset, "Parks");
        foreign.builder = 99;
        let p = plan(
            &Catalog::default(),
            vec![
                DdlOp::CreateFeatureDataset(FeatureDatasetDescription::new("Parks")),
                DdlOp::CreateTable(trees().in_dataset(foreign)),
            ],
        );
        assert_eq!(p.errors.len(), 1);
        assert!(matches!(p.errors[0], GdxError::Validation(_)));
    }

    #[test]
    fn failures_are_collected() {
        let ops = vec![
            DdlOp::CreateTable(TableDescription::new("1bad")),
            DdlOp::CreateTable(TableDescription::new("Ok")),
            DdlOp::CreateTable(TableDescription::new("OK")),
            DdlOp::DeleteTable("Missing".into()),
        ];
        let p = plan(&Catalog::default(), ops);
        assert_eq!(p.errors.len(), 3);
        assert!(
            p.errors
                .iter()
                .any(|e| matches!(e, GdxError::DuplicateName { .. }))
        );
        assert!(
            p.errors
                .iter()
                .any(|e| matches!(e, GdxError::TableNotFound(_)))
        );
    }

    #[test]
    fn field_rules() {
        let base = plan(&Catalog::default(), vec![DdlOp::CreateTable(trees())]).catalog;
        let required = plan(
            &base,
            vec![DdlOp::AddField {
                table: "Trees".into(),
                field: FieldDescription::integer("AGE").required(),
            }],
        );
        assert_eq!(required.errors.len(), 1);

        let with_default = plan(
            &base,
            vec![DdlOp::AddField {
                table: "Trees".into(),
                field: FieldDescription::integer("AGE").required().default_value(1),
            }],
        );
        assert!(with_default.errors.is_empty());

        let retype = plan(
            &base,
            vec![DdlOp::ModifyTable(
                TableDescription::feature_class("Trees", GeometryType::Point)
                    .field(FieldDescription::integer("NAME")),
            )],
        );
        assert!(matches!(retype.errors[0], GdxError::Validation(_)));

        let drop_shape = plan(
            &base,
            vec![DdlOp::DeleteField {
                table: "Trees".into(),
                field: "SHAPE".into(),
            }],
        );
        assert_eq!(drop_shape.errors.len(), 1);
    }

    #[test]
    fn renames_propagate_to_indexes_and_relationships() {
        let ops = vec![
            DdlOp::CreateTable(TableDescription::new("Owners").field(FieldDescription::integer("OWNER_ID"))),
            DdlOp::CreateTable(
                trees()
                    .field(FieldDescription::integer("OWNER"))
                    .index(IndexDescription::new("IX_OWNER", ["OWNER"])),
            ),
            DdlOp::CreateRelationship(RelationshipDescription::new(
                "OwnerTrees",
                "Owners",
                "Trees",
                "OWNER_ID",
                "OWNER",
                Cardinality::OneToMany,
            )),
        ];
        let base = plan(&Catalog::default(), ops);
        assert!(base.errors.is_empty(), "{:?}", base.errors);

        let p = plan(
            &base.catalog,
            vec![
                DdlOp::RenameField {
                    table: "Trees".into(),
                    field: "OWNER".into(),
                    new_name: "OWNER_REF".into(),
                },
                DdlOp::RenameTable {
                    target: "Owners".into(),
                    new_name: "Stewards".into(),
                },
            ],
        );
        assert!(p.errors.is_empty(), "{:?}", p.errors);
        let rel = p.catalog.relationship("OwnerTrees").unwrap();
        assert_eq!(rel.origin_table, "Stewards");
        assert_eq!(rel.origin_foreign_key, "OWNER_REF");
        let t = p.catalog.require_table("Trees").unwrap();
        assert_eq!(t.indexes[0].fields, vec!["OWNER_REF"]);

        // a related table cannot go while the relationship class exists
        let p = plan(&base.catalog, vec![DdlOp::DeleteTable("Owners".into())]);
        assert_eq!(p.errors.len(), 1);
        let p = plan(
            &base.catalog,
            vec![
                DdlOp::DeleteTable("Owners".into()),
                DdlOp::DeleteRelationship("OwnerTrees".into()),
            ],
        );
        assert!(p.errors.is_empty(), "{:?}", p.errors);
        assert_eq!(p.dropped.len(), 1);
    }

    #[test]
    fn domain_validation() {
        let bad_range = Domain::Range {
            name: "Height".into(),
            field_type: FieldType::Double,
            min: Value::Double(10.0),
            max: Value::Double(1.0),
        };
        let p = plan(&Catalog::default(), vec![DdlOp::CreateDomain(bad_range)]);
        assert_eq!(p.errors.len(), 1);

        let species = Domain::Coded {
            name: "Species".into(),
            field_type: FieldType::Text,
            codes: vec![(Value::from("PI"), "Pine".into())],
        };
        let ops = vec![
            DdlOp::CreateDomain(species),
            DdlOp::CreateTable(trees().field(FieldDescription::text("SPECIES", 2).domain("Species"))),
        ];
        let base = plan(&Catalog::default(), ops);
        assert!(base.errors.is_empty(), "{:?}", base.errors);
        let p = plan(&base.catalog, vec![DdlOp::DeleteDomain("Species".into())]);
        assert_eq!(p.errors.len(), 1);
        let p = plan(
            &base.catalog,
            vec![DdlOp::RenameDomain {
                target: "Species".into(),
                new_name: "TreeSpecies".into(),
            }],
        );
        assert!(p.errors.is_empty());
        let t = p.catalog.require_table("Trees").unwrap();
        assert_eq!(t.field("SPECIES").unwrap().domain.as_deref(), Some("TreeSpecies"));
    }

    #[test]
    fn touched_tables_names_existing_targets() {
        let base = plan(&Catalog::default(), vec![DdlOp::CreateTable(trees())]).catalog;
        let ops = vec![
            DdlOp::AddField {
                table: "trees".into(),
                field: FieldDescription::integer("AGE"),
            },
            DdlOp::CreateTable(TableDescription::new("Other")),
        ];
        let touched = touched_tables(&base, &ops);
        assert_eq!(touched.len(), 1);
        assert_eq!(touched[0].name, "Trees");
    }
}
