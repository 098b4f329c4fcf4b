//! Version Graph — 버전 트리 관리
//!
//! Versions form a tree rooted at `DEFAULT`. Parents never change after
//! creation, so ancestor lists are cached in an LRU and only invalidated when
//! a version is deleted.

use crate::error::{GdxError, GdxResult};
use crate::schema::{RowId, TableId};
use crate::storage::delta_store::{Change, TableDeltas, latest_in};
use crate::transaction::chain::{BaseEntry, ChainLink, ShadowChain, entry_at};
use crate::transaction::{Generation, VersionId};
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

pub const DEFAULT_VERSION_NAME: &str = "DEFAULT";

/// Who may see and edit a version. Recorded, not enforced by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersionAccess {
    Private,
    Protected,
    Public,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub id: VersionId,
    pub name: String,
    pub description: Option<String>,
    pub access: VersionAccess,
    pub owner: Option<String>,
    pub parent: Option<VersionId>,
    pub children: Vec<VersionId>,
    pub created_at: Generation,
    /// Generation of the last commit, reconcile or post touching this version.
    pub modified_at: Generation,
}

#[derive(Debug)]
struct VersionNode {
    info: VersionInfo,
    history: Vec<Arc<BaseEntry>>,
}

#[derive(Debug)]
pub struct VersionGraph {
    nodes: RwLock<HashMap<VersionId, VersionNode>>,
    next_id: AtomicU64,
    /// version -> [version, parent, ..., DEFAULT]
    ancestors: Mutex<LruCache<VersionId, Arc<[VersionId]>>>,
}

impl VersionGraph {
    pub fn new(cache_capacity: usize) -> Self {
        let root = VersionNode {
            info: VersionInfo {
                id: VersionId::DEFAULT,
                name: DEFAULT_VERSION_NAME.to_string(),
                description: Some("Root version".to_string()),
                access: VersionAccess::Public,
                owner: None,
                parent: None,
                children: Vec::new(),
                created_at: Generation::ZERO,
                modified_at: Generation::ZERO,
            },
            history: Vec::new(),
        };
        let mut nodes = HashMap::new();
        nodes.insert(VersionId::DEFAULT, root);
        let capacity = NonZeroUsize::new(cache_capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            nodes: RwLock::new(nodes),
            next_id: AtomicU64::new(1),
            ancestors: Mutex::new(LruCache::new(capacity)),
        }
    }

    // ════════════════════════════════════════════
    // Lookup
    // ════════════════════════════════════════════

    pub fn exists(&self, id: VersionId) -> bool {
        self.nodes.read().contains_key(&id)
    }

    pub fn info(&self, id: VersionId) -> GdxResult<VersionInfo> {
        self.nodes
            .read()
            .get(&id)
            .map(|n| n.info.clone())
            .ok_or_else(|| GdxError::VersionNotFound(id.to_string()))
    }

    pub fn parent(&self, id: VersionId) -> GdxResult<Option<VersionId>> {
        Ok(self.info(id)?.parent)
    }

    pub fn children(&self, id: VersionId) -> GdxResult<Vec<VersionId>> {
        Ok(self.info(id)?.children)
    }

    pub fn list(&self) -> Vec<VersionInfo> {
        let mut out: Vec<VersionInfo> = self.nodes.read().values().map(|n| n.info.clone()).collect();
        out.sort_by_key(|i| i.id);
        out
    }

    /// Human-readable path such as `DEFAULT/edits/alice`.
    pub fn path(&self, id: VersionId) -> String {
        match self.ancestors(id) {
            Ok(chain) => {
                let nodes = self.nodes.read();
                chain
                    .iter()
                    .rev()
                    .filter_map(|v| nodes.get(v).map(|n| n.info.name.clone()))
                    .collect::<Vec<_>>()
                    .join("/")
            }
            Err(_) => id.to_string(),
        }
    }

    /// Resolves a full path (`DEFAULT/a/b`) or a unique bare name.
    pub fn find(&self, name: &str) -> GdxResult<Option<VersionId>> {
        let nodes = self.nodes.read();
        if name.contains('/') {
            let mut parts = name.split('/');
            let root = parts.next().unwrap_or_default();
            if !root.eq_ignore_ascii_case(DEFAULT_VERSION_NAME) {
                return Ok(None);
            }
            let mut current = VersionId::DEFAULT;
            for part in parts {
                let Some(node) = nodes.get(&current) else {
                    return Ok(None);
                };
                let next = node.info.children.iter().copied().find(|c| {
                    nodes
                        .get(c)
                        .is_some_and(|n| n.info.name.eq_ignore_ascii_case(part))
                });
                match next {
                    Some(c) => current = c,
                    None => return Ok(None),
                }
            }
            return Ok(Some(current));
        }
        let matches: Vec<VersionId> = nodes
            .values()
            .filter(|n| n.info.name.eq_ignore_ascii_case(name))
            .map(|n| n.info.id)
            .collect();
        match matches.len() {
            0 => Ok(None),
            1 => Ok(Some(matches[0])),
            n => Err(GdxError::Validation(format!(
                "version name '{}' is ambiguous ({} matches); use a full path",
                name, n
            ))),
        }
    }

    /// Ancestor list `[id, parent, ..., DEFAULT]`, cached.
    pub fn ancestors(&self, id: VersionId) -> GdxResult<Arc<[VersionId]>> {
        if let Some(hit) = self.ancestors.lock().get(&id) {
            return Ok(Arc::clone(hit));
        }
        let nodes = self.nodes.read();
        let mut out = Vec::new();
        let mut current = Some(id);
        while let Some(v) = current {
            let node = nodes
                .get(&v)
                .ok_or_else(|| GdxError::VersionNotFound(v.to_string()))?;
            out.push(v);
            current = node.info.parent;
        }
        let list: Arc<[VersionId]> = out.into();
        self.ancestors.lock().put(id, Arc::clone(&list));
        Ok(list)
    }

    pub fn is_ancestor(&self, ancestor: VersionId, of: VersionId) -> GdxResult<bool> {
        Ok(ancestor != of && self.ancestors(of)?.contains(&ancestor))
    }

    // ════════════════════════════════════════════
    // Mutation (caller holds the commit lock)
    // ════════════════════════════════════════════

    /// Allocates an id and inserts a child based on the parent as of `at`.
    pub(crate) fn create(
        &self,
        parent: VersionId,
        name: &str,
        access: VersionAccess,
        description: Option<String>,
        owner: Option<String>,
        at: Generation,
    ) -> GdxResult<VersionInfo> {
        validate_name(name)?;
        let mut nodes = self.nodes.write();
        check_sibling_name(&nodes, parent, name, None)?;
        let id = VersionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let info = VersionInfo {
            id,
            name: name.to_string(),
            description,
            access,
            owner,
            parent: Some(parent),
            children: Vec::new(),
            created_at: at,
            modified_at: at,
        };
        insert_node(&mut nodes, info.clone(), vec![BaseEntry::new(at, at)])?;
        debug!(version = %id, parent = %parent, name, "version created");
        Ok(info)
    }

    /// Re-inserts a version read back from the journal.
    pub(crate) fn restore(&self, info: VersionInfo, base: BaseEntry) -> GdxResult<()> {
        let mut nodes = self.nodes.write();
        self.next_id.fetch_max(info.id.0 + 1, Ordering::SeqCst);
        let mut info = info;
        info.children.clear();
        insert_node(&mut nodes, info, vec![base])
    }

    pub(crate) fn delete(&self, id: VersionId) -> GdxResult<VersionInfo> {
        if id.is_default() {
            return Err(GdxError::DefaultVersionImmutable {
                operation: "deleted".to_string(),
            });
        }
        let mut nodes = self.nodes.write();
        let node = nodes
            .get(&id)
            .ok_or_else(|| GdxError::VersionNotFound(id.to_string()))?;
        if !node.info.children.is_empty() {
            return Err(GdxError::HasChildren {
                version: node.info.name.clone(),
                children: node.info.children.len(),
            });
        }
        let parent = node.info.parent;
        let removed = nodes
            .remove(&id)
            .ok_or_else(|| GdxError::VersionNotFound(id.to_string()))?;
        if let Some(parent) = parent
            && let Some(p) = nodes.get_mut(&parent)
        {
            p.info.children.retain(|c| *c != id);
        }
        self.ancestors.lock().pop(&id);
        Ok(removed.info)
    }

    pub(crate) fn alter(
        &self,
        id: VersionId,
        name: Option<&str>,
        description: Option<Option<String>>,
        access: Option<VersionAccess>,
    ) -> GdxResult<VersionInfo> {
        let mut nodes = self.nodes.write();
        let parent = nodes
            .get(&id)
            .ok_or_else(|| GdxError::VersionNotFound(id.to_string()))?
            .info
            .parent;
        if let Some(new_name) = name {
            let Some(parent) = parent else {
                return Err(GdxError::DefaultVersionImmutable {
                    operation: "renamed".to_string(),
                });
            };
            validate_name(new_name)?;
            check_sibling_name(&nodes, parent, new_name, Some(id))?;
        }
        let node = nodes
            .get_mut(&id)
            .ok_or_else(|| GdxError::VersionNotFound(id.to_string()))?;
        if let Some(new_name) = name {
            node.info.name = new_name.to_string();
        }
        if let Some(description) = description {
            node.info.description = description;
        }
        if let Some(access) = access {
            node.info.access = access;
        }
        Ok(node.info.clone())
    }

    pub(crate) fn push_base(&self, id: VersionId, entry: BaseEntry) -> GdxResult<()> {
        let mut nodes = self.nodes.write();
        let node = nodes
            .get_mut(&id)
            .ok_or_else(|| GdxError::VersionNotFound(id.to_string()))?;
        node.info.modified_at = node.info.modified_at.max(entry.since);
        node.history.push(Arc::new(entry));
        Ok(())
    }

    pub(crate) fn touch(&self, id: VersionId, at: Generation) {
        if let Some(node) = self.nodes.write().get_mut(&id) {
            node.info.modified_at = node.info.modified_at.max(at);
        }
    }

    // ════════════════════════════════════════════
    // Visibility
    // ════════════════════════════════════════════

    pub fn base_entry(&self, id: VersionId, at: Generation) -> GdxResult<Option<Arc<BaseEntry>>> {
        let nodes = self.nodes.read();
        let node = nodes
            .get(&id)
            .ok_or_else(|| GdxError::VersionNotFound(id.to_string()))?;
        Ok(entry_at(&node.history, at).cloned())
    }

    /// Base histories of every direct child of `id`.
    pub(crate) fn child_histories(&self, id: VersionId) -> Vec<Vec<Arc<BaseEntry>>> {
        let nodes = self.nodes.read();
        nodes
            .get(&id)
            .map(|n| {
                n.info
                    .children
                    .iter()
                    .filter_map(|c| nodes.get(c).map(|cn| cn.history.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Shadow-resolution order of `id` at `snapshot`; walks the ancestors once.
    pub fn chain(&self, id: VersionId, snapshot: Generation) -> GdxResult<ShadowChain> {
        let ancestors = self.ancestors(id)?;
        let nodes = self.nodes.read();
        let mut links: SmallVec<[ChainLink; 4]> = SmallVec::new();
        let mut cutoff = snapshot;
        for (i, v) in ancestors.iter().enumerate() {
            let node = nodes
                .get(v)
                .ok_or_else(|| GdxError::VersionNotFound(v.to_string()))?;
            let step = if i + 1 < ancestors.len() {
                entry_at(&node.history, cutoff).cloned()
            } else {
                None
            };
            links.push(ChainLink {
                version: *v,
                cutoff,
                history: node.history.clone().into(),
                step: step.clone(),
            });
            if let Some(step) = step {
                cutoff = step.base;
            }
        }
        Ok(ShadowChain::new(links))
    }

    /// Resolves a row by walking the live graph from `id` to the root without
    /// any cached state. Reference for the cached chain.
    pub fn resolve_walk(
        &self,
        map: &TableDeltas,
        table: TableId,
        row_id: RowId,
        id: VersionId,
        snapshot: Generation,
    ) -> GdxResult<Option<Arc<Change>>> {
        let nodes = self.nodes.read();
        let mut current = Some(id);
        let mut cutoff = snapshot;
        while let Some(v) = current {
            let node = nodes
                .get(&v)
                .ok_or_else(|| GdxError::VersionNotFound(v.to_string()))?;
            if let Some(change) = latest_in(map, row_id, v, cutoff) {
                return Ok(Some(change));
            }
            current = node.info.parent;
            if current.is_some() {
                match entry_at(&node.history, cutoff) {
                    Some(entry) => cutoff = entry.cutoff_for(table, row_id),
                    None => break,
                }
            }
        }
        Ok(None)
    }
}

fn validate_name(name: &str) -> GdxResult<()> {
    if name.trim().is_empty() || name.contains('/') {
        return Err(GdxError::Validation(format!(
            "invalid version name '{}'",
            name
        )));
    }
    Ok(())
}

fn check_sibling_name(
    nodes: &HashMap<VersionId, VersionNode>,
    parent: VersionId,
    name: &str,
    except: Option<VersionId>,
) -> GdxResult<()> {
    let parent_node = nodes
        .get(&parent)
        .ok_or_else(|| GdxError::VersionNotFound(parent.to_string()))?;
    let taken = parent_node.info.children.iter().any(|c| {
        Some(*c) != except
            && nodes
                .get(c)
                .is_some_and(|n| n.info.name.eq_ignore_ascii_case(name))
    });
    if taken {
        return Err(GdxError::DuplicateName {
            kind: "version".to_string(),
            name: name.to_string(),
            scope: format!("children of '{}'", parent_node.info.name),
        });
    }
    Ok(())
}

fn insert_node(
    nodes: &mut HashMap<VersionId, VersionNode>,
    info: VersionInfo,
    history: Vec<BaseEntry>,
) -> GdxResult<()> {
    let parent = info
        .parent
        .ok_or_else(|| GdxError::Validation("only DEFAULT may lack a parent".to_string()))?;
    let parent_node = nodes
        .get_mut(&parent)
        .ok_or_else(|| GdxError::VersionNotFound(parent.to_string()))?;
    parent_node.info.children.push(info.id);
    let id = info.id;
    nodes.insert(
        id,
        VersionNode {
            info,
            history: history.into_iter().map(Arc::new).collect(),
        },
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> VersionGraph {
        VersionGraph::new(16)
    }

    #[test]
    fn create_and_navigate() -> GdxResult<()> {
        let g = graph();
        let a = g.create(VersionId::DEFAULT, "a", VersionAccess::Public, None, None, Generation(1))?;
        let b = g.create(a.id, "b", VersionAccess::Private, None, None, Generation(2))?;
        assert_eq!(g.parent(b.id)?, Some(a.id));
        assert_eq!(g.children(VersionId::DEFAULT)?, vec![a.id]);
        assert_eq!(&*g.ancestors(b.id)?, &[b.id, a.id, VersionId::DEFAULT]);
        assert_eq!(g.path(b.id), "DEFAULT/a/b");
        assert_eq!(g.find("DEFAULT/a/b")?, Some(b.id));
        assert_eq!(g.find("B")?, Some(b.id));
        assert_eq!(g.find("DEFAULT/x")?, None);
        assert!(g.is_ancestor(VersionId::DEFAULT, b.id)?);
        assert!(!g.is_ancestor(b.id, a.id)?);
        Ok(())
    }

    #[test]
    fn sibling_names_are_unique() -> GdxResult<()> {
        let g = graph();
        g.create(VersionId::DEFAULT, "qa", VersionAccess::Public, None, None, Generation(1))?;
        let err = g
            .create(VersionId::DEFAULT, "QA", VersionAccess::Public, None, None, Generation(2))
            .unwrap_err();
        assert!(matches!(err, GdxError::DuplicateName { .. }));
        // same name under a different parent is fine
        let other = g.create(VersionId::DEFAULT, "other", VersionAccess::Public, None, None, Generation(3))?;
        g.create(other.id, "qa", VersionAccess::Public, None, None, Generation(4))?;
        assert!(g.find("qa").is_err());
        Ok(())
    }

    #[test]
    fn delete_rules() -> GdxResult<()> {
        let g = graph();
        let a = g.create(VersionId::DEFAULT, "a", VersionAccess::Public, None, None, Generation(1))?;
        let b = g.create(a.id, "b", VersionAccess::Public, None, None, Generation(2))?;
        assert!(matches!(g.delete(a.id), Err(GdxError::HasChildren { children: 1, .. })));
        assert!(matches!(
            g.delete(VersionId::DEFAULT),
            Err(GdxError::DefaultVersionImmutable { .. })
        ));
        g.ancestors(b.id)?;
        g.delete(b.id)?;
        assert!(g.children(a.id)?.is_empty());
        assert!(matches!(g.ancestors(b.id), Err(GdxError::VersionNotFound(_))));
        g.delete(a.id)?;
        Ok(())
    }

    #[test]
    fn alter_renames_but_not_default() -> GdxResult<()> {
        let g = graph();
        let a = g.create(VersionId::DEFAULT, "a", VersionAccess::Public, None, None, Generation(1))?;
        let altered = g.alter(a.id, Some("renamed"), Some(Some("desc".into())), Some(VersionAccess::Protected))?;
        assert_eq!(altered.name, "renamed");
        assert_eq!(altered.access, VersionAccess::Protected);
        assert!(matches!(
            g.alter(VersionId::DEFAULT, Some("root"), None, None),
            Err(GdxError::DefaultVersionImmutable { .. })
        ));
        // description of DEFAULT may change
        g.alter(VersionId::DEFAULT, None, Some(None), None)?;
        Ok(())
    }

    #[test]
    fn chain_cutoffs_follow_base_history() -> GdxResult<()> {
        let g = graph();
        let a = g.create(VersionId::DEFAULT, "a", VersionAccess::Public, None, None, Generation(3))?;
        let b = g.create(a.id, "b", VersionAccess::Public, None, None, Generation(5))?;
        g.push_base(a.id, BaseEntry::new(Generation(8), Generation(7)))?;

        let chain = g.chain(b.id, Generation(10))?;
        let cutoffs: Vec<Generation> = chain.links.iter().map(|l| l.cutoff).collect();
        assert_eq!(cutoffs, vec![Generation(10), Generation(5), Generation(3)]);

        let chain = g.chain(a.id, Generation(10))?;
        let cutoffs: Vec<Generation> = chain.links.iter().map(|l| l.cutoff).collect();
        assert_eq!(cutoffs, vec![Generation(10), Generation(7)]);
        Ok(())
    }
}
