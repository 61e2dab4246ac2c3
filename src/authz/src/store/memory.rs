//! In-memory relation and definition store

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{DefinitionStore, RelationStore};
use crate::context::ContextFilter;
use crate::error::Result;
use crate::types::{
    Capability, ContextRef, EntityId, GrantEdge, OwnerKey, Permission, Relation, Role,
    SyncChanges,
};

type EdgeKey = (Relation, OwnerKey);
type EdgeSet = HashSet<(EntityId, Option<ContextRef>)>;

#[derive(Default)]
struct Definitions {
    permissions: HashMap<EntityId, Permission>,
    roles: HashMap<EntityId, Role>,
    capabilities: HashMap<EntityId, Capability>,
}

/// In-memory store backing both traits.
///
/// Each multi-row mutation runs under a single write lock, so readers never see
/// the intermediate state of a detach-then-attach sync.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    edges: Arc<RwLock<HashMap<EdgeKey, EdgeSet>>>,
    definitions: Arc<RwLock<Definitions>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored edges
    pub async fn edge_count(&self) -> usize {
        self.edges.read().await.values().map(|set| set.len()).sum()
    }
}

fn attach_locked(
    set: &mut EdgeSet,
    grantees: &[EntityId],
    context: Option<&ContextRef>,
) -> Vec<EntityId> {
    let mut attached = Vec::new();
    for grantee in grantees {
        if set.insert((*grantee, context.cloned())) {
            attached.push(*grantee);
        }
    }
    attached
}

#[async_trait]
impl RelationStore for InMemoryStore {
    async fn exists(
        &self,
        relation: Relation,
        owner: &OwnerKey,
        grantee: EntityId,
        filter: &ContextFilter,
    ) -> Result<bool> {
        let edges = self.edges.read().await;
        Ok(edges
            .get(&(relation, owner.clone()))
            .map(|set| {
                set.iter()
                    .any(|(id, ctx)| *id == grantee && filter.matches(ctx.as_ref()))
            })
            .unwrap_or(false))
    }

    async fn grantees(
        &self,
        relation: Relation,
        owner: &OwnerKey,
        filter: &ContextFilter,
    ) -> Result<Vec<EntityId>> {
        let edges = self.edges.read().await;
        let mut seen = HashSet::new();
        let mut result = Vec::new();
        if let Some(set) = edges.get(&(relation, owner.clone())) {
            for (id, ctx) in set {
                if filter.matches(ctx.as_ref()) && seen.insert(*id) {
                    result.push(*id);
                }
            }
        }
        Ok(result)
    }

    async fn existing(
        &self,
        relation: Relation,
        owner: &OwnerKey,
        grantees: &[EntityId],
        context: Option<&ContextRef>,
    ) -> Result<HashSet<EntityId>> {
        let edges = self.edges.read().await;
        let Some(set) = edges.get(&(relation, owner.clone())) else {
            return Ok(HashSet::new());
        };
        Ok(grantees
            .iter()
            .filter(|id| set.contains(&(**id, context.cloned())))
            .copied()
            .collect())
    }

    async fn attach(
        &self,
        relation: Relation,
        owner: &OwnerKey,
        grantees: &[EntityId],
        context: Option<&ContextRef>,
    ) -> Result<Vec<EntityId>> {
        let mut edges = self.edges.write().await;
        let set = edges.entry((relation, owner.clone())).or_default();
        Ok(attach_locked(set, grantees, context))
    }

    async fn detach(
        &self,
        relation: Relation,
        owner: &OwnerKey,
        grantees: Option<&[EntityId]>,
        context: Option<&ContextRef>,
    ) -> Result<Vec<EntityId>> {
        let mut edges = self.edges.write().await;
        let Some(set) = edges.get_mut(&(relation, owner.clone())) else {
            return Ok(Vec::new());
        };

        let mut detached = Vec::new();
        set.retain(|(id, ctx)| {
            let in_scope = ctx.as_ref() == context
                && grantees.map(|ids| ids.contains(id)).unwrap_or(true);
            if in_scope {
                detached.push(*id);
            }
            !in_scope
        });
        Ok(detached)
    }

    async fn sync(
        &self,
        relation: Relation,
        owner: &OwnerKey,
        grantees: &[EntityId],
        context: Option<&ContextRef>,
        detaching: bool,
    ) -> Result<SyncChanges> {
        let mut edges = self.edges.write().await;
        let set = edges.entry((relation, owner.clone())).or_default();

        let mut changes = SyncChanges::default();
        if detaching {
            let wanted: HashSet<EntityId> = grantees.iter().copied().collect();
            set.retain(|(id, ctx)| {
                let stale = ctx.as_ref() == context && !wanted.contains(id);
                if stale {
                    changes.detached.push(*id);
                }
                !stale
            });
        }
        changes.attached = attach_locked(set, grantees, context);
        Ok(changes)
    }

    async fn contexts(
        &self,
        relation: Relation,
        owner: &OwnerKey,
        grantee: EntityId,
    ) -> Result<Vec<ContextRef>> {
        let edges = self.edges.read().await;
        let contexts: BTreeSet<ContextRef> = edges
            .get(&(relation, owner.clone()))
            .map(|set| {
                set.iter()
                    .filter(|(id, _)| *id == grantee)
                    .filter_map(|(_, ctx)| ctx.clone())
                    .collect()
            })
            .unwrap_or_default();
        Ok(contexts.into_iter().collect())
    }

    async fn edges(&self, relation: Relation) -> Result<Vec<GrantEdge>> {
        let edges = self.edges.read().await;
        Ok(edges
            .iter()
            .filter(|((rel, _), _)| *rel == relation)
            .flat_map(|((rel, owner), set)| {
                set.iter().map(move |(grantee, context)| GrantEdge {
                    relation: *rel,
                    owner: owner.clone(),
                    grantee: *grantee,
                    context: context.clone(),
                })
            })
            .collect())
    }

    async fn remove_owner(&self, owner: &OwnerKey) -> Result<usize> {
        let mut edges = self.edges.write().await;
        let mut removed = 0;
        edges.retain(|(_, key_owner), set| {
            if key_owner == owner {
                removed += set.len();
                false
            } else {
                true
            }
        });
        Ok(removed)
    }
}

fn in_guard(guard: Option<&str>, candidate: &str) -> bool {
    guard.map(|g| g == candidate).unwrap_or(true)
}

#[async_trait]
impl DefinitionStore for InMemoryStore {
    async fn permissions(&self, guard: Option<&str>) -> Result<Vec<Permission>> {
        let defs = self.definitions.read().await;
        let mut result: Vec<Permission> = defs
            .permissions
            .values()
            .filter(|p| in_guard(guard, &p.guard))
            .cloned()
            .collect();
        result.sort_by(|a, b| (&a.guard, &a.name).cmp(&(&b.guard, &b.name)));
        Ok(result)
    }

    async fn roles(&self, guard: Option<&str>) -> Result<Vec<Role>> {
        let defs = self.definitions.read().await;
        let mut result: Vec<Role> = defs
            .roles
            .values()
            .filter(|r| in_guard(guard, &r.guard))
            .cloned()
            .collect();
        result.sort_by(|a, b| (&a.guard, &a.name).cmp(&(&b.guard, &b.name)));
        Ok(result)
    }

    async fn capabilities(&self, guard: Option<&str>) -> Result<Vec<Capability>> {
        let defs = self.definitions.read().await;
        let mut result: Vec<Capability> = defs
            .capabilities
            .values()
            .filter(|c| in_guard(guard, &c.guard))
            .cloned()
            .collect();
        result.sort_by(|a, b| (&a.guard, &a.name).cmp(&(&b.guard, &b.name)));
        Ok(result)
    }

    async fn put_permission(&self, permission: Permission) -> Result<()> {
        let mut defs = self.definitions.write().await;
        defs.permissions.insert(permission.id, permission);
        Ok(())
    }

    async fn put_role(&self, role: Role) -> Result<()> {
        let mut defs = self.definitions.write().await;
        defs.roles.insert(role.id, role);
        Ok(())
    }

    async fn put_capability(&self, capability: Capability) -> Result<()> {
        let mut defs = self.definitions.write().await;
        defs.capabilities.insert(capability.id, capability);
        Ok(())
    }
}
