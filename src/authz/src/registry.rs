//! Definition registry backed by the registry cache
//!
//! Enumerates permissions, roles and capabilities per guard, resolves grantees by
//! name or typed definition, and syncs statically built definition tables.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

use crate::cache::RegistryCache;
use crate::error::{AuthzError, Result};
use crate::hierarchy::RoleHierarchy;
use crate::store::{DefinitionStore, RelationStore};
use crate::types::{
    Capability, Definition, EntityId, Grantee, OwnerKey, Permission, Relation, Role,
};

const PERMISSIONS: &str = "permissions:";
const ROLES: &str = "roles:";
const CAPABILITIES: &str = "capabilities:";
pub(crate) const GRAPH_KEY: &str = "graph";

fn listing_key(prefix: &str, guard: Option<&str>) -> String {
    format!("{}{}", prefix, guard.unwrap_or("*"))
}

/// Definition-level edges: role/capability composition and role inheritance
#[derive(Debug, Clone, Default)]
pub struct DefinitionGraph {
    pub role_permissions: HashMap<EntityId, HashSet<EntityId>>,
    pub role_capabilities: HashMap<EntityId, HashSet<EntityId>>,
    pub capability_permissions: HashMap<EntityId, HashSet<EntityId>>,
    pub hierarchy: RoleHierarchy,
}

impl DefinitionGraph {
    pub async fn load(relations: &dyn RelationStore) -> Result<Self> {
        let mut graph = Self::default();

        for edge in relations.edges(Relation::RolePermission).await? {
            if let OwnerKey::Role { id } = edge.owner {
                graph.role_permissions.entry(id).or_default().insert(edge.grantee);
            }
        }
        for edge in relations.edges(Relation::RoleCapability).await? {
            if let OwnerKey::Role { id } = edge.owner {
                graph.role_capabilities.entry(id).or_default().insert(edge.grantee);
            }
        }
        for edge in relations.edges(Relation::CapabilityPermission).await? {
            if let OwnerKey::Capability { id } = edge.owner {
                graph
                    .capability_permissions
                    .entry(id)
                    .or_default()
                    .insert(edge.grantee);
            }
        }
        for edge in relations.edges(Relation::RoleParent).await? {
            if let OwnerKey::Role { id } = edge.owner {
                graph.hierarchy.add_parent(id, edge.grantee);
            }
        }

        Ok(graph)
    }

    fn lookup<'a>(
        map: &'a HashMap<EntityId, HashSet<EntityId>>,
        owner: &EntityId,
    ) -> impl Iterator<Item = EntityId> + 'a {
        map.get(owner).into_iter().flat_map(|set| set.iter().copied())
    }

    pub fn permissions_of_role(&self, role: &EntityId) -> impl Iterator<Item = EntityId> + '_ {
        Self::lookup(&self.role_permissions, role)
    }

    pub fn capabilities_of_role(&self, role: &EntityId) -> impl Iterator<Item = EntityId> + '_ {
        Self::lookup(&self.role_capabilities, role)
    }

    pub fn permissions_of_capability(
        &self,
        capability: &EntityId,
    ) -> impl Iterator<Item = EntityId> + '_ {
        Self::lookup(&self.capability_permissions, capability)
    }
}

/// Statically built definition table handed to `sync_definitions`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DefinitionTable {
    pub permissions: Vec<PermissionDefinition>,
    pub roles: Vec<RoleDefinition>,
    pub capabilities: Vec<CapabilityDefinition>,
}

impl DefinitionTable {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PermissionDefinition {
    pub name: String,
    pub guard: Option<String>,
    pub label: Option<String>,
    pub description: Option<String>,
    pub feature: Option<String>,
    /// Capabilities this permission belongs to
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RoleDefinition {
    pub name: String,
    pub guard: Option<String>,
    pub label: Option<String>,
    pub description: Option<String>,
    pub feature: Option<String>,
    pub permissions: Vec<String>,
    pub capabilities: Vec<String>,
    /// Parent roles this role inherits from
    pub inherits: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CapabilityDefinition {
    pub name: String,
    pub guard: Option<String>,
    pub label: Option<String>,
    pub description: Option<String>,
    pub permissions: Vec<String>,
}

/// Outcome of a definition sync
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionSyncReport {
    pub created: usize,
    pub updated: usize,
}

fn ensure_guard<T: Definition>(entity: &T, guard: &str) -> Result<()> {
    if entity.guard() != guard {
        return Err(AuthzError::GuardMismatch {
            grantee: entity.name().to_string(),
            expected: guard.to_string(),
            actual: entity.guard().to_string(),
        });
    }
    Ok(())
}

fn resolve_in<T: Definition>(grantee: Grantee<T>, guard: &str, listing: &[T]) -> Result<T> {
    match grantee {
        Grantee::Entity(entity) => {
            ensure_guard(&entity, guard)?;
            listing
                .iter()
                .find(|d| d.id() == entity.id())
                .cloned()
                .ok_or_else(|| AuthzError::UnresolvedGrantee {
                    kind: T::KIND,
                    name: entity.name().to_string(),
                    guard: guard.to_string(),
                })
        }
        Grantee::Name(name) => listing
            .iter()
            .find(|d| d.name() == name)
            .cloned()
            .ok_or_else(|| AuthzError::UnresolvedGrantee {
                kind: T::KIND,
                name,
                guard: guard.to_string(),
            }),
    }
}

/// Cached access to definitions
pub struct Registry {
    definitions: Arc<dyn DefinitionStore>,
    relations: Arc<dyn RelationStore>,
    cache: Arc<RegistryCache>,
    default_guard: String,
}

impl Registry {
    pub fn new(
        definitions: Arc<dyn DefinitionStore>,
        relations: Arc<dyn RelationStore>,
        cache: Arc<RegistryCache>,
        default_guard: impl Into<String>,
    ) -> Self {
        Self {
            definitions,
            relations,
            cache,
            default_guard: default_guard.into(),
        }
    }

    pub fn default_guard(&self) -> &str {
        &self.default_guard
    }

    pub fn cache(&self) -> &RegistryCache {
        &self.cache
    }

    pub async fn all_permissions(&self, guard: Option<&str>) -> Result<Arc<Vec<Permission>>> {
        let store = Arc::clone(&self.definitions);
        let owned = guard.map(str::to_string);
        self.cache
            .get_or_load(&listing_key(PERMISSIONS, guard), || async move {
                Ok(Arc::new(store.permissions(owned.as_deref()).await?))
            })
            .await
    }

    pub async fn all_roles(&self, guard: Option<&str>) -> Result<Arc<Vec<Role>>> {
        let store = Arc::clone(&self.definitions);
        let owned = guard.map(str::to_string);
        self.cache
            .get_or_load(&listing_key(ROLES, guard), || async move {
                Ok(Arc::new(store.roles(owned.as_deref()).await?))
            })
            .await
    }

    pub async fn all_capabilities(&self, guard: Option<&str>) -> Result<Arc<Vec<Capability>>> {
        let store = Arc::clone(&self.definitions);
        let owned = guard.map(str::to_string);
        self.cache
            .get_or_load(&listing_key(CAPABILITIES, guard), || async move {
                Ok(Arc::new(store.capabilities(owned.as_deref()).await?))
            })
            .await
    }

    /// Role composition and inheritance edges
    pub async fn graph(&self) -> Result<Arc<DefinitionGraph>> {
        let relations = Arc::clone(&self.relations);
        self.cache
            .get_or_load(GRAPH_KEY, || async move {
                Ok(Arc::new(DefinitionGraph::load(relations.as_ref()).await?))
            })
            .await
    }

    pub async fn find_permission(&self, name: &str, guard: &str) -> Result<Option<Permission>> {
        Ok(self
            .all_permissions(Some(guard))
            .await?
            .iter()
            .find(|p| p.name == name)
            .cloned())
    }

    pub async fn find_role(&self, name: &str, guard: &str) -> Result<Option<Role>> {
        Ok(self
            .all_roles(Some(guard))
            .await?
            .iter()
            .find(|r| r.name == name)
            .cloned())
    }

    pub async fn find_capability(&self, name: &str, guard: &str) -> Result<Option<Capability>> {
        Ok(self
            .all_capabilities(Some(guard))
            .await?
            .iter()
            .find(|c| c.name == name)
            .cloned())
    }

    pub async fn resolve_permission(
        &self,
        grantee: Grantee<Permission>,
        guard: &str,
    ) -> Result<Permission> {
        resolve_in(grantee, guard, &self.all_permissions(Some(guard)).await?)
    }

    pub async fn resolve_role(&self, grantee: Grantee<Role>, guard: &str) -> Result<Role> {
        resolve_in(grantee, guard, &self.all_roles(Some(guard)).await?)
    }

    pub async fn resolve_capability(
        &self,
        grantee: Grantee<Capability>,
        guard: &str,
    ) -> Result<Capability> {
        resolve_in(grantee, guard, &self.all_capabilities(Some(guard)).await?)
    }

    /// Definitions for a set of ids, in listing order
    pub async fn permissions_by_ids(&self, ids: &HashSet<EntityId>) -> Result<Vec<Permission>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .all_permissions(None)
            .await?
            .iter()
            .filter(|p| ids.contains(&p.id))
            .cloned()
            .collect())
    }

    pub async fn roles_by_ids(&self, ids: &HashSet<EntityId>) -> Result<Vec<Role>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .all_roles(None)
            .await?
            .iter()
            .filter(|r| ids.contains(&r.id))
            .cloned()
            .collect())
    }

    pub async fn capabilities_by_ids(&self, ids: &HashSet<EntityId>) -> Result<Vec<Capability>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .all_capabilities(None)
            .await?
            .iter()
            .filter(|c| ids.contains(&c.id))
            .cloned()
            .collect())
    }

    /// Creates a permission unless one with the same name exists in its guard
    pub async fn create_permission(&self, permission: Permission) -> Result<Permission> {
        validate_name(&permission.name)?;
        if let Some(existing) = self.find_permission(&permission.name, &permission.guard).await? {
            return Ok(existing);
        }
        self.definitions.put_permission(permission.clone()).await?;
        self.invalidate_definitions();
        debug!(name = %permission.name, guard = %permission.guard, "Permission created");
        Ok(permission)
    }

    pub async fn create_role(&self, role: Role) -> Result<Role> {
        validate_name(&role.name)?;
        if let Some(existing) = self.find_role(&role.name, &role.guard).await? {
            return Ok(existing);
        }
        self.definitions.put_role(role.clone()).await?;
        self.invalidate_definitions();
        debug!(name = %role.name, guard = %role.guard, "Role created");
        Ok(role)
    }

    pub async fn create_capability(&self, capability: Capability) -> Result<Capability> {
        validate_name(&capability.name)?;
        if let Some(existing) = self.find_capability(&capability.name, &capability.guard).await? {
            return Ok(existing);
        }
        self.definitions.put_capability(capability.clone()).await?;
        self.invalidate_definitions();
        debug!(name = %capability.name, guard = %capability.guard, "Capability created");
        Ok(capability)
    }

    /// Creates missing definitions and refreshes cosmetic fields. Never deletes.
    pub async fn sync_definitions(&self, table: &DefinitionTable) -> Result<DefinitionSyncReport> {
        let mut report = DefinitionSyncReport::default();

        for def in &table.permissions {
            validate_name(&def.name)?;
            let guard = self.guard_or_default(def.guard.as_deref());
            match self.find_permission(&def.name, &guard).await? {
                None => {
                    let mut permission = Permission::new(&def.name, guard);
                    permission.label = def.label.clone();
                    permission.description = def.description.clone();
                    permission.feature = def.feature.clone();
                    self.definitions.put_permission(permission).await?;
                    self.cache.invalidate_prefix(PERMISSIONS);
                    report.created += 1;
                }
                Some(mut existing) => {
                    if existing.label != def.label
                        || existing.description != def.description
                        || existing.feature != def.feature
                    {
                        existing.label = def.label.clone();
                        existing.description = def.description.clone();
                        existing.feature = def.feature.clone();
                        self.definitions.put_permission(existing).await?;
                        self.cache.invalidate_prefix(PERMISSIONS);
                        report.updated += 1;
                    }
                }
            }
        }

        for def in &table.capabilities {
            validate_name(&def.name)?;
            let guard = self.guard_or_default(def.guard.as_deref());
            match self.find_capability(&def.name, &guard).await? {
                None => {
                    let mut capability = Capability::new(&def.name, guard);
                    capability.label = def.label.clone();
                    capability.description = def.description.clone();
                    self.definitions.put_capability(capability).await?;
                    self.cache.invalidate_prefix(CAPABILITIES);
                    report.created += 1;
                }
                Some(mut existing) => {
                    if existing.label != def.label || existing.description != def.description {
                        existing.label = def.label.clone();
                        existing.description = def.description.clone();
                        self.definitions.put_capability(existing).await?;
                        self.cache.invalidate_prefix(CAPABILITIES);
                        report.updated += 1;
                    }
                }
            }
        }

        for def in &table.roles {
            validate_name(&def.name)?;
            let guard = self.guard_or_default(def.guard.as_deref());
            match self.find_role(&def.name, &guard).await? {
                None => {
                    let mut role = Role::new(&def.name, guard);
                    role.label = def.label.clone();
                    role.description = def.description.clone();
                    role.feature = def.feature.clone();
                    self.definitions.put_role(role).await?;
                    self.cache.invalidate_prefix(ROLES);
                    report.created += 1;
                }
                Some(mut existing) => {
                    if existing.label != def.label
                        || existing.description != def.description
                        || existing.feature != def.feature
                    {
                        existing.label = def.label.clone();
                        existing.description = def.description.clone();
                        existing.feature = def.feature.clone();
                        self.definitions.put_role(existing).await?;
                        self.cache.invalidate_prefix(ROLES);
                        report.updated += 1;
                    }
                }
            }
        }

        info!(
            created = report.created,
            updated = report.updated,
            "Definitions synced"
        );
        Ok(report)
    }

    pub fn guard_or_default(&self, guard: Option<&str>) -> String {
        guard.unwrap_or(&self.default_guard).to_string()
    }

    /// Drops every cached listing
    pub fn invalidate_definitions(&self) {
        self.cache.invalidate_prefix(PERMISSIONS);
        self.cache.invalidate_prefix(ROLES);
        self.cache.invalidate_prefix(CAPABILITIES);
    }

    /// Drops the cached definition graph
    pub fn invalidate_graph(&self) {
        self.cache.invalidate(GRAPH_KEY);
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(AuthzError::InvalidInput(
            "Definition name cannot be empty".to_string(),
        ));
    }
    Ok(())
}
