//! Grant, revoke and sync operations
//!
//! Every mutation resolves its grantees against the owner's guard, writes through
//! one store call, invalidates the registry cache before returning and emits an
//! audit event when something changed.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::audit::{Auditor, AuthzEvent};
use crate::context::ContextResolver;
use crate::error::{AuthzError, Result};
use crate::registry::Registry;
use crate::store::RelationStore;
use crate::types::{
    Capability, CapabilityHolder, ContextEntity, ContextRef, Definition, DefinitionKind, EntityId,
    GrantHolder, Grantee, OwnerKey, Permission, Relation, Role, RoleHolder, SyncChanges,
};

/// Resolved grantees of one mutation
struct Batch {
    ids: Vec<EntityId>,
    names: HashMap<EntityId, String>,
}

impl Batch {
    fn from_definitions<T: Definition>(definitions: &[T]) -> Self {
        let mut ids = Vec::with_capacity(definitions.len());
        let mut names = HashMap::with_capacity(definitions.len());
        for definition in definitions {
            if names.insert(definition.id(), definition.name().to_string()).is_none() {
                ids.push(definition.id());
            }
        }
        Self { ids, names }
    }

    fn names_of(&self, ids: &[EntityId]) -> Vec<String> {
        ids.iter()
            .filter_map(|id| self.names.get(id).cloned())
            .collect()
    }
}

/// Applies grant edge mutations
#[derive(Clone)]
pub struct GrantManager {
    registry: Arc<Registry>,
    relations: Arc<dyn RelationStore>,
    contexts: ContextResolver,
    direct_capabilities: bool,
    auditor: Auditor,
}

impl GrantManager {
    pub fn new(
        registry: Arc<Registry>,
        relations: Arc<dyn RelationStore>,
        contexts: ContextResolver,
        direct_capabilities: bool,
        auditor: Auditor,
    ) -> Self {
        Self {
            registry,
            relations,
            contexts,
            direct_capabilities,
            auditor,
        }
    }

    // Subject permissions

    pub async fn give_permission_to<S, I>(
        &self,
        subject: &S,
        permissions: I,
        context: Option<&dyn ContextEntity>,
    ) -> Result<Vec<EntityId>>
    where
        S: GrantHolder,
        I: IntoIterator,
        I::Item: Into<Grantee<Permission>>,
    {
        let subject = subject.subject_ref();
        let batch = self.permissions(permissions, &subject.guard).await?;
        let context = self.edge_context(context);
        self.grant(Relation::SubjectPermission, subject.owner_key(), batch, context)
            .await
    }

    pub async fn revoke_permission_to<S, I>(
        &self,
        subject: &S,
        permissions: I,
        context: Option<&dyn ContextEntity>,
    ) -> Result<Vec<EntityId>>
    where
        S: GrantHolder,
        I: IntoIterator,
        I::Item: Into<Grantee<Permission>>,
    {
        let subject = subject.subject_ref();
        let batch = self.permissions(permissions, &subject.guard).await?;
        let context = self.edge_context(context);
        self.revoke(Relation::SubjectPermission, subject.owner_key(), batch, context)
            .await
    }

    /// Replaces the subject's direct permissions for exactly this context
    pub async fn sync_permissions<S, I>(
        &self,
        subject: &S,
        permissions: I,
        context: Option<&dyn ContextEntity>,
    ) -> Result<SyncChanges>
    where
        S: GrantHolder,
        I: IntoIterator,
        I::Item: Into<Grantee<Permission>>,
    {
        let subject = subject.subject_ref();
        let batch = self.permissions(permissions, &subject.guard).await?;
        let context = self.edge_context(context);
        self.sync(Relation::SubjectPermission, subject.owner_key(), batch, context)
            .await
    }

    // Subject roles

    pub async fn assign_role<S, I>(
        &self,
        subject: &S,
        roles: I,
        context: Option<&dyn ContextEntity>,
    ) -> Result<Vec<EntityId>>
    where
        S: RoleHolder,
        I: IntoIterator,
        I::Item: Into<Grantee<Role>>,
    {
        let subject = subject.subject_ref();
        let batch = self.roles(roles, &subject.guard).await?;
        let context = self.edge_context(context);
        self.grant(Relation::SubjectRole, subject.owner_key(), batch, context)
            .await
    }

    pub async fn remove_role<S, I>(
        &self,
        subject: &S,
        roles: I,
        context: Option<&dyn ContextEntity>,
    ) -> Result<Vec<EntityId>>
    where
        S: RoleHolder,
        I: IntoIterator,
        I::Item: Into<Grantee<Role>>,
    {
        let subject = subject.subject_ref();
        let batch = self.roles(roles, &subject.guard).await?;
        let context = self.edge_context(context);
        self.revoke(Relation::SubjectRole, subject.owner_key(), batch, context)
            .await
    }

    pub async fn sync_roles<S, I>(
        &self,
        subject: &S,
        roles: I,
        context: Option<&dyn ContextEntity>,
    ) -> Result<SyncChanges>
    where
        S: RoleHolder,
        I: IntoIterator,
        I::Item: Into<Grantee<Role>>,
    {
        let subject = subject.subject_ref();
        let batch = self.roles(roles, &subject.guard).await?;
        let context = self.edge_context(context);
        self.sync(Relation::SubjectRole, subject.owner_key(), batch, context)
            .await
    }

    // Subject capabilities

    pub async fn assign_capability<S, I>(
        &self,
        subject: &S,
        capabilities: I,
        context: Option<&dyn ContextEntity>,
    ) -> Result<Vec<EntityId>>
    where
        S: CapabilityHolder,
        I: IntoIterator,
        I::Item: Into<Grantee<Capability>>,
    {
        self.ensure_direct_capabilities()?;
        let subject = subject.subject_ref();
        let batch = self.capabilities(capabilities, &subject.guard).await?;
        let context = self.edge_context(context);
        self.grant(Relation::SubjectCapability, subject.owner_key(), batch, context)
            .await
    }

    pub async fn remove_capability<S, I>(
        &self,
        subject: &S,
        capabilities: I,
        context: Option<&dyn ContextEntity>,
    ) -> Result<Vec<EntityId>>
    where
        S: CapabilityHolder,
        I: IntoIterator,
        I::Item: Into<Grantee<Capability>>,
    {
        let subject = subject.subject_ref();
        let batch = self.capabilities(capabilities, &subject.guard).await?;
        let context = self.edge_context(context);
        self.revoke(Relation::SubjectCapability, subject.owner_key(), batch, context)
            .await
    }

    pub async fn sync_capabilities<S, I>(
        &self,
        subject: &S,
        capabilities: I,
        context: Option<&dyn ContextEntity>,
    ) -> Result<SyncChanges>
    where
        S: CapabilityHolder,
        I: IntoIterator,
        I::Item: Into<Grantee<Capability>>,
    {
        self.ensure_direct_capabilities()?;
        let subject = subject.subject_ref();
        let batch = self.capabilities(capabilities, &subject.guard).await?;
        let context = self.edge_context(context);
        self.sync(Relation::SubjectCapability, subject.owner_key(), batch, context)
            .await
    }

    // Definition-level edges (always global)

    pub async fn grant_permission_to_role<I>(
        &self,
        role: impl Into<Grantee<Role>>,
        permissions: I,
    ) -> Result<Vec<EntityId>>
    where
        I: IntoIterator,
        I::Item: Into<Grantee<Permission>>,
    {
        let role = self.owner_role(role.into()).await?;
        let batch = self.permissions(permissions, &role.guard).await?;
        self.grant(Relation::RolePermission, OwnerKey::Role { id: role.id }, batch, None)
            .await
    }

    pub async fn revoke_permission_from_role<I>(
        &self,
        role: impl Into<Grantee<Role>>,
        permissions: I,
    ) -> Result<Vec<EntityId>>
    where
        I: IntoIterator,
        I::Item: Into<Grantee<Permission>>,
    {
        let role = self.owner_role(role.into()).await?;
        let batch = self.permissions(permissions, &role.guard).await?;
        self.revoke(Relation::RolePermission, OwnerKey::Role { id: role.id }, batch, None)
            .await
    }

    pub async fn grant_capability_to_role<I>(
        &self,
        role: impl Into<Grantee<Role>>,
        capabilities: I,
    ) -> Result<Vec<EntityId>>
    where
        I: IntoIterator,
        I::Item: Into<Grantee<Capability>>,
    {
        let role = self.owner_role(role.into()).await?;
        let batch = self.capabilities(capabilities, &role.guard).await?;
        self.grant(Relation::RoleCapability, OwnerKey::Role { id: role.id }, batch, None)
            .await
    }

    pub async fn revoke_capability_from_role<I>(
        &self,
        role: impl Into<Grantee<Role>>,
        capabilities: I,
    ) -> Result<Vec<EntityId>>
    where
        I: IntoIterator,
        I::Item: Into<Grantee<Capability>>,
    {
        let role = self.owner_role(role.into()).await?;
        let batch = self.capabilities(capabilities, &role.guard).await?;
        self.revoke(Relation::RoleCapability, OwnerKey::Role { id: role.id }, batch, None)
            .await
    }

    pub async fn grant_permission_to_capability<I>(
        &self,
        capability: impl Into<Grantee<Capability>>,
        permissions: I,
    ) -> Result<Vec<EntityId>>
    where
        I: IntoIterator,
        I::Item: Into<Grantee<Permission>>,
    {
        let capability = self.owner_capability(capability.into()).await?;
        let batch = self.permissions(permissions, &capability.guard).await?;
        self.grant(
            Relation::CapabilityPermission,
            OwnerKey::Capability { id: capability.id },
            batch,
            None,
        )
        .await
    }

    pub async fn revoke_permission_from_capability<I>(
        &self,
        capability: impl Into<Grantee<Capability>>,
        permissions: I,
    ) -> Result<Vec<EntityId>>
    where
        I: IntoIterator,
        I::Item: Into<Grantee<Permission>>,
    {
        let capability = self.owner_capability(capability.into()).await?;
        let batch = self.permissions(permissions, &capability.guard).await?;
        self.revoke(
            Relation::CapabilityPermission,
            OwnerKey::Capability { id: capability.id },
            batch,
            None,
        )
        .await
    }

    /// Makes `child` inherit from `parent`; rejects links that would close a cycle
    pub async fn add_role_parent(
        &self,
        child: impl Into<Grantee<Role>>,
        parent: impl Into<Grantee<Role>>,
    ) -> Result<bool> {
        let child = self.owner_role(child.into()).await?;
        let parent = self.registry.resolve_role(parent.into(), &child.guard).await?;

        let graph = self.registry.graph().await?;
        if let Some(path) = graph.hierarchy.cycle_if_added(child.id, parent.id) {
            let roles = self.registry.all_roles(Some(&child.guard)).await?;
            let rendered: Vec<String> = path
                .iter()
                .map(|id| {
                    roles
                        .iter()
                        .find(|r| r.id == *id)
                        .map(|r| r.name.clone())
                        .unwrap_or_else(|| id.to_string())
                })
                .collect();
            return Err(AuthzError::HierarchyCycle(rendered.join(" -> ")));
        }

        let batch = Batch::from_definitions(std::slice::from_ref(&parent));
        let attached = self
            .grant(Relation::RoleParent, OwnerKey::Role { id: child.id }, batch, None)
            .await?;
        Ok(!attached.is_empty())
    }

    pub async fn remove_role_parent(
        &self,
        child: impl Into<Grantee<Role>>,
        parent: impl Into<Grantee<Role>>,
    ) -> Result<bool> {
        let child = self.owner_role(child.into()).await?;
        let parent = self.registry.resolve_role(parent.into(), &child.guard).await?;
        let batch = Batch::from_definitions(std::slice::from_ref(&parent));
        let detached = self
            .revoke(Relation::RoleParent, OwnerKey::Role { id: child.id }, batch, None)
            .await?;
        Ok(!detached.is_empty())
    }

    /// Removes every grant edge owned by the subject
    pub async fn forget_subject<S: GrantHolder>(&self, subject: &S) -> Result<usize> {
        let owner = subject.subject_ref().owner_key();
        let removed = self.relations.remove_owner(&owner).await?;
        self.registry.invalidate_graph();
        info!(%owner, removed, "Subject forgotten");
        self.auditor.emit(AuthzEvent::SubjectForgotten {
            owner,
            edges_removed: removed,
        });
        Ok(removed)
    }

    fn edge_context(&self, context: Option<&dyn ContextEntity>) -> Option<ContextRef> {
        let context = self.contexts.normalize(context);
        self.contexts.edge_context(context.as_ref())
    }

    fn ensure_direct_capabilities(&self) -> Result<()> {
        if !self.direct_capabilities {
            return Err(AuthzError::InvalidInput(
                "Direct capability assignment is disabled".to_string(),
            ));
        }
        Ok(())
    }

    async fn owner_role(&self, role: Grantee<Role>) -> Result<Role> {
        let guard = match &role {
            Grantee::Entity(r) => r.guard.clone(),
            Grantee::Name(_) => self.registry.default_guard().to_string(),
        };
        self.registry.resolve_role(role, &guard).await
    }

    async fn owner_capability(&self, capability: Grantee<Capability>) -> Result<Capability> {
        let guard = match &capability {
            Grantee::Entity(c) => c.guard.clone(),
            Grantee::Name(_) => self.registry.default_guard().to_string(),
        };
        self.registry.resolve_capability(capability, &guard).await
    }

    async fn permissions<I>(&self, grantees: I, guard: &str) -> Result<Batch>
    where
        I: IntoIterator,
        I::Item: Into<Grantee<Permission>>,
    {
        let mut resolved = Vec::new();
        for grantee in grantees {
            resolved.push(self.registry.resolve_permission(grantee.into(), guard).await?);
        }
        Ok(Batch::from_definitions(&resolved))
    }

    async fn roles<I>(&self, grantees: I, guard: &str) -> Result<Batch>
    where
        I: IntoIterator,
        I::Item: Into<Grantee<Role>>,
    {
        let mut resolved = Vec::new();
        for grantee in grantees {
            resolved.push(self.registry.resolve_role(grantee.into(), guard).await?);
        }
        Ok(Batch::from_definitions(&resolved))
    }

    async fn capabilities<I>(&self, grantees: I, guard: &str) -> Result<Batch>
    where
        I: IntoIterator,
        I::Item: Into<Grantee<Capability>>,
    {
        let mut resolved = Vec::new();
        for grantee in grantees {
            resolved.push(self.registry.resolve_capability(grantee.into(), guard).await?);
        }
        Ok(Batch::from_definitions(&resolved))
    }

    async fn grant(
        &self,
        relation: Relation,
        owner: OwnerKey,
        batch: Batch,
        context: Option<ContextRef>,
    ) -> Result<Vec<EntityId>> {
        if batch.ids.is_empty() {
            return Ok(Vec::new());
        }

        let existing = self
            .relations
            .existing(relation, &owner, &batch.ids, context.as_ref())
            .await?;
        let missing: Vec<EntityId> = batch
            .ids
            .iter()
            .copied()
            .filter(|id| !existing.contains(id))
            .collect();
        if missing.is_empty() {
            debug!(%relation, %owner, "Grant already present");
            return Ok(Vec::new());
        }

        let attached = self
            .relations
            .attach(relation, &owner, &missing, context.as_ref())
            .await?;
        self.registry.invalidate_graph();

        if !attached.is_empty() {
            debug!(%relation, %owner, count = attached.len(), "Granted");
            self.auditor.emit(AuthzEvent::Granted {
                relation,
                grantees: batch.names_of(&attached),
                owner,
                context,
            });
        }
        Ok(attached)
    }

    async fn revoke(
        &self,
        relation: Relation,
        owner: OwnerKey,
        batch: Batch,
        context: Option<ContextRef>,
    ) -> Result<Vec<EntityId>> {
        if batch.ids.is_empty() {
            return Ok(Vec::new());
        }

        let detached = self
            .relations
            .detach(relation, &owner, Some(&batch.ids), context.as_ref())
            .await?;
        self.registry.invalidate_graph();

        if !detached.is_empty() {
            debug!(%relation, %owner, count = detached.len(), "Revoked");
            self.auditor.emit(AuthzEvent::Revoked {
                relation,
                grantees: batch.names_of(&detached),
                owner,
                context,
            });
        }
        Ok(detached)
    }

    async fn sync(
        &self,
        relation: Relation,
        owner: OwnerKey,
        batch: Batch,
        context: Option<ContextRef>,
    ) -> Result<SyncChanges> {
        let changes = self
            .relations
            .sync(relation, &owner, &batch.ids, context.as_ref(), true)
            .await?;
        self.registry.invalidate_graph();

        if !changes.is_empty() {
            // Detached grantees were not part of the batch, so name them via the registry
            let detached = self.detached_names(relation, &changes.detached).await?;
            debug!(
                %relation,
                %owner,
                attached = changes.attached.len(),
                detached = changes.detached.len(),
                "Synced"
            );
            self.auditor.emit(AuthzEvent::Synced {
                relation,
                attached: batch.names_of(&changes.attached),
                detached,
                owner,
                context,
            });
        }
        Ok(changes)
    }

    async fn detached_names(&self, relation: Relation, ids: &[EntityId]) -> Result<Vec<String>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let set = ids.iter().copied().collect();
        let names = match relation.grantee_kind() {
            DefinitionKind::Permission => self
                .registry
                .permissions_by_ids(&set)
                .await?
                .into_iter()
                .map(|p| p.name)
                .collect(),
            DefinitionKind::Role => self
                .registry
                .roles_by_ids(&set)
                .await?
                .into_iter()
                .map(|r| r.name)
                .collect(),
            DefinitionKind::Capability => self
                .registry
                .capabilities_by_ids(&set)
                .await?
                .into_iter()
                .map(|c| c.name)
                .collect(),
        };
        Ok(names)
    }
}
