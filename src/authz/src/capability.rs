//! Capability indirection: named groups of permissions held by roles or subjects

use std::collections::HashSet;
use std::sync::Arc;

use crate::config::CapabilitySection;
use crate::context::ContextFilter;
use crate::error::Result;
use crate::registry::Registry;
use crate::store::RelationStore;
use crate::types::{EntityId, Permission, Relation, SubjectRef};

/// Resolves capability → permission edges from the cached definition graph
#[derive(Clone)]
pub struct CapabilityIndex {
    registry: Arc<Registry>,
    relations: Arc<dyn RelationStore>,
    enabled: bool,
    direct_assignment: bool,
}

impl CapabilityIndex {
    pub fn new(
        registry: Arc<Registry>,
        relations: Arc<dyn RelationStore>,
        config: &CapabilitySection,
    ) -> Self {
        Self {
            registry,
            relations,
            enabled: config.enabled,
            direct_assignment: config.direct_assignment,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Whether capabilities assigned straight to subjects count
    pub fn direct_assignment_enabled(&self) -> bool {
        self.enabled && self.direct_assignment
    }

    /// Ids of the permissions grouped by the given capabilities
    pub async fn permission_ids_of(
        &self,
        capabilities: &HashSet<EntityId>,
    ) -> Result<HashSet<EntityId>> {
        if !self.enabled || capabilities.is_empty() {
            return Ok(HashSet::new());
        }
        let graph = self.registry.graph().await?;
        Ok(capabilities
            .iter()
            .flat_map(|cap| graph.permissions_of_capability(cap))
            .collect())
    }

    pub async fn permissions_of(
        &self,
        capabilities: &HashSet<EntityId>,
    ) -> Result<Vec<Permission>> {
        let ids = self.permission_ids_of(capabilities).await?;
        self.registry.permissions_by_ids(&ids).await
    }

    /// Capabilities granted to any of the given roles
    pub async fn capabilities_of_roles(
        &self,
        roles: &HashSet<EntityId>,
    ) -> Result<HashSet<EntityId>> {
        if !self.enabled || roles.is_empty() {
            return Ok(HashSet::new());
        }
        let graph = self.registry.graph().await?;
        Ok(roles
            .iter()
            .flat_map(|role| graph.capabilities_of_role(role))
            .collect())
    }

    /// Capabilities assigned to the subject itself under `filter`
    pub async fn direct_capabilities(
        &self,
        subject: &SubjectRef,
        filter: &ContextFilter,
    ) -> Result<HashSet<EntityId>> {
        if !self.direct_assignment_enabled() {
            return Ok(HashSet::new());
        }
        Ok(self
            .relations
            .grantees(Relation::SubjectCapability, &subject.owner_key(), filter)
            .await?
            .into_iter()
            .collect())
    }

    /// Union of every permission path for a subject, deduplicated by id.
    ///
    /// `roles` must already include inherited roles.
    pub async fn all_permission_ids(
        &self,
        subject: &SubjectRef,
        roles: &HashSet<EntityId>,
        filter: &ContextFilter,
        include_direct_capabilities: bool,
    ) -> Result<HashSet<EntityId>> {
        let mut ids: HashSet<EntityId> = self
            .relations
            .grantees(Relation::SubjectPermission, &subject.owner_key(), filter)
            .await?
            .into_iter()
            .collect();

        if !roles.is_empty() {
            let graph = self.registry.graph().await?;
            ids.extend(roles.iter().flat_map(|role| graph.permissions_of_role(role)));
        }

        let mut capabilities = self.capabilities_of_roles(roles).await?;
        if include_direct_capabilities {
            capabilities.extend(self.direct_capabilities(subject, filter).await?);
        }
        ids.extend(self.permission_ids_of(&capabilities).await?);

        Ok(ids)
    }
}
