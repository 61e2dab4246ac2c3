//! Permission, role and capability resolution
//!
//! Every resolver shares one [`Resolution`] bundle: the registry, the relation
//! store, the context policy, the feature gate and the auditor. Grant paths are
//! walked in a fixed order and the first match wins.

pub mod capability;
pub mod permission;
pub mod role;

pub use capability::CapabilityResolver;
pub use permission::PermissionResolver;
pub use role::RoleResolver;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::audit::Auditor;
use crate::capability::CapabilityIndex;
use crate::context::{ContextFilter, ContextResolver};
use crate::error::Result;
use crate::feature::FeatureGate;
use crate::registry::{DefinitionGraph, Registry};
use crate::store::RelationStore;
use crate::types::{ContextEntity, ContextRef, EntityId, Relation, SubjectRef};

/// Grant path that satisfied a permission check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantPath {
    /// A held wildcard permission covers the requested name
    Wildcard,
    /// Granted to the subject directly
    Direct,
    /// Granted to a held (or inherited) role
    Role,
    /// Grouped in a capability of a held role
    RoleCapability,
    /// Grouped in a capability held by the subject directly
    DirectCapability,
}

impl fmt::Display for GrantPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Wildcard => "wildcard",
            Self::Direct => "direct",
            Self::Role => "role",
            Self::RoleCapability => "role_capability",
            Self::DirectCapability => "direct_capability",
        };
        f.write_str(name)
    }
}

/// Collaborators shared by all resolvers
#[derive(Clone)]
pub struct Resolution {
    pub registry: Arc<Registry>,
    pub relations: Arc<dyn RelationStore>,
    pub contexts: ContextResolver,
    pub features: FeatureGate,
    pub capabilities: CapabilityIndex,
    pub auditor: Auditor,
}

/// Normalized request context and the read filter built from it
pub(crate) struct Scope {
    pub context: Option<ContextRef>,
    pub filter: ContextFilter,
}

impl Resolution {
    pub(crate) fn scope(&self, context: Option<&dyn ContextEntity>) -> Scope {
        let context = self.contexts.normalize(context);
        let filter = self.contexts.filter(context.as_ref());
        Scope { context, filter }
    }

    /// Roles assigned to the subject under `filter`, without inheritance
    pub(crate) async fn assigned_role_ids(
        &self,
        subject: &SubjectRef,
        filter: &ContextFilter,
    ) -> Result<HashSet<EntityId>> {
        Ok(self
            .relations
            .grantees(Relation::SubjectRole, &subject.owner_key(), filter)
            .await?
            .into_iter()
            .collect())
    }

    /// Assigned roles plus every ancestor
    pub(crate) async fn held_role_ids(
        &self,
        subject: &SubjectRef,
        filter: &ContextFilter,
        graph: &DefinitionGraph,
    ) -> Result<HashSet<EntityId>> {
        let assigned = self.assigned_role_ids(subject, filter).await?;
        if assigned.is_empty() {
            return Ok(assigned);
        }
        Ok(graph.hierarchy.expand(assigned))
    }
}
