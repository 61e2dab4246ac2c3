//! Capability checks: held directly (when enabled) or through any held role

use std::collections::HashSet;
use tracing::debug;

use super::{Resolution, Scope};
use crate::error::Result;
use crate::types::{
    Capability, ContextEntity, ContextRef, EntityId, GrantHolder, Relation, SubjectRef,
};

#[derive(Clone)]
pub struct CapabilityResolver {
    shared: Resolution,
}

impl CapabilityResolver {
    pub fn new(shared: Resolution) -> Self {
        Self { shared }
    }

    pub async fn has_capability<S: GrantHolder>(
        &self,
        subject: &S,
        capability: &str,
        context: Option<&dyn ContextEntity>,
    ) -> Result<bool> {
        if !self.shared.capabilities.enabled() {
            return Ok(false);
        }
        let subject = subject.subject_ref();
        let Some(capability) = self
            .shared
            .registry
            .find_capability(capability, &subject.guard)
            .await?
        else {
            return Ok(false);
        };
        let scope = self.shared.scope(context);
        let held = self.held_capability_ids::<S>(&subject, &scope).await?;
        let granted = held.contains(&capability.id);
        debug!(%subject, capability = %capability.name, granted, "Capability check");
        Ok(granted)
    }

    /// False for an empty list
    pub async fn has_any_capability<S: GrantHolder, N: AsRef<str>>(
        &self,
        subject: &S,
        capabilities: &[N],
        context: Option<&dyn ContextEntity>,
    ) -> Result<bool> {
        for capability in capabilities {
            if self.has_capability(subject, capability.as_ref(), context).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// False for an empty list
    pub async fn has_all_capabilities<S: GrantHolder, N: AsRef<str>>(
        &self,
        subject: &S,
        capabilities: &[N],
        context: Option<&dyn ContextEntity>,
    ) -> Result<bool> {
        if capabilities.is_empty() {
            return Ok(false);
        }
        for capability in capabilities {
            if !self.has_capability(subject, capability.as_ref(), context).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Capabilities held directly or through roles
    pub async fn get_all_capabilities<S: GrantHolder>(
        &self,
        subject: &S,
        context: Option<&dyn ContextEntity>,
    ) -> Result<Vec<Capability>> {
        if !self.shared.capabilities.enabled() {
            return Ok(Vec::new());
        }
        let subject = subject.subject_ref();
        let scope = self.shared.scope(context);
        let ids = self.held_capability_ids::<S>(&subject, &scope).await?;
        Ok(self
            .shared
            .registry
            .capabilities_by_ids(&ids)
            .await?
            .into_iter()
            .filter(|c| c.guard == subject.guard)
            .collect())
    }

    /// Distinct contexts in which the capability is assigned to the subject directly
    pub async fn get_capability_contexts<S: GrantHolder>(
        &self,
        subject: &S,
        capability: &str,
    ) -> Result<Vec<ContextRef>> {
        let subject = subject.subject_ref();
        let Some(capability) = self
            .shared
            .registry
            .find_capability(capability, &subject.guard)
            .await?
        else {
            return Ok(Vec::new());
        };
        self.shared
            .relations
            .contexts(Relation::SubjectCapability, &subject.owner_key(), capability.id)
            .await
    }

    async fn held_capability_ids<S: GrantHolder>(
        &self,
        subject: &SubjectRef,
        scope: &Scope,
    ) -> Result<HashSet<EntityId>> {
        let mut held = HashSet::new();
        if S::HOLDS_ROLES {
            let graph = self.shared.registry.graph().await?;
            let roles = self
                .shared
                .held_role_ids(subject, &scope.filter, &graph)
                .await?;
            held.extend(self.shared.capabilities.capabilities_of_roles(&roles).await?);
        }
        if S::HOLDS_CAPABILITIES {
            held.extend(
                self.shared
                    .capabilities
                    .direct_capabilities(subject, &scope.filter)
                    .await?,
            );
        }
        Ok(held)
    }
}
