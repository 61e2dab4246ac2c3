//! Role resolution with inheritance

use std::collections::HashSet;
use tracing::debug;

use super::Resolution;
use crate::audit::AuthzEvent;
use crate::error::Result;
use crate::types::{ContextEntity, ContextRef, EntityId, Relation, Role, RoleHolder};

#[derive(Clone)]
pub struct RoleResolver {
    shared: Resolution,
}

impl RoleResolver {
    pub fn new(shared: Resolution) -> Self {
        Self { shared }
    }

    /// Held directly or through an inherited role
    pub async fn has_role<S: RoleHolder>(
        &self,
        subject: &S,
        role: &str,
        context: Option<&dyn ContextEntity>,
        bypass_feature: bool,
    ) -> Result<bool> {
        let subject = subject.subject_ref();
        let scope = self.shared.scope(context);
        let features = &self.shared.features;

        let granted = if !features
            .check_access(scope.context.as_ref(), &subject, bypass_feature)
            .await?
        {
            false
        } else {
            match self.shared.registry.find_role(role, &subject.guard).await? {
                None => false,
                Some(definition) => {
                    if features
                        .check_binding(definition.feature.as_deref(), &subject, bypass_feature)
                        .await?
                    {
                        let graph = self.shared.registry.graph().await?;
                        self.shared
                            .held_role_ids(&subject, &scope.filter, &graph)
                            .await?
                            .contains(&definition.id)
                    } else {
                        false
                    }
                }
            }
        };

        debug!(%subject, role, granted, "Role check");
        self.shared.auditor.emit_check(AuthzEvent::RoleChecked {
            subject: subject.to_string(),
            role: role.to_string(),
            context: scope.context,
            granted,
        });

        Ok(granted)
    }

    /// False for an empty list
    pub async fn has_any_role<S: RoleHolder, N: AsRef<str>>(
        &self,
        subject: &S,
        roles: &[N],
        context: Option<&dyn ContextEntity>,
        bypass_feature: bool,
    ) -> Result<bool> {
        for role in roles {
            if self
                .has_role(subject, role.as_ref(), context, bypass_feature)
                .await?
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// False for an empty list
    pub async fn has_all_roles<S: RoleHolder, N: AsRef<str>>(
        &self,
        subject: &S,
        roles: &[N],
        context: Option<&dyn ContextEntity>,
        bypass_feature: bool,
    ) -> Result<bool> {
        if roles.is_empty() {
            return Ok(false);
        }
        for role in roles {
            if !self
                .has_role(subject, role.as_ref(), context, bypass_feature)
                .await?
            {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Assigned roles (ignoring inheritance) are exactly `roles`
    pub async fn has_exact_roles<S: RoleHolder, N: AsRef<str>>(
        &self,
        subject: &S,
        roles: &[N],
        context: Option<&dyn ContextEntity>,
    ) -> Result<bool> {
        let expected: HashSet<&str> = roles.iter().map(|r| r.as_ref()).collect();
        let names = self.get_role_names(subject, context).await?;
        let actual: HashSet<&str> = names.iter().map(String::as_str).collect();
        Ok(expected == actual)
    }

    /// Names of the roles assigned under the context, sorted
    pub async fn get_role_names<S: RoleHolder>(
        &self,
        subject: &S,
        context: Option<&dyn ContextEntity>,
    ) -> Result<Vec<String>> {
        let subject = subject.subject_ref();
        let scope = self.shared.scope(context);
        let ids = self
            .shared
            .assigned_role_ids(&subject, &scope.filter)
            .await?;
        let mut names: Vec<String> = self
            .in_guard(&subject.guard, &ids)
            .await?
            .into_iter()
            .map(|r| r.name)
            .collect();
        names.sort();
        Ok(names)
    }

    /// Assigned roles plus every inherited ancestor
    pub async fn get_all_roles<S: RoleHolder>(
        &self,
        subject: &S,
        context: Option<&dyn ContextEntity>,
    ) -> Result<Vec<Role>> {
        let subject = subject.subject_ref();
        let scope = self.shared.scope(context);
        let graph = self.shared.registry.graph().await?;
        let ids = self
            .shared
            .held_role_ids(&subject, &scope.filter, &graph)
            .await?;
        self.in_guard(&subject.guard, &ids).await
    }

    /// Distinct contexts in which the role is assigned to the subject directly
    pub async fn get_role_contexts<S: RoleHolder>(
        &self,
        subject: &S,
        role: &str,
    ) -> Result<Vec<ContextRef>> {
        let subject = subject.subject_ref();
        let Some(role) = self.shared.registry.find_role(role, &subject.guard).await? else {
            return Ok(Vec::new());
        };
        self.shared
            .relations
            .contexts(Relation::SubjectRole, &subject.owner_key(), role.id)
            .await
    }

    async fn in_guard(&self, guard: &str, ids: &HashSet<EntityId>) -> Result<Vec<Role>> {
        Ok(self
            .shared
            .registry
            .roles_by_ids(ids)
            .await?
            .into_iter()
            .filter(|r| r.guard == guard)
            .collect())
    }
}
