//! Permission resolution
//!
//! Path order: feature gate, wildcard, direct, role (incl. inherited roles and
//! their capabilities), direct capability.

use std::collections::HashSet;
use tracing::debug;

use super::{GrantPath, Resolution, Scope};
use crate::audit::AuthzEvent;
use crate::error::Result;
use crate::registry::DefinitionGraph;
use crate::types::{
    ContextEntity, ContextRef, EntityId, GrantHolder, Permission, Relation, RoleHolder, SubjectRef,
};
use crate::wildcard::WildcardMatcher;

#[derive(Clone)]
pub struct PermissionResolver {
    shared: Resolution,
    wildcard: Option<WildcardMatcher>,
}

impl PermissionResolver {
    /// `wildcard` is `None` when wildcard checking is disabled
    pub fn new(shared: Resolution, wildcard: Option<WildcardMatcher>) -> Self {
        Self { shared, wildcard }
    }

    pub fn wildcard_enabled(&self) -> bool {
        self.wildcard.is_some()
    }

    pub async fn has_permission<S: GrantHolder>(
        &self,
        subject: &S,
        permission: &str,
        context: Option<&dyn ContextEntity>,
        bypass_feature: bool,
    ) -> Result<bool> {
        let subject = subject.subject_ref();
        let scope = self.shared.scope(context);
        let path = self
            .resolve::<S>(&subject, permission, &scope, bypass_feature)
            .await?;

        debug!(%subject, permission, granted = path.is_some(), path = ?path, "Permission check");
        self.shared.auditor.emit_check(AuthzEvent::PermissionChecked {
            subject: subject.to_string(),
            permission: permission.to_string(),
            context: scope.context,
            granted: path.is_some(),
            path,
        });

        Ok(path.is_some())
    }

    /// The grant path that would satisfy the check, if any
    pub async fn explain_permission<S: GrantHolder>(
        &self,
        subject: &S,
        permission: &str,
        context: Option<&dyn ContextEntity>,
        bypass_feature: bool,
    ) -> Result<Option<GrantPath>> {
        let subject = subject.subject_ref();
        let scope = self.shared.scope(context);
        self.resolve::<S>(&subject, permission, &scope, bypass_feature)
            .await
    }

    /// False for an empty list
    pub async fn has_any_permission<S: GrantHolder, N: AsRef<str>>(
        &self,
        subject: &S,
        permissions: &[N],
        context: Option<&dyn ContextEntity>,
        bypass_feature: bool,
    ) -> Result<bool> {
        for permission in permissions {
            if self
                .has_permission(subject, permission.as_ref(), context, bypass_feature)
                .await?
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// False for an empty list
    pub async fn has_all_permissions<S: GrantHolder, N: AsRef<str>>(
        &self,
        subject: &S,
        permissions: &[N],
        context: Option<&dyn ContextEntity>,
        bypass_feature: bool,
    ) -> Result<bool> {
        if permissions.is_empty() {
            return Ok(false);
        }
        for permission in permissions {
            if !self
                .has_permission(subject, permission.as_ref(), context, bypass_feature)
                .await?
            {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Direct grant only; no wildcard, role or capability paths
    pub async fn has_direct_permission<S: GrantHolder>(
        &self,
        subject: &S,
        permission: &str,
        context: Option<&dyn ContextEntity>,
    ) -> Result<bool> {
        let subject = subject.subject_ref();
        let scope = self.shared.scope(context);
        let Some(permission) = self
            .shared
            .registry
            .find_permission(permission, &subject.guard)
            .await?
        else {
            return Ok(false);
        };
        self.direct(&subject, permission.id, &scope).await
    }

    /// Granted through a held or inherited role, directly or via the role's capabilities
    pub async fn has_permission_via_role<S: RoleHolder>(
        &self,
        subject: &S,
        permission: &str,
        context: Option<&dyn ContextEntity>,
    ) -> Result<bool> {
        let subject = subject.subject_ref();
        let scope = self.shared.scope(context);
        let Some(permission) = self
            .shared
            .registry
            .find_permission(permission, &subject.guard)
            .await?
        else {
            return Ok(false);
        };
        let graph = self.shared.registry.graph().await?;
        let roles = self
            .shared
            .held_role_ids(&subject, &scope.filter, &graph)
            .await?;
        Ok(self.via_roles(&graph, &roles, permission.id).await?.is_some())
    }

    pub async fn get_direct_permissions<S: GrantHolder>(
        &self,
        subject: &S,
        context: Option<&dyn ContextEntity>,
    ) -> Result<Vec<Permission>> {
        let subject = subject.subject_ref();
        let scope = self.shared.scope(context);
        let ids: HashSet<EntityId> = self
            .shared
            .relations
            .grantees(Relation::SubjectPermission, &subject.owner_key(), &scope.filter)
            .await?
            .into_iter()
            .collect();
        self.in_guard(&subject, &ids).await
    }

    /// Permissions reachable through held roles, their ancestors and their capabilities
    pub async fn get_permissions_via_roles<S: RoleHolder>(
        &self,
        subject: &S,
        context: Option<&dyn ContextEntity>,
    ) -> Result<Vec<Permission>> {
        let subject = subject.subject_ref();
        let scope = self.shared.scope(context);
        let graph = self.shared.registry.graph().await?;
        let roles = self
            .shared
            .held_role_ids(&subject, &scope.filter, &graph)
            .await?;

        let mut ids: HashSet<EntityId> = roles
            .iter()
            .flat_map(|role| graph.permissions_of_role(role))
            .collect();
        let capabilities = self.shared.capabilities.capabilities_of_roles(&roles).await?;
        ids.extend(self.shared.capabilities.permission_ids_of(&capabilities).await?);

        self.in_guard(&subject, &ids).await
    }

    /// Every permission the subject holds, deduplicated
    pub async fn get_all_permissions<S: GrantHolder>(
        &self,
        subject: &S,
        context: Option<&dyn ContextEntity>,
    ) -> Result<Vec<Permission>> {
        let subject = subject.subject_ref();
        let scope = self.shared.scope(context);
        let ids = self.held_permission_ids::<S>(&subject, &scope).await?;
        self.in_guard(&subject, &ids).await
    }

    pub async fn get_permission_names<S: GrantHolder>(
        &self,
        subject: &S,
        context: Option<&dyn ContextEntity>,
    ) -> Result<Vec<String>> {
        Ok(self
            .get_all_permissions(subject, context)
            .await?
            .into_iter()
            .map(|p| p.name)
            .collect())
    }

    /// Distinct contexts in which the permission is granted to the subject directly
    pub async fn get_permission_contexts<S: GrantHolder>(
        &self,
        subject: &S,
        permission: &str,
    ) -> Result<Vec<ContextRef>> {
        let subject = subject.subject_ref();
        let Some(permission) = self
            .shared
            .registry
            .find_permission(permission, &subject.guard)
            .await?
        else {
            return Ok(Vec::new());
        };
        self.shared
            .relations
            .contexts(Relation::SubjectPermission, &subject.owner_key(), permission.id)
            .await
    }

    async fn resolve<S: GrantHolder>(
        &self,
        subject: &SubjectRef,
        name: &str,
        scope: &Scope,
        bypass_feature: bool,
    ) -> Result<Option<GrantPath>> {
        let features = &self.shared.features;
        if !features
            .check_access(scope.context.as_ref(), subject, bypass_feature)
            .await?
        {
            debug!(%subject, permission = name, "Blocked by feature context");
            return Ok(None);
        }

        let permission = self
            .shared
            .registry
            .find_permission(name, &subject.guard)
            .await?;
        if let Some(permission) = &permission {
            if !features
                .check_binding(permission.feature.as_deref(), subject, bypass_feature)
                .await?
            {
                debug!(%subject, permission = name, "Blocked by feature binding");
                return Ok(None);
            }
        }

        if let Some(matcher) = &self.wildcard {
            if self.wildcard_covers::<S>(matcher, subject, name, scope).await? {
                return Ok(Some(GrantPath::Wildcard));
            }
        }

        let Some(permission) = permission else {
            debug!(permission = name, guard = %subject.guard, "Unknown permission");
            return Ok(None);
        };

        if self.direct(subject, permission.id, scope).await? {
            return Ok(Some(GrantPath::Direct));
        }

        let graph = self.shared.registry.graph().await?;

        if S::HOLDS_ROLES {
            let roles = self
                .shared
                .held_role_ids(subject, &scope.filter, &graph)
                .await?;
            if let Some(path) = self.via_roles(&graph, &roles, permission.id).await? {
                return Ok(Some(path));
            }
        }

        if S::HOLDS_CAPABILITIES {
            let capabilities = self
                .shared
                .capabilities
                .direct_capabilities(subject, &scope.filter)
                .await?;
            let granted = capabilities
                .iter()
                .any(|cap| graph.permissions_of_capability(cap).any(|p| p == permission.id));
            if granted {
                return Ok(Some(GrantPath::DirectCapability));
            }
        }

        Ok(None)
    }

    async fn direct(
        &self,
        subject: &SubjectRef,
        permission: EntityId,
        scope: &Scope,
    ) -> Result<bool> {
        self.shared
            .relations
            .exists(
                Relation::SubjectPermission,
                &subject.owner_key(),
                permission,
                &scope.filter,
            )
            .await
    }

    async fn via_roles(
        &self,
        graph: &DefinitionGraph,
        roles: &HashSet<EntityId>,
        permission: EntityId,
    ) -> Result<Option<GrantPath>> {
        if roles
            .iter()
            .any(|role| graph.permissions_of_role(role).any(|p| p == permission))
        {
            return Ok(Some(GrantPath::Role));
        }

        let capabilities = self.shared.capabilities.capabilities_of_roles(roles).await?;
        if capabilities
            .iter()
            .any(|cap| graph.permissions_of_capability(cap).any(|p| p == permission))
        {
            return Ok(Some(GrantPath::RoleCapability));
        }

        Ok(None)
    }

    async fn held_permission_ids<S: GrantHolder>(
        &self,
        subject: &SubjectRef,
        scope: &Scope,
    ) -> Result<HashSet<EntityId>> {
        let roles = if S::HOLDS_ROLES {
            let graph = self.shared.registry.graph().await?;
            self.shared
                .held_role_ids(subject, &scope.filter, &graph)
                .await?
        } else {
            HashSet::new()
        };
        self.shared
            .capabilities
            .all_permission_ids(subject, &roles, &scope.filter, S::HOLDS_CAPABILITIES)
            .await
    }

    async fn wildcard_covers<S: GrantHolder>(
        &self,
        matcher: &WildcardMatcher,
        subject: &SubjectRef,
        name: &str,
        scope: &Scope,
    ) -> Result<bool> {
        let ids = self.held_permission_ids::<S>(subject, scope).await?;
        let held = self.in_guard(subject, &ids).await?;
        Ok(held
            .iter()
            .filter(|p| matcher.contains_wildcard(&p.name))
            .any(|p| matcher.matches(&p.name, name)))
    }

    async fn in_guard(
        &self,
        subject: &SubjectRef,
        ids: &HashSet<EntityId>,
    ) -> Result<Vec<Permission>> {
        Ok(self
            .shared
            .registry
            .permissions_by_ids(ids)
            .await?
            .into_iter()
            .filter(|p| p.guard == subject.guard)
            .collect())
    }
}
