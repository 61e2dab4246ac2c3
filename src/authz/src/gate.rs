//! Ability hook for host authorization layers
//!
//! `check` answers `None` for abilities this engine does not manage so the host
//! can fall through to its own policies.

use tracing::debug;

use crate::engine::Authorizer;
use crate::error::Result;
use crate::types::{ContextEntity, RoleHolder};

pub struct Gate<'a> {
    authorizer: &'a Authorizer,
}

impl<'a> Gate<'a> {
    pub fn new(authorizer: &'a Authorizer) -> Self {
        Self { authorizer }
    }

    /// Maps an ability name onto a permission check, then a role check.
    ///
    /// With wildcards enabled an undefined ability still counts as managed when a
    /// held pattern covers it.
    pub async fn check<S: RoleHolder>(
        &self,
        subject: &S,
        ability: &str,
        context: Option<&dyn ContextEntity>,
    ) -> Result<Option<bool>> {
        let authz = self.authorizer;
        let guard = subject.subject_ref().guard;

        if authz.registry().find_permission(ability, &guard).await?.is_some() {
            return authz
                .permissions()
                .has_permission(subject, ability, context, false)
                .await
                .map(Some);
        }

        if authz.registry().find_role(ability, &guard).await?.is_some() {
            return authz
                .roles()
                .has_role(subject, ability, context, false)
                .await
                .map(Some);
        }

        if authz.permissions().wildcard_enabled()
            && authz
                .permissions()
                .has_permission(subject, ability, context, false)
                .await?
        {
            return Ok(Some(true));
        }

        debug!(ability, %guard, "Ability not managed");
        Ok(None)
    }
}
