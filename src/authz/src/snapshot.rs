//! Serializable view of what a subject holds, for UI collaborators

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::Authorizer;
use crate::error::Result;
use crate::types::{ContextEntity, ContextRef, RoleHolder, SubjectRef};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationSnapshot {
    pub subject: SubjectRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextRef>,
    /// Every held permission, sorted
    pub permissions: Vec<String>,
    /// Assigned roles plus inherited ones, sorted
    pub roles: Vec<String>,
    pub capabilities: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

impl AuthorizationSnapshot {
    pub async fn capture<S: RoleHolder>(
        authorizer: &Authorizer,
        subject: &S,
        context: Option<&dyn ContextEntity>,
    ) -> Result<Self> {
        let mut permissions = authorizer
            .permissions()
            .get_permission_names(subject, context)
            .await?;
        permissions.sort();

        let mut roles: Vec<String> = authorizer
            .roles()
            .get_all_roles(subject, context)
            .await?
            .into_iter()
            .map(|r| r.name)
            .collect();
        roles.sort();

        let mut capabilities: Vec<String> = authorizer
            .capabilities()
            .get_all_capabilities(subject, context)
            .await?
            .into_iter()
            .map(|c| c.name)
            .collect();
        capabilities.sort();

        let context = context.map(|c| ContextRef::new(c.context_type(), c.context_id()));
        let context = if authorizer.config().context.enabled {
            context
        } else {
            None
        };

        Ok(Self {
            subject: subject.subject_ref(),
            context,
            permissions,
            roles,
            capabilities,
            generated_at: Utc::now(),
        })
    }

    pub fn can(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }

    pub fn is(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}
