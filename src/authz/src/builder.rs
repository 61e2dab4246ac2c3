//! Fluent AND/OR chain of authorization checks
//!
//! ```ignore
//! let allowed = authz
//!     .check(&user, Some(&team))
//!     .can("articles.edit")
//!     .or_has_role("admin")
//!     .evaluate()
//!     .await?;
//! ```
//!
//! Conditions fold left to right: the first seeds the result, each later one
//! combines with its own operator. No operator precedence. An empty chain is `false`.

use serde::{Deserialize, Serialize};

use crate::engine::Authorizer;
use crate::error::Result;
use crate::types::{ContextEntity, RoleHolder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    And,
    Or,
}

/// A single check inside a chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "check", content = "names", rename_all = "snake_case")]
pub enum Check {
    Permission(String),
    AnyPermission(Vec<String>),
    AllPermissions(Vec<String>),
    Role(String),
    AnyRole(Vec<String>),
    AllRoles(Vec<String>),
    Capability(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub op: Operator,
    pub check: Check,
}

pub struct AuthorizationBuilder<'a, S: RoleHolder> {
    authorizer: &'a Authorizer,
    subject: &'a S,
    context: Option<&'a dyn ContextEntity>,
    bypass_feature: bool,
    conditions: Vec<Condition>,
}

fn names<I>(items: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

impl<'a, S: RoleHolder> AuthorizationBuilder<'a, S> {
    pub fn new(
        authorizer: &'a Authorizer,
        subject: &'a S,
        context: Option<&'a dyn ContextEntity>,
    ) -> Self {
        Self {
            authorizer,
            subject,
            context,
            bypass_feature: false,
            conditions: Vec::new(),
        }
    }

    /// Skips feature gating for every check in the chain
    pub fn bypass_features(mut self) -> Self {
        self.bypass_feature = true;
        self
    }

    pub fn and(mut self, check: Check) -> Self {
        self.conditions.push(Condition {
            op: Operator::And,
            check,
        });
        self
    }

    pub fn or(mut self, check: Check) -> Self {
        self.conditions.push(Condition {
            op: Operator::Or,
            check,
        });
        self
    }

    pub fn can(self, permission: impl Into<String>) -> Self {
        self.and(Check::Permission(permission.into()))
    }

    pub fn or_can(self, permission: impl Into<String>) -> Self {
        self.or(Check::Permission(permission.into()))
    }

    pub fn can_any<I>(self, permissions: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.and(Check::AnyPermission(names(permissions)))
    }

    pub fn can_all<I>(self, permissions: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.and(Check::AllPermissions(names(permissions)))
    }

    pub fn has_role(self, role: impl Into<String>) -> Self {
        self.and(Check::Role(role.into()))
    }

    pub fn or_has_role(self, role: impl Into<String>) -> Self {
        self.or(Check::Role(role.into()))
    }

    pub fn has_any_role<I>(self, roles: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.and(Check::AnyRole(names(roles)))
    }

    pub fn has_all_roles<I>(self, roles: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.and(Check::AllRoles(names(roles)))
    }

    pub fn has_capability(self, capability: impl Into<String>) -> Self {
        self.and(Check::Capability(capability.into()))
    }

    pub fn or_has_capability(self, capability: impl Into<String>) -> Self {
        self.or(Check::Capability(capability.into()))
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Left fold over the chain; store errors propagate
    pub async fn evaluate(&self) -> Result<bool> {
        let mut conditions = self.conditions.iter();
        let Some(first) = conditions.next() else {
            return Ok(false);
        };

        let mut result = self.run(&first.check).await?;
        for condition in conditions {
            result = match condition.op {
                // Either side already decides the fold, skip the lookup
                Operator::And if !result => false,
                Operator::Or if result => true,
                Operator::And | Operator::Or => self.run(&condition.check).await?,
            };
        }
        Ok(result)
    }

    async fn run(&self, check: &Check) -> Result<bool> {
        let authz = self.authorizer;
        let bypass = self.bypass_feature;
        match check {
            Check::Permission(name) => {
                authz
                    .permissions()
                    .has_permission(self.subject, name, self.context, bypass)
                    .await
            }
            Check::AnyPermission(names) => {
                authz
                    .permissions()
                    .has_any_permission(self.subject, names, self.context, bypass)
                    .await
            }
            Check::AllPermissions(names) => {
                authz
                    .permissions()
                    .has_all_permissions(self.subject, names, self.context, bypass)
                    .await
            }
            Check::Role(name) => {
                authz
                    .roles()
                    .has_role(self.subject, name, self.context, bypass)
                    .await
            }
            Check::AnyRole(names) => {
                authz
                    .roles()
                    .has_any_role(self.subject, names, self.context, bypass)
                    .await
            }
            Check::AllRoles(names) => {
                authz
                    .roles()
                    .has_all_roles(self.subject, names, self.context, bypass)
                    .await
            }
            Check::Capability(name) => {
                authz
                    .capabilities()
                    .has_capability(self.subject, name, self.context)
                    .await
            }
        }
    }
}
