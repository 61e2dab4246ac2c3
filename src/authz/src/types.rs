//! Core authorization types

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a permission, role or capability definition
pub type EntityId = Uuid;

/// Guard name (namespace partition for definitions)
pub type Guard = String;

/// Kind of a named definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefinitionKind {
    Permission,
    Role,
    Capability,
}

impl fmt::Display for DefinitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Permission => write!(f, "Permission"),
            Self::Role => write!(f, "Role"),
            Self::Capability => write!(f, "Capability"),
        }
    }
}

/// Subject that holds grants (user, service account, api client)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectRef {
    /// Subject type (e.g., "user")
    #[serde(rename = "type")]
    pub kind: String,

    /// Subject identifier within its type
    pub id: String,

    /// Guard the subject authenticates under
    pub guard: Guard,
}

impl SubjectRef {
    /// Create a new subject reference
    pub fn new(kind: impl Into<String>, id: impl Into<String>, guard: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
            guard: guard.into(),
        }
    }

    /// Owner key used for subject-owned grant edges
    pub fn owner_key(&self) -> OwnerKey {
        OwnerKey::Subject {
            kind: self.kind.clone(),
            id: self.id.clone(),
            guard: self.guard.clone(),
        }
    }
}

impl fmt::Display for SubjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.kind, self.id, self.guard)
    }
}

/// Something that can hold permission grants.
///
/// The associated consts are resolved at compile time and decide which grant
/// paths the permission resolver walks for this subject type.
pub trait GrantHolder: Send + Sync {
    /// Whether roles can be assigned to this subject type
    const HOLDS_ROLES: bool = true;

    /// Whether capabilities can be assigned directly to this subject type
    const HOLDS_CAPABILITIES: bool = true;

    /// Reference used to key grant edges
    fn subject_ref(&self) -> SubjectRef;
}

/// Marker for subjects that can be assigned roles
pub trait RoleHolder: GrantHolder {}

/// Marker for subjects that can be assigned capabilities directly
pub trait CapabilityHolder: GrantHolder {}

impl GrantHolder for SubjectRef {
    fn subject_ref(&self) -> SubjectRef {
        self.clone()
    }
}

impl RoleHolder for SubjectRef {}
impl CapabilityHolder for SubjectRef {}

/// Scoping entity attached to a grant edge (e.g., a tenant or team)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContextRef {
    /// Context type (e.g., "team")
    #[serde(rename = "type")]
    pub kind: String,

    /// Context identifier
    pub id: String,
}

impl ContextRef {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for ContextRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Any domain entity usable as a context
pub trait ContextEntity: Send + Sync {
    fn context_type(&self) -> String;
    fn context_id(&self) -> String;
}

impl ContextEntity for ContextRef {
    fn context_type(&self) -> String {
        self.kind.clone()
    }

    fn context_id(&self) -> String {
        self.id.clone()
    }
}

/// Common accessors over permission, role and capability definitions
pub trait Definition: Clone + Send + Sync + 'static {
    const KIND: DefinitionKind;

    fn id(&self) -> EntityId;
    fn name(&self) -> &str;
    fn guard(&self) -> &str;
}

/// Permission definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: EntityId,
    pub name: String,
    pub guard: Guard,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Feature identifier gating this permission
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature: Option<String>,
}

impl Permission {
    pub fn new(name: impl Into<String>, guard: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            guard: guard.into(),
            label: None,
            description: None,
            feature: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.feature = Some(feature.into());
        self
    }
}

impl Definition for Permission {
    const KIND: DefinitionKind = DefinitionKind::Permission;

    fn id(&self) -> EntityId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn guard(&self) -> &str {
        &self.guard
    }
}

/// Role definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: EntityId,
    pub name: String,
    pub guard: Guard,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Feature identifier gating this role
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature: Option<String>,
}

impl Role {
    pub fn new(name: impl Into<String>, guard: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            guard: guard.into(),
            label: None,
            description: None,
            feature: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.feature = Some(feature.into());
        self
    }
}

impl Definition for Role {
    const KIND: DefinitionKind = DefinitionKind::Role;

    fn id(&self) -> EntityId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn guard(&self) -> &str {
        &self.guard
    }
}

/// Capability definition: a named group of permissions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    pub id: EntityId,
    pub name: String,
    pub guard: Guard,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Capability {
    pub fn new(name: impl Into<String>, guard: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            guard: guard.into(),
            label: None,
            description: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl Definition for Capability {
    const KIND: DefinitionKind = DefinitionKind::Capability;

    fn id(&self) -> EntityId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn guard(&self) -> &str {
        &self.guard
    }
}

/// Kind of grant edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    SubjectPermission,
    SubjectRole,
    SubjectCapability,
    RolePermission,
    RoleCapability,
    CapabilityPermission,
    /// Child role inherits from the parent role (grantee)
    RoleParent,
}

impl Relation {
    /// Kind of definition on the grantee side of the edge
    pub fn grantee_kind(&self) -> DefinitionKind {
        match self {
            Self::SubjectPermission | Self::RolePermission | Self::CapabilityPermission => {
                DefinitionKind::Permission
            }
            Self::SubjectRole | Self::RoleParent => DefinitionKind::Role,
            Self::SubjectCapability | Self::RoleCapability => DefinitionKind::Capability,
        }
    }

    /// Whether edges of this relation may carry a context
    pub fn is_contextual(&self) -> bool {
        matches!(
            self,
            Self::SubjectPermission | Self::SubjectRole | Self::SubjectCapability
        )
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SubjectPermission => "subject_permission",
            Self::SubjectRole => "subject_role",
            Self::SubjectCapability => "subject_capability",
            Self::RolePermission => "role_permission",
            Self::RoleCapability => "role_capability",
            Self::CapabilityPermission => "capability_permission",
            Self::RoleParent => "role_parent",
        };
        f.write_str(name)
    }
}

/// Owner side of a grant edge
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "owner", rename_all = "snake_case")]
pub enum OwnerKey {
    Subject { kind: String, id: String, guard: Guard },
    Role { id: EntityId },
    Capability { id: EntityId },
}

impl fmt::Display for OwnerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Subject { kind, id, guard } => write!(f, "{}:{}@{}", kind, id, guard),
            Self::Role { id } => write!(f, "role:{}", id),
            Self::Capability { id } => write!(f, "capability:{}", id),
        }
    }
}

/// Persisted grant edge
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GrantEdge {
    pub relation: Relation,
    pub owner: OwnerKey,
    pub grantee: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextRef>,
}

/// Changes applied by a sync operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncChanges {
    pub attached: Vec<EntityId>,
    pub detached: Vec<EntityId>,
}

impl SyncChanges {
    pub fn is_empty(&self) -> bool {
        self.attached.is_empty() && self.detached.is_empty()
    }
}

/// Grantee given either by name or as a typed definition
#[derive(Debug, Clone)]
pub enum Grantee<T> {
    Name(String),
    Entity(T),
}

impl<T> From<&str> for Grantee<T> {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl<T> From<String> for Grantee<T> {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl<T> From<&String> for Grantee<T> {
    fn from(name: &String) -> Self {
        Self::Name(name.clone())
    }
}

impl From<Permission> for Grantee<Permission> {
    fn from(permission: Permission) -> Self {
        Self::Entity(permission)
    }
}

impl From<&Permission> for Grantee<Permission> {
    fn from(permission: &Permission) -> Self {
        Self::Entity(permission.clone())
    }
}

impl From<Role> for Grantee<Role> {
    fn from(role: Role) -> Self {
        Self::Entity(role)
    }
}

impl From<&Role> for Grantee<Role> {
    fn from(role: &Role) -> Self {
        Self::Entity(role.clone())
    }
}

impl From<Capability> for Grantee<Capability> {
    fn from(capability: Capability) -> Self {
        Self::Entity(capability)
    }
}

impl From<&Capability> for Grantee<Capability> {
    fn from(capability: &Capability) -> Self {
        Self::Entity(capability.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_owner_key() {
        let subject = SubjectRef::new("user", "42", "web");
        assert_eq!(
            subject.owner_key(),
            OwnerKey::Subject {
                kind: "user".to_string(),
                id: "42".to_string(),
                guard: "web".to_string(),
            }
        );
        assert_eq!(subject.to_string(), "user:42@web");
    }

    #[test]
    fn test_relation_grantee_kinds() {
        assert_eq!(Relation::SubjectRole.grantee_kind(), DefinitionKind::Role);
        assert_eq!(Relation::RoleParent.grantee_kind(), DefinitionKind::Role);
        assert_eq!(
            Relation::CapabilityPermission.grantee_kind(),
            DefinitionKind::Permission
        );
        assert!(Relation::SubjectCapability.is_contextual());
        assert!(!Relation::RolePermission.is_contextual());
    }

    #[test]
    fn test_grantee_conversions() {
        let by_name: Grantee<Permission> = "posts.view".into();
        assert!(matches!(by_name, Grantee::Name(ref n) if n == "posts.view"));

        let permission = Permission::new("posts.view", "web").with_label("View posts");
        let typed: Grantee<Permission> = (&permission).into();
        assert!(matches!(typed, Grantee::Entity(ref p) if p.id == permission.id));
    }
}
