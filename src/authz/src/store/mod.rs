//! Relation and definition storage
//!
//! The engine only talks to persistence through these two traits. Implementations
//! must surface every failure as `AuthzError::Store`; the resolvers propagate it
//! instead of reading it as "denied".

pub mod memory;

pub use memory::InMemoryStore;

use async_trait::async_trait;
use std::collections::HashSet;

use crate::context::ContextFilter;
use crate::error::Result;
use crate::types::{
    Capability, ContextRef, EntityId, GrantEdge, OwnerKey, Permission, Relation, Role,
    SyncChanges,
};

/// Grant edge storage
#[async_trait]
pub trait RelationStore: Send + Sync {
    /// Whether an edge matching the filter exists
    async fn exists(
        &self,
        relation: Relation,
        owner: &OwnerKey,
        grantee: EntityId,
        filter: &ContextFilter,
    ) -> Result<bool>;

    /// All grantee ids of an owner that match the filter
    async fn grantees(
        &self,
        relation: Relation,
        owner: &OwnerKey,
        filter: &ContextFilter,
    ) -> Result<Vec<EntityId>>;

    /// Batch existence check: which of `grantees` already have an edge for `context`
    async fn existing(
        &self,
        relation: Relation,
        owner: &OwnerKey,
        grantees: &[EntityId],
        context: Option<&ContextRef>,
    ) -> Result<HashSet<EntityId>>;

    /// Inserts edges that do not exist yet; returns the ids actually inserted
    async fn attach(
        &self,
        relation: Relation,
        owner: &OwnerKey,
        grantees: &[EntityId],
        context: Option<&ContextRef>,
    ) -> Result<Vec<EntityId>>;

    /// Deletes edges for exactly `context` (`None` grantees means all of them).
    /// Returns the removed ids.
    async fn detach(
        &self,
        relation: Relation,
        owner: &OwnerKey,
        grantees: Option<&[EntityId]>,
        context: Option<&ContextRef>,
    ) -> Result<Vec<EntityId>>;

    /// Replaces (or extends, when `detaching` is false) the edge set for `context`
    async fn sync(
        &self,
        relation: Relation,
        owner: &OwnerKey,
        grantees: &[EntityId],
        context: Option<&ContextRef>,
        detaching: bool,
    ) -> Result<SyncChanges>;

    /// Distinct non-null contexts of the edges between owner and grantee
    async fn contexts(
        &self,
        relation: Relation,
        owner: &OwnerKey,
        grantee: EntityId,
    ) -> Result<Vec<ContextRef>>;

    /// Every edge of a relation
    async fn edges(&self, relation: Relation) -> Result<Vec<GrantEdge>>;

    /// Removes every edge owned by `owner`, across relations
    async fn remove_owner(&self, owner: &OwnerKey) -> Result<usize>;
}

/// Permission, role and capability definition storage
#[async_trait]
pub trait DefinitionStore: Send + Sync {
    async fn permissions(&self, guard: Option<&str>) -> Result<Vec<Permission>>;

    async fn roles(&self, guard: Option<&str>) -> Result<Vec<Role>>;

    async fn capabilities(&self, guard: Option<&str>) -> Result<Vec<Capability>>;

    /// Insert or replace by id
    async fn put_permission(&self, permission: Permission) -> Result<()>;

    /// Insert or replace by id
    async fn put_role(&self, role: Role) -> Result<()>;

    /// Insert or replace by id
    async fn put_capability(&self, capability: Capability) -> Result<()>;
}

/// Convenience bound for stores that implement both traits
pub trait Store: RelationStore + DefinitionStore {}

impl<T: RelationStore + DefinitionStore> Store for T {}
