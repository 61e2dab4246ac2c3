//! # Warden Authorization Engine
//!
//! In-process authorization decisions for subjects holding permissions, roles and
//! capabilities, optionally scoped to a context.
//!
//! ## Features
//!
//! - **Multiple grant paths**: direct, role-mediated (with role inheritance),
//!   capability groups held by roles or subjects
//! - **Context scoping** with optional fallback to global grants
//! - **Wildcard permissions** (`users.*`, `*.view`, `*`)
//! - **Feature gating** through a pluggable [`FeatureHandler`]
//! - **Registry cache** with TTL, single-flight loads and synchronous invalidation
//! - **Async-first design** using Tokio
//!
//! ## Example
//!
//! ```rust
//! use warden_authz::{Authorizer, ContextRef, EngineConfig, Permission, Role, SubjectRef};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let authz = Authorizer::in_memory(EngineConfig::default())?;
//!
//!     authz.registry().create_permission(Permission::new("articles.edit", "web")).await?;
//!     authz.registry().create_role(Role::new("editor", "web")).await?;
//!     authz.grants().grant_permission_to_role("editor", ["articles.edit"]).await?;
//!
//!     let alice = SubjectRef::new("user", "alice", "web");
//!     let team = ContextRef::new("team", "t1");
//!     authz.grants().assign_role(&alice, ["editor"], Some(&team)).await?;
//!
//!     assert!(authz.has_permission(&alice, "articles.edit", Some(&team)).await?);
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod builder;
pub mod cache;
pub mod capability;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod feature;
pub mod gate;
pub mod grants;
pub mod hierarchy;
pub mod registry;
pub mod resolver;
pub mod snapshot;
pub mod store;
pub mod types;
pub mod wildcard;

// Re-export commonly used types
pub use audit::{
    AuditRecord, AuditSink, AuthzEvent, MemoryAuditSink, NoopAuditSink, TracingAuditSink,
};
pub use builder::{AuthorizationBuilder, Check, Operator};
pub use cache::{CacheStats, RegistryCache};
pub use config::{EngineConfig, MissingHandlerPolicy};
pub use context::{ContextFilter, ContextResolver};
pub use engine::{Authorizer, AuthorizerBuilder};
pub use error::{AuthzError, Result};
pub use feature::{FeatureGate, FeatureHandler};
pub use gate::Gate;
pub use registry::{DefinitionSyncReport, DefinitionTable};
pub use resolver::GrantPath;
pub use snapshot::AuthorizationSnapshot;
pub use store::{DefinitionStore, InMemoryStore, RelationStore, Store};
pub use types::{
    Capability, CapabilityHolder, ContextEntity, ContextRef, DefinitionKind, EntityId,
    GrantHolder, Grantee, Permission, Relation, Role, RoleHolder, SubjectRef, SyncChanges,
};
pub use wildcard::WildcardMatcher;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
