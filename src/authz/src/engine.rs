//! Authorizer: wires configuration, stores, resolvers, grants and audit together
//!
//! # Architecture
//!
//! ```text
//! check    → FeatureGate → wildcard → direct → role(+ancestors) → direct capability
//!                 ↓                       ↓               ↓
//!            [FeatureHandler]      [RelationStore]  [RegistryCache → DefinitionStore]
//!
//! mutation → GrantManager → RelationStore → cache invalidation → AuditSink
//! ```

use std::sync::Arc;
use tracing::info;

use crate::audit::{AuditSink, Auditor, AuthzEvent, TracingAuditSink};
use crate::builder::AuthorizationBuilder;
use crate::cache::{CacheStats, RegistryCache};
use crate::capability::CapabilityIndex;
use crate::config::EngineConfig;
use crate::context::ContextResolver;
use crate::error::Result;
use crate::feature::{FeatureGate, FeatureHandler};
use crate::gate::Gate;
use crate::grants::GrantManager;
use crate::registry::{DefinitionSyncReport, DefinitionTable, Registry};
use crate::resolver::{CapabilityResolver, PermissionResolver, Resolution, RoleResolver};
use crate::snapshot::AuthorizationSnapshot;
use crate::store::{DefinitionStore, InMemoryStore, RelationStore, Store};
use crate::types::{ContextEntity, GrantHolder, Grantee, RoleHolder};
use crate::wildcard::WildcardMatcher;

/// Builder for [`Authorizer`]
pub struct AuthorizerBuilder {
    config: EngineConfig,
    relations: Option<Arc<dyn RelationStore>>,
    definitions: Option<Arc<dyn DefinitionStore>>,
    feature_handler: Option<Arc<dyn FeatureHandler>>,
    audit_sink: Option<Arc<dyn AuditSink>>,
}

impl AuthorizerBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            relations: None,
            definitions: None,
            feature_handler: None,
            audit_sink: None,
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses one backend for both relations and definitions
    pub fn store<S: Store + 'static>(mut self, store: Arc<S>) -> Self {
        let relations: Arc<dyn RelationStore> = store.clone();
        let definitions: Arc<dyn DefinitionStore> = store;
        self.relations = Some(relations);
        self.definitions = Some(definitions);
        self
    }

    pub fn relation_store(mut self, store: Arc<dyn RelationStore>) -> Self {
        self.relations = Some(store);
        self
    }

    pub fn definition_store(mut self, store: Arc<dyn DefinitionStore>) -> Self {
        self.definitions = Some(store);
        self
    }

    pub fn feature_handler(mut self, handler: Arc<dyn FeatureHandler>) -> Self {
        self.feature_handler = Some(handler);
        self
    }

    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = Some(sink);
        self
    }

    /// Validates the configuration and assembles the engine.
    ///
    /// Missing stores default to a shared [`InMemoryStore`]; a missing audit sink
    /// defaults to [`TracingAuditSink`].
    pub fn build(self) -> Result<Authorizer> {
        let config = self.config;
        config.validate()?;

        let fallback = Arc::new(InMemoryStore::new());
        let relations: Arc<dyn RelationStore> = match self.relations {
            Some(store) => store,
            None => fallback.clone() as Arc<dyn RelationStore>,
        };
        let definitions: Arc<dyn DefinitionStore> = match self.definitions {
            Some(store) => store,
            None => fallback as Arc<dyn DefinitionStore>,
        };

        let cache = Arc::new(RegistryCache::new(config.cache.ttl()));
        let registry = Arc::new(Registry::new(
            definitions,
            relations.clone(),
            cache.clone(),
            config.default_guard.clone(),
        ));

        let sink: Arc<dyn AuditSink> = match self.audit_sink {
            Some(sink) => sink,
            None => Arc::new(TracingAuditSink),
        };
        let auditor = Auditor::new(sink, config.audit.enabled, config.audit.log_checks);

        let contexts = ContextResolver::from_config(&config.context);
        let features = FeatureGate::new(&config, self.feature_handler);
        let capability_index =
            CapabilityIndex::new(registry.clone(), relations.clone(), &config.capabilities);

        let shared = Resolution {
            registry: registry.clone(),
            relations: relations.clone(),
            contexts: contexts.clone(),
            features,
            capabilities: capability_index.clone(),
            auditor: auditor.clone(),
        };

        let wildcard = config
            .wildcard
            .enabled
            .then(|| WildcardMatcher::from_config(&config.wildcard));

        let grants = GrantManager::new(
            registry.clone(),
            relations,
            contexts,
            capability_index.direct_assignment_enabled(),
            auditor.clone(),
        );

        info!(
            default_guard = %config.default_guard,
            context = config.context.enabled,
            fallback = config.context.global_fallback,
            wildcard = config.wildcard.enabled,
            capabilities = config.capabilities.enabled,
            features = config.feature_integration_enabled(),
            cache_ttl_secs = config.cache.ttl_secs,
            "Authorizer initialized"
        );

        Ok(Authorizer {
            permissions: PermissionResolver::new(shared.clone(), wildcard),
            roles: RoleResolver::new(shared.clone()),
            capabilities: CapabilityResolver::new(shared),
            grants,
            registry,
            cache,
            auditor,
            config,
        })
    }
}

impl Default for AuthorizerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Composition root of the authorization engine
pub struct Authorizer {
    permissions: PermissionResolver,
    roles: RoleResolver,
    capabilities: CapabilityResolver,
    grants: GrantManager,
    registry: Arc<Registry>,
    cache: Arc<RegistryCache>,
    auditor: Auditor,
    config: EngineConfig,
}

impl Authorizer {
    pub fn builder() -> AuthorizerBuilder {
        AuthorizerBuilder::new()
    }

    /// Engine over an in-memory store with the given configuration
    pub fn in_memory(config: EngineConfig) -> Result<Self> {
        Self::builder().config(config).build()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn permissions(&self) -> &PermissionResolver {
        &self.permissions
    }

    pub fn roles(&self) -> &RoleResolver {
        &self.roles
    }

    pub fn capabilities(&self) -> &CapabilityResolver {
        &self.capabilities
    }

    pub fn grants(&self) -> &GrantManager {
        &self.grants
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub async fn has_permission<S: GrantHolder>(
        &self,
        subject: &S,
        permission: &str,
        context: Option<&dyn ContextEntity>,
    ) -> Result<bool> {
        self.permissions
            .has_permission(subject, permission, context, false)
            .await
    }

    pub async fn has_role<S: RoleHolder>(
        &self,
        subject: &S,
        role: &str,
        context: Option<&dyn ContextEntity>,
    ) -> Result<bool> {
        self.roles.has_role(subject, role, context, false).await
    }

    pub async fn has_capability<S: GrantHolder>(
        &self,
        subject: &S,
        capability: &str,
        context: Option<&dyn ContextEntity>,
    ) -> Result<bool> {
        self.capabilities
            .has_capability(subject, capability, context)
            .await
    }

    /// Fluent AND/OR chain of checks for one subject
    pub fn check<'a, S: RoleHolder>(
        &'a self,
        subject: &'a S,
        context: Option<&'a dyn ContextEntity>,
    ) -> AuthorizationBuilder<'a, S> {
        AuthorizationBuilder::new(self, subject, context)
    }

    /// Hook mapping arbitrary ability names onto managed checks
    pub fn gate(&self) -> Gate<'_> {
        Gate::new(self)
    }

    /// Everything the subject holds under the context, in serializable form
    pub async fn snapshot<S: RoleHolder>(
        &self,
        subject: &S,
        context: Option<&dyn ContextEntity>,
    ) -> Result<AuthorizationSnapshot> {
        AuthorizationSnapshot::capture(self, subject, context).await
    }

    /// Creates missing definitions, refreshes changed ones and wires the
    /// listed composition and inheritance edges. Never deletes.
    pub async fn sync_definitions(&self, table: &DefinitionTable) -> Result<DefinitionSyncReport> {
        let report = self.registry.sync_definitions(table).await?;

        for def in &table.permissions {
            if def.capabilities.is_empty() {
                continue;
            }
            let guard = self.registry.guard_or_default(def.guard.as_deref());
            for capability in &def.capabilities {
                let owner = self
                    .registry
                    .resolve_capability(Grantee::Name(capability.clone()), &guard)
                    .await?;
                self.grants
                    .grant_permission_to_capability(owner, [def.name.as_str()])
                    .await?;
            }
        }

        for def in &table.capabilities {
            if def.permissions.is_empty() {
                continue;
            }
            let guard = self.registry.guard_or_default(def.guard.as_deref());
            let owner = self
                .registry
                .resolve_capability(Grantee::Name(def.name.clone()), &guard)
                .await?;
            self.grants
                .grant_permission_to_capability(owner, &def.permissions)
                .await?;
        }

        for def in &table.roles {
            let guard = self.registry.guard_or_default(def.guard.as_deref());
            let role = self
                .registry
                .resolve_role(Grantee::Name(def.name.clone()), &guard)
                .await?;
            if !def.permissions.is_empty() {
                self.grants
                    .grant_permission_to_role(&role, &def.permissions)
                    .await?;
            }
            if !def.capabilities.is_empty() {
                self.grants
                    .grant_capability_to_role(&role, &def.capabilities)
                    .await?;
            }
        }

        // Parents last so every role in the table exists
        for def in &table.roles {
            if def.inherits.is_empty() {
                continue;
            }
            let guard = self.registry.guard_or_default(def.guard.as_deref());
            let role = self
                .registry
                .resolve_role(Grantee::Name(def.name.clone()), &guard)
                .await?;
            for parent in &def.inherits {
                self.grants.add_role_parent(&role, parent).await?;
            }
        }

        self.auditor.emit(AuthzEvent::DefinitionsSynced {
            created: report.created,
            updated: report.updated,
        });
        Ok(report)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drops every cached definition listing and the definition graph
    pub fn invalidate_cache(&self) {
        self.cache.clear();
        info!("Registry cache invalidated");
    }
}
