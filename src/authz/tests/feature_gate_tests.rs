//! Feature gating through the public API

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use warden_authz::{
    Authorizer, AuthzError, ContextRef, EngineConfig, FeatureHandler, MissingHandlerPolicy,
    Permission, Result, Role, SubjectRef,
};

/// Handler backed by in-memory sets, counting how often it is consulted
#[derive(Default)]
struct ToggleHandler {
    active: Mutex<HashSet<String>>,
    members: Mutex<HashSet<String>>,
    calls: AtomicUsize,
}

impl ToggleHandler {
    fn activate(&self, feature: &str) {
        self.active.lock().insert(feature.to_string());
    }

    fn admit(&self, subject_id: &str) {
        self.members.lock().insert(subject_id.to_string());
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeatureHandler for ToggleHandler {
    async fn is_active(&self, feature: &ContextRef) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.active.lock().contains(&feature.id))
    }

    async fn can_access(&self, _feature: &ContextRef, subject: &SubjectRef) -> Result<bool> {
        Ok(self.members.lock().contains(&subject.id))
    }
}

fn feature_config(policy: MissingHandlerPolicy) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.features.enabled = true;
    config.features.on_missing_handler = policy;
    config
}

async fn engine(handler: Option<Arc<ToggleHandler>>, policy: MissingHandlerPolicy) -> Authorizer {
    let mut builder = Authorizer::builder().config(feature_config(policy));
    if let Some(handler) = handler {
        builder = builder.feature_handler(handler);
    }
    let authz = builder.build().unwrap();

    let registry = authz.registry();
    registry
        .create_permission(Permission::new("reports.view", "web"))
        .await
        .unwrap();
    registry
        .create_permission(Permission::new("reports.export", "web").with_feature("exports"))
        .await
        .unwrap();
    registry
        .create_role(Role::new("analyst", "web").with_feature("analytics"))
        .await
        .unwrap();
    authz
}

fn alice() -> SubjectRef {
    SubjectRef::new("user", "alice", "web")
}

fn beta() -> ContextRef {
    ContextRef::new("feature", "beta")
}

#[tokio::test]
async fn test_feature_context_consults_handler() {
    let handler = Arc::new(ToggleHandler::default());
    let authz = engine(Some(handler.clone()), MissingHandlerPolicy::Deny).await;
    let alice = alice();
    let beta = beta();
    authz
        .grants()
        .give_permission_to(&alice, ["reports.view"], None)
        .await
        .unwrap();

    // Inactive feature vetoes the global grant
    assert!(!authz.has_permission(&alice, "reports.view", Some(&beta)).await.unwrap());

    handler.activate("beta");
    assert!(!authz.has_permission(&alice, "reports.view", Some(&beta)).await.unwrap());

    handler.admit("alice");
    assert!(authz.has_permission(&alice, "reports.view", Some(&beta)).await.unwrap());
}

#[tokio::test]
async fn test_non_feature_context_skips_handler() {
    let handler = Arc::new(ToggleHandler::default());
    let authz = engine(Some(handler.clone()), MissingHandlerPolicy::Deny).await;
    let alice = alice();
    let team = ContextRef::new("team", "t1");
    authz
        .grants()
        .give_permission_to(&alice, ["reports.view"], None)
        .await
        .unwrap();

    assert!(authz.has_permission(&alice, "reports.view", Some(&team)).await.unwrap());
    assert!(authz.has_permission(&alice, "reports.view", None).await.unwrap());
    assert_eq!(handler.calls(), 0);
}

#[tokio::test]
async fn test_veto_short_circuits_grant_paths() {
    let handler = Arc::new(ToggleHandler::default());
    let authz = engine(Some(handler.clone()), MissingHandlerPolicy::Deny).await;
    let alice = alice();
    let beta = beta();

    // No grant at all: the gate still runs first and answers false
    assert!(!authz.has_permission(&alice, "reports.view", Some(&beta)).await.unwrap());
    assert_eq!(handler.calls(), 1);
}

#[tokio::test]
async fn test_permission_feature_binding() {
    let handler = Arc::new(ToggleHandler::default());
    let authz = engine(Some(handler.clone()), MissingHandlerPolicy::Deny).await;
    let alice = alice();
    authz
        .grants()
        .give_permission_to(&alice, ["reports.export"], None)
        .await
        .unwrap();

    // Binding applies without any context
    assert!(!authz.has_permission(&alice, "reports.export", None).await.unwrap());

    handler.activate("exports");
    handler.admit("alice");
    assert!(authz.has_permission(&alice, "reports.export", None).await.unwrap());
}

#[tokio::test]
async fn test_role_feature_binding() {
    let handler = Arc::new(ToggleHandler::default());
    let authz = engine(Some(handler.clone()), MissingHandlerPolicy::Deny).await;
    let alice = alice();
    authz.grants().assign_role(&alice, ["analyst"], None).await.unwrap();

    assert!(!authz.has_role(&alice, "analyst", None).await.unwrap());

    handler.activate("analytics");
    handler.admit("alice");
    assert!(authz.has_role(&alice, "analyst", None).await.unwrap());
}

#[tokio::test]
async fn test_missing_handler_throw_propagates() {
    let authz = engine(None, MissingHandlerPolicy::Throw).await;
    let alice = alice();
    let beta = beta();

    let result = authz.has_permission(&alice, "reports.view", Some(&beta)).await;
    assert!(matches!(result, Err(AuthzError::FeatureHandlerUnavailable(_))));

    // Unbound permissions without a feature context never reach the gate
    assert!(!authz.has_permission(&alice, "reports.view", None).await.unwrap());
}

#[tokio::test]
async fn test_missing_handler_allow_and_deny() {
    let alice = alice();
    let beta = beta();

    let allow = engine(None, MissingHandlerPolicy::Allow).await;
    allow
        .grants()
        .give_permission_to(&alice, ["reports.view"], None)
        .await
        .unwrap();
    assert!(allow.has_permission(&alice, "reports.view", Some(&beta)).await.unwrap());

    let deny = engine(None, MissingHandlerPolicy::Deny).await;
    deny.grants()
        .give_permission_to(&alice, ["reports.view"], None)
        .await
        .unwrap();
    assert!(!deny.has_permission(&alice, "reports.view", Some(&beta)).await.unwrap());
}

#[tokio::test]
async fn test_bypass_skips_gate() {
    let handler = Arc::new(ToggleHandler::default());
    let authz = engine(Some(handler.clone()), MissingHandlerPolicy::Deny).await;
    let alice = alice();
    let beta = beta();
    authz
        .grants()
        .give_permission_to(&alice, ["reports.view", "reports.export"], None)
        .await
        .unwrap();

    assert!(authz
        .permissions()
        .has_permission(&alice, "reports.view", Some(&beta), true)
        .await
        .unwrap());
    assert!(authz
        .permissions()
        .has_permission(&alice, "reports.export", None, true)
        .await
        .unwrap());
    assert_eq!(handler.calls(), 0);

    let allowed = authz
        .check(&alice, Some(&beta))
        .bypass_features()
        .can("reports.view")
        .evaluate()
        .await
        .unwrap();
    assert!(allowed);

    let blocked = authz
        .check(&alice, Some(&beta))
        .can("reports.view")
        .evaluate()
        .await
        .unwrap();
    assert!(!blocked);
}

#[tokio::test]
async fn test_disabled_context_support_disables_features() {
    let handler = Arc::new(ToggleHandler::default());
    let mut config = feature_config(MissingHandlerPolicy::Deny);
    config.context.enabled = false;
    let authz = Authorizer::builder()
        .config(config)
        .feature_handler(handler.clone())
        .build()
        .unwrap();
    authz
        .registry()
        .create_permission(Permission::new("reports.view", "web"))
        .await
        .unwrap();
    let alice = alice();
    authz
        .grants()
        .give_permission_to(&alice, ["reports.view"], None)
        .await
        .unwrap();

    assert!(authz.has_permission(&alice, "reports.view", Some(&beta())).await.unwrap());
    assert_eq!(handler.calls(), 0);
}
