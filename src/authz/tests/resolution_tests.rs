//! Permission and role resolution across every grant path
//!
//! Direct grants, role-mediated grants with inheritance, capability indirection,
//! context scoping with and without global fallback, and wildcard coverage.

use warden_authz::{
    Authorizer, ContextRef, DefinitionTable, EngineConfig, GrantHolder, GrantPath, SubjectRef,
};

const DEFINITIONS: &str = r#"
[[permissions]]
name = "articles.view"

[[permissions]]
name = "articles.edit"

[[permissions]]
name = "articles.publish"

[[permissions]]
name = "articles.delete"

[[permissions]]
name = "users.*"

[[permissions]]
name = "users.view"

[[capabilities]]
name = "publishing"
permissions = ["articles.publish"]

[[roles]]
name = "viewer"
permissions = ["articles.view"]

[[roles]]
name = "editor"
permissions = ["articles.edit"]
capabilities = ["publishing"]
inherits = ["viewer"]

[[roles]]
name = "admin"
permissions = ["articles.delete"]
inherits = ["editor"]
"#;

async fn authorizer(config: EngineConfig) -> Authorizer {
    let authz = Authorizer::in_memory(config).unwrap();
    let table = DefinitionTable::from_toml_str(DEFINITIONS).unwrap();
    authz.sync_definitions(&table).await.unwrap();
    authz
}

fn user(id: &str) -> SubjectRef {
    SubjectRef::new("user", id, "web")
}

fn team(id: &str) -> ContextRef {
    ContextRef::new("team", id)
}

fn with_fallback(enabled: bool) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.context.global_fallback = enabled;
    config
}

// ============================================================================
// GRANT PATHS
// ============================================================================

#[tokio::test]
async fn test_direct_grant() {
    let authz = authorizer(EngineConfig::default()).await;
    let alice = user("alice");

    authz
        .grants()
        .give_permission_to(&alice, ["articles.delete"], None)
        .await
        .unwrap();

    assert!(authz.has_permission(&alice, "articles.delete", None).await.unwrap());
    assert!(!authz.has_permission(&alice, "articles.edit", None).await.unwrap());
    assert_eq!(
        authz
            .permissions()
            .explain_permission(&alice, "articles.delete", None, false)
            .await
            .unwrap(),
        Some(GrantPath::Direct)
    );
}

#[tokio::test]
async fn test_role_grant_with_inheritance() {
    let authz = authorizer(EngineConfig::default()).await;
    let alice = user("alice");

    authz.grants().assign_role(&alice, ["editor"], None).await.unwrap();

    let permissions = authz.permissions();
    assert_eq!(
        permissions
            .explain_permission(&alice, "articles.edit", None, false)
            .await
            .unwrap(),
        Some(GrantPath::Role)
    );
    // Inherited from viewer
    assert_eq!(
        permissions
            .explain_permission(&alice, "articles.view", None, false)
            .await
            .unwrap(),
        Some(GrantPath::Role)
    );
    assert!(!authz.has_permission(&alice, "articles.delete", None).await.unwrap());

    assert!(authz.has_role(&alice, "editor", None).await.unwrap());
    assert!(authz.has_role(&alice, "viewer", None).await.unwrap());
    assert!(!authz.has_role(&alice, "admin", None).await.unwrap());
}

#[tokio::test]
async fn test_transitive_inheritance() {
    let authz = authorizer(EngineConfig::default()).await;
    let root = user("root");

    authz.grants().assign_role(&root, ["admin"], None).await.unwrap();

    for permission in ["articles.delete", "articles.edit", "articles.publish", "articles.view"] {
        assert!(
            authz.has_permission(&root, permission, None).await.unwrap(),
            "admin should hold {}",
            permission
        );
    }
}

#[tokio::test]
async fn test_capability_indirection() {
    let authz = authorizer(EngineConfig::default()).await;
    let alice = user("alice");
    authz.grants().assign_role(&alice, ["editor"], None).await.unwrap();

    let permissions = authz.permissions();
    assert!(authz.has_permission(&alice, "articles.publish", None).await.unwrap());
    assert!(!permissions
        .has_direct_permission(&alice, "articles.publish", None)
        .await
        .unwrap());
    assert!(permissions
        .has_permission_via_role(&alice, "articles.publish", None)
        .await
        .unwrap());
    assert_eq!(
        permissions
            .explain_permission(&alice, "articles.publish", None, false)
            .await
            .unwrap(),
        Some(GrantPath::RoleCapability)
    );
    assert!(authz.has_capability(&alice, "publishing", None).await.unwrap());
}

#[tokio::test]
async fn test_direct_capability_requires_opt_in() {
    let mut config = EngineConfig::default();
    config.capabilities.direct_assignment = true;
    let authz = authorizer(config).await;
    let bob = user("bob");

    authz
        .grants()
        .assign_capability(&bob, ["publishing"], None)
        .await
        .unwrap();

    assert_eq!(
        authz
            .permissions()
            .explain_permission(&bob, "articles.publish", None, false)
            .await
            .unwrap(),
        Some(GrantPath::DirectCapability)
    );

    let disabled = authorizer(EngineConfig::default()).await;
    assert!(disabled
        .grants()
        .assign_capability(&bob, ["publishing"], None)
        .await
        .is_err());
}

#[tokio::test]
async fn test_get_all_permissions_deduplicates() {
    let authz = authorizer(EngineConfig::default()).await;
    let alice = user("alice");

    authz.grants().assign_role(&alice, ["editor"], None).await.unwrap();
    authz
        .grants()
        .give_permission_to(&alice, ["articles.edit", "articles.view"], None)
        .await
        .unwrap();

    let mut names = authz
        .permissions()
        .get_permission_names(&alice, None)
        .await
        .unwrap();
    names.sort();
    assert_eq!(names, vec!["articles.edit", "articles.publish", "articles.view"]);

    let direct = authz
        .permissions()
        .get_direct_permissions(&alice, None)
        .await
        .unwrap();
    assert_eq!(direct.len(), 2);

    let via_roles = authz
        .permissions()
        .get_permissions_via_roles(&alice, None)
        .await
        .unwrap();
    assert_eq!(via_roles.len(), 3);
}

#[tokio::test]
async fn test_unknown_names_are_denied() {
    let authz = authorizer(EngineConfig::default()).await;
    let alice = user("alice");

    assert!(!authz.has_permission(&alice, "reports.view", None).await.unwrap());
    assert!(!authz.has_role(&alice, "auditor", None).await.unwrap());
    assert!(!authz.has_capability(&alice, "billing", None).await.unwrap());
}

// ============================================================================
// QUANTIFIERS
// ============================================================================

#[tokio::test]
async fn test_any_and_all_on_empty_input() {
    let authz = authorizer(EngineConfig::default()).await;
    let alice = user("alice");
    authz.grants().assign_role(&alice, ["admin"], None).await.unwrap();
    let none: [&str; 0] = [];

    let permissions = authz.permissions();
    assert!(!permissions.has_any_permission(&alice, &none, None, false).await.unwrap());
    assert!(!permissions.has_all_permissions(&alice, &none, None, false).await.unwrap());

    let roles = authz.roles();
    assert!(!roles.has_any_role(&alice, &none, None, false).await.unwrap());
    assert!(!roles.has_all_roles(&alice, &none, None, false).await.unwrap());
}

#[tokio::test]
async fn test_any_and_all() {
    let authz = authorizer(EngineConfig::default()).await;
    let alice = user("alice");
    authz.grants().assign_role(&alice, ["viewer"], None).await.unwrap();

    let permissions = authz.permissions();
    assert!(permissions
        .has_any_permission(&alice, &["articles.delete", "articles.view"], None, false)
        .await
        .unwrap());
    assert!(!permissions
        .has_all_permissions(&alice, &["articles.delete", "articles.view"], None, false)
        .await
        .unwrap());

    let capabilities = authz.capabilities();
    assert!(!capabilities
        .has_any_capability(&alice, &["publishing"], None)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_role_names_and_exact_roles() {
    let authz = authorizer(EngineConfig::default()).await;
    let alice = user("alice");
    authz
        .grants()
        .assign_role(&alice, ["viewer", "editor"], None)
        .await
        .unwrap();

    let roles = authz.roles();
    assert_eq!(
        roles.get_role_names(&alice, None).await.unwrap(),
        vec!["editor", "viewer"]
    );
    assert!(roles
        .has_exact_roles(&alice, &["viewer", "editor"], None)
        .await
        .unwrap());
    assert!(!roles.has_exact_roles(&alice, &["editor"], None).await.unwrap());
}

// ============================================================================
// CONTEXT SCOPING
// ============================================================================

#[tokio::test]
async fn test_scoped_role_with_fallback() {
    let authz = authorizer(with_fallback(true)).await;
    let alice = user("alice");
    let t1 = team("t1");
    let t2 = team("t2");

    authz.grants().assign_role(&alice, ["editor"], Some(&t1)).await.unwrap();

    assert!(authz.has_permission(&alice, "articles.edit", Some(&t1)).await.unwrap());
    assert!(!authz.has_permission(&alice, "articles.edit", Some(&t2)).await.unwrap());
    assert!(!authz.has_permission(&alice, "articles.edit", None).await.unwrap());
}

#[tokio::test]
async fn test_global_grant_falls_back_into_context() {
    let alice = user("alice");
    let t1 = team("t1");

    let fallback = authorizer(with_fallback(true)).await;
    fallback.grants().assign_role(&alice, ["editor"], None).await.unwrap();
    assert!(fallback.has_permission(&alice, "articles.edit", Some(&t1)).await.unwrap());
    assert!(fallback.has_permission(&alice, "articles.edit", None).await.unwrap());

    let strict = authorizer(with_fallback(false)).await;
    strict.grants().assign_role(&alice, ["editor"], None).await.unwrap();
    assert!(!strict.has_permission(&alice, "articles.edit", Some(&t1)).await.unwrap());
    assert!(strict.has_permission(&alice, "articles.edit", None).await.unwrap());
}

#[tokio::test]
async fn test_disabled_context_support_treats_checks_as_global() {
    let mut config = EngineConfig::default();
    config.context.enabled = false;
    let authz = authorizer(config).await;
    let alice = user("alice");
    let t1 = team("t1");

    // Stored globally, so visible with or without the context
    authz.grants().assign_role(&alice, ["editor"], Some(&t1)).await.unwrap();
    assert!(authz.has_permission(&alice, "articles.edit", None).await.unwrap());
    assert!(authz.has_permission(&alice, "articles.edit", Some(&team("t2"))).await.unwrap());
}

#[tokio::test]
async fn test_context_queries() {
    let authz = authorizer(EngineConfig::default()).await;
    let alice = user("alice");

    authz.grants().assign_role(&alice, ["editor"], Some(&team("b"))).await.unwrap();
    authz.grants().assign_role(&alice, ["editor"], Some(&team("a"))).await.unwrap();
    authz.grants().assign_role(&alice, ["editor"], None).await.unwrap();
    authz
        .grants()
        .give_permission_to(&alice, ["articles.view"], Some(&team("a")))
        .await
        .unwrap();

    assert_eq!(
        authz.roles().get_role_contexts(&alice, "editor").await.unwrap(),
        vec![team("a"), team("b")]
    );
    assert_eq!(
        authz
            .permissions()
            .get_permission_contexts(&alice, "articles.view")
            .await
            .unwrap(),
        vec![team("a")]
    );
    assert!(authz
        .roles()
        .get_role_contexts(&alice, "nonexistent")
        .await
        .unwrap()
        .is_empty());
}

// ============================================================================
// WILDCARDS
// ============================================================================

#[tokio::test]
async fn test_wildcard_coverage() {
    let mut config = EngineConfig::default();
    config.wildcard.enabled = true;
    let authz = authorizer(config).await;
    let alice = user("alice");

    authz.grants().give_permission_to(&alice, ["users.*"], None).await.unwrap();

    assert_eq!(
        authz
            .permissions()
            .explain_permission(&alice, "users.view", None, false)
            .await
            .unwrap(),
        Some(GrantPath::Wildcard)
    );
    // Not defined, still covered
    assert!(authz.has_permission(&alice, "users.delete", None).await.unwrap());
    assert!(!authz.has_permission(&alice, "articles.view", None).await.unwrap());
}

#[tokio::test]
async fn test_wildcard_disabled_is_literal() {
    let authz = authorizer(EngineConfig::default()).await;
    let alice = user("alice");

    authz.grants().give_permission_to(&alice, ["users.*"], None).await.unwrap();

    assert!(!authz.has_permission(&alice, "users.view", None).await.unwrap());
    assert!(authz.has_permission(&alice, "users.*", None).await.unwrap());
}

// ============================================================================
// SUBJECT TYPES AND GUARDS
// ============================================================================

/// Subject type that can only hold direct permissions
struct ApiKey {
    id: String,
}

impl GrantHolder for ApiKey {
    const HOLDS_ROLES: bool = false;
    const HOLDS_CAPABILITIES: bool = false;

    fn subject_ref(&self) -> SubjectRef {
        SubjectRef::new("api_key", &self.id, "web")
    }
}

#[tokio::test]
async fn test_subject_without_roles_skips_role_path() {
    let authz = authorizer(EngineConfig::default()).await;
    let key = ApiKey {
        id: "k1".to_string(),
    };

    // Role edge written through the raw subject reference
    authz
        .grants()
        .assign_role(&key.subject_ref(), ["editor"], None)
        .await
        .unwrap();
    authz
        .grants()
        .give_permission_to(&key, ["articles.view"], None)
        .await
        .unwrap();

    assert!(!authz.has_permission(&key, "articles.edit", None).await.unwrap());
    assert!(authz.has_permission(&key, "articles.view", None).await.unwrap());
}

#[tokio::test]
async fn test_guards_partition_definitions() {
    let authz = authorizer(EngineConfig::default()).await;
    let web = user("alice");
    let api = SubjectRef::new("user", "alice", "api");

    authz.grants().assign_role(&web, ["editor"], None).await.unwrap();

    assert!(authz.has_permission(&web, "articles.edit", None).await.unwrap());
    assert!(!authz.has_permission(&api, "articles.edit", None).await.unwrap());
}

// ============================================================================
// SNAPSHOT
// ============================================================================

#[tokio::test]
async fn test_snapshot() {
    let authz = authorizer(EngineConfig::default()).await;
    let alice = user("alice");
    authz.grants().assign_role(&alice, ["editor"], None).await.unwrap();

    let snapshot = authz.snapshot(&alice, None).await.unwrap();
    assert_eq!(snapshot.roles, vec!["editor", "viewer"]);
    assert_eq!(
        snapshot.permissions,
        vec!["articles.edit", "articles.publish", "articles.view"]
    );
    assert_eq!(snapshot.capabilities, vec!["publishing"]);
    assert!(snapshot.can("articles.edit"));
    assert!(snapshot.is("viewer"));

    let json = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json["subject"]["type"], "user");
    assert!(json.get("context").is_none());
}
