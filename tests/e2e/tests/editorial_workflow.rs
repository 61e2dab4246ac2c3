//! End-to-end editorial workflow
//!
//! Loads configuration and definitions from disk, grants roles in team contexts
//! and checks decisions the way a host application would.

use anyhow::Result;
use futures::future::join_all;
use serial_test::serial;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing_test::traced_test;
use warden_authz::{
    Authorizer, AuthzEvent, ContextRef, DefinitionTable, EngineConfig, MemoryAuditSink, SubjectRef,
};

const DEFINITIONS: &str = r#"
[[permissions]]
name = "articles.view"

[[permissions]]
name = "articles.edit"

[[permissions]]
name = "articles.publish"
label = "Publish articles"

[[capabilities]]
name = "publishing"
permissions = ["articles.publish"]

[[roles]]
name = "reader"
permissions = ["articles.view"]

[[roles]]
name = "editor"
permissions = ["articles.edit"]
capabilities = ["publishing"]
inherits = ["reader"]
"#;

fn config_file(fallback: bool) -> Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    write!(
        file,
        r#"
default_guard = "web"

[context]
enabled = true
global_fallback = {}

[cache]
ttl_secs = 600
"#,
        fallback
    )?;
    Ok(file)
}

async fn boot(fallback: bool) -> Result<(Authorizer, MemoryAuditSink)> {
    let file = config_file(fallback)?;
    let config = EngineConfig::from_file(file.path())?;
    let audit = MemoryAuditSink::new();
    let authz = Authorizer::builder()
        .config(config)
        .audit_sink(Arc::new(audit.clone()))
        .build()?;

    let table = DefinitionTable::from_toml_str(DEFINITIONS)?;
    let report = authz.sync_definitions(&table).await?;
    assert_eq!(report.created, 6);
    Ok((authz, audit))
}

#[tokio::test]
#[traced_test]
#[serial]
async fn test_editor_in_team_with_fallback() -> Result<()> {
    let (authz, _audit) = boot(true).await?;
    let alice = SubjectRef::new("user", "alice", "web");
    let t1 = ContextRef::new("team", "t1");
    let t2 = ContextRef::new("team", "t2");

    authz.grants().assign_role(&alice, ["editor"], Some(&t1)).await?;
    authz.grants().give_permission_to(&alice, ["articles.view"], None).await?;

    assert!(authz.has_permission(&alice, "articles.edit", Some(&t1)).await?);
    assert!(authz.has_permission(&alice, "articles.publish", Some(&t1)).await?);
    assert!(!authz.has_permission(&alice, "articles.edit", Some(&t2)).await?);
    assert!(!authz.has_permission(&alice, "articles.edit", None).await?);

    // The global view grant follows alice into any team
    assert!(authz.has_permission(&alice, "articles.view", Some(&t2)).await?);

    let allowed = authz
        .check(&alice, Some(&t1))
        .can("articles.edit")
        .or_has_role("admin")
        .evaluate()
        .await?;
    assert!(allowed);

    assert_eq!(authz.gate().check(&alice, "editor", Some(&t1)).await?, Some(true));
    assert_eq!(authz.gate().check(&alice, "billing.refund", Some(&t1)).await?, None);

    tracing::info!("editor workflow with fallback verified");
    assert!(logs_contain("editor workflow with fallback verified"));
    Ok(())
}

#[tokio::test]
#[traced_test]
#[serial]
async fn test_editor_in_team_without_fallback() -> Result<()> {
    let (authz, _audit) = boot(false).await?;
    let alice = SubjectRef::new("user", "alice", "web");
    let t1 = ContextRef::new("team", "t1");

    authz.grants().assign_role(&alice, ["editor"], Some(&t1)).await?;
    authz.grants().give_permission_to(&alice, ["articles.view"], None).await?;

    assert!(authz.has_permission(&alice, "articles.edit", Some(&t1)).await?);
    // reader is inherited inside t1, so view still resolves there
    assert!(authz.has_permission(&alice, "articles.view", Some(&t1)).await?);

    authz.grants().remove_role(&alice, ["editor"], Some(&t1)).await?;
    assert!(!authz.has_permission(&alice, "articles.edit", Some(&t1)).await?);
    assert!(!authz.has_permission(&alice, "articles.view", Some(&t1)).await?);
    assert!(authz.has_permission(&alice, "articles.view", None).await?);
    Ok(())
}

#[tokio::test]
#[traced_test]
#[serial]
async fn test_global_editor_reaches_team_only_with_fallback() -> Result<()> {
    for fallback in [true, false] {
        let (authz, _audit) = boot(fallback).await?;
        let alice = SubjectRef::new("user", "alice", "web");
        let t1 = ContextRef::new("team", "t1");

        authz.grants().assign_role(&alice, ["editor"], None).await?;

        assert!(authz.has_permission(&alice, "articles.edit", None).await?);
        assert!(authz.has_permission(&alice, "articles.publish", None).await?);
        assert_eq!(authz.has_permission(&alice, "articles.edit", Some(&t1)).await?, fallback);
        assert_eq!(authz.has_permission(&alice, "articles.publish", Some(&t1)).await?, fallback);
        assert_eq!(authz.has_role(&alice, "editor", Some(&t1)).await?, fallback);

        tracing::info!(fallback, "global editor checked in team");
    }
    assert!(logs_contain("global editor checked in team"));
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_snapshot_serializes_for_clients() -> Result<()> {
    let (authz, _audit) = boot(true).await?;
    let bob = SubjectRef::new("user", "bob", "web");
    let t1 = ContextRef::new("team", "t1");
    authz.grants().assign_role(&bob, ["editor"], Some(&t1)).await?;

    let snapshot = authz.snapshot(&bob, Some(&t1)).await?;
    assert!(snapshot.can("articles.publish"));
    assert!(snapshot.is("reader"));

    let json = serde_json::to_value(&snapshot)?;
    assert_eq!(
        json["permissions"],
        serde_json::json!(["articles.edit", "articles.publish", "articles.view"])
    );
    assert_eq!(json["roles"], serde_json::json!(["editor", "reader"]));
    assert_eq!(json["capabilities"], serde_json::json!(["publishing"]));
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_concurrent_checks_and_grants() -> Result<()> {
    let (authz, audit) = boot(true).await?;
    audit.clear();
    let t1 = ContextRef::new("team", "t1");
    let users: Vec<SubjectRef> = (0..32)
        .map(|i| SubjectRef::new("user", format!("u{}", i), "web"))
        .collect();

    let grants = users.iter().map(|user| {
        let authz = &authz;
        let t1 = &t1;
        async move { authz.grants().assign_role(user, ["editor"], Some(t1)).await }
    });
    for result in join_all(grants).await {
        assert_eq!(result?.len(), 1);
    }

    let checks = users.iter().map(|user| {
        let authz = &authz;
        let t1 = &t1;
        async move { authz.has_permission(user, "articles.publish", Some(t1)).await }
    });
    for result in join_all(checks).await {
        assert!(result?);
    }

    let granted = audit
        .events()
        .into_iter()
        .filter(|e| matches!(e, AuthzEvent::Granted { .. }))
        .count();
    assert_eq!(granted, users.len());
    Ok(())
}
