//! Audit events and sinks
//!
//! Sinks are injected per `Authorizer`. Recording is best-effort: a failing sink
//! is logged and ignored, it never changes the outcome of a check or mutation.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::resolver::GrantPath;
use crate::types::{ContextRef, OwnerKey, Relation};

/// Domain event emitted by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuthzEvent {
    Granted {
        relation: Relation,
        owner: OwnerKey,
        grantees: Vec<String>,
        context: Option<ContextRef>,
    },
    Revoked {
        relation: Relation,
        owner: OwnerKey,
        grantees: Vec<String>,
        context: Option<ContextRef>,
    },
    Synced {
        relation: Relation,
        owner: OwnerKey,
        attached: Vec<String>,
        detached: Vec<String>,
        context: Option<ContextRef>,
    },
    DefinitionsSynced {
        created: usize,
        updated: usize,
    },
    SubjectForgotten {
        owner: OwnerKey,
        edges_removed: usize,
    },
    PermissionChecked {
        subject: String,
        permission: String,
        context: Option<ContextRef>,
        granted: bool,
        path: Option<GrantPath>,
    },
    RoleChecked {
        subject: String,
        role: String,
        context: Option<ContextRef>,
        granted: bool,
    },
}

impl AuthzEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Granted { .. } => "granted",
            Self::Revoked { .. } => "revoked",
            Self::Synced { .. } => "synced",
            Self::DefinitionsSynced { .. } => "definitions_synced",
            Self::SubjectForgotten { .. } => "subject_forgotten",
            Self::PermissionChecked { .. } => "permission_checked",
            Self::RoleChecked { .. } => "role_checked",
        }
    }
}

/// Audit record wrapping an event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: AuthzEvent,
}

impl AuditRecord {
    pub fn new(event: AuthzEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            at: Utc::now(),
            event,
        }
    }
}

/// Destination for audit records
pub trait AuditSink: Send + Sync {
    fn record(&self, record: &AuditRecord) -> Result<()>;
}

/// Emits audit records as structured `tracing` events
#[derive(Debug, Default, Clone)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: &AuditRecord) -> Result<()> {
        let body = serde_json::to_string(&record.event)?;
        info!(
            target: "warden::audit",
            audit_id = %record.id,
            at = %record.at.to_rfc3339(),
            event = record.event.name(),
            %body,
            "authorization audit"
        );
        Ok(())
    }
}

/// Keeps records in memory (tests, debugging)
#[derive(Debug, Default, Clone)]
pub struct MemoryAuditSink {
    records: Arc<Mutex<Vec<AuditRecord>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    pub fn events(&self) -> Vec<AuthzEvent> {
        self.records.lock().iter().map(|r| r.event.clone()).collect()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: &AuditRecord) -> Result<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

/// Discards everything
#[derive(Debug, Default, Clone)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _record: &AuditRecord) -> Result<()> {
        Ok(())
    }
}

/// Engine-side handle that applies the audit configuration and swallows sink errors
#[derive(Clone)]
pub struct Auditor {
    sink: Arc<dyn AuditSink>,
    enabled: bool,
    log_checks: bool,
}

impl Auditor {
    pub fn new(sink: Arc<dyn AuditSink>, enabled: bool, log_checks: bool) -> Self {
        Self {
            sink,
            enabled,
            log_checks,
        }
    }

    pub fn disabled() -> Self {
        Self::new(Arc::new(NoopAuditSink), false, false)
    }

    pub fn logs_checks(&self) -> bool {
        self.enabled && self.log_checks
    }

    /// Records a mutation event
    pub fn emit(&self, event: AuthzEvent) {
        if !self.enabled {
            return;
        }
        let record = AuditRecord::new(event);
        if let Err(e) = self.sink.record(&record) {
            warn!(
                event = record.event.name(),
                error = %e,
                "Audit sink failed, continuing"
            );
        }
    }

    /// Records a check event when check auditing is enabled
    pub fn emit_check(&self, event: AuthzEvent) {
        if self.logs_checks() {
            self.emit(event);
        }
    }
}
