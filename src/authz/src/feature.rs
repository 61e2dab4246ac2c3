//! Feature gate: an optional veto evaluated before any grant path
//!
//! | integration | feature context | bypass | handler | result |
//! |---|---|---|---|---|
//! | off | – | – | – | allow |
//! | on | no | – | – | allow |
//! | on | yes | yes | – | allow |
//! | on | yes | no | none | `on_missing_handler` policy |
//! | on | yes | no | bound | `is_active && can_access` |

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::{EngineConfig, MissingHandlerPolicy};
use crate::error::{AuthzError, Result};
use crate::types::{ContextRef, SubjectRef};

/// Pluggable feature subsystem
#[async_trait]
pub trait FeatureHandler: Send + Sync {
    /// Whether the feature is switched on at all
    async fn is_active(&self, feature: &ContextRef) -> Result<bool>;

    /// Whether this subject may use the feature
    async fn can_access(&self, feature: &ContextRef, subject: &SubjectRef) -> Result<bool>;
}

/// Applies the feature decision table
#[derive(Clone)]
pub struct FeatureGate {
    integration_enabled: bool,
    context_types: Vec<String>,
    binding_type: String,
    on_missing_handler: MissingHandlerPolicy,
    handler: Option<Arc<dyn FeatureHandler>>,
}

impl FeatureGate {
    pub fn new(config: &EngineConfig, handler: Option<Arc<dyn FeatureHandler>>) -> Self {
        Self {
            integration_enabled: config.feature_integration_enabled(),
            context_types: config.features.context_types.clone(),
            binding_type: config.features.binding_type.clone(),
            on_missing_handler: config.features.on_missing_handler,
            handler,
        }
    }

    /// Gate that always allows
    pub fn disabled() -> Self {
        Self {
            integration_enabled: false,
            context_types: Vec::new(),
            binding_type: String::new(),
            on_missing_handler: MissingHandlerPolicy::Allow,
            handler: None,
        }
    }

    pub fn integration_enabled(&self) -> bool {
        self.integration_enabled
    }

    pub fn handler_bound(&self) -> bool {
        self.handler.is_some()
    }

    /// Whether the context's type is one of the feature-bearing types
    pub fn is_feature_context(&self, context: &ContextRef) -> bool {
        self.context_types.iter().any(|t| t == &context.kind)
    }

    /// Checks a requested context
    pub async fn check_access(
        &self,
        context: Option<&ContextRef>,
        subject: &SubjectRef,
        bypass: bool,
    ) -> Result<bool> {
        if !self.integration_enabled {
            return Ok(true);
        }
        let Some(context) = context else {
            return Ok(true);
        };
        if !self.is_feature_context(context) {
            return Ok(true);
        }
        self.evaluate(context, subject, bypass).await
    }

    /// Checks the feature bound to a permission or role definition
    pub async fn check_binding(
        &self,
        feature: Option<&str>,
        subject: &SubjectRef,
        bypass: bool,
    ) -> Result<bool> {
        if !self.integration_enabled {
            return Ok(true);
        }
        let Some(feature) = feature else {
            return Ok(true);
        };
        let context = ContextRef::new(self.binding_type.clone(), feature);
        self.evaluate(&context, subject, bypass).await
    }

    async fn evaluate(
        &self,
        feature: &ContextRef,
        subject: &SubjectRef,
        bypass: bool,
    ) -> Result<bool> {
        if bypass {
            debug!(%feature, "Feature check bypassed");
            return Ok(true);
        }

        let Some(handler) = &self.handler else {
            return match self.on_missing_handler {
                MissingHandlerPolicy::Allow => {
                    warn!(%feature, "No feature handler bound, allowing by policy");
                    Ok(true)
                }
                MissingHandlerPolicy::Deny => {
                    warn!(%feature, "No feature handler bound, denying by policy");
                    Ok(false)
                }
                MissingHandlerPolicy::Throw => {
                    Err(AuthzError::FeatureHandlerUnavailable(feature.to_string()))
                }
            };
        };

        if !handler.is_active(feature).await? {
            debug!(%feature, "Feature inactive");
            return Ok(false);
        }
        let allowed = handler.can_access(feature, subject).await?;
        if !allowed {
            debug!(%feature, %subject, "Subject cannot access feature");
        }
        Ok(allowed)
    }
}
