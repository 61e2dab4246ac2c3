//! Context normalization and the grant-edge context filter
//!
//! Every query that touches grant edges builds its filter here so the three-way
//! global / exact / exact-or-global policy cannot drift between call sites.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ContextSection;
use crate::types::{ContextEntity, ContextRef};

/// Predicate over the context stored on a grant edge
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "mode", content = "context", rename_all = "snake_case")]
pub enum ContextFilter {
    /// Only edges without a context
    GlobalOnly,
    /// Only edges scoped to exactly this context
    Exact(ContextRef),
    /// Edges scoped to this context or global edges
    ExactOrGlobal(ContextRef),
}

impl ContextFilter {
    /// Checks a stored edge context against the filter
    pub fn matches(&self, edge_context: Option<&ContextRef>) -> bool {
        match (self, edge_context) {
            (Self::GlobalOnly, None) => true,
            (Self::GlobalOnly, Some(_)) => false,
            (Self::Exact(ctx), Some(edge)) => ctx == edge,
            (Self::Exact(_), None) => false,
            (Self::ExactOrGlobal(_), None) => true,
            (Self::ExactOrGlobal(ctx), Some(edge)) => ctx == edge,
        }
    }

    /// The requested context, if any
    pub fn context(&self) -> Option<&ContextRef> {
        match self {
            Self::GlobalOnly => None,
            Self::Exact(ctx) | Self::ExactOrGlobal(ctx) => Some(ctx),
        }
    }
}

/// Normalizes optional contexts and applies the global-fallback policy
#[derive(Debug, Clone)]
pub struct ContextResolver {
    enabled: bool,
    global_fallback: bool,
}

impl ContextResolver {
    pub fn new(enabled: bool, global_fallback: bool) -> Self {
        Self {
            enabled,
            global_fallback,
        }
    }

    pub fn from_config(config: &ContextSection) -> Self {
        Self::new(config.enabled, config.global_fallback)
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn global_fallback(&self) -> bool {
        self.global_fallback
    }

    /// Splits a context into its `(type, id)` pair
    pub fn resolve(&self, context: Option<&dyn ContextEntity>) -> (Option<String>, Option<String>) {
        match self.normalize(context) {
            Some(ctx) => (Some(ctx.kind), Some(ctx.id)),
            None => (None, None),
        }
    }

    /// Converts an arbitrary context entity into a `ContextRef`.
    ///
    /// Returns `None` when no context is given or context support is disabled.
    pub fn normalize(&self, context: Option<&dyn ContextEntity>) -> Option<ContextRef> {
        let context = context?;
        if !self.enabled {
            debug!(
                context_type = %context.context_type(),
                "Context support disabled, treating check as global"
            );
            return None;
        }
        Some(ContextRef::new(context.context_type(), context.context_id()))
    }

    /// Filter for read paths, honoring the configured fallback policy
    pub fn filter(&self, context: Option<&ContextRef>) -> ContextFilter {
        self.build_filter(context, self.global_fallback)
    }

    /// Filter for mutations: always exact so global grants are never touched
    pub fn mutation_filter(&self, context: Option<&ContextRef>) -> ContextFilter {
        self.build_filter(context, false)
    }

    /// Builds the edge filter for a requested context
    pub fn build_filter(&self, context: Option<&ContextRef>, fallback: bool) -> ContextFilter {
        let context = if self.enabled { context } else { None };
        match context {
            None => ContextFilter::GlobalOnly,
            Some(ctx) if fallback => ContextFilter::ExactOrGlobal(ctx.clone()),
            Some(ctx) => ContextFilter::Exact(ctx.clone()),
        }
    }

    /// Context to store on a new edge
    pub fn edge_context(&self, context: Option<&ContextRef>) -> Option<ContextRef> {
        self.mutation_filter(context).context().cloned()
    }
}

impl Default for ContextResolver {
    fn default() -> Self {
        Self::from_config(&ContextSection::default())
    }
}
