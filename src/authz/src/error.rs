//! Error types for the authorization engine

use thiserror::Error;

use crate::types::DefinitionKind;

/// Authorization engine errors
///
/// Resolution functions only return `Ok(bool)` on a definitive decision. Every
/// other outcome is one of these variants and is never folded into `false`.
#[derive(Debug, Error)]
pub enum AuthzError {
    /// A typed grantee belongs to a different guard than its owner
    #[error("Guard mismatch for '{grantee}': expected guard '{expected}', got '{actual}'")]
    GuardMismatch {
        grantee: String,
        expected: String,
        actual: String,
    },

    /// A name-based grant references a definition that does not exist
    #[error("{kind} '{name}' does not exist for guard '{guard}'")]
    UnresolvedGrantee {
        kind: DefinitionKind,
        name: String,
        guard: String,
    },

    /// Feature integration is enabled but no handler is bound
    #[error("No feature handler bound while checking feature '{0}'")]
    FeatureHandlerUnavailable(String),

    /// Failure reported by the relation or definition store
    #[error("Store error: {0}")]
    Store(String),

    /// Role inheritance would form a cycle
    #[error("Role hierarchy cycle: {0}")]
    HierarchyCycle(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file could not be parsed
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Audit payload could not be encoded as JSON
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AuthzError {
    /// Wrap any store-side failure
    pub fn store(err: impl std::fmt::Display) -> Self {
        Self::Store(err.to_string())
    }

    /// Whether the error came from the underlying store
    pub fn is_store_error(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

/// Result type for authorization operations
pub type Result<T> = std::result::Result<T, AuthzError>;
