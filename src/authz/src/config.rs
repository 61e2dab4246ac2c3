//! Engine configuration loading and validation

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{AuthzError, Result};

/// Complete engine configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Guard used when a definition is created without one
    pub default_guard: String,
    pub context: ContextSection,
    pub wildcard: WildcardSection,
    pub capabilities: CapabilitySection,
    pub features: FeatureSection,
    pub cache: CacheSection,
    pub audit: AuditSection,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_guard: "web".to_string(),
            context: ContextSection::default(),
            wildcard: WildcardSection::default(),
            capabilities: CapabilitySection::default(),
            features: FeatureSection::default(),
            cache: CacheSection::default(),
            audit: AuditSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ContextSection {
    /// Whether grant edges may be scoped to a context
    pub enabled: bool,
    /// Whether global grants also apply when a context is requested
    pub global_fallback: bool,
}

impl Default for ContextSection {
    fn default() -> Self {
        Self {
            enabled: true,
            global_fallback: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WildcardSection {
    pub enabled: bool,
    pub token: String,
    pub delimiters: Vec<char>,
}

impl Default for WildcardSection {
    fn default() -> Self {
        Self {
            enabled: false,
            token: "*".to_string(),
            delimiters: vec!['.', ':'],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CapabilitySection {
    pub enabled: bool,
    /// Allow capabilities to be assigned straight to subjects
    pub direct_assignment: bool,
}

impl Default for CapabilitySection {
    fn default() -> Self {
        Self {
            enabled: true,
            direct_assignment: false,
        }
    }
}

/// What to do when a feature check has no handler bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingHandlerPolicy {
    Allow,
    Deny,
    Throw,
}

impl std::str::FromStr for MissingHandlerPolicy {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "allow" => Ok(Self::Allow),
            "deny" => Ok(Self::Deny),
            "throw" => Ok(Self::Throw),
            other => Err(AuthzError::Config(format!(
                "unknown missing handler policy '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FeatureSection {
    pub enabled: bool,
    /// Context types treated as feature contexts
    pub context_types: Vec<String>,
    /// Context type used for feature bindings on definitions
    pub binding_type: String,
    pub on_missing_handler: MissingHandlerPolicy,
}

impl Default for FeatureSection {
    fn default() -> Self {
        Self {
            enabled: false,
            context_types: vec!["feature".to_string()],
            binding_type: "feature".to_string(),
            on_missing_handler: MissingHandlerPolicy::Deny,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheSection {
    /// Registry cache TTL in seconds; 0 disables caching
    pub ttl_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self { ttl_secs: 86_400 }
    }
}

impl CacheSection {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditSection {
    pub enabled: bool,
    /// Also record every permission/role check, not only mutations
    pub log_checks: bool,
}

impl Default for AuditSection {
    fn default() -> Self {
        Self {
            enabled: true,
            log_checks: false,
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    /// Apply `WARDEN_*` environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(guard) = std::env::var("WARDEN_DEFAULT_GUARD") {
            self.default_guard = guard;
        }
        if let Some(v) = env_bool("WARDEN_CONTEXT_ENABLED")? {
            self.context.enabled = v;
        }
        if let Some(v) = env_bool("WARDEN_CONTEXT_FALLBACK")? {
            self.context.global_fallback = v;
        }
        if let Some(v) = env_bool("WARDEN_WILDCARD_ENABLED")? {
            self.wildcard.enabled = v;
        }
        if let Some(v) = env_bool("WARDEN_FEATURES_ENABLED")? {
            self.features.enabled = v;
        }
        if let Ok(policy) = std::env::var("WARDEN_FEATURES_ON_MISSING_HANDLER") {
            self.features.on_missing_handler = policy.parse()?;
        }
        if let Ok(ttl) = std::env::var("WARDEN_CACHE_TTL") {
            self.cache.ttl_secs = ttl.parse().map_err(|_| {
                AuthzError::Config(format!("WARDEN_CACHE_TTL must be an integer, got '{}'", ttl))
            })?;
        }
        self.validate()
    }

    /// Validate configuration invariants
    pub fn validate(&self) -> Result<()> {
        if self.default_guard.is_empty() {
            return Err(AuthzError::Config("default_guard cannot be empty".to_string()));
        }
        if self.wildcard.token.is_empty() {
            return Err(AuthzError::Config("wildcard.token cannot be empty".to_string()));
        }
        if self.wildcard.delimiters.is_empty() {
            return Err(AuthzError::Config(
                "wildcard.delimiters needs at least one delimiter".to_string(),
            ));
        }
        if self
            .wildcard
            .delimiters
            .iter()
            .any(|d| self.wildcard.token.contains(*d))
        {
            return Err(AuthzError::Config(
                "wildcard.token cannot contain a delimiter".to_string(),
            ));
        }
        if self.features.enabled && self.features.context_types.is_empty() {
            return Err(AuthzError::Config(
                "features.context_types cannot be empty when features are enabled".to_string(),
            ));
        }
        Ok(())
    }

    /// Feature integration needs both the feature and the context subsystems
    pub fn feature_integration_enabled(&self) -> bool {
        self.features.enabled && self.context.enabled
    }
}

fn env_bool(key: &str) -> Result<Option<bool>> {
    match std::env::var(key) {
        Ok(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(AuthzError::Config(format!(
                "{} must be a boolean, got '{}'",
                key, raw
            ))),
        },
        Err(_) => Ok(None),
    }
}
