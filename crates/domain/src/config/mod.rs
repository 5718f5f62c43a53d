mod conversation;
mod insights;
mod llm;
mod media;
mod observability;
mod server;
mod storage;
mod surveys;

pub use conversation::*;
pub use insights::*;
pub use llm::*;
pub use media::*;
pub use observability::*;
pub use server::*;
pub use storage::*;
pub use surveys::*;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub insights: InsightsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    /// Surveys seeded into the store at startup.
    #[serde(default)]
    pub surveys: Vec<SurveySeed>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl ConfigError {
    fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            field: field.into(),
            message: message.into(),
        }
    }

    fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError::error("server.port", "port must be greater than 0"));
        }
        if self.server.host.is_empty() {
            errors.push(ConfigError::error("server.host", "host must not be empty"));
        }
        if self.server.max_concurrent_requests == 0 {
            errors.push(ConfigError::error(
                "server.max_concurrent_requests",
                "must be greater than 0",
            ));
        }
        if self.server.cors.allowed_origins.len() == 1 && self.server.cors.allowed_origins[0] == "*" {
            errors.push(ConfigError::warning(
                "server.cors.allowed_origins",
                "wildcard \"*\" allows all origins (not recommended for production)",
            ));
        }

        if self.llm.providers.is_empty() {
            errors.push(ConfigError::warning(
                "llm.providers",
                "no LLM providers configured; joins fall back to a fixed greeting and turns fail",
            ));
        }
        let mut seen_ids = HashSet::new();
        for (i, provider) in self.llm.providers.iter().enumerate() {
            if provider.id.is_empty() {
                errors.push(ConfigError::error(
                    format!("llm.providers[{i}].id"),
                    "provider id must not be empty",
                ));
            } else if !seen_ids.insert(provider.id.as_str()) {
                errors.push(ConfigError::error(
                    format!("llm.providers[{i}].id"),
                    format!("duplicate provider id '{}'", provider.id),
                ));
            }
            if provider.base_url.is_empty() {
                errors.push(ConfigError::error(
                    format!("llm.providers[{i}].base_url"),
                    "provider base_url must not be empty",
                ));
            }
        }
        for (role, rc) in &self.llm.roles {
            let (provider_id, _) = rc.split();
            if !self.llm.providers.iter().any(|p| p.id == provider_id) {
                errors.push(ConfigError::error(
                    format!("llm.roles.{role}.model"),
                    format!("unknown provider '{provider_id}'"),
                ));
            }
        }

        if self.media.timeout_ms == 0 {
            errors.push(ConfigError::error("media.timeout_ms", "must be greater than 0"));
        }

        if self.conversation.chunk_chars == 0 {
            errors.push(ConfigError::error(
                "conversation.chunk_chars",
                "chunk size must be greater than 0",
            ));
        }
        if self.conversation.placeholder.trim().is_empty() {
            errors.push(ConfigError::error(
                "conversation.placeholder",
                "placeholder must not be empty",
            ));
        }
        if self.conversation.model_timeout_ms == 0 {
            errors.push(ConfigError::error(
                "conversation.model_timeout_ms",
                "must be greater than 0",
            ));
        }

        if self.insights.staleness_secs == 0 {
            errors.push(ConfigError::warning(
                "insights.staleness_secs",
                "0 disables caching; every read regenerates",
            ));
        }

        let mut seen_codes = HashSet::new();
        for (i, seed) in self.surveys.iter().enumerate() {
            let code = seed.code.trim().to_uppercase();
            if code.is_empty() {
                errors.push(ConfigError::error(format!("surveys[{i}].code"), "code must not be empty"));
            } else if !seen_codes.insert(code.clone()) {
                errors.push(ConfigError::error(
                    format!("surveys[{i}].code"),
                    format!("duplicate survey code '{code}'"),
                ));
            }
            if seed.max_messages == 0 {
                errors.push(ConfigError::error(
                    format!("surveys[{i}].max_messages"),
                    "max_messages must be at least 1",
                ));
            }
            if seed.system_prompt.trim().is_empty() {
                errors.push(ConfigError::warning(
                    format!("surveys[{i}].system_prompt"),
                    "empty system prompt",
                ));
            }
        }

        errors
    }
}
