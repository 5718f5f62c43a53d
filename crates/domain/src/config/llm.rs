use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM provider system
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Role used for participant conversations (join greeting and turns).
pub const ROLE_CONVERSATION: &str = "conversation";
/// Role used for insights generation and the admin analysis chat.
pub const ROLE_ANALYSIS: &str = "analysis";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// HTTP timeout for a single provider request.
    #[serde(default = "d_60000u")]
    pub default_timeout_ms: u64,
    /// Model roles (`conversation`, `analysis`). A missing role falls back
    /// to the first registered provider.
    #[serde(default)]
    pub roles: HashMap<String, RoleConfig>,
    /// Registered providers. Adding a provider means adding config.
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: d_60000u(),
            roles: HashMap::new(),
            providers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleConfig {
    /// Format: "provider_id/model_name"
    pub model: String,
}

impl RoleConfig {
    /// Split `"provider/model"` into its parts. A bare id yields no model.
    pub fn split(&self) -> (&str, Option<&str>) {
        match self.model.split_once('/') {
            Some((provider, model)) if !model.is_empty() => (provider, Some(model)),
            Some((provider, _)) => (provider, None),
            None => (self.model.as_str(), None),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub kind: ProviderKind,
    pub base_url: String,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub default_model: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    OpenaiCompat,
    Anthropic,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    /// Header name (e.g. "Authorization", "x-api-key").
    #[serde(default)]
    pub header: Option<String>,
    /// Header value prefix (e.g. "Bearer ").
    #[serde(default)]
    pub prefix: Option<String>,
    /// Env var containing the key.
    #[serde(default)]
    pub env: Option<String>,
    /// Direct key (for config-only setups; prefer env).
    #[serde(default)]
    pub key: Option<String>,
}

// ── serde default helpers ───────────────────────────────────────────

fn d_60000u() -> u64 {
    60_000
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
