//! Provider registry.
//!
//! Constructs and holds all configured model provider instances. At startup
//! the registry reads the [`LlmConfig`], resolves authentication once, and
//! instantiates the adapter for each configured provider.

use crate::anthropic::AnthropicProvider;
use crate::openai_compat::OpenAiCompatProvider;
use crate::traits::LlmProvider;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use sv_domain::config::{LlmConfig, ProviderKind};
use sv_domain::error::Result;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ProviderRegistry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Holds all instantiated model providers, keyed by config id.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
}

impl ProviderRegistry {
    /// Build the registry from the application's [`LlmConfig`].
    ///
    /// Providers that fail to initialize (usually a missing key) are logged
    /// and skipped so the server can still boot.
    pub fn from_config(config: &LlmConfig) -> Self {
        let timeout = Duration::from_millis(config.default_timeout_ms);
        let mut providers: HashMap<String, Arc<dyn LlmProvider>> = HashMap::new();

        for pc in &config.providers {
            let result: Result<Arc<dyn LlmProvider>> = match pc.kind {
                ProviderKind::OpenaiCompat => OpenAiCompatProvider::from_config(pc, timeout)
                    .map(|p| Arc::new(p) as Arc<dyn LlmProvider>),
                ProviderKind::Anthropic => AnthropicProvider::from_config(pc, timeout)
                    .map(|p| Arc::new(p) as Arc<dyn LlmProvider>),
            };

            match result {
                Ok(provider) => {
                    tracing::info!(provider_id = %pc.id, kind = ?pc.kind, "registered LLM provider");
                    providers.insert(pc.id.clone(), provider);
                }
                Err(e) => {
                    tracing::warn!(
                        provider_id = %pc.id,
                        kind = ?pc.kind,
                        error = %e,
                        "failed to initialize LLM provider, skipping"
                    );
                }
            }
        }

        if providers.is_empty() {
            tracing::warn!("no LLM providers initialized; model calls will fail until auth is configured");
        }

        Self { providers }
    }

    /// Build from already-constructed providers.
    pub fn from_providers(list: impl IntoIterator<Item = Arc<dyn LlmProvider>>) -> Self {
        let providers = list
            .into_iter()
            .map(|p| (p.provider_id().to_string(), p))
            .collect();
        Self { providers }
    }

    /// Look up a provider by its config id.
    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn LlmProvider>> {
        self.providers.get(provider_id).cloned()
    }

    /// The provider with the lowest id, used when a role is not configured.
    pub fn first(&self) -> Option<Arc<dyn LlmProvider>> {
        self.providers
            .iter()
            .min_by(|a, b| a.0.cmp(b.0))
            .map(|(_, p)| p.clone())
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// List all registered provider IDs (sorted).
    pub fn list_providers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }
}
