//! Role-based model routing.
//!
//! Callers ask for a role (`conversation`, `analysis`); the router picks the
//! provider and model bound to it and records each call as a trace event.

use crate::registry::ProviderRegistry;
use crate::traits::{ChatRequest, ChatResponse, LlmProvider};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use sv_domain::config::{LlmConfig, RoleConfig};
use sv_domain::error::{Error, Result};
use sv_domain::trace::TraceEvent;
use tracing::Instrument;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Router
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct LlmRouter {
    registry: ProviderRegistry,
    roles: HashMap<String, RoleConfig>,
}

impl LlmRouter {
    /// Construct the router from the full LLM config.
    pub fn from_config(llm_config: &LlmConfig) -> Self {
        Self {
            registry: ProviderRegistry::from_config(llm_config),
            roles: llm_config.roles.clone(),
        }
    }

    /// Build from an already-constructed registry.
    pub fn new(registry: ProviderRegistry, roles: HashMap<String, RoleConfig>) -> Self {
        Self { registry, roles }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Resolve the provider and model override for a role.
    ///
    /// An unconfigured role falls back to the first registered provider
    /// with its default model.
    pub fn resolve(&self, role: &str) -> Option<(Arc<dyn LlmProvider>, Option<String>)> {
        match self.roles.get(role) {
            Some(rc) => {
                let (provider_id, model) = rc.split();
                let provider = self.registry.get(provider_id)?;
                Some((provider, model.map(str::to_string)))
            }
            None => self.registry.first().map(|p| (p, None)),
        }
    }

    /// Send a request for the given role.
    ///
    /// A model already set on the request wins over the role binding.
    pub async fn chat_for_role(&self, role: &str, mut req: ChatRequest) -> Result<ChatResponse> {
        let (provider, role_model) = self
            .resolve(role)
            .ok_or_else(|| Error::Config(format!("no LLM provider available for role '{role}'")))?;
        if req.model.is_none() {
            req.model = role_model;
        }

        let provider_id = provider.provider_id().to_string();
        let requested_model = req.model.clone().unwrap_or_else(|| "default".into());
        let span = tracing::info_span!(
            "llm.call",
            provider = %provider_id,
            model = %requested_model,
            role = %role,
        );

        let start = Instant::now();
        let result = provider.chat(req).instrument(span).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let (model, usage) = match &result {
            Ok(resp) => (resp.model.clone(), resp.usage.clone()),
            Err(e) => {
                tracing::warn!(provider = %provider_id, role = %role, error = %e, "model call failed");
                (requested_model, None)
            }
        };
        TraceEvent::LlmRequest {
            provider: provider_id,
            model,
            role: role.to_string(),
            duration_ms,
            prompt_tokens: usage.as_ref().map(|u| u.prompt_tokens),
            completion_tokens: usage.as_ref().map(|u| u.completion_tokens),
        }
        .emit();

        result
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
