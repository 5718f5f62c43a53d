//! Anthropic-native adapter.
//!
//! Implements the Anthropic Messages API with tool use. The directive goes
//! in the top-level `system` field and the response's `content` array is
//! mapped block-for-block, preserving the order of text and `tool_use`.

use crate::traits::{ChatRequest, ChatResponse, LlmProvider};
use crate::util::{from_reqwest, resolve_api_key};
use serde_json::Value;
use std::time::Duration;
use sv_domain::config::ProviderConfig;
use sv_domain::error::{Error, Result};
use sv_domain::tool::{ContentBlock, Message, ToolDefinition, Usage};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Constants
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-haiku-4-5-20251001";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A model adapter for the Anthropic Messages API.
pub struct AnthropicProvider {
    id: String,
    base_url: String,
    api_key: String,
    default_model: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a new provider from the deserialized provider config.
    pub fn from_config(cfg: &ProviderConfig, timeout: Duration) -> Result<Self> {
        let api_key = resolve_api_key(&cfg.auth)?;
        let default_model = cfg
            .default_model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.into());

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            id: cfg.id.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            default_model,
            client,
        })
    }

    // ── Internal helpers ───────────────────────────────────────────

    fn authed_post(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
    }

    fn build_messages_body(&self, req: &ChatRequest) -> Value {
        let model = req
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());

        let api_messages: Vec<Value> = req.messages.iter().map(msg_to_anthropic).collect();

        let mut body = serde_json::json!({
            "model": model,
            "messages": api_messages,
        });

        if !req.directive.is_empty() {
            body["system"] = Value::String(req.directive.clone());
        }

        if !req.tools.is_empty() {
            let tools: Vec<Value> = req.tools.iter().map(tool_to_anthropic).collect();
            body["tools"] = Value::Array(tools);
        }

        if let Some(temp) = req.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        let max_tokens = req.max_tokens.unwrap_or(4096);
        body["max_tokens"] = serde_json::json!(max_tokens);

        body
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message serialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn msg_to_anthropic(msg: &Message) -> Value {
    serde_json::json!({
        "role": msg.role.as_str(),
        "content": msg.content,
    })
}

fn tool_to_anthropic(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "name": tool.name,
        "description": tool.description,
        "input_schema": tool.parameters,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response deserialization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_anthropic_response(provider: &str, body: &Value) -> Result<ChatResponse> {
    let content_arr = body
        .get("content")
        .and_then(|v| v.as_array())
        .ok_or_else(|| Error::Provider {
            provider: provider.to_string(),
            message: "response has no content array".into(),
        })?;

    let mut blocks = Vec::with_capacity(content_arr.len());
    for block in content_arr {
        let block_type = block.get("type").and_then(|v| v.as_str()).unwrap_or("");
        match block_type {
            "text" => {
                if let Some(t) = block.get("text").and_then(|v| v.as_str()) {
                    if !t.is_empty() {
                        blocks.push(ContentBlock::text(t));
                    }
                }
            }
            "tool_use" => {
                let call_id = block.get("id").and_then(|v| v.as_str()).unwrap_or("");
                let name = block.get("name").and_then(|v| v.as_str()).unwrap_or("");
                let arguments = block
                    .get("input")
                    .cloned()
                    .unwrap_or(Value::Object(Default::default()));
                blocks.push(ContentBlock::tool_call(call_id, name, arguments));
            }
            _ => {}
        }
    }

    let model = body
        .get("model")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();

    let finish_reason = body
        .get("stop_reason")
        .and_then(|v| v.as_str())
        .map(|s| match s {
            "end_turn" => "stop".to_string(),
            "tool_use" => "tool_calls".to_string(),
            other => other.to_string(),
        });

    let usage = body.get("usage").and_then(parse_anthropic_usage);

    Ok(ChatResponse {
        blocks,
        usage,
        model,
        finish_reason,
    })
}

fn parse_anthropic_usage(v: &Value) -> Option<Usage> {
    let input = v.get("input_tokens")?.as_u64()? as u32;
    let output = v.get("output_tokens")?.as_u64()? as u32;
    Some(Usage {
        prompt_tokens: input,
        completion_tokens: output,
        total_tokens: input + output,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmProvider for AnthropicProvider {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_messages_body(&req);

        tracing::debug!(provider = %self.id, url = %url, tools = req.tools.len(), "anthropic request");

        let resp = self
            .authed_post(&url)
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        let resp_text = resp.text().await.map_err(from_reqwest)?;

        if !status.is_success() {
            return Err(Error::Provider {
                provider: self.id.clone(),
                message: format!("HTTP {} - {}", status.as_u16(), resp_text),
            });
        }

        let resp_json: Value = serde_json::from_str(&resp_text)?;
        parse_anthropic_response(&self.id, &resp_json)
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use sv_domain::config::{AuthConfig, ProviderKind};

    fn provider() -> AnthropicProvider {
        let cfg = ProviderConfig {
            id: "anthropic".into(),
            kind: ProviderKind::Anthropic,
            base_url: "https://api.anthropic.com/".into(),
            auth: AuthConfig {
                key: Some("sk-test".into()),
                ..Default::default()
            },
            default_model: None,
        };
        AnthropicProvider::from_config(&cfg, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn body_puts_directive_in_system_and_maps_tools() {
        let p = provider();
        let req = ChatRequest {
            directive: "Be kind.".into(),
            messages: vec![Message::assistant("Hi!"), Message::user("Hello")],
            tools: vec![ToolDefinition {
                name: "show_image".into(),
                description: "Show an image".into(),
                parameters: serde_json::json!({"type": "object"}),
            }],
            max_tokens: Some(1024),
            ..Default::default()
        };
        let body = p.build_messages_body(&req);
        assert_eq!(body["system"], "Be kind.");
        assert_eq!(body["model"], DEFAULT_MODEL);
        assert_eq!(body["max_tokens"], 1024);
        assert_eq!(body["messages"][0]["role"], "assistant");
        assert_eq!(body["messages"][1]["content"], "Hello");
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn body_omits_tools_when_none_offered() {
        let body = provider().build_messages_body(&ChatRequest::default());
        assert!(body.get("tools").is_none());
        assert!(body.get("system").is_none());
        assert_eq!(body["max_tokens"], 4096);
    }

    #[test]
    fn response_blocks_keep_emission_order() {
        let body = serde_json::json!({
            "model": "claude-x",
            "stop_reason": "tool_use",
            "content": [
                {"type": "text", "text": "Look at this."},
                {"type": "tool_use", "id": "tu_1", "name": "show_image", "input": {"query": "forest"}},
                {"type": "text", "text": "What do you feel?"},
                {"type": "tool_use", "id": "tu_2", "name": "show_buttons", "input": {}}
            ],
            "usage": {"input_tokens": 10, "output_tokens": 5}
        });
        let resp = parse_anthropic_response("anthropic", &body).unwrap();
        assert_eq!(resp.blocks.len(), 4);
        assert!(matches!(&resp.blocks[0], ContentBlock::Text { text } if text == "Look at this."));
        assert!(matches!(&resp.blocks[1], ContentBlock::ToolCall { name, .. } if name == "show_image"));
        assert!(matches!(&resp.blocks[2], ContentBlock::Text { .. }));
        assert_eq!(resp.finish_reason.as_deref(), Some("tool_calls"));
        assert_eq!(resp.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn response_without_content_is_an_error() {
        let err = parse_anthropic_response("anthropic", &serde_json::json!({"type": "error"}))
            .unwrap_err();
        assert!(err.to_string().contains("no content"));
    }
}
