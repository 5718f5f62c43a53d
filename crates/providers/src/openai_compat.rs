//! OpenAI-compatible adapter.
//!
//! Works with OpenAI, Ollama, vLLM, LM Studio, Together, and any other
//! endpoint that follows the chat completions contract. That contract
//! returns text and tool calls separately, so the text block is ordered
//! first and the tool calls follow in their listed order.

use crate::traits::{ChatRequest, ChatResponse, LlmProvider};
use crate::util::{from_reqwest, resolve_api_key};
use serde_json::Value;
use std::time::Duration;
use sv_domain::config::ProviderConfig;
use sv_domain::error::{Error, Result};
use sv_domain::tool::{ContentBlock, Message, ToolDefinition, Usage};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct OpenAiCompatProvider {
    id: String,
    base_url: String,
    /// `None` for keyless local endpoints.
    api_key: Option<String>,
    auth_header: String,
    auth_prefix: String,
    default_model: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new provider from the deserialized provider config.
    ///
    /// A provider with no `key` or `env` is treated as keyless (local
    /// servers); a named env var that is missing is an error.
    pub fn from_config(cfg: &ProviderConfig, timeout: Duration) -> Result<Self> {
        let api_key = if cfg.auth.key.is_none() && cfg.auth.env.is_none() {
            None
        } else {
            Some(resolve_api_key(&cfg.auth)?)
        };

        let auth_header = cfg
            .auth
            .header
            .clone()
            .unwrap_or_else(|| "Authorization".into());
        let auth_prefix = cfg.auth.prefix.clone().unwrap_or_else(|| "Bearer ".into());
        let default_model = cfg.default_model.clone().unwrap_or_else(|| "gpt-4o-mini".into());

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            id: cfg.id.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            auth_header,
            auth_prefix,
            default_model,
            client,
        })
    }

    // ── Internal: build authenticated request builder ──────────────

    fn authed_post(&self, url: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .post(url)
            .header("Content-Type", "application/json");
        match &self.api_key {
            Some(key) => builder.header(&self.auth_header, format!("{}{}", self.auth_prefix, key)),
            None => builder,
        }
    }

    // ── Internal: build the JSON body ─────────────────────────────

    fn build_chat_body(&self, req: &ChatRequest) -> Value {
        let mut messages: Vec<Value> = Vec::with_capacity(req.messages.len() + 1);
        if !req.directive.is_empty() {
            messages.push(serde_json::json!({
                "role": "system",
                "content": req.directive,
            }));
        }
        messages.extend(req.messages.iter().map(msg_to_openai));

        let model = req
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());

        let mut body = serde_json::json!({
            "model": model,
            "messages": messages,
            "stream": false,
        });

        if !req.tools.is_empty() {
            let tools: Vec<Value> = req.tools.iter().map(tool_to_openai).collect();
            body["tools"] = Value::Array(tools);
        }
        if let Some(temp) = req.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        if let Some(max) = req.max_tokens {
            body["max_tokens"] = serde_json::json!(max);
        }
        body
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message serialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn msg_to_openai(msg: &Message) -> Value {
    serde_json::json!({
        "role": msg.role.as_str(),
        "content": msg.content,
    })
}

fn tool_to_openai(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response deserialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_chat_response(provider: &str, body: &Value) -> Result<ChatResponse> {
    let choice = body
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
        .ok_or_else(|| Error::Provider {
            provider: provider.to_string(),
            message: "no choices in response".into(),
        })?;

    let message = choice.get("message").ok_or_else(|| Error::Provider {
        provider: provider.to_string(),
        message: "no message in choice".into(),
    })?;

    let mut blocks = Vec::new();
    if let Some(content) = message.get("content").and_then(|v| v.as_str()) {
        if !content.is_empty() {
            blocks.push(ContentBlock::text(content));
        }
    }
    blocks.extend(parse_openai_tool_calls(message));

    let finish_reason = choice
        .get("finish_reason")
        .and_then(|v| v.as_str())
        .map(String::from);

    let model = body
        .get("model")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();

    let usage = body.get("usage").and_then(parse_openai_usage);

    Ok(ChatResponse {
        blocks,
        usage,
        model,
        finish_reason,
    })
}

/// Tool-call arguments arrive as a JSON string. An unparseable string is
/// passed through as a string value so the tool processor can reject it.
fn parse_openai_tool_calls(message: &Value) -> Vec<ContentBlock> {
    let arr = match message.get("tool_calls").and_then(|v| v.as_array()) {
        Some(a) => a,
        None => return Vec::new(),
    };
    arr.iter()
        .filter_map(|tc| {
            let call_id = tc.get("id").and_then(|v| v.as_str()).unwrap_or("");
            let func = tc.get("function")?;
            let name = func.get("name")?.as_str()?;
            let args_str = func.get("arguments").and_then(|v| v.as_str()).unwrap_or("{}");
            let arguments: Value = serde_json::from_str(args_str)
                .unwrap_or_else(|_| Value::String(args_str.to_string()));
            Some(ContentBlock::tool_call(call_id, name, arguments))
        })
        .collect()
}

fn parse_openai_usage(v: &Value) -> Option<Usage> {
    Some(Usage {
        prompt_tokens: v.get("prompt_tokens")?.as_u64()? as u32,
        completion_tokens: v.get("completion_tokens")?.as_u64()? as u32,
        total_tokens: v.get("total_tokens")?.as_u64()? as u32,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_chat_body(&req);

        tracing::debug!(provider = %self.id, url = %url, tools = req.tools.len(), "openai_compat request");

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
        parse_chat_response(&self.id, &resp_json)
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

    fn keyless() -> OpenAiCompatProvider {
        let cfg = ProviderConfig {
            id: "local".into(),
            kind: ProviderKind::OpenaiCompat,
            base_url: "http://localhost:11434/v1".into(),
            auth: AuthConfig::default(),
            default_model: Some("llama3".into()),
        };
        OpenAiCompatProvider::from_config(&cfg, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn keyless_provider_builds() {
        assert!(keyless().api_key.is_none());
    }

    #[test]
    fn missing_env_key_is_an_error() {
        let cfg = ProviderConfig {
            id: "openai".into(),
            kind: ProviderKind::OpenaiCompat,
            base_url: "https://api.openai.com/v1".into(),
            auth: AuthConfig {
                env: Some("SV_TEST_OPENAI_KEY_UNSET_4242".into()),
                ..Default::default()
            },
            default_model: None,
        };
        assert!(OpenAiCompatProvider::from_config(&cfg, Duration::from_secs(5)).is_err());
    }

    #[test]
    fn directive_becomes_leading_system_message() {
        let req = ChatRequest {
            directive: "Be brief.".into(),
            messages: vec![Message::user("hi")],
            ..Default::default()
        };
        let body = keyless().build_chat_body(&req);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["model"], "llama3");
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn text_precedes_tool_calls() {
        let body = serde_json::json!({
            "model": "gpt-x",
            "choices": [{
                "finish_reason": "tool_calls",
                "message": {
                    "content": "Pick one:",
                    "tool_calls": [
                        {"id": "c1", "type": "function", "function": {"name": "show_buttons", "arguments": "{\"question\":\"Q\"}"}},
                        {"id": "c2", "type": "function", "function": {"name": "show_image", "arguments": "not json"}}
                    ]
                }
            }]
        });
        let resp = parse_chat_response("local", &body).unwrap();
        assert_eq!(resp.blocks.len(), 3);
        assert!(matches!(&resp.blocks[0], ContentBlock::Text { text } if text == "Pick one:"));
        match &resp.blocks[1] {
            ContentBlock::ToolCall { arguments, .. } => assert_eq!(arguments["question"], "Q"),
            other => panic!("unexpected block: {other:?}"),
        }
        match &resp.blocks[2] {
            ContentBlock::ToolCall { arguments, .. } => assert!(arguments.is_string()),
            other => panic!("unexpected block: {other:?}"),
        }
    }

    #[test]
    fn empty_choices_is_an_error() {
        assert!(parse_chat_response("local", &serde_json::json!({"choices": []})).is_err());
    }
}
