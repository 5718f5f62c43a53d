use sv_domain::error::Result;
use sv_domain::tool::{ContentBlock, Message, ToolDefinition, Usage};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / Response types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A provider-agnostic model invocation.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// System directive. Sent out-of-band from `messages`.
    pub directive: String,
    /// Ordered plain-text history, `user`/`assistant` only.
    pub messages: Vec<Message>,
    /// Tool definitions the model may invoke. Empty means no tools.
    pub tools: Vec<ToolDefinition>,
    /// Sampling temperature. `None` lets the provider choose.
    pub temperature: Option<f32>,
    /// Maximum tokens in the response. `None` lets the provider choose.
    pub max_tokens: Option<u32>,
    /// Model identifier override. When `None`, the provider uses its default.
    pub model: Option<String>,
}

/// A provider-agnostic response: content blocks in the order the model
/// emitted them.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub blocks: Vec<ContentBlock>,
    pub usage: Option<Usage>,
    /// The model that actually produced the response.
    pub model: String,
    pub finish_reason: Option<String>,
}

impl ChatResponse {
    /// Concatenation of every text block, in order.
    pub fn text(&self) -> String {
        self.blocks
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::ToolCall { .. } => None,
            })
            .collect()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core provider trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Trait that every model adapter must implement.
///
/// A failed call yields an error and no partial content.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a request and wait for the full response.
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse>;

    /// A unique identifier for this provider instance.
    fn provider_id(&self) -> &str;
}
