use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Conversation turns
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Size of each `text_chunk` event, counted in chars.
    #[serde(default = "d_48")]
    pub chunk_chars: usize,
    #[serde(default = "d_1024")]
    pub max_tokens: u32,
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Upper bound on one model invocation, on top of the HTTP timeout.
    #[serde(default = "d_90000")]
    pub model_timeout_ms: u64,
    /// Assistant text committed when a turn produced only tool events.
    #[serde(default = "d_placeholder")]
    pub placeholder: String,
    /// Appended to every survey prompt.
    #[serde(default = "d_style_directive")]
    pub style_directive: String,
    /// Appended on turns where tools are offered.
    #[serde(default = "d_tool_directive")]
    pub tool_directive: String,
    /// Appended on the participant's last allowed message.
    #[serde(default = "d_final_turn_directive")]
    pub final_turn_directive: String,
    /// Synthetic user message used to generate the opening greeting.
    #[serde(default = "d_opening_cue")]
    pub opening_cue: String,
    /// Committed as the opening message when the model is unavailable.
    #[serde(default = "d_fallback_greeting")]
    pub fallback_greeting: String,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            chunk_chars: d_48(),
            max_tokens: d_1024(),
            temperature: None,
            model_timeout_ms: d_90000(),
            placeholder: d_placeholder(),
            style_directive: d_style_directive(),
            tool_directive: d_tool_directive(),
            final_turn_directive: d_final_turn_directive(),
            opening_cue: d_opening_cue(),
            fallback_greeting: d_fallback_greeting(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_48() -> usize {
    48
}
fn d_1024() -> u32 {
    1024
}
fn d_90000() -> u64 {
    90_000
}
fn d_placeholder() -> String {
    "[shared content]".into()
}
fn d_style_directive() -> String {
    "[STYLE: Be warm and conversational, not formal. \
     Keep your replies relatively short so the participant does most of the talking. \
     Often ask brief follow-ups to draw out more thoughts (e.g. 'What made you think that?', \
     'Can you say a bit more?', 'How did that feel?'). \
     Reflect back what they share and invite elaboration. \
     Your goal is to elicit genuine reflection and richer responses, not to rush through questions.]"
        .into()
}
fn d_tool_directive() -> String {
    "[TOOLS: You have tools available to enrich the conversation. \
     Use show_buttons when asking questions with clear discrete choices (e.g., frequency, ratings, yes/no). \
     Use show_image when a visual would help the participant understand or connect with the topic. \
     Use show_video sparingly, only when a video clip would significantly help. \
     You can combine text with tool calls: write your message text AND call a tool in the same turn.]"
        .into()
}
fn d_final_turn_directive() -> String {
    "[SYSTEM NOTE: This is the participant's last allowed message. \
     Do not use any tools. Thank them for their time, provide a brief summary of what you gathered, \
     and end the conversation warmly.]"
        .into()
}
fn d_opening_cue() -> String {
    "(The participant has just joined the survey. Greet them and begin.)".into()
}
fn d_fallback_greeting() -> String {
    "Hi, and thanks for joining! I'd love to hear your thoughts. \
     To start, what comes to mind when you think about this topic?"
        .into()
}
