use serde::Serialize;

/// Structured trace events emitted across all Surveyor crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    LlmRequest {
        provider: String,
        model: String,
        role: String,
        duration_ms: u64,
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
    },
    TurnCommitted {
        conversation_id: String,
        turn: u32,
        text_chars: usize,
        side_events: usize,
        is_complete: bool,
    },
    TurnFailed {
        conversation_id: String,
        reason: String,
    },
    ToolDropped {
        conversation_id: String,
        tool: String,
        reason: String,
    },
    MediaLookup {
        kind: String,
        provider: String,
        found: bool,
        timed_out: bool,
        duration_ms: u64,
    },
    InsightsGenerated {
        survey_id: String,
        conversation_count: usize,
        parse_error: bool,
        cached: bool,
    },
    ConversationCompleted {
        conversation_id: String,
        survey_id: String,
        turn_count: u32,
        duration_seconds: Option<f64>,
    },
    TranscriptAppend {
        conversation_id: String,
        lines: usize,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "sv_event");
    }
}
