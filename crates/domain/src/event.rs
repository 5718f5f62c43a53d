//! Typed events pushed to a participant during a turn.
//!
//! Every frame on the push channel is one of these, serialized as a JSON
//! object with a `type` discriminator. Side-channel events (media and
//! option sets) are also what a replay envelope stores.

use serde::{Deserialize, Serialize};

use crate::capability::MediaKind;

/// Lower and upper bound on the number of options in an option set.
pub const MIN_OPTIONS: usize = 2;
pub const MAX_OPTIONS: usize = 6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// A fixed-size slice of assistant prose.
    TextChunk { text: String },

    /// An image or video resolved by a capability provider.
    Media {
        kind: MediaKind,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attribution: Option<String>,
    },

    /// Selectable options offered instead of free text.
    OptionSet {
        question: String,
        options: Vec<ChoiceOption>,
        #[serde(default)]
        allow_multiple: bool,
    },

    /// Terminal event of a successful turn.
    TurnComplete { is_complete: bool },

    /// Terminal event of a failed turn. `code` is the same short code the
    /// HTTP error bodies carry (`adapter_failure`, `storage`, ...).
    TurnError {
        message: String,
        #[serde(default)]
        code: String,
    },

    /// A frame type this build does not know. Readers skip it.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub label: String,
    pub value: String,
}

impl ChatEvent {
    /// The `type` discriminator, also used as the SSE event name.
    pub fn event_type(&self) -> &'static str {
        match self {
            ChatEvent::TextChunk { .. } => "text_chunk",
            ChatEvent::Media { .. } => "media",
            ChatEvent::OptionSet { .. } => "option_set",
            ChatEvent::TurnComplete { .. } => "turn_complete",
            ChatEvent::TurnError { .. } => "turn_error",
            ChatEvent::Unknown => "unknown",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ChatEvent::TurnComplete { .. } | ChatEvent::TurnError { .. })
    }

    /// Events produced by tool calls; these are the ones kept for replay.
    pub fn is_side_channel(&self) -> bool {
        matches!(self, ChatEvent::Media { .. } | ChatEvent::OptionSet { .. })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
