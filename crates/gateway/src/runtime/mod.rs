//! Core runtime: the conversation turn orchestrator, the tool processor it
//! drains model output through, the insights cache, and the admin-side
//! operations that read the same transcripts.
//!
//! Entry point for participants: [`participant::join`] creates a
//! conversation, then [`turn::start_turn`] runs one turn and returns a
//! channel of [`ChatEvent`](sv_domain::event::ChatEvent)s suitable for SSE
//! or non-streaming aggregation.

pub mod admin;
pub mod analysis;
pub mod insights;
pub mod participant;
pub mod session_lock;
pub mod tools;
pub mod turn;

pub use turn::{start_turn, TurnInput};

use sv_domain::survey::Survey;

use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Errors that reach callers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Failures surfaced to a caller. Degraded media lookups, malformed tool
/// calls, and unparseable insight payloads are not here: they are absorbed
/// where they happen.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    /// The conversation or its survey does not accept this request.
    #[error("{0}")]
    StateConflict(String),

    /// Another turn holds the conversation.
    #[error("a turn is already in progress for this conversation")]
    Busy,

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    InvalidInput(String),

    /// The model call failed or timed out. Nothing was committed.
    #[error("model call failed: {0}")]
    AdapterFailure(String),

    /// Persisting state failed.
    #[error("storage: {0}")]
    Storage(#[from] sv_domain::error::Error),
}

impl From<session_lock::SessionBusy> for TurnError {
    fn from(_: session_lock::SessionBusy) -> Self {
        TurnError::Busy
    }
}

impl TurnError {
    /// Short machine-readable code for API bodies and trace events.
    pub fn code(&self) -> &'static str {
        match self {
            TurnError::StateConflict(_) => "state_conflict",
            TurnError::Busy => "busy",
            TurnError::NotFound(_) => "not_found",
            TurnError::InvalidInput(_) => "invalid_input",
            TurnError::AdapterFailure(_) => "adapter_failure",
            TurnError::Storage(_) => "storage",
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Shared helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn survey_or_not_found(state: &AppState, survey_id: &str) -> Result<Survey, TurnError> {
    state
        .surveys
        .get(survey_id)
        .ok_or_else(|| TurnError::NotFound(format!("survey {survey_id}")))
}

/// Join directive sections with a blank line, skipping empty ones.
fn join_sections<'a>(sections: impl IntoIterator<Item = &'a str>) -> String {
    sections
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Truncate to at most `max` characters, on a char boundary.
pub(crate) fn truncate_str(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_owned(),
    }
}
