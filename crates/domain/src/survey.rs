//! Surveys (conversation groups) and the participant conversations in them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_MESSAGES: u32 = 20;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Survey
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurveyStatus {
    Draft,
    Active,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Survey {
    pub id: String,
    /// Join code, stored upper-case.
    pub code: String,
    pub title: String,
    pub topic: String,
    pub system_prompt: String,
    #[serde(default)]
    pub facilitator_intro: Option<String>,
    pub status: SurveyStatus,
    #[serde(default = "d_max_messages")]
    pub max_messages: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
}

impl Survey {
    pub fn accepts_submissions(&self) -> bool {
        self.status == SurveyStatus::Active
    }

    /// Normalize a participant-supplied code for lookup.
    pub fn normalize_code(code: &str) -> String {
        code.trim().to_uppercase()
    }
}

fn d_max_messages() -> u32 {
    DEFAULT_MAX_MESSAGES
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Conversation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Active,
    Completed,
    Abandoned,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStatus::Active => "active",
            ConversationStatus::Completed => "completed",
            ConversationStatus::Abandoned => "abandoned",
        }
    }
}

impl std::fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One participant's session within a survey.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub survey_id: String,
    /// Bearer credential handed to the participant at join time.
    pub session_token: String,
    pub status: ConversationStatus,
    /// Number of committed participant turns.
    #[serde(default)]
    pub turn_count: u32,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_seconds: Option<f64>,
}

impl Conversation {
    pub fn is_active(&self) -> bool {
        self.status == ConversationStatus::Active
    }

    /// Move out of `active`, stamping the end time and elapsed duration.
    /// A conversation that already ended is left untouched.
    pub fn finish(&mut self, status: ConversationStatus, now: DateTime<Utc>) -> bool {
        if !self.is_active() || status == ConversationStatus::Active {
            return false;
        }
        self.status = status;
        self.completed_at = Some(now);
        let elapsed = now.signed_duration_since(self.started_at);
        self.duration_seconds = Some(elapsed.num_milliseconds().max(0) as f64 / 1000.0);
        true
    }
}
