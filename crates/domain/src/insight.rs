//! Aggregate analysis of a survey's conversations.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentCounts {
    #[serde(default)]
    pub positive: u32,
    #[serde(default)]
    pub neutral: u32,
    #[serde(default)]
    pub negative: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeCount {
    pub theme: String,
    #[serde(default)]
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantInsight {
    pub conversation_id: String,
    pub sentiment: Sentiment,
    /// 1 (disengaged) to 10 (highly engaged).
    pub engagement: u8,
    #[serde(default)]
    pub themes: Vec<String>,
}

/// The structured result of one insights generation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsightPayload {
    pub sentiment: SentimentCounts,
    /// Ranked, most frequent first.
    pub themes: Vec<ThemeCount>,
    pub participants: Vec<ParticipantInsight>,
    /// Set when the model's reply could not be parsed; aggregates are zero.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub parse_error: bool,
}

impl InsightPayload {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn parse_failure() -> Self {
        Self {
            parse_error: true,
            ..Self::default()
        }
    }
}

/// The single live snapshot for a survey.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightSnapshot {
    pub survey_id: String,
    pub payload: InsightPayload,
    pub generated_at: DateTime<Utc>,
}

impl InsightSnapshot {
    pub fn is_fresh(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now.signed_duration_since(self.generated_at) < window
    }
}
