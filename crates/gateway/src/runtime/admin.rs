//! Admin-side survey operations: listing, per-survey results, and the
//! close/reopen lifecycle.

use chrono::{DateTime, Utc};
use serde::Serialize;

use sv_domain::survey::{ConversationStatus, Survey, SurveyStatus};
use sv_domain::tool::Message;

use crate::state::AppState;

use super::{survey_or_not_found, TurnError};

#[derive(Debug, Clone, Serialize)]
pub struct SurveySummary {
    #[serde(flatten)]
    pub survey: Survey,
    pub participant_count: usize,
}

/// All surveys, newest first, with how many conversations each has.
pub fn list_surveys(state: &AppState) -> Vec<SurveySummary> {
    state
        .surveys
        .list()
        .into_iter()
        .map(|survey| {
            let participant_count = state.conversations.list_for_survey(&survey.id).len();
            SurveySummary {
                survey,
                participant_count,
            }
        })
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Results
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultStats {
    pub total_participants: usize,
    pub active_participants: usize,
    pub completed_participants: usize,
    /// Mean over conversations that have a duration, one decimal place.
    pub avg_completion_seconds: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParticipantResult {
    pub id: String,
    pub status: ConversationStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
    pub message_count: usize,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SurveyResults {
    pub survey: Survey,
    pub stats: ResultStats,
    /// Oldest first.
    pub participants: Vec<ParticipantResult>,
}

pub async fn survey_results(state: &AppState, survey_id: &str) -> Result<SurveyResults, TurnError> {
    let survey = survey_or_not_found(state, survey_id)?;

    let mut participants = Vec::new();
    for conv in state.conversations.list_for_survey(&survey.id) {
        let messages = state.transcripts.prose_history(&conv.id).await?;
        participants.push(ParticipantResult {
            id: conv.id,
            status: conv.status,
            started_at: conv.started_at,
            completed_at: conv.completed_at,
            duration_seconds: conv.duration_seconds,
            message_count: messages.len(),
            messages,
        });
    }

    Ok(SurveyResults {
        stats: stats(&participants),
        survey,
        participants,
    })
}

fn stats(participants: &[ParticipantResult]) -> ResultStats {
    let durations: Vec<f64> = participants.iter().filter_map(|p| p.duration_seconds).collect();
    let avg = if durations.is_empty() {
        0.0
    } else {
        let mean = durations.iter().sum::<f64>() / durations.len() as f64;
        (mean * 10.0).round() / 10.0
    };
    ResultStats {
        total_participants: participants.len(),
        active_participants: participants
            .iter()
            .filter(|p| p.status == ConversationStatus::Active)
            .count(),
        completed_participants: participants
            .iter()
            .filter(|p| p.status == ConversationStatus::Completed)
            .count(),
        avg_completion_seconds: avg,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Lifecycle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize)]
pub struct CloseOutcome {
    pub survey: Survey,
    pub abandoned: usize,
}

/// Close a survey to new joins and turns. Conversations still active are
/// marked abandoned.
pub fn close_survey(state: &AppState, survey_id: &str) -> Result<CloseOutcome, TurnError> {
    survey_or_not_found(state, survey_id)?;
    let now = Utc::now();
    let survey = state.surveys.set_status(survey_id, SurveyStatus::Closed, now)?;
    let abandoned = state.conversations.abandon_active(survey_id, now)?;
    tracing::info!(survey_id = %survey.id, abandoned, "survey closed");
    Ok(CloseOutcome { survey, abandoned })
}

/// Accept participants again. Abandoned conversations stay abandoned.
pub fn reopen_survey(state: &AppState, survey_id: &str) -> Result<Survey, TurnError> {
    survey_or_not_found(state, survey_id)?;
    let survey = state
        .surveys
        .set_status(survey_id, SurveyStatus::Active, Utc::now())?;
    tracing::info!(survey_id = %survey.id, "survey reopened");
    Ok(survey)
}
