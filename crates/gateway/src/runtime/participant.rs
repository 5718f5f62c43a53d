//! Participant lifecycle outside of turns: joining a survey, ending a
//! conversation early, and reading back a transcript for replay.

use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use sv_domain::config::ROLE_CONVERSATION;
use sv_domain::survey::{ConversationStatus, Survey};
use sv_domain::tool::{Message, Role};
use sv_providers::ChatRequest;
use sv_sessions::TranscriptLine;

use crate::state::AppState;

use super::{join_sections, TurnError};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Join
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize)]
pub struct JoinOutcome {
    pub session_token: String,
    pub survey_title: String,
    pub opening_message: String,
}

/// Create a conversation for `survey_code` and commit its greeting.
///
/// The greeting comes from one tool-less model call answering a synthetic
/// cue that is not stored. If that call fails the configured fallback
/// greeting is committed instead; the participant can still proceed.
pub async fn join(state: &AppState, survey_code: &str) -> Result<JoinOutcome, TurnError> {
    let survey = state
        .surveys
        .get_by_code(survey_code)
        .ok_or_else(|| TurnError::NotFound("survey code".into()))?;
    if !survey.accepts_submissions() {
        return Err(TurnError::StateConflict(
            "this survey is not currently active".into(),
        ));
    }

    let conv = state.conversations.create(&survey.id)?;
    tracing::info!(
        conversation_id = %conv.id,
        survey_id = %survey.id,
        "participant joined"
    );

    let cfg = &state.config.conversation;
    let req = ChatRequest {
        directive: opening_directive(&survey, &cfg.style_directive),
        messages: vec![Message::user(cfg.opening_cue.clone())],
        tools: Vec::new(),
        temperature: cfg.temperature,
        max_tokens: Some(cfg.max_tokens),
        model: None,
    };
    let timeout = Duration::from_millis(cfg.model_timeout_ms);
    let opening = match tokio::time::timeout(timeout, state.llm.chat_for_role(ROLE_CONVERSATION, req)).await {
        Ok(Ok(resp)) => {
            let text = resp.text();
            let text = text.trim();
            if text.is_empty() {
                cfg.fallback_greeting.clone()
            } else {
                text.to_owned()
            }
        }
        Ok(Err(e)) => {
            tracing::warn!(conversation_id = %conv.id, error = %e, "opening message failed, using fallback");
            cfg.fallback_greeting.clone()
        }
        Err(_) => {
            tracing::warn!(conversation_id = %conv.id, "opening message timed out, using fallback");
            cfg.fallback_greeting.clone()
        }
    };

    state
        .transcripts
        .append_async(&conv.id, &[TranscriptLine::prose(0, Role::Assistant, opening.clone())])
        .await?;

    Ok(JoinOutcome {
        session_token: conv.session_token,
        survey_title: survey.title,
        opening_message: opening,
    })
}

/// Survey prompt, then the facilitator introduction if one is set, then the
/// conversational style.
pub fn opening_directive(survey: &Survey, style: &str) -> String {
    let intro = survey
        .facilitator_intro
        .as_deref()
        .map(str::trim)
        .filter(|i| !i.is_empty())
        .map(|i| {
            format!(
                "[When you first greet the participant, use this introduction (say it naturally):\n{i}\n]"
            )
        })
        .unwrap_or_default();
    join_sections([survey.system_prompt.as_str(), intro.as_str(), style])
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Manual completion
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// End a conversation at the participant's request. A conversation that
/// already ended is left as it is.
pub fn complete(state: &AppState, session_token: &str) -> Result<ConversationStatus, TurnError> {
    let conv = state
        .conversations
        .get_by_token(session_token)
        .ok_or_else(|| TurnError::NotFound("session".into()))?;
    let _permit = state.session_locks.try_acquire(&conv.id)?;

    let (conv, changed) = state
        .conversations
        .finish(&conv.id, ConversationStatus::Completed, Utc::now())?;
    if changed {
        tracing::info!(
            conversation_id = %conv.id,
            duration_seconds = ?conv.duration_seconds,
            "conversation completed by participant"
        );
    }
    Ok(conv.status)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Replay
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize)]
pub struct TranscriptView {
    pub status: ConversationStatus,
    pub is_complete: bool,
    /// Prose and replay lines alike, in commit order.
    pub records: Vec<TranscriptLine>,
}

pub async fn transcript(state: &AppState, session_token: &str) -> Result<TranscriptView, TurnError> {
    let conv = state
        .conversations
        .get_by_token(session_token)
        .ok_or_else(|| TurnError::NotFound("session".into()))?;
    let records = state.transcripts.read_async(&conv.id).await?;
    Ok(TranscriptView {
        status: conv.status,
        is_complete: !conv.is_active(),
        records,
    })
}
