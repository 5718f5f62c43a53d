//! Free-form analysis chat: an admin asks questions about a survey and the
//! model answers with every conversation of that survey in its context.
//!
//! The exchange itself is kept in a separate transcript store keyed by
//! survey id, so follow-up questions see the earlier answers.

use std::time::Duration;

use sv_domain::config::ROLE_ANALYSIS;
use sv_domain::survey::{Conversation, ConversationStatus, Survey};
use sv_domain::tool::{Message, Role};
use sv_providers::ChatRequest;
use sv_sessions::TranscriptLine;

use crate::state::AppState;

use super::{survey_or_not_found, TurnError};

const ANALYST_DIRECTIVE: &str = "You are a survey data analyst. You have access to all the \
survey conversation data below. Provide insightful analysis, identify themes, summarize \
sentiment, and answer questions about the survey results. Be specific and cite participant \
responses when relevant.";

fn lock_key(survey_id: &str) -> String {
    format!("analysis:{survey_id}")
}

/// Answer one analysis question. The question and answer are only recorded
/// when the model call succeeds.
pub async fn analyze(state: &AppState, survey_id: &str, question: &str) -> Result<String, TurnError> {
    let question = question.trim();
    if question.is_empty() {
        return Err(TurnError::InvalidInput("message must not be empty".into()));
    }
    let survey = survey_or_not_found(state, survey_id)?;
    let _permit = state.session_locks.try_acquire(&lock_key(&survey.id))?;

    // ── Build context from every conversation ─────────────────────────
    let conversations = state.conversations.list_for_survey(&survey.id);
    let mut transcripts = Vec::with_capacity(conversations.len());
    for conv in &conversations {
        let prose = state.transcripts.prose_history(&conv.id).await?;
        transcripts.push((conv, prose));
    }
    let context = survey_context(&survey, &transcripts);

    let mut messages = state.analysis_transcripts.prose_history(&survey.id).await?;
    let prior_turns = (messages.len() / 2) as u32;
    messages.push(Message::user(question));

    let req = ChatRequest {
        directive: format!("{ANALYST_DIRECTIVE}\n\n{context}"),
        messages,
        tools: Vec::new(),
        temperature: None,
        max_tokens: Some(state.config.insights.analysis_max_tokens),
        model: None,
    };
    let timeout = Duration::from_millis(state.config.insights.model_timeout_ms);
    let answer = match tokio::time::timeout(timeout, state.llm.chat_for_role(ROLE_ANALYSIS, req)).await {
        Ok(Ok(resp)) => resp.text(),
        Ok(Err(e)) => return Err(TurnError::AdapterFailure(e.to_string())),
        Err(_) => return Err(TurnError::AdapterFailure("analysis timed out".into())),
    };

    let turn = prior_turns + 1;
    state
        .analysis_transcripts
        .append_async(
            &survey.id,
            &[
                TranscriptLine::prose(turn, Role::User, question),
                TranscriptLine::prose(turn, Role::Assistant, answer.clone()),
            ],
        )
        .await?;

    tracing::info!(
        survey_id = %survey.id,
        conversations = conversations.len(),
        answer_chars = answer.chars().count(),
        "analysis answered"
    );
    Ok(answer)
}

/// The recorded analysis exchange for a survey, oldest first.
pub async fn history(state: &AppState, survey_id: &str) -> Result<Vec<Message>, TurnError> {
    let survey = survey_or_not_found(state, survey_id)?;
    Ok(state.analysis_transcripts.prose_history(&survey.id).await?)
}

/// Header with participation counts, then one block per conversation that
/// has any messages.
fn survey_context(survey: &Survey, transcripts: &[(&Conversation, Vec<Message>)]) -> String {
    let completed = transcripts
        .iter()
        .filter(|(c, _)| c.status == ConversationStatus::Completed)
        .count();
    let active = transcripts.iter().filter(|(c, _)| c.is_active()).count();

    let blocks: Vec<String> = transcripts
        .iter()
        .filter(|(_, messages)| !messages.is_empty())
        .map(|(conv, messages)| {
            let short_id: String = conv.id.chars().take(8).collect();
            let duration = conv
                .duration_seconds
                .map(|s| format!("{:.1} min", s / 60.0))
                .unwrap_or_else(|| "in progress".into());
            let lines: Vec<String> = messages
                .iter()
                .map(|m| format!("  {}: {}", m.role, m.content))
                .collect();
            format!(
                "[Participant {short_id} | {} | {duration}]\n{}",
                conv.status,
                lines.join("\n")
            )
        })
        .collect();
    let body = if blocks.is_empty() {
        "No conversations yet.".to_string()
    } else {
        blocks.join("\n\n")
    };

    format!(
        "Survey: {}\nTopic: {}\nTotal participants: {}\nCompleted: {completed}\nActive: {active}\n\n\
         --- ALL CONVERSATIONS ---\n\n{body}",
        survey.title,
        survey.topic,
        transcripts.len(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sv_domain::survey::SurveyStatus;

    fn survey() -> Survey {
        Survey {
            id: "s1".into(),
            code: "ABC".into(),
            title: "Commuting".into(),
            topic: "daily travel".into(),
            system_prompt: String::new(),
            facilitator_intro: None,
            status: SurveyStatus::Active,
            max_messages: 20,
            created_at: Utc::now(),
            closed_at: None,
        }
    }

    fn conversation(id: &str, status: ConversationStatus, duration: Option<f64>) -> Conversation {
        Conversation {
            id: id.into(),
            survey_id: "s1".into(),
            session_token: format!("tok-{id}"),
            status,
            turn_count: 1,
            started_at: Utc::now(),
            completed_at: None,
            duration_seconds: duration,
        }
    }

    #[test]
    fn context_lists_conversations_with_messages() {
        let done = conversation("0123456789abcdef", ConversationStatus::Completed, Some(90.0));
        let live = conversation("fedcba9876543210", ConversationStatus::Active, None);
        let silent = conversation("aaaaaaaabbbbbbbb", ConversationStatus::Active, None);
        let transcripts = vec![
            (&done, vec![Message::assistant("Hi"), Message::user("I cycle")]),
            (&live, vec![Message::assistant("Hello")]),
            (&silent, vec![]),
        ];

        let ctx = survey_context(&survey(), &transcripts);
        assert!(ctx.starts_with(
            "Survey: Commuting\nTopic: daily travel\nTotal participants: 3\nCompleted: 1\nActive: 2\n\n--- ALL CONVERSATIONS ---\n\n"
        ));
        assert!(ctx.contains("[Participant 01234567 | completed | 1.5 min]\n  assistant: Hi\n  user: I cycle"));
        assert!(ctx.contains("[Participant fedcba98 | active | in progress]\n  assistant: Hello"));
        assert!(!ctx.contains("aaaaaaaa"));
    }

    #[test]
    fn empty_survey_context_says_so() {
        let ctx = survey_context(&survey(), &[]);
        assert!(ctx.ends_with("--- ALL CONVERSATIONS ---\n\nNo conversations yet."));
        assert!(ctx.contains("Total participants: 0"));
    }
}
