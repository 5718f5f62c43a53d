//! Insights cache: one aggregate analysis per survey, regenerated when it
//! goes stale or on request.
//!
//! The model is asked for a fixed JSON shape. Its reply goes through an
//! explicit parse step: fences are stripped, fields are repaired where a
//! sensible repair exists, and anything that still does not parse becomes a
//! zeroed snapshot carrying a parse-failure marker. A survey therefore
//! always has something to serve once it has been analysed.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sv_domain::config::ROLE_ANALYSIS;
use sv_domain::insight::{
    InsightPayload, InsightSnapshot, ParticipantInsight, Sentiment, SentimentCounts, ThemeCount,
};
use sv_domain::tool::Message;
use sv_domain::trace::TraceEvent;
use sv_providers::ChatRequest;

use crate::state::AppState;

use super::{survey_or_not_found, TurnError};

const INSIGHTS_DIRECTIVE: &str = "You are a survey data analyst. You will receive every \
conversation from one survey, each introduced by its conversation id. Reply with a single JSON \
object and nothing else, using exactly this shape:\n\
{\"sentiment\": {\"positive\": 0, \"neutral\": 0, \"negative\": 0}, \
\"themes\": [{\"theme\": \"short label\", \"count\": 0}], \
\"participants\": [{\"conversation_id\": \"id\", \"sentiment\": \"positive|neutral|negative\", \
\"engagement\": 1, \"themes\": [\"short label\"]}]}\n\
sentiment counts conversations by overall tone. themes are ranked by how many conversations \
raise them. engagement is an integer from 1 (disengaged) to 10 (highly engaged). Include one \
participants entry per conversation.";

/// Engagement assumed when the model omits it.
const DEFAULT_ENGAGEMENT: u8 = 5;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Retrieval
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightsView {
    pub snapshot: InsightPayload,
    pub generated_at: DateTime<Utc>,
    pub was_cached: bool,
}

impl InsightsView {
    fn cached(snapshot: InsightSnapshot) -> Self {
        Self {
            snapshot: snapshot.payload,
            generated_at: snapshot.generated_at,
            was_cached: true,
        }
    }
}

/// Serve the survey's snapshot, regenerating it when stale or forced.
///
/// Regenerations are not coordinated: two concurrent ones both call the
/// model and whichever stores last wins.
pub async fn get(state: &AppState, survey_id: &str, force_refresh: bool) -> Result<InsightsView, TurnError> {
    let survey = survey_or_not_found(state, survey_id)?;
    let window = chrono::Duration::seconds(state.config.insights.staleness_secs as i64);
    let existing = state.insights.get(&survey.id);

    if !force_refresh {
        if let Some(snap) = existing.as_ref().filter(|s| s.is_fresh(Utc::now(), window)) {
            TraceEvent::InsightsGenerated {
                survey_id: survey.id.clone(),
                conversation_count: snap.payload.participants.len(),
                parse_error: snap.payload.parse_error,
                cached: true,
            }
            .emit();
            return Ok(InsightsView::cached(snap.clone()));
        }
    }

    // ── Gather prose per conversation ─────────────────────────────────
    let mut corpus = Vec::new();
    for conv in state.conversations.list_for_survey(&survey.id) {
        let prose = state.transcripts.prose_history(&conv.id).await?;
        if !prose.is_empty() {
            corpus.push((conv.id, prose));
        }
    }

    if corpus.is_empty() {
        tracing::debug!(survey_id = %survey.id, "no conversations to analyse");
        return Ok(InsightsView {
            snapshot: InsightPayload::zero(),
            generated_at: Utc::now(),
            was_cached: false,
        });
    }

    // ── Ask the model ─────────────────────────────────────────────────
    let req = ChatRequest {
        directive: INSIGHTS_DIRECTIVE.to_owned(),
        messages: vec![Message::user(render_corpus(&corpus))],
        tools: Vec::new(),
        temperature: Some(0.0),
        max_tokens: Some(state.config.insights.max_tokens),
        model: None,
    };
    let timeout = Duration::from_millis(state.config.insights.model_timeout_ms);
    let reply = match tokio::time::timeout(timeout, state.llm.chat_for_role(ROLE_ANALYSIS, req)).await {
        Ok(Ok(resp)) => resp.text(),
        Ok(Err(e)) => return serve_stale(existing, TurnError::AdapterFailure(e.to_string())),
        Err(_) => {
            return serve_stale(
                existing,
                TurnError::AdapterFailure("insights generation timed out".into()),
            )
        }
    };

    // ── Parse, repair, store ──────────────────────────────────────────
    let known: HashSet<&str> = corpus.iter().map(|(id, _)| id.as_str()).collect();
    let payload = match parse_payload(&reply, &known) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(survey_id = %survey.id, error = %e, "insights reply did not parse");
            InsightPayload::parse_failure()
        }
    };

    let snapshot = InsightSnapshot {
        survey_id: survey.id.clone(),
        payload,
        generated_at: Utc::now(),
    };
    state.insights.upsert(snapshot.clone())?;

    TraceEvent::InsightsGenerated {
        survey_id: survey.id.clone(),
        conversation_count: corpus.len(),
        parse_error: snapshot.payload.parse_error,
        cached: false,
    }
    .emit();

    Ok(InsightsView {
        snapshot: snapshot.payload,
        generated_at: snapshot.generated_at,
        was_cached: false,
    })
}

fn serve_stale(existing: Option<InsightSnapshot>, err: TurnError) -> Result<InsightsView, TurnError> {
    match existing {
        Some(snap) => {
            tracing::warn!(survey_id = %snap.survey_id, error = %err, "regeneration failed, serving previous snapshot");
            Ok(InsightsView::cached(snap))
        }
        None => Err(err),
    }
}

fn render_corpus(corpus: &[(String, Vec<Message>)]) -> String {
    corpus
        .iter()
        .map(|(id, messages)| {
            let lines: Vec<String> = messages
                .iter()
                .map(|m| format!("  {}: {}", m.role, m.content))
                .collect();
            format!("[Conversation {id}]\n{}", lines.join("\n"))
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Remove a surrounding markdown code fence, if there is one.
pub fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.rsplit_once("```").map(|(content, _)| content))
        .unwrap_or(trimmed)
        .trim()
}

/// Locate the JSON object in a reply: a leading fence is stripped first,
/// otherwise the text from the first `{` to the last `}` is taken. Prose
/// around the object and unterminated fences are tolerated.
pub fn extract_json_object(reply: &str) -> &str {
    let unfenced = strip_code_fence(reply);
    if unfenced.starts_with('{') && unfenced.ends_with('}') {
        return unfenced;
    }
    match (unfenced.find('{'), unfenced.rfind('}')) {
        (Some(start), Some(end)) if start < end => &unfenced[start..=end],
        _ => unfenced,
    }
}

#[derive(Deserialize)]
struct RawPayload {
    #[serde(default)]
    sentiment: Option<SentimentCounts>,
    #[serde(default)]
    themes: Vec<RawTheme>,
    #[serde(default)]
    participants: Vec<RawParticipant>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTheme {
    Counted {
        theme: String,
        #[serde(default)]
        count: Option<u32>,
    },
    Bare(String),
}

#[derive(Deserialize)]
struct RawParticipant {
    conversation_id: String,
    #[serde(default)]
    sentiment: Option<String>,
    #[serde(default)]
    engagement: Option<f64>,
    #[serde(default)]
    themes: Vec<String>,
}

fn parse_sentiment(raw: Option<&str>) -> Sentiment {
    match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
        Some("positive") => Sentiment::Positive,
        Some("negative") => Sentiment::Negative,
        _ => Sentiment::Neutral,
    }
}

/// Parse and repair a model reply.
///
/// Repairs: engagement is rounded and clamped to 1..=10; themes are
/// re-ranked by count; participants naming unknown conversations are
/// dropped; aggregate sentiment that does not add up to the participant
/// list is recounted from it.
pub fn parse_payload(reply: &str, known: &HashSet<&str>) -> Result<InsightPayload, serde_json::Error> {
    let raw: RawPayload = serde_json::from_str(extract_json_object(reply))?;

    let participants: Vec<ParticipantInsight> = raw
        .participants
        .into_iter()
        .filter(|p| {
            let ok = known.contains(p.conversation_id.as_str());
            if !ok {
                tracing::debug!(conversation_id = %p.conversation_id, "insights named an unknown conversation");
            }
            ok
        })
        .map(|p| ParticipantInsight {
            conversation_id: p.conversation_id,
            sentiment: parse_sentiment(p.sentiment.as_deref()),
            engagement: p
                .engagement
                .filter(|e| e.is_finite())
                .map(|e| e.round().clamp(1.0, 10.0) as u8)
                .unwrap_or(DEFAULT_ENGAGEMENT),
            themes: p.themes.into_iter().filter(|t| !t.trim().is_empty()).collect(),
        })
        .collect();

    let mut themes: Vec<ThemeCount> = raw
        .themes
        .into_iter()
        .map(|t| match t {
            RawTheme::Counted { theme, count } => ThemeCount {
                theme,
                count: count.unwrap_or(0),
            },
            RawTheme::Bare(theme) => ThemeCount { theme, count: 0 },
        })
        .filter(|t| !t.theme.trim().is_empty())
        .collect();
    themes.sort_by(|a, b| b.count.cmp(&a.count));

    let mut sentiment = raw.sentiment.unwrap_or_default();
    // Model-supplied counts; summed wide so huge values read as a mismatch.
    let total = u64::from(sentiment.positive)
        + u64::from(sentiment.neutral)
        + u64::from(sentiment.negative);
    if !participants.is_empty() && total != participants.len() as u64 {
        sentiment = SentimentCounts::default();
        for p in &participants {
            match p.sentiment {
                Sentiment::Positive => sentiment.positive += 1,
                Sentiment::Neutral => sentiment.neutral += 1,
                Sentiment::Negative => sentiment.negative += 1,
            }
        }
    }

    Ok(InsightPayload {
        sentiment,
        themes,
        participants,
        parse_error: false,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
