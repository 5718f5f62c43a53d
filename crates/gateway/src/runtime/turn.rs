//! Turn execution: the orchestrator that takes one participant message
//! through model invocation, tool resolution, event ordering, and commit.
//!
//! Entry point: [`start_turn`] validates and locks the conversation, spawns
//! the turn, and returns a channel of [`ChatEvent`]s. The turn commits
//! before anything is delivered, so a client that disconnects mid-stream
//! still gets its turn recorded; the closed channel only stops delivery.

use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::Instrument;

use sv_domain::config::{ConversationConfig, ROLE_CONVERSATION};
use sv_domain::event::ChatEvent;
use sv_domain::survey::{Conversation, Survey};
use sv_domain::tool::{ContentBlock, Message, Role};
use sv_domain::trace::TraceEvent;
use sv_media::MediaLookup;
use sv_providers::ChatRequest;
use sv_sessions::TranscriptLine;

use crate::state::AppState;

use super::tools::{self, ToolInvocation};
use super::{join_sections, survey_or_not_found, truncate_str, TurnError};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Run parameters
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Input to a single turn.
pub struct TurnInput {
    pub session_token: String,
    pub message: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// start_turn
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run one participant turn.
///
/// Rejections (unknown token, ended conversation, closed survey, a turn
/// already in flight) are returned here, before any model call and without
/// side effects. Everything after that arrives on the channel: text chunks
/// and side-channel events in model order, then exactly one terminal event.
pub fn start_turn(
    state: AppState,
    input: TurnInput,
) -> Result<mpsc::Receiver<ChatEvent>, TurnError> {
    let message = input.message.trim().to_owned();
    if message.is_empty() {
        return Err(TurnError::InvalidInput("message must not be empty".into()));
    }

    let conv = state
        .conversations
        .get_by_token(&input.session_token)
        .ok_or_else(|| TurnError::NotFound("session".into()))?;

    let permit = state.session_locks.try_acquire(&conv.id)?;

    // Re-read under the lock; a turn that just finished may have completed it.
    let conv = state
        .conversations
        .get(&conv.id)
        .ok_or_else(|| TurnError::NotFound("session".into()))?;
    if !conv.is_active() {
        return Err(TurnError::StateConflict("this survey session has ended".into()));
    }
    let survey = survey_or_not_found(&state, &conv.survey_id)?;
    if !survey.accepts_submissions() {
        return Err(TurnError::StateConflict("this survey has been closed".into()));
    }

    let (tx, rx) = mpsc::channel::<ChatEvent>(64);
    let span = tracing::info_span!(
        "turn",
        conversation_id = %conv.id,
        turn = conv.turn_count + 1,
    );

    tokio::spawn(
        async move {
            tracing::debug!(message = %truncate_str(&message, 80), "turn started");
            let outcome = run_turn_inner(&state, &survey, &conv, &message).await;
            drop(permit);

            match outcome {
                Ok(events) => deliver(&tx, events).await,
                Err(e) => {
                    tracing::warn!(error = %e, "turn failed");
                    TraceEvent::TurnFailed {
                        conversation_id: conv.id.clone(),
                        reason: e.code().to_owned(),
                    }
                    .emit();
                    let _ = tx
                        .send(ChatEvent::TurnError {
                            message: e.to_string(),
                            code: e.code().to_owned(),
                        })
                        .await;
                }
            }
        }
        .instrument(span),
    );

    Ok(rx)
}

async fn run_turn_inner(
    state: &AppState,
    survey: &Survey,
    conv: &Conversation,
    message: &str,
) -> Result<Vec<ChatEvent>, TurnError> {
    let cfg = &state.config.conversation;

    // 1. History: committed prose plus the new message.
    let mut history = state.transcripts.prose_history(&conv.id).await?;
    history.push(Message::user(message));

    // 2. Completion policy.
    let user_count = history.iter().filter(|m| m.role == Role::User).count();
    let final_turn = user_count >= survey.max_messages as usize;

    // 3. Invoke.
    let req = ChatRequest {
        directive: turn_directive(survey, cfg, final_turn),
        messages: with_opening_cue(history, &cfg.opening_cue),
        tools: if final_turn {
            Vec::new()
        } else {
            tools::tool_definitions()
        },
        temperature: cfg.temperature,
        max_tokens: Some(cfg.max_tokens),
        model: None,
    };
    let timeout = Duration::from_millis(cfg.model_timeout_ms);
    let resp = match tokio::time::timeout(timeout, state.llm.chat_for_role(ROLE_CONVERSATION, req)).await {
        Ok(Ok(resp)) => resp,
        Ok(Err(e)) => return Err(TurnError::AdapterFailure(e.to_string())),
        Err(_) => {
            return Err(TurnError::AdapterFailure(format!(
                "no response within {}ms",
                cfg.model_timeout_ms
            )))
        }
    };

    // 4. Drain.
    let drained = drain(&state.media, &conv.id, resp.blocks, cfg.chunk_chars).await;

    // 5. Commit: one append for the whole turn, then the counter.
    let turn = conv.turn_count + 1;
    let assistant_text = if drained.text.is_empty() {
        cfg.placeholder.clone()
    } else {
        drained.text.clone()
    };
    let side_events: Vec<ChatEvent> = drained
        .events
        .iter()
        .filter(|e| e.is_side_channel())
        .cloned()
        .collect();

    let mut lines = vec![
        TranscriptLine::prose(turn, Role::User, message),
        TranscriptLine::prose(turn, Role::Assistant, assistant_text),
    ];
    if !side_events.is_empty() {
        lines.push(TranscriptLine::replay(turn, side_events.clone()));
    }
    state.transcripts.append_async(&conv.id, &lines).await?;

    let updated = state
        .conversations
        .record_turn(&conv.id, final_turn, Utc::now())?;

    TraceEvent::TurnCommitted {
        conversation_id: conv.id.clone(),
        turn,
        text_chars: drained.text.chars().count(),
        side_events: side_events.len(),
        is_complete: final_turn,
    }
    .emit();

    if final_turn {
        tracing::info!(
            conversation_id = %conv.id,
            duration_seconds = ?updated.duration_seconds,
            "conversation completed"
        );
        TraceEvent::ConversationCompleted {
            conversation_id: conv.id.clone(),
            survey_id: conv.survey_id.clone(),
            turn_count: updated.turn_count,
            duration_seconds: updated.duration_seconds,
        }
        .emit();
    }

    let mut events = drained.events;
    events.push(ChatEvent::TurnComplete {
        is_complete: final_turn,
    });
    Ok(events)
}

async fn deliver(tx: &mpsc::Sender<ChatEvent>, events: Vec<ChatEvent>) {
    for event in events {
        if tx.send(event).await.is_err() {
            tracing::debug!("client went away after commit, dropping remaining events");
            return;
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Directive and history
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Survey prompt, conversational style, then the tool directive or, on the
/// final turn, the closing directive.
pub fn turn_directive(survey: &Survey, cfg: &ConversationConfig, final_turn: bool) -> String {
    let last = if final_turn {
        cfg.final_turn_directive.as_str()
    } else {
        cfg.tool_directive.as_str()
    };
    join_sections([survey.system_prompt.as_str(), cfg.style_directive.as_str(), last])
}

/// The opening greeting was produced in reply to a synthetic cue that is
/// not stored. Put it back in front so the model sees the same exchange
/// and the history starts with a user message.
pub(crate) fn with_opening_cue(history: Vec<Message>, cue: &str) -> Vec<Message> {
    match history.first() {
        Some(first) if first.role == Role::Assistant => {
            let mut out = Vec::with_capacity(history.len() + 1);
            out.push(Message::user(cue));
            out.extend(history);
            out
        }
        _ => history,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Draining
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Split text into chunks of `size` characters. Never splits a code point.
pub fn chunk_text(text: &str, size: usize) -> Vec<String> {
    let size = size.max(1);
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(size).map(|c| c.iter().collect()).collect()
}

pub(crate) struct Drained {
    /// Text chunks and side-channel events in model order.
    pub events: Vec<ChatEvent>,
    /// All text blocks concatenated.
    pub text: String,
}

enum Segment {
    Ready(Vec<ChatEvent>),
    Tool(ToolInvocation),
}

fn flush_text(pending: &mut String, segments: &mut Vec<Segment>, chunk_chars: usize) {
    if pending.is_empty() {
        return;
    }
    let chunks = chunk_text(pending, chunk_chars)
        .into_iter()
        .map(|text| ChatEvent::TextChunk { text })
        .collect();
    segments.push(Segment::Ready(chunks));
    pending.clear();
}

/// Turn model blocks into ordered events.
///
/// Adjacent text blocks are chunked together; a valid tool call closes the
/// current run of text so its event lands after every chunk that preceded
/// it. Tool calls resolve concurrently and are re-joined in block order.
pub(crate) async fn drain(
    media: &MediaLookup,
    conversation_id: &str,
    blocks: Vec<ContentBlock>,
    chunk_chars: usize,
) -> Drained {
    let mut segments = Vec::new();
    let mut pending = String::new();
    let mut text = String::new();

    for block in blocks {
        match block {
            ContentBlock::Text { text: t } => {
                text.push_str(&t);
                pending.push_str(&t);
            }
            ContentBlock::ToolCall {
                name, arguments, ..
            } => {
                if let Some(inv) = ToolInvocation::parse_or_drop(conversation_id, &name, &arguments) {
                    flush_text(&mut pending, &mut segments, chunk_chars);
                    segments.push(Segment::Tool(inv));
                }
            }
        }
    }
    flush_text(&mut pending, &mut segments, chunk_chars);

    let futures = segments.into_iter().map(|segment| async move {
        match segment {
            Segment::Ready(events) => events,
            Segment::Tool(inv) => {
                let span = tracing::info_span!("tool.call", tool = inv_name(&inv));
                tools::resolve(media, inv)
                    .instrument(span)
                    .await
                    .into_iter()
                    .collect()
            }
        }
    });
    let events = futures_util::future::join_all(futures)
        .await
        .into_iter()
        .flatten()
        .collect();

    Drained { events, text }
}

fn inv_name(inv: &ToolInvocation) -> &'static str {
    match inv {
        ToolInvocation::ShowMedia { kind, .. } => match kind {
            sv_domain::capability::MediaKind::Image => tools::SHOW_IMAGE,
            sv_domain::capability::MediaKind::Video => tools::SHOW_VIDEO,
        },
        ToolInvocation::ShowButtons { .. } => tools::SHOW_BUTTONS,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Non-streaming aggregation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A drained turn, for callers that do not stream.
#[derive(Debug, Clone, Serialize)]
pub struct TurnSummary {
    pub response: String,
    /// Side-channel events in emission order.
    pub events: Vec<ChatEvent>,
    pub is_complete: bool,
    #[serde(skip)]
    pub error: Option<TurnFailure>,
}

/// The terminal error of a drained turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnFailure {
    pub code: String,
    pub message: String,
}

impl TurnSummary {
    pub async fn collect(mut rx: mpsc::Receiver<ChatEvent>) -> Self {
        let mut summary = TurnSummary {
            response: String::new(),
            events: Vec::new(),
            is_complete: false,
            error: None,
        };
        while let Some(event) = rx.recv().await {
            match event {
                ChatEvent::TextChunk { text } => summary.response.push_str(&text),
                ChatEvent::TurnComplete { is_complete } => summary.is_complete = is_complete,
                ChatEvent::TurnError { message, code } => {
                    summary.error = Some(TurnFailure { code, message })
                }
                ChatEvent::Unknown => {}
                side => summary.events.push(side),
            }
        }
        summary
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
