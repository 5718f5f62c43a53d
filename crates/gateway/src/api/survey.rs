//! Participant endpoints. Authenticated by the session token handed out at
//! join time.
//!
//! - `POST /v1/survey/join`        - create a conversation, return the greeting
//! - `POST /v1/survey/chat`        - non-streaming turn: `{response, events, is_complete}`
//! - `POST /v1/survey/chat/stream` - SSE turn: one frame per event
//! - `POST /v1/survey/complete`    - end the conversation early
//! - `GET  /v1/survey/transcript`  - replay the conversation's records

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use futures_util::stream::Stream;
use serde::Deserialize;

use sv_domain::event::ChatEvent;

use crate::runtime::turn::TurnSummary;
use crate::runtime::{participant, start_turn, TurnInput};
use crate::state::AppState;

use super::error::api_error;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request shapes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct JoinRequest {
    #[serde(alias = "code")]
    pub survey_code: String,
}

#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    #[serde(alias = "conversationToken")]
    pub session_token: String,
    #[serde(alias = "messageText")]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct SessionRequest {
    #[serde(alias = "conversationToken")]
    pub session_token: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/survey/join
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn join(State(state): State<AppState>, Json(body): Json<JoinRequest>) -> Response {
    match participant::join(&state, &body.survey_code).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => e.into_response(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/survey/chat (non-streaming)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn chat(State(state): State<AppState>, Json(body): Json<TurnRequest>) -> Response {
    let rx = match start_turn(state, turn_input(body)) {
        Ok(rx) => rx,
        Err(e) => return e.into_response(),
    };

    let summary = TurnSummary::collect(rx).await;
    if let Some(failure) = summary.error {
        // A turn that fails after its transcript append is a storage fault,
        // not a model one.
        let status = match failure.code.as_str() {
            "storage" => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_GATEWAY,
        };
        return api_error(status, &failure.code, failure.message);
    }
    Json(summary).into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/survey/chat/stream (SSE)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Rejections happen before the stream opens and come back as plain JSON
/// errors. Once streaming, a failed turn ends with a `turn_error` frame.
pub async fn chat_stream(State(state): State<AppState>, Json(body): Json<TurnRequest>) -> Response {
    let rx = match start_turn(state, turn_input(body)) {
        Ok(rx) => rx,
        Err(e) => return e.into_response(),
    };

    Sse::new(make_sse_stream(rx))
        .keep_alive(KeepAlive::default())
        .into_response()
}

fn make_sse_stream(
    mut rx: tokio::sync::mpsc::Receiver<ChatEvent>,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    async_stream::stream! {
        while let Some(event) = rx.recv().await {
            let data = serde_json::to_string(&event).unwrap_or_default();
            yield Ok(Event::default().event(event.event_type()).data(data));
        }
    }
}

fn turn_input(body: TurnRequest) -> TurnInput {
    TurnInput {
        session_token: body.session_token,
        message: body.message,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/survey/complete
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn complete(State(state): State<AppState>, Json(body): Json<SessionRequest>) -> Response {
    match participant::complete(&state, &body.session_token) {
        Ok(status) => Json(serde_json::json!({
            "status": status,
            "is_complete": true,
        }))
        .into_response(),
        Err(e) => e.into_response(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/survey/transcript?session_token=...
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn transcript(
    State(state): State<AppState>,
    Query(query): Query<SessionRequest>,
) -> Response {
    match participant::transcript(&state, &query.session_token).await {
        Ok(view) => Json(view).into_response(),
        Err(e) => e.into_response(),
    }
}
