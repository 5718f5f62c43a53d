pub mod auth;
pub mod error;
pub mod survey;
pub mod surveys;

use axum::extract::State;
use axum::middleware;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full API router.
///
/// Routes are split into **participant** (session-token authenticated, or
/// none for health and join) and **admin** (gated behind the
/// `SV_ADMIN_TOKEN` bearer-token middleware).
///
/// `state` is needed to wire up the auth middleware at build time.
pub fn router(state: AppState) -> Router<AppState> {
    let participant = Router::new()
        .route("/v1/health", get(health))
        .route("/v1/survey/join", post(survey::join))
        .route("/v1/survey/chat", post(survey::chat))
        .route("/v1/survey/chat/stream", post(survey::chat_stream))
        .route("/v1/survey/complete", post(survey::complete))
        .route("/v1/survey/transcript", get(survey::transcript));

    let admin = Router::new()
        .route("/v1/surveys", get(surveys::list_surveys))
        .route("/v1/surveys/:id/insights", get(surveys::get_insights))
        .route("/v1/surveys/:id/results", get(surveys::get_results))
        .route("/v1/surveys/:id/analyze", post(surveys::analyze))
        .route("/v1/surveys/:id/analysis-history", get(surveys::analysis_history))
        .route("/v1/surveys/:id/close", post(surveys::close))
        .route("/v1/surveys/:id/reopen", post(surveys::reopen))
        .route_layer(middleware::from_fn_with_state(
            state,
            auth::require_admin_token,
        ));

    participant.merge(admin)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "providers": state.llm.registry().len(),
    }))
}
