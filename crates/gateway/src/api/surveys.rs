//! Admin survey endpoints.
//!
//! - `GET  /v1/surveys`                       - list surveys with participant counts
//! - `GET  /v1/surveys/:id/insights?force=`   - cached aggregate analysis
//! - `GET  /v1/surveys/:id/results`           - stats + every conversation
//! - `POST /v1/surveys/:id/analyze`           - ask the analyst a question
//! - `GET  /v1/surveys/:id/analysis-history`  - earlier analyst exchange
//! - `POST /v1/surveys/:id/close`             - stop accepting participants
//! - `POST /v1/surveys/:id/reopen`            - accept participants again

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use crate::runtime::{admin, analysis, insights};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct InsightsQuery {
    #[serde(default, alias = "forceRefresh")]
    pub force: bool,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub message: String,
}

pub async fn list_surveys(State(state): State<AppState>) -> impl IntoResponse {
    let surveys = admin::list_surveys(&state);
    Json(serde_json::json!({
        "count": surveys.len(),
        "surveys": surveys,
    }))
}

pub async fn get_insights(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<InsightsQuery>,
) -> Response {
    match insights::get(&state, &id, query.force).await {
        Ok(view) => Json(view).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn get_results(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match admin::survey_results(&state, &id).await {
        Ok(results) => Json(results).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn analyze(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<AnalyzeRequest>,
) -> Response {
    match analysis::analyze(&state, &id, &body.message).await {
        Ok(response) => Json(serde_json::json!({ "response": response })).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn analysis_history(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match analysis::history(&state, &id).await {
        Ok(messages) => Json(serde_json::json!({ "messages": messages })).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn close(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match admin::close_survey(&state, &id) {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn reopen(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match admin::reopen_survey(&state, &id) {
        Ok(survey) => Json(survey).into_response(),
        Err(e) => e.into_response(),
    }
}
