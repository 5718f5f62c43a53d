//! Mapping from runtime errors to HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

use crate::runtime::TurnError;

/// Build a standardized JSON error response: `{ "error": "<message>", "code": "<code>" }`.
pub fn api_error(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": message.into(), "code": code })),
    )
        .into_response()
}

pub fn status_for(err: &TurnError) -> StatusCode {
    match err {
        TurnError::StateConflict(_) | TurnError::Busy => StatusCode::CONFLICT,
        TurnError::NotFound(_) => StatusCode::NOT_FOUND,
        TurnError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        TurnError::AdapterFailure(_) => StatusCode::BAD_GATEWAY,
        TurnError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for TurnError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if status.is_server_error() {
            tracing::warn!(code = self.code(), error = %self, "request failed");
        }
        api_error(status, self.code(), self.to_string())
    }
}
