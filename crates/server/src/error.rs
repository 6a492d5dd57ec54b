//! Mapping of [`PipelineError`] onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pipeline::PipelineError;
use serde::Serialize;

/// Error body returned to callers: `{"code": "...", "message": "..."}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

/// A [`PipelineError`] on its way out of a handler.
#[derive(Debug)]
pub struct ApiError(pub PipelineError);

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let message = match &self.0 {
            // Storage details stay in the logs.
            PipelineError::Storage { .. } => "Internal server error.".to_owned(),
            other => other.to_string(),
        };
        let body = ErrorBody {
            code: self.0.code(),
            message,
        };
        (status, Json(body)).into_response()
    }
}
