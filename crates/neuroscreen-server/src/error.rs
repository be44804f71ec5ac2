//! Mapping of pipeline errors onto HTTP responses.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use neuroscreen_core::error::AssessmentError;

/// Error returned by every handler. Renders as `{"error": ..., "field": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    field: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            field: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<AssessmentError> for ApiError {
    fn from(err: AssessmentError) -> Self {
        let status = match &err {
            AssessmentError::Validation { .. } | AssessmentError::InvalidAnswerFormat { .. } => {
                StatusCode::BAD_REQUEST
            }
            AssessmentError::SessionNotFound(_) | AssessmentError::QuestionNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            AssessmentError::AnswerKeyLocked(_) => StatusCode::FORBIDDEN,
            AssessmentError::GenerationCountMismatch { .. }
            | AssessmentError::DifficultyMismatch { .. }
            | AssessmentError::Generation(_) => StatusCode::BAD_GATEWAY,
            AssessmentError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!("request failed: {err}");
        }

        Self {
            status,
            field: err.field().map(String::from),
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self.field {
            Some(field) => json!({ "error": self.message, "field": field }),
            None => json!({ "error": self.message }),
        };
        (self.status, Json(body)).into_response()
    }
}
