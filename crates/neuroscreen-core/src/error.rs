//! Error taxonomy for the assessment pipeline.
//!
//! `AssessmentError` covers everything that can reject a request or a single
//! item of a batch. `PredictionError` is absorbed by the Risk Predictor and
//! never reaches a caller. `ProviderError` is defined here so the question
//! generator can downcast provider failures and classify them for retry
//! decisions without string matching.

use thiserror::Error;
use uuid::Uuid;

use crate::model::Difficulty;

/// Errors produced while starting, recording, or scoring an assessment.
#[derive(Debug, Error)]
pub enum AssessmentError {
    /// A submission or request field is missing or malformed.
    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    /// The selected-answer token does not map to a valid answer for the question.
    #[error("invalid answer '{answer}' for question {question_id}")]
    InvalidAnswerFormat { question_id: Uuid, answer: String },

    /// No session with this id exists.
    #[error("assessment session not found: {0}")]
    SessionNotFound(Uuid),

    /// No question with this id exists (or it is not part of the session).
    #[error("question not found: {0}")]
    QuestionNotFound(Uuid),

    /// Answer keys are withheld while the session is still being taken.
    #[error("answer keys are hidden while session {0} is in progress")]
    AnswerKeyLocked(Uuid),

    /// The question source returned a different number of questions than requested.
    #[error("expected {expected} questions but got {actual}")]
    GenerationCountMismatch { expected: usize, actual: usize },

    /// The question source returned the right total but the wrong mix for one difficulty.
    #[error("expected {expected} {difficulty} questions but got {actual}")]
    DifficultyMismatch {
        difficulty: Difficulty,
        expected: usize,
        actual: usize,
    },

    /// The question source failed outright.
    #[error("question generation failed: {0}")]
    Generation(String),

    /// The backing store rejected a write.
    #[error("storage error: {0}")]
    Storage(String),
}

impl AssessmentError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AssessmentError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if the caller sent something wrong (maps to a 4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AssessmentError::Validation { .. }
                | AssessmentError::InvalidAnswerFormat { .. }
                | AssessmentError::SessionNotFound(_)
                | AssessmentError::QuestionNotFound(_)
                | AssessmentError::AnswerKeyLocked(_)
        )
    }

    /// The request field an error refers to, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            AssessmentError::Validation { field, .. } => Some(field),
            AssessmentError::InvalidAnswerFormat { .. } => Some("selected_answer"),
            AssessmentError::SessionNotFound(_) | AssessmentError::AnswerKeyLocked(_) => {
                Some("session_id")
            }
            AssessmentError::QuestionNotFound(_) => Some("question_id"),
            _ => None,
        }
    }
}

/// Failures of the risk classifier. Never propagated past the Risk Predictor.
#[derive(Debug, Error)]
pub enum PredictionError {
    /// No classifier artifact is loaded.
    #[error("classifier unavailable: {0}")]
    Unavailable(String),

    /// The classifier raised during inference.
    #[error("inference failed: {0}")]
    Inference(String),

    /// The artifact could not be read or is internally inconsistent.
    #[error("invalid classifier artifact: {0}")]
    Artifact(String),
}

/// Errors that can occur when interacting with an LLM provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The API returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The requested model was not found.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),
}

impl ProviderError {
    /// Returns `true` if this error is permanent and should not be retried.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ProviderError::AuthenticationFailed(_) | ProviderError::ModelNotFound(_)
        )
    }

    /// Returns the retry-after delay in milliseconds, if applicable.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            ProviderError::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}
