//! Request and result payloads for starting and submitting assessments.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AssessmentError;
use crate::model::{
    AssessmentType, Condition, Difficulty, DifficultyCounts, PreAssessment, Prediction,
    PredictionLevel, QuestionView, RiskLevel,
};

/// Input to `POST /assessments/start`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartRequest {
    pub student_ref: String,
    #[serde(default = "default_assessment_type")]
    pub assessment_type: AssessmentType,
    #[serde(flatten)]
    pub pre_assessment: PreAssessment,
}

fn default_assessment_type() -> AssessmentType {
    AssessmentType::Both
}

impl StartRequest {
    pub fn validate(&self) -> Result<(), AssessmentError> {
        if self.student_ref.trim().is_empty() {
            return Err(AssessmentError::validation("student_ref", "must not be empty"));
        }
        self.pre_assessment.validate()
    }
}

/// Output of `POST /assessments/start`. Answer keys are never included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartedAssessment {
    pub session_id: Uuid,
    pub assessment_type: AssessmentType,
    pub total_questions: usize,
    pub difficulty_distribution: DifficultyCounts,
    pub difficulty_customized: bool,
    pub customization_reason: Option<String>,
    pub visual_assessment_recommended: bool,
    pub questions: Vec<QuestionView>,
}

/// One answer in a submission batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerInput {
    pub question_id: Uuid,
    pub selected_answer: String,
    /// Client-measured response time in seconds.
    #[serde(default, alias = "response_time")]
    pub response_time_seconds: Option<f64>,
    /// The client's own correctness claim. Informational only.
    #[serde(default)]
    pub is_correct: Option<bool>,
}

/// Detailed per-question timing sent alongside the answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingInput {
    pub question_id: Uuid,
    /// Milliseconds since the epoch.
    pub start_time: i64,
    /// Milliseconds since the epoch.
    pub end_time: i64,
    /// Seconds.
    pub response_time: f64,
}

/// Input to `POST /assessments/submit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub session_id: Uuid,
    /// When present, must match the session's assessment type.
    #[serde(default)]
    pub assessment_type: Option<AssessmentType>,
    pub answers: Vec<AnswerInput>,
    #[serde(default)]
    pub question_timings: Vec<TimingInput>,
    /// Total time in seconds, as measured by the client.
    #[serde(default)]
    pub total_time: Option<u64>,
    /// Client-reported totals. Checked for consistency, never used for scoring.
    #[serde(default)]
    pub total_questions: Option<usize>,
    #[serde(default)]
    pub correct_answers: Option<usize>,
}

impl SubmitRequest {
    /// Structural validation performed before anything is persisted.
    pub fn validate(&self) -> Result<(), AssessmentError> {
        if self.answers.is_empty() {
            return Err(AssessmentError::validation(
                "answers",
                "at least one answer is required",
            ));
        }

        if let (Some(total), Some(correct)) = (self.total_questions, self.correct_answers) {
            if correct > total {
                return Err(AssessmentError::validation(
                    "correct_answers",
                    format!("{correct} exceeds total_questions {total}"),
                ));
            }
        }

        for answer in &self.answers {
            if answer.selected_answer.trim().is_empty() {
                return Err(AssessmentError::validation(
                    "selected_answer",
                    format!("empty answer for question {}", answer.question_id),
                ));
            }
            if let Some(t) = answer.response_time_seconds {
                if !t.is_finite() || t < 0.0 {
                    return Err(AssessmentError::validation(
                        "response_time",
                        format!("invalid response time {t} for question {}", answer.question_id),
                    ));
                }
            }
        }

        for timing in &self.question_timings {
            if !timing.response_time.is_finite() || timing.response_time < 0.0 {
                return Err(AssessmentError::validation(
                    "question_timings",
                    format!(
                        "invalid response time {} for question {}",
                        timing.response_time, timing.question_id
                    ),
                ));
            }
            if timing.end_time < timing.start_time {
                return Err(AssessmentError::validation(
                    "question_timings",
                    format!("end_time precedes start_time for question {}", timing.question_id),
                ));
            }
        }

        Ok(())
    }
}

/// A question the student answered incorrectly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissedQuestion {
    pub question_id: Uuid,
    pub condition: Condition,
    pub difficulty: Difficulty,
    pub selected_answer: String,
    pub correct_answer: String,
}

/// Output of `POST /assessments/submit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub session_id: Uuid,
    pub assessment_type: AssessmentType,
    pub total_questions: usize,
    pub correct_answers: usize,
    pub accuracy_percentage: f64,
    pub dyslexia_score: Option<f64>,
    pub autism_score: Option<f64>,
    pub risk_indicators: BTreeMap<String, RiskLevel>,
    pub predictions: BTreeMap<Condition, Prediction>,
    pub predicted_level: Option<PredictionLevel>,
    pub predicted_confidence: Option<f64>,
    pub missed_questions: Vec<MissedQuestion>,
    /// Answers that referenced unknown questions or failed to persist.
    pub skipped_questions: Vec<Uuid>,
    pub message: String,
}
