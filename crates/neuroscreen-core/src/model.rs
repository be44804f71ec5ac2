//! Core data model types for neuroscreen.
//!
//! Questions, sessions, responses, and the durable student profile that the
//! scoring pipeline reads and writes.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AssessmentError;

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

/// The clinical screening dimension a question targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    Dyslexia,
    Autism,
}

impl Condition {
    pub const ALL: [Condition; 2] = [Condition::Dyslexia, Condition::Autism];
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Dyslexia => write!(f, "dyslexia"),
            Condition::Autism => write!(f, "autism"),
        }
    }
}

impl FromStr for Condition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "dyslexia" => Ok(Condition::Dyslexia),
            "autism" => Ok(Condition::Autism),
            other => Err(format!("unknown condition: {other}")),
        }
    }
}

/// Question difficulty bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Moderate,
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Moderate, Difficulty::Hard];
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "easy"),
            Difficulty::Moderate => write!(f, "moderate"),
            Difficulty::Hard => write!(f, "hard"),
        }
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "moderate" | "medium" => Ok(Difficulty::Moderate),
            "hard" => Ok(Difficulty::Hard),
            other => Err(format!("unknown difficulty: {other}")),
        }
    }
}

/// Which conditions an assessment attempt screens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssessmentType {
    Dyslexia,
    Autism,
    Both,
}

impl AssessmentType {
    /// Conditions covered, in presentation order.
    pub fn conditions(&self) -> &'static [Condition] {
        match self {
            AssessmentType::Dyslexia => &[Condition::Dyslexia],
            AssessmentType::Autism => &[Condition::Autism],
            AssessmentType::Both => &Condition::ALL,
        }
    }

    /// Fixed question count: 10 per single-condition assessment, 20 combined.
    pub fn total_questions(&self) -> usize {
        QUESTIONS_PER_CONDITION * self.conditions().len()
    }

    pub fn includes(&self, condition: Condition) -> bool {
        self.conditions().contains(&condition)
    }
}

/// Questions served per condition in one assessment.
pub const QUESTIONS_PER_CONDITION: usize = 10;

impl fmt::Display for AssessmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssessmentType::Dyslexia => write!(f, "dyslexia"),
            AssessmentType::Autism => write!(f, "autism"),
            AssessmentType::Both => write!(f, "both"),
        }
    }
}

impl FromStr for AssessmentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "dyslexia" => Ok(AssessmentType::Dyslexia),
            "autism" => Ok(AssessmentType::Autism),
            "both" | "mixed" => Ok(AssessmentType::Both),
            other => Err(format!("unknown assessment type: {other}")),
        }
    }
}

/// Lifecycle state of an assessment session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Completed,
    Abandoned,
}

/// Categorical severity bucket derived from per-category accuracy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    HighRisk,
    ModerateRisk,
    LowRisk,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::HighRisk => write!(f, "high_risk"),
            RiskLevel::ModerateRisk => write!(f, "moderate_risk"),
            RiskLevel::LowRisk => write!(f, "low_risk"),
        }
    }
}

/// Discrete label produced by the risk classifier, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionLevel {
    No,
    Low,
    Medium,
    High,
}

impl PredictionLevel {
    pub const ALL: [PredictionLevel; 4] = [
        PredictionLevel::No,
        PredictionLevel::Low,
        PredictionLevel::Medium,
        PredictionLevel::High,
    ];
}

impl fmt::Display for PredictionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredictionLevel::No => write!(f, "no"),
            PredictionLevel::Low => write!(f, "low"),
            PredictionLevel::Medium => write!(f, "medium"),
            PredictionLevel::High => write!(f, "high"),
        }
    }
}

impl FromStr for PredictionLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "no" | "none" => Ok(PredictionLevel::No),
            "low" => Ok(PredictionLevel::Low),
            "medium" => Ok(PredictionLevel::Medium),
            "high" => Ok(PredictionLevel::High),
            other => Err(format!("unknown prediction level: {other}")),
        }
    }
}

/// Self-reported reading proficiency.
///
/// Accepts the snake_case identifiers as well as the labels shown on the
/// pre-assessment form ("Cannot read yet", "Early reader (simple sentences)", ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum ReadingLevel {
    CannotRead,
    BeginningReader,
    EarlyReader,
    DevelopingReader,
    ProficientReader,
    AdvancedReader,
}

impl FromStr for ReadingLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        let level = match normalized.as_str() {
            "cannot_read" | "cannot read yet" => ReadingLevel::CannotRead,
            "beginning_reader" => ReadingLevel::BeginningReader,
            "early_reader" => ReadingLevel::EarlyReader,
            "developing_reader" => ReadingLevel::DevelopingReader,
            "proficient_reader" | "grade_level" => ReadingLevel::ProficientReader,
            "advanced_reader" => ReadingLevel::AdvancedReader,
            label if label.starts_with("beginning reader") => ReadingLevel::BeginningReader,
            label if label.starts_with("early reader") => ReadingLevel::EarlyReader,
            label if label.starts_with("developing reader") => ReadingLevel::DevelopingReader,
            label if label.starts_with("proficient reader") => ReadingLevel::ProficientReader,
            label if label.starts_with("advanced reader") => ReadingLevel::AdvancedReader,
            other => return Err(format!("unknown reading level: {other}")),
        };
        Ok(level)
    }
}

impl TryFrom<String> for ReadingLevel {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// ---------------------------------------------------------------------------
// Questions
// ---------------------------------------------------------------------------

/// A published assessment question. Never mutated once a response references it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,
    pub text: String,
    pub condition: Condition,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub explanation: String,
    /// Subtype-specific payload, tagged by `question_type`.
    #[serde(flatten)]
    pub kind: QuestionKind,
    pub created_at: DateTime<Utc>,
}

/// Subtype-specific question payload with its answer key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "question_type", rename_all = "snake_case")]
pub enum QuestionKind {
    MultipleChoice {
        options: Vec<String>,
        /// Zero-based index into `options`.
        correct_answer: usize,
    },
    TrueFalse {
        correct_answer: bool,
    },
    Sequencing {
        /// Items in display order.
        items: Vec<String>,
        /// Indices into `items` in the correct order.
        correct_order: Vec<usize>,
    },
    AudioResponse {
        prompt_audio: String,
        accepted_transcripts: Vec<String>,
    },
}

impl QuestionKind {
    /// Grade an answer token against the stored key.
    ///
    /// Fails with `InvalidAnswerFormat` when the token cannot be mapped to an
    /// answer for this question (e.g. option letter out of range).
    pub fn grade(&self, question_id: Uuid, token: &str) -> Result<bool, AssessmentError> {
        let invalid = || AssessmentError::InvalidAnswerFormat {
            question_id,
            answer: token.to_string(),
        };

        match self {
            QuestionKind::MultipleChoice {
                options,
                correct_answer,
            } => {
                let index = parse_choice(token, options.len()).ok_or_else(invalid)?;
                Ok(index == *correct_answer)
            }
            QuestionKind::TrueFalse { correct_answer } => {
                let value = match token.trim().to_lowercase().as_str() {
                    "true" | "t" | "yes" | "a" | "0" => true,
                    "false" | "f" | "no" | "b" | "1" => false,
                    _ => return Err(invalid()),
                };
                Ok(value == *correct_answer)
            }
            QuestionKind::Sequencing {
                items,
                correct_order,
            } => {
                let order = token
                    .split(',')
                    .map(|part| parse_choice(part, items.len()))
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(invalid)?;
                if order.len() != items.len() {
                    return Err(invalid());
                }
                Ok(order == *correct_order)
            }
            QuestionKind::AudioResponse {
                accepted_transcripts,
                ..
            } => {
                let spoken = normalize_transcript(token);
                if spoken.is_empty() {
                    return Err(invalid());
                }
                Ok(accepted_transcripts
                    .iter()
                    .any(|t| normalize_transcript(t) == spoken))
            }
        }
    }

    /// Human-readable form of the answer key, used in missed-question reports.
    pub fn correct_answer_display(&self) -> String {
        match self {
            QuestionKind::MultipleChoice {
                options,
                correct_answer,
            } => match options.get(*correct_answer) {
                Some(text) => format!("{}: {text}", option_letter(*correct_answer)),
                None => option_letter(*correct_answer).to_string(),
            },
            QuestionKind::TrueFalse { correct_answer } => correct_answer.to_string(),
            QuestionKind::Sequencing { correct_order, .. } => correct_order
                .iter()
                .map(|&i| option_letter(i).to_string())
                .collect::<Vec<_>>()
                .join(","),
            QuestionKind::AudioResponse {
                accepted_transcripts,
                ..
            } => accepted_transcripts.first().cloned().unwrap_or_default(),
        }
    }

    /// Structural problems with the answer key, if any.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        match self {
            QuestionKind::MultipleChoice {
                options,
                correct_answer,
            } => {
                if options.len() < 2 {
                    problems.push(format!("needs at least 2 options, has {}", options.len()));
                }
                if *correct_answer >= options.len() {
                    problems.push(format!(
                        "correct_answer {correct_answer} is out of range for {} options",
                        options.len()
                    ));
                }
            }
            QuestionKind::TrueFalse { .. } => {}
            QuestionKind::Sequencing {
                items,
                correct_order,
            } => {
                let mut sorted = correct_order.clone();
                sorted.sort_unstable();
                if sorted != (0..items.len()).collect::<Vec<_>>() {
                    problems.push("correct_order is not a permutation of the items".into());
                }
            }
            QuestionKind::AudioResponse {
                accepted_transcripts,
                ..
            } => {
                if accepted_transcripts.is_empty() {
                    problems.push("no accepted transcripts".into());
                }
            }
        }
        problems
    }

    fn view(&self) -> QuestionKindView {
        match self {
            QuestionKind::MultipleChoice { options, .. } => QuestionKindView::MultipleChoice {
                options: options.clone(),
            },
            QuestionKind::TrueFalse { .. } => QuestionKindView::TrueFalse {},
            QuestionKind::Sequencing { items, .. } => QuestionKindView::Sequencing {
                items: items.clone(),
            },
            QuestionKind::AudioResponse { prompt_audio, .. } => QuestionKindView::AudioResponse {
                prompt_audio: prompt_audio.clone(),
            },
        }
    }
}

/// Map a letter (`A`, `b`) or zero-based index (`2`) to an option index.
fn parse_choice(token: &str, option_count: usize) -> Option<usize> {
    let token = token.trim();
    let mut chars = token.chars();
    let index = match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphabetic() => {
            (c.to_ascii_uppercase() as u8 - b'A') as usize
        }
        _ => token.parse::<usize>().ok()?,
    };
    (index < option_count).then_some(index)
}

/// Letter label for an option index (0 → 'A').
pub fn option_letter(index: usize) -> char {
    u8::try_from(index)
        .ok()
        .filter(|i| *i < 26)
        .map(|i| (b'A' + i) as char)
        .unwrap_or('?')
}

fn normalize_transcript(s: &str) -> String {
    s.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

impl Question {
    /// Client-facing projection served during an active assessment.
    pub fn view(&self) -> QuestionView {
        QuestionView {
            id: self.id,
            text: self.text.clone(),
            condition: self.condition,
            difficulty: self.difficulty,
            category: self.category.clone(),
            kind: self.kind.view(),
        }
    }

    /// Grouping key for per-category risk: the category, or the condition name.
    pub fn risk_category(&self) -> String {
        self.category
            .clone()
            .unwrap_or_else(|| self.condition.to_string())
    }
}

/// A question as shown to a student: the answer key and explanation are withheld.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionView {
    pub id: Uuid,
    pub text: String,
    pub condition: Condition,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(flatten)]
    pub kind: QuestionKindView,
}

/// Answer-free question payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "question_type", rename_all = "snake_case")]
pub enum QuestionKindView {
    MultipleChoice { options: Vec<String> },
    TrueFalse {},
    Sequencing { items: Vec<String> },
    AudioResponse { prompt_audio: String },
}

// ---------------------------------------------------------------------------
// Sessions and responses
// ---------------------------------------------------------------------------

/// Self-reported attributes used to choose the difficulty mix.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreAssessment {
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub grade: Option<String>,
    #[serde(default)]
    pub reading_level: Option<ReadingLevel>,
    #[serde(default)]
    pub primary_language: Option<String>,
    #[serde(default)]
    pub has_reading_difficulty: bool,
    #[serde(default)]
    pub needs_assistance: bool,
    #[serde(default)]
    pub previous_assessment: bool,
}

pub const MIN_STUDENT_AGE: u32 = 3;
pub const MAX_STUDENT_AGE: u32 = 100;

impl PreAssessment {
    pub fn validate(&self) -> Result<(), AssessmentError> {
        if let Some(age) = self.age {
            if !(MIN_STUDENT_AGE..=MAX_STUDENT_AGE).contains(&age) {
                return Err(AssessmentError::validation(
                    "age",
                    format!("must be between {MIN_STUDENT_AGE} and {MAX_STUDENT_AGE}, got {age}"),
                ));
            }
        }
        Ok(())
    }
}

/// Number of questions per difficulty bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifficultyCounts {
    pub easy: usize,
    pub moderate: usize,
    pub hard: usize,
}

impl DifficultyCounts {
    pub fn total(&self) -> usize {
        self.easy + self.moderate + self.hard
    }

    pub fn get(&self, difficulty: Difficulty) -> usize {
        match difficulty {
            Difficulty::Easy => self.easy,
            Difficulty::Moderate => self.moderate,
            Difficulty::Hard => self.hard,
        }
    }

    pub fn add(&mut self, difficulty: Difficulty, n: usize) {
        match difficulty {
            Difficulty::Easy => self.easy += n,
            Difficulty::Moderate => self.moderate += n,
            Difficulty::Hard => self.hard += n,
        }
    }
}

/// Risk prediction for one condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub level: PredictionLevel,
    /// Mean of the per-question maximum class probability, in [0, 1].
    pub confidence: f64,
    /// Per-question labels, in response order.
    pub per_question: Vec<PredictionLevel>,
    pub question_count: usize,
    /// True when the classifier failed and the fixed fallback was used.
    #[serde(default)]
    pub fallback: bool,
}

/// One assessment attempt. Never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentSession {
    pub id: Uuid,
    pub student_ref: String,
    pub assessment_type: AssessmentType,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Total time in seconds.
    #[serde(default)]
    pub total_time: Option<u64>,
    /// Questions served for this attempt, in presentation order.
    #[serde(default)]
    pub question_ids: Vec<Uuid>,
    #[serde(default)]
    pub pre_assessment: PreAssessment,
    #[serde(default)]
    pub difficulty_distribution: DifficultyCounts,
    #[serde(default)]
    pub difficulty_customized: bool,
    #[serde(default)]
    pub customization_reason: Option<String>,
    #[serde(default)]
    pub visual_assessment_recommended: bool,
    #[serde(default)]
    pub total_questions: usize,
    #[serde(default)]
    pub correct_answers: usize,
    #[serde(default)]
    pub overall_accuracy: Option<f64>,
    #[serde(default)]
    pub dyslexia_score: Option<f64>,
    #[serde(default)]
    pub autism_score: Option<f64>,
    #[serde(default)]
    pub category_accuracy: BTreeMap<String, f64>,
    #[serde(default)]
    pub risk_indicators: BTreeMap<String, RiskLevel>,
    #[serde(default)]
    pub predictions: BTreeMap<Condition, Prediction>,
    #[serde(default)]
    pub predicted_level: Option<PredictionLevel>,
    #[serde(default)]
    pub predicted_confidence: Option<f64>,
}

impl AssessmentSession {
    pub fn new(student_ref: &str, assessment_type: AssessmentType) -> Self {
        Self {
            id: Uuid::new_v4(),
            student_ref: student_ref.to_string(),
            assessment_type,
            status: SessionStatus::InProgress,
            started_at: Utc::now(),
            completed_at: None,
            total_time: None,
            question_ids: Vec::new(),
            pre_assessment: PreAssessment::default(),
            difficulty_distribution: DifficultyCounts::default(),
            difficulty_customized: false,
            customization_reason: None,
            visual_assessment_recommended: false,
            total_questions: 0,
            correct_answers: 0,
            overall_accuracy: None,
            dyslexia_score: None,
            autism_score: None,
            category_accuracy: BTreeMap::new(),
            risk_indicators: BTreeMap::new(),
            predictions: BTreeMap::new(),
            predicted_level: None,
            predicted_confidence: None,
        }
    }

    pub fn condition_score(&self, condition: Condition) -> Option<f64> {
        match condition {
            Condition::Dyslexia => self.dyslexia_score,
            Condition::Autism => self.autism_score,
        }
    }
}

/// A recorded answer. One per (session, question); a resubmission replaces it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub session_id: Uuid,
    pub question_id: Uuid,
    pub selected_answer: String,
    /// Computed server-side from the stored answer key.
    pub is_correct: bool,
    #[serde(default)]
    pub response_time_seconds: Option<f64>,
    pub difficulty: Difficulty,
    pub condition: Condition,
    #[serde(default)]
    pub category: Option<String>,
    pub answered_at: DateTime<Utc>,
}

/// Detailed client timing for one question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionTiming {
    pub session_id: Uuid,
    pub question_id: Uuid,
    /// Milliseconds since the epoch.
    pub start_time: i64,
    /// Milliseconds since the epoch.
    pub end_time: i64,
    /// Seconds.
    pub response_time: f64,
    pub difficulty: Difficulty,
    pub condition: Condition,
}

/// Durable per-student summary written at the end of the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentProfile {
    pub student_ref: String,
    #[serde(default)]
    pub assessment_score: Option<f64>,
    #[serde(default)]
    pub dyslexia_score: Option<f64>,
    #[serde(default)]
    pub autism_score: Option<f64>,
    #[serde(default)]
    pub dyslexia_prediction_level: Option<PredictionLevel>,
    #[serde(default)]
    pub dyslexia_prediction_confidence: Option<f64>,
    #[serde(default)]
    pub dyslexia_prediction_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub autism_prediction_level: Option<PredictionLevel>,
    #[serde(default)]
    pub autism_prediction_confidence: Option<f64>,
    #[serde(default)]
    pub autism_prediction_date: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl StudentProfile {
    pub fn new(student_ref: &str) -> Self {
        Self {
            student_ref: student_ref.to_string(),
            assessment_score: None,
            dyslexia_score: None,
            autism_score: None,
            dyslexia_prediction_level: None,
            dyslexia_prediction_confidence: None,
            dyslexia_prediction_date: None,
            autism_prediction_level: None,
            autism_prediction_confidence: None,
            autism_prediction_date: None,
            updated_at: Utc::now(),
        }
    }
}
