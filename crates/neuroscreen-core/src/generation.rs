//! LLM-backed question generation.
//!
//! Builds a prompt for one condition and difficulty mix, calls the provider
//! with retries on transient errors, and decodes the JSON payload into
//! multiple-choice `Question`s.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{AssessmentError, ProviderError};
use crate::model::{Condition, Difficulty, DifficultyCounts, Question, QuestionKind};
use crate::parser::AnswerKey;
use crate::traits::{
    extract_json_from_markdown, GenerateRequest, LlmProvider, QuestionSource,
    DEFAULT_SYSTEM_PROMPT,
};

/// Settings for LLM question generation.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Retries on provider errors (not on malformed output).
    pub max_retries: u32,
    /// Initial delay between retries; doubles each attempt up to 60s.
    pub retry_delay: Duration,
    pub system_prompt_override: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".to_string(),
            temperature: 0.7,
            max_tokens: 4096,
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            system_prompt_override: None,
        }
    }
}

/// A `QuestionSource` that asks an LLM to write fresh questions.
pub struct LlmQuestionSource {
    provider: Arc<dyn LlmProvider>,
    config: GenerationConfig,
    name: String,
}

impl LlmQuestionSource {
    pub fn new(provider: Arc<dyn LlmProvider>, config: GenerationConfig) -> Self {
        let name = format!("llm:{}", provider.name());
        Self {
            provider,
            config,
            name,
        }
    }

    fn request(&self, condition: Condition, counts: DifficultyCounts) -> GenerateRequest {
        GenerateRequest {
            model: self.config.model.clone(),
            prompt: build_prompt(condition, counts),
            system_prompt: Some(
                self.config
                    .system_prompt_override
                    .clone()
                    .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            ),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            stop_sequences: vec![],
        }
    }
}

#[async_trait]
impl QuestionSource for LlmQuestionSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        condition: Condition,
        counts: DifficultyCounts,
    ) -> Result<Vec<Question>, AssessmentError> {
        let request = self.request(condition, counts);
        let start = Instant::now();

        let mut last_error = None;
        let mut retry_delay = self.config.retry_delay;
        for retry in 0..=self.config.max_retries {
            if retry > 0 {
                tracing::info!(
                    provider = self.provider.name(),
                    %condition,
                    retry,
                    delay_ms = retry_delay.as_millis() as u64,
                    "retrying question generation"
                );
                tokio::time::sleep(retry_delay).await;
                retry_delay = (retry_delay * 2).min(MAX_RETRY_DELAY);
            }

            match self.provider.generate(&request).await {
                Ok(response) => {
                    let questions = parse_generated(&response.content, condition, counts)?;
                    tracing::info!(
                        provider = self.provider.name(),
                        model = %response.model,
                        %condition,
                        count = questions.len(),
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "generated questions"
                    );
                    return Ok(questions);
                }
                Err(e) => {
                    let provider_error = e.downcast_ref::<ProviderError>();
                    if provider_error.is_some_and(ProviderError::is_permanent) {
                        return Err(AssessmentError::Generation(format!("{e:#}")));
                    }
                    if let Some(ms) = provider_error.and_then(ProviderError::retry_after_ms) {
                        retry_delay = retry_hint(ms);
                    }
                    tracing::warn!(provider = self.provider.name(), "generation attempt failed: {e:#}");
                    last_error = Some(e);
                }
            }
        }

        Err(AssessmentError::Generation(match last_error {
            Some(e) => format!("{e:#}"),
            None => "unknown error".to_string(),
        }))
    }
}

/// Longest wait between attempts, for backoff and rate-limit hints alike.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// A provider's rate-limit hint, capped at `MAX_RETRY_DELAY`.
fn retry_hint(ms: u64) -> Duration {
    Duration::from_millis(ms).min(MAX_RETRY_DELAY)
}

fn focus_areas(condition: Condition) -> &'static str {
    match condition {
        Condition::Dyslexia => {
            "phonological awareness, letter and word recognition, rhyming, spelling patterns, reading comprehension, rapid naming"
        }
        Condition::Autism => {
            "social understanding, emotion recognition, literal versus figurative language, routines and change, sensory preferences, theory of mind"
        }
    }
}

/// Build the generation prompt for one condition.
pub fn build_prompt(condition: Condition, counts: DifficultyCounts) -> String {
    format!(
        r#"Generate exactly {total} multiple-choice screening questions for the condition: {condition}.
Use this difficulty mix: {easy} easy, {moderate} moderate, and {hard} hard.
Cover these focus areas: {areas}.
Each question must have 4 short options and exactly one correct answer.
Use simple, age-appropriate language.

Respond with JSON only, in this shape:
{{
  "questions": [
    {{
      "difficulty": "easy",
      "question": "Which word rhymes with 'cat'?",
      "options": ["dog", "hat", "cup", "sun"],
      "correct_answer": "B",
      "explanation": "'Hat' and 'cat' share the -at ending.",
      "focus_area": "phonological_awareness"
    }}
  ]
}}"#,
        total = counts.total(),
        easy = counts.easy,
        moderate = counts.moderate,
        hard = counts.hard,
        areas = focus_areas(condition),
    )
}

#[derive(Debug, Deserialize)]
struct GeneratedPayload {
    questions: Vec<GeneratedQuestion>,
}

#[derive(Debug, Deserialize)]
struct GeneratedQuestion {
    #[serde(default)]
    difficulty: Option<String>,
    #[serde(alias = "text")]
    question: String,
    options: Vec<String>,
    correct_answer: AnswerKey,
    #[serde(default)]
    explanation: String,
    #[serde(default, alias = "category")]
    focus_area: Option<String>,
}

/// Decode an LLM response into questions for `condition`.
///
/// Fails with `GenerationCountMismatch` unless exactly `counts.total()`
/// questions come back, and with `DifficultyMismatch` when any difficulty
/// bucket differs from `counts`.
pub fn parse_generated(
    content: &str,
    condition: Condition,
    counts: DifficultyCounts,
) -> Result<Vec<Question>, AssessmentError> {
    let json = extract_json_from_markdown(content);
    let payload: GeneratedPayload = serde_json::from_str(&json)
        .map_err(|e| AssessmentError::Generation(format!("malformed question JSON: {e}")))?;

    if payload.questions.len() != counts.total() {
        return Err(AssessmentError::GenerationCountMismatch {
            expected: counts.total(),
            actual: payload.questions.len(),
        });
    }

    let now = Utc::now();
    let questions = payload
        .questions
        .into_iter()
        .enumerate()
        .map(|(i, g)| {
            let difficulty = g
                .difficulty
                .as_deref()
                .ok_or_else(|| "missing difficulty".to_string())
                .and_then(|d| d.parse::<Difficulty>())
                .map_err(|e| AssessmentError::Generation(format!("question {}: {e}", i + 1)))?;
            let correct_answer = g
                .correct_answer
                .option_index(&g.options)
                .map_err(|e| AssessmentError::Generation(format!("question {}: {e}", i + 1)))?;
            let kind = QuestionKind::MultipleChoice {
                options: g.options,
                correct_answer,
            };
            if let Some(problem) = kind.problems().into_iter().next() {
                return Err(AssessmentError::Generation(format!(
                    "question {}: {problem}",
                    i + 1
                )));
            }
            Ok(Question {
                id: Uuid::new_v4(),
                text: g.question,
                condition,
                difficulty,
                category: g.focus_area.filter(|c| !c.trim().is_empty()),
                explanation: g.explanation,
                kind,
                created_at: now,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut produced = DifficultyCounts::default();
    for q in &questions {
        produced.add(q.difficulty, 1);
    }
    if let Some(difficulty) = Difficulty::ALL
        .into_iter()
        .find(|&d| produced.get(d) != counts.get(d))
    {
        tracing::warn!(
            %condition,
            requested = ?counts,
            produced = ?produced,
            "generated difficulty mix differs from the request"
        );
        return Err(AssessmentError::DifficultyMismatch {
            difficulty,
            expected: counts.get(difficulty),
            actual: produced.get(difficulty),
        });
    }

    Ok(questions)
}
