//! Collaborator traits consumed by the assessment pipeline.
//!
//! `LlmProvider` is implemented by `neuroscreen-providers`, `Classifier` by
//! `neuroscreen-classifier`. `QuestionSource` is implemented here by both the
//! LLM-backed generator and the static TOML bank.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AssessmentError, PredictionError};
use crate::model::{Condition, Difficulty, DifficultyCounts, PredictionLevel, Question};

// ---------------------------------------------------------------------------
// LLM Provider trait
// ---------------------------------------------------------------------------

/// Trait for LLM backends that write assessment questions from prompts.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name (e.g. "anthropic").
    fn name(&self) -> &str;

    /// Run one completion.
    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse>;

    /// List available models for this provider.
    fn available_models(&self) -> Vec<ModelInfo>;
}

/// Request to an LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Model identifier (e.g. "claude-sonnet-4-20250514").
    pub model: String,
    /// The main prompt.
    pub prompt: String,
    /// Optional system prompt override.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
    /// Stop sequences.
    #[serde(default)]
    pub stop_sequences: Vec<String>,
}

/// Response from an LLM request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// The raw response content.
    pub content: String,
    /// Model that actually generated the response.
    pub model: String,
    /// Token usage.
    pub token_usage: TokenUsage,
    /// Latency in milliseconds.
    pub latency_ms: u64,
}

/// Token accounting for one request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub estimated_cost_usd: f64,
}

/// Information about an available model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model identifier.
    pub id: String,
    /// Human-readable model name.
    pub name: String,
    /// Provider name.
    pub provider: String,
    /// Maximum context window size in tokens.
    pub max_context: u32,
    /// Cost per 1K input tokens in USD.
    pub cost_per_1k_input: f64,
    /// Cost per 1K output tokens in USD.
    pub cost_per_1k_output: f64,
}

/// Default system prompt for question generation.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You write short screening questions for children and adults being assessed for dyslexia and autism. Respond ONLY with a JSON object of the form {\"questions\": [...]}. Do not include explanations outside the JSON.";

// ---------------------------------------------------------------------------
// Classifier trait
// ---------------------------------------------------------------------------

/// One classifier input row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResponseFeatures {
    pub difficulty: Difficulty,
    /// Seconds.
    pub response_time: f64,
    pub is_correct: bool,
}

/// One classifier output row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassPrediction {
    pub label: PredictionLevel,
    /// Probability per class, in the classifier's class order.
    pub probabilities: Vec<f64>,
}

impl ClassPrediction {
    /// Probability of the predicted class.
    pub fn max_probability(&self) -> f64 {
        self.probabilities
            .iter()
            .copied()
            .fold(0.0_f64, f64::max)
    }
}

/// A pre-trained risk classifier. Inference is synchronous and CPU-bound.
pub trait Classifier: Send + Sync {
    /// Identifier of the loaded artifact, for logs.
    fn version(&self) -> &str;

    /// Predict one label per input row, in input order.
    fn predict(&self, rows: &[ResponseFeatures]) -> Result<Vec<ClassPrediction>, PredictionError>;
}

// ---------------------------------------------------------------------------
// Question source trait
// ---------------------------------------------------------------------------

/// Produces questions for one condition with an exact difficulty mix.
#[async_trait]
pub trait QuestionSource: Send + Sync {
    /// Short name for logs (e.g. "llm:anthropic", "bank:core").
    fn name(&self) -> &str;

    /// Produce exactly `counts.total()` questions for `condition`.
    async fn generate(
        &self,
        condition: Condition,
        counts: DifficultyCounts,
    ) -> Result<Vec<Question>, AssessmentError>;
}

// ---------------------------------------------------------------------------
// Markdown JSON extraction
// ---------------------------------------------------------------------------

/// Extract a JSON payload from a markdown-formatted LLM response.
///
/// Handles:
/// - A ```json``` block (preferred)
/// - A generic ``` block
/// - Raw text, trimmed to the outermost `{ ... }` when present
pub fn extract_json_from_markdown(response: &str) -> String {
    let mut json_blocks = Vec::new();
    let mut generic_blocks = Vec::new();
    let mut in_block = false;
    let mut is_json_block = false;
    let mut is_generic_block = false;
    let mut current_block = String::new();

    for line in response.lines() {
        let trimmed = line.trim();

        if !in_block && trimmed.starts_with("```") {
            in_block = true;
            let lang = trimmed.trim_start_matches('`').trim().to_lowercase();
            is_json_block = lang == "json";
            is_generic_block = lang.is_empty();
            current_block.clear();
            continue;
        }

        if in_block && trimmed == "```" {
            in_block = false;
            if is_json_block {
                json_blocks.push(current_block.clone());
            } else if is_generic_block {
                generic_blocks.push(current_block.clone());
            }
            current_block.clear();
            continue;
        }

        if in_block {
            if !current_block.is_empty() {
                current_block.push('\n');
            }
            current_block.push_str(line);
        }
    }

    // Truncated (unclosed) block
    if in_block && !current_block.is_empty() {
        if is_json_block {
            json_blocks.push(current_block);
        } else if is_generic_block {
            generic_blocks.push(current_block);
        }
    }

    if let Some(block) = json_blocks.into_iter().next() {
        return block;
    }
    if let Some(block) = generic_blocks.into_iter().next() {
        return block;
    }

    match (response.find('{'), response.rfind('}')) {
        (Some(start), Some(end)) if start < end => response[start..=end].to_string(),
        _ => response.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_json_block() {
        let input = "Here you go:\n\n```json\n{\"questions\": []}\n```\n\nGood luck!";
        assert_eq!(extract_json_from_markdown(input), "{\"questions\": []}");
    }

    #[test]
    fn extract_generic_block_fallback() {
        let input = "```\n{\"questions\": [1]}\n```";
        assert_eq!(extract_json_from_markdown(input), "{\"questions\": [1]}");
    }

    #[test]
    fn extract_prefers_json_over_generic() {
        let input = "```\n{\"a\": 1}\n```\n\n```json\n{\"b\": 2}\n```\n";
        assert_eq!(extract_json_from_markdown(input), "{\"b\": 2}");
    }

    #[test]
    fn extract_raw_object_with_chatter() {
        let input = "Sure! {\"questions\": []} Hope this helps.";
        assert_eq!(extract_json_from_markdown(input), "{\"questions\": []}");
    }

    #[test]
    fn extract_truncated_unclosed_block() {
        let input = "```json\n{\"questions\": [";
        assert_eq!(extract_json_from_markdown(input), "{\"questions\": [");
    }

    #[test]
    fn max_probability_picks_largest() {
        let p = ClassPrediction {
            label: PredictionLevel::Medium,
            probabilities: vec![0.1, 0.2, 0.6, 0.1],
        };
        assert!((p.max_probability() - 0.6).abs() < f64::EPSILON);
    }
}
