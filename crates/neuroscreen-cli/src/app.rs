//! Wiring shared by the `serve` and `score` commands.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use neuroscreen_core::bank::BankSource;
use neuroscreen_core::generation::LlmQuestionSource;
use neuroscreen_core::parser::{load_bank, validate_bank};
use neuroscreen_core::predictor::RiskPredictor;
use neuroscreen_core::traits::{LlmProvider, QuestionSource};
use neuroscreen_providers::{create_provider, NeuroscreenConfig};

/// Load and validate a question bank, logging any warnings.
pub fn load_bank_source(path: &Path) -> Result<BankSource> {
    let bank = load_bank(path)
        .with_context(|| format!("failed to load question bank from {}", path.display()))?;
    for w in validate_bank(&bank) {
        match w.question_id {
            Some(id) => tracing::warn!(bank = %bank.id, question = %id, "{}", w.message),
            None => tracing::warn!(bank = %bank.id, "{}", w.message),
        }
    }
    tracing::info!(bank = %bank.id, questions = bank.questions.len(), "loaded question bank");
    Ok(BankSource::new(bank))
}

/// The configured question source: a static bank when one is set, otherwise
/// the default LLM provider.
pub fn question_source(config: &NeuroscreenConfig) -> Result<Arc<dyn QuestionSource>> {
    if let Some(path) = &config.question_bank {
        return Ok(Arc::new(load_bank_source(path)?));
    }

    let (name, provider_config) = config.provider(None)?;
    let provider: Arc<dyn LlmProvider> = Arc::from(create_provider(provider_config));
    tracing::info!(provider = name, model = %config.default_model, "generating questions with LLM");
    Ok(Arc::new(LlmQuestionSource::new(
        provider,
        config.generation_config(None),
    )))
}

/// Risk predictor over the configured classifier, or the built-in model.
pub fn risk_predictor(classifier_path: Option<&Path>) -> RiskPredictor {
    match neuroscreen_classifier::load_classifier(classifier_path) {
        Some(classifier) => RiskPredictor::new(classifier),
        None => RiskPredictor::unavailable(),
    }
}
