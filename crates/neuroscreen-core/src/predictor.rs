//! Risk Predictor: per-question classification aggregated by majority vote.
//!
//! Classifier faults never escape this module. A missing classifier, an
//! inference error, or a malformed output all degrade to the fixed fallback
//! label with a logged warning.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::PredictionError;
use crate::model::{Condition, Prediction, PredictionLevel, Response};
use crate::traits::{Classifier, ResponseFeatures};

pub const FALLBACK_LEVEL: PredictionLevel = PredictionLevel::Low;
pub const FALLBACK_CONFIDENCE: f64 = 0.5;
/// Seconds assumed when a response carries no usable time.
pub const DEFAULT_RESPONSE_TIME_SECS: f64 = 30.0;

/// Injectable wrapper around an optional classifier.
#[derive(Clone, Default)]
pub struct RiskPredictor {
    classifier: Option<Arc<dyn Classifier>>,
}

impl std::fmt::Debug for RiskPredictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RiskPredictor")
            .field("classifier", &self.classifier.as_ref().map(|c| c.version()))
            .finish()
    }
}

impl RiskPredictor {
    pub fn new(classifier: Arc<dyn Classifier>) -> Self {
        Self {
            classifier: Some(classifier),
        }
    }

    /// A predictor that always returns the fallback.
    pub fn unavailable() -> Self {
        Self { classifier: None }
    }

    pub fn is_available(&self) -> bool {
        self.classifier.is_some()
    }

    /// Predict a level for one condition's feature rows.
    pub fn predict(&self, rows: &[ResponseFeatures]) -> Prediction {
        if rows.is_empty() {
            return Prediction {
                level: PredictionLevel::No,
                confidence: 0.0,
                per_question: vec![],
                question_count: 0,
                fallback: false,
            };
        }

        match self.try_predict(rows) {
            Ok(prediction) => prediction,
            Err(e) => {
                tracing::warn!(rows = rows.len(), "risk prediction fell back to '{FALLBACK_LEVEL}': {e}");
                fallback(rows.len())
            }
        }
    }

    /// Predict separately for every condition present in `responses`.
    pub fn predict_by_condition(&self, responses: &[Response]) -> BTreeMap<Condition, Prediction> {
        let mut grouped: BTreeMap<Condition, Vec<ResponseFeatures>> = BTreeMap::new();
        for r in responses {
            grouped.entry(r.condition).or_default().push(features(r));
        }
        grouped
            .into_iter()
            .map(|(condition, rows)| (condition, self.predict(&rows)))
            .collect()
    }

    fn try_predict(&self, rows: &[ResponseFeatures]) -> Result<Prediction, PredictionError> {
        let classifier = self
            .classifier
            .as_ref()
            .ok_or_else(|| PredictionError::Unavailable("no classifier loaded".into()))?;

        let outputs = classifier.predict(rows)?;
        if outputs.len() != rows.len() {
            return Err(PredictionError::Inference(format!(
                "classifier returned {} predictions for {} rows",
                outputs.len(),
                rows.len()
            )));
        }

        let per_question: Vec<PredictionLevel> = outputs.iter().map(|o| o.label).collect();
        let level = majority_vote(&per_question)
            .ok_or_else(|| PredictionError::Inference("no labels to vote on".into()))?;
        let confidence = outputs.iter().map(|o| o.max_probability()).sum::<f64>()
            / outputs.len() as f64;
        if !confidence.is_finite() {
            return Err(PredictionError::Inference(format!(
                "non-finite confidence {confidence}"
            )));
        }

        tracing::debug!(
            classifier = classifier.version(),
            %level,
            confidence,
            rows = rows.len(),
            "risk prediction"
        );

        Ok(Prediction {
            level,
            confidence: confidence.clamp(0.0, 1.0),
            question_count: rows.len(),
            per_question,
            fallback: false,
        })
    }
}

/// Classifier input for a stored response. Missing or zero times become
/// `DEFAULT_RESPONSE_TIME_SECS`.
pub fn features(response: &Response) -> ResponseFeatures {
    ResponseFeatures {
        difficulty: response.difficulty,
        response_time: response
            .response_time_seconds
            .filter(|t| *t > 0.0 && t.is_finite())
            .unwrap_or(DEFAULT_RESPONSE_TIME_SECS),
        is_correct: response.is_correct,
    }
}

/// Most frequent label. Ties go to the more severe label.
pub fn majority_vote(labels: &[PredictionLevel]) -> Option<PredictionLevel> {
    let mut counts: BTreeMap<PredictionLevel, usize> = BTreeMap::new();
    for label in labels {
        *counts.entry(*label).or_default() += 1;
    }
    // BTreeMap iterates in ascending severity; max_by_key keeps the last max.
    counts
        .into_iter()
        .max_by_key(|(_, n)| *n)
        .map(|(label, _)| label)
}

/// The prediction used when the classifier is unavailable or fails.
pub fn fallback(question_count: usize) -> Prediction {
    Prediction {
        level: FALLBACK_LEVEL,
        confidence: FALLBACK_CONFIDENCE,
        per_question: vec![],
        question_count,
        fallback: true,
    }
}
