//! neuroscreen-classifier: pre-trained risk classifier.
//!
//! Loads a multinomial logistic model exported as JSON and implements the
//! `Classifier` trait from `neuroscreen-core`. Inference is a softmax over
//! `intercept + w·x` per class.

pub mod artifact;
pub mod encoder;

use std::path::Path;
use std::sync::Arc;

use neuroscreen_core::error::PredictionError;
use neuroscreen_core::traits::{ClassPrediction, Classifier, ResponseFeatures};

pub use artifact::{ClassifierArtifact, DEFAULT_ARTIFACT};
use encoder::OrdinalEncoder;

/// Logistic-regression classifier built from a `ClassifierArtifact`.
#[derive(Debug, Clone)]
pub struct LinearClassifier {
    artifact: ClassifierArtifact,
    encoder: OrdinalEncoder,
}

impl LinearClassifier {
    pub fn new(artifact: ClassifierArtifact) -> Result<Self, PredictionError> {
        artifact.validate()?;
        let encoder = OrdinalEncoder::new(artifact.difficulty_categories.clone());
        Ok(Self { artifact, encoder })
    }

    pub fn load(path: &Path) -> Result<Self, PredictionError> {
        Self::new(ClassifierArtifact::load(path)?)
    }

    pub fn builtin() -> Result<Self, PredictionError> {
        Self::new(ClassifierArtifact::builtin()?)
    }

    pub fn artifact(&self) -> &ClassifierArtifact {
        &self.artifact
    }

    fn encode(&self, row: &ResponseFeatures) -> Result<[f64; artifact::N_FEATURES], PredictionError> {
        if !row.response_time.is_finite() {
            return Err(PredictionError::Inference(format!(
                "non-finite response time {}",
                row.response_time
            )));
        }
        Ok([
            self.encoder.transform(row.difficulty)?,
            row.response_time,
            if row.is_correct { 1.0 } else { 0.0 },
        ])
    }

    fn predict_row(&self, row: &ResponseFeatures) -> Result<ClassPrediction, PredictionError> {
        let x = self.encode(row)?;
        let logits: Vec<f64> = self
            .artifact
            .coefficients
            .iter()
            .zip(&self.artifact.intercepts)
            .map(|(w, b)| b + w.iter().zip(&x).map(|(wi, xi)| wi * xi).sum::<f64>())
            .collect();
        let probabilities = softmax(&logits);

        let best = probabilities
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .ok_or_else(|| PredictionError::Inference("empty probability vector".into()))?;

        Ok(ClassPrediction {
            label: self.artifact.classes[best],
            probabilities,
        })
    }
}

impl Classifier for LinearClassifier {
    fn version(&self) -> &str {
        &self.artifact.version
    }

    fn predict(&self, rows: &[ResponseFeatures]) -> Result<Vec<ClassPrediction>, PredictionError> {
        rows.iter().map(|row| self.predict_row(row)).collect()
    }
}

/// Numerically stable softmax.
pub fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Load the classifier from `path`, or the built-in artifact when no path
/// is configured. Failures are logged and yield `None`, which leaves the
/// risk predictor on its fallback.
pub fn load_classifier(path: Option<&Path>) -> Option<Arc<dyn Classifier>> {
    let loaded = match path {
        Some(p) => LinearClassifier::load(p),
        None => LinearClassifier::builtin(),
    };
    match loaded {
        Ok(classifier) => {
            tracing::info!(version = classifier.version(), "loaded risk classifier");
            Some(Arc::new(classifier))
        }
        Err(e) => {
            tracing::warn!("risk classifier unavailable, predictions will use the fallback: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neuroscreen_core::model::{Difficulty, PredictionLevel};

    fn row(difficulty: Difficulty, response_time: f64, is_correct: bool) -> ResponseFeatures {
        ResponseFeatures {
            difficulty,
            response_time,
            is_correct,
        }
    }

    #[test]
    fn fast_correct_answers_are_no_risk() {
        let clf = LinearClassifier::builtin().unwrap();
        let out = clf.predict(&[row(Difficulty::Easy, 5.0, true)]).unwrap();
        assert_eq!(out[0].label, PredictionLevel::No);
    }

    #[test]
    fn slow_wrong_hard_answers_are_high_risk() {
        let clf = LinearClassifier::builtin().unwrap();
        let out = clf.predict(&[row(Difficulty::Hard, 30.0, false)]).unwrap();
        assert_eq!(out[0].label, PredictionLevel::High);
    }

    #[test]
    fn probabilities_sum_to_one() {
        let clf = LinearClassifier::builtin().unwrap();
        let rows = [
            row(Difficulty::Easy, 10.0, false),
            row(Difficulty::Moderate, 2.0, true),
            row(Difficulty::Hard, 45.0, true),
        ];
        for p in clf.predict(&rows).unwrap() {
            assert_eq!(p.probabilities.len(), 4);
            let sum: f64 = p.probabilities.iter().sum();
            assert!((sum - 1.0).abs() < 1e-9);
            assert!(p.max_probability() > 0.25);
        }
    }

    #[test]
    fn non_finite_time_is_inference_error() {
        let clf = LinearClassifier::builtin().unwrap();
        let err = clf.predict(&[row(Difficulty::Easy, f64::NAN, true)]).unwrap_err();
        assert!(matches!(err, PredictionError::Inference(_)));
    }

    #[test]
    fn softmax_is_stable_for_large_logits() {
        let p = softmax(&[1000.0, 1000.0]);
        assert!((p[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn load_classifier_falls_back_to_none() {
        assert!(load_classifier(Some(Path::new("/nonexistent/model.json"))).is_none());
        assert!(load_classifier(None).is_some());
    }
}
