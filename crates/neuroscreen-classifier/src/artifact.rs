//! The serialized classifier artifact.
//!
//! A multinomial logistic model exported to JSON together with the
//! categories of its difficulty encoder. Feature order is
//! `[difficulty, response_time, is_correct]`.

use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use neuroscreen_core::error::PredictionError;
use neuroscreen_core::model::{Difficulty, PredictionLevel};

/// Number of input features per row.
pub const N_FEATURES: usize = 3;

/// Built-in artifact shipped with the crate.
pub const DEFAULT_ARTIFACT: &str = include_str!("../assets/risk_classifier.json");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierArtifact {
    pub version: String,
    /// Class labels, in the order of `coefficients` and `intercepts`.
    pub classes: Vec<PredictionLevel>,
    /// Fitted categories of the difficulty ordinal encoder.
    pub difficulty_categories: Vec<Difficulty>,
    /// One weight row per class.
    pub coefficients: Vec<Vec<f64>>,
    pub intercepts: Vec<f64>,
}

impl ClassifierArtifact {
    /// Parse and validate an artifact from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self, PredictionError> {
        let artifact: ClassifierArtifact = serde_json::from_str(json)
            .map_err(|e| PredictionError::Artifact(format!("malformed artifact JSON: {e}")))?;
        artifact.validate()?;
        Ok(artifact)
    }

    /// Read and validate an artifact file.
    pub fn load(path: &Path) -> Result<Self, PredictionError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            PredictionError::Artifact(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&json)
    }

    /// The artifact bundled with this crate.
    pub fn builtin() -> Result<Self, PredictionError> {
        Self::from_json_str(DEFAULT_ARTIFACT)
    }

    /// Write the artifact as pretty JSON.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize artifact")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write artifact to {}", path.display()))
    }

    /// Check internal dimensions.
    pub fn validate(&self) -> Result<(), PredictionError> {
        if self.classes.is_empty() {
            return Err(PredictionError::Artifact("no classes".into()));
        }
        let unique: HashSet<_> = self.classes.iter().collect();
        if unique.len() != self.classes.len() {
            return Err(PredictionError::Artifact("duplicate class labels".into()));
        }
        if self.coefficients.len() != self.classes.len() {
            return Err(PredictionError::Artifact(format!(
                "{} coefficient rows for {} classes",
                self.coefficients.len(),
                self.classes.len()
            )));
        }
        if self.intercepts.len() != self.classes.len() {
            return Err(PredictionError::Artifact(format!(
                "{} intercepts for {} classes",
                self.intercepts.len(),
                self.classes.len()
            )));
        }
        if let Some(row) = self.coefficients.iter().find(|r| r.len() != N_FEATURES) {
            return Err(PredictionError::Artifact(format!(
                "coefficient row has {} weights, expected {N_FEATURES}",
                row.len()
            )));
        }
        if self
            .coefficients
            .iter()
            .flatten()
            .chain(&self.intercepts)
            .any(|w| !w.is_finite())
        {
            return Err(PredictionError::Artifact("non-finite weight".into()));
        }
        for d in Difficulty::ALL {
            if !self.difficulty_categories.contains(&d) {
                return Err(PredictionError::Artifact(format!(
                    "difficulty encoder is missing '{d}'"
                )));
            }
        }
        Ok(())
    }
}
