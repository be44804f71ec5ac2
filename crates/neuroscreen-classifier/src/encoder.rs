//! Ordinal encoding of the difficulty feature.

use neuroscreen_core::error::PredictionError;
use neuroscreen_core::model::Difficulty;

/// Maps a difficulty to its position in the fitted category list.
#[derive(Debug, Clone)]
pub struct OrdinalEncoder {
    categories: Vec<Difficulty>,
}

impl OrdinalEncoder {
    pub fn new(categories: Vec<Difficulty>) -> Self {
        Self { categories }
    }

    pub fn categories(&self) -> &[Difficulty] {
        &self.categories
    }

    pub fn transform(&self, difficulty: Difficulty) -> Result<f64, PredictionError> {
        self.categories
            .iter()
            .position(|c| *c == difficulty)
            .map(|i| i as f64)
            .ok_or_else(|| {
                PredictionError::Inference(format!("difficulty '{difficulty}' was not seen in training"))
            })
    }
}
