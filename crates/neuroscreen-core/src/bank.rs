//! Static question bank as a `QuestionSource`.

use async_trait::async_trait;
use rand::seq::SliceRandom;

use crate::error::AssessmentError;
use crate::model::{Condition, Difficulty, DifficultyCounts, Question};
use crate::parser::QuestionBank;
use crate::traits::QuestionSource;

/// Serves questions from an authored bank, picking per-difficulty counts.
pub struct BankSource {
    name: String,
    questions: Vec<Question>,
    shuffle: bool,
}

impl BankSource {
    pub fn new(bank: QuestionBank) -> Self {
        Self {
            name: format!("bank:{}", bank.id),
            questions: bank.questions,
            shuffle: true,
        }
    }

    /// Take questions in bank order instead of sampling.
    pub fn in_order(mut self) -> Self {
        self.shuffle = false;
        self
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    /// Number of questions available for a condition and difficulty.
    pub fn available(&self, condition: Condition, difficulty: Difficulty) -> usize {
        self.questions
            .iter()
            .filter(|q| q.condition == condition && q.difficulty == difficulty)
            .count()
    }

    fn pick(&self, condition: Condition, counts: DifficultyCounts) -> Vec<Question> {
        let mut rng = rand::thread_rng();
        let mut picked = Vec::with_capacity(counts.total());

        for difficulty in Difficulty::ALL {
            let pool: Vec<&Question> = self
                .questions
                .iter()
                .filter(|q| q.condition == condition && q.difficulty == difficulty)
                .collect();
            let wanted = counts.get(difficulty);

            if self.shuffle {
                picked.extend(pool.choose_multiple(&mut rng, wanted).map(|q| (*q).clone()));
            } else {
                picked.extend(pool.into_iter().take(wanted).cloned());
            }
        }

        picked
    }
}

#[async_trait]
impl QuestionSource for BankSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        condition: Condition,
        counts: DifficultyCounts,
    ) -> Result<Vec<Question>, AssessmentError> {
        let picked = self.pick(condition, counts);

        if picked.len() != counts.total() {
            tracing::warn!(
                source = %self.name,
                %condition,
                easy = self.available(condition, Difficulty::Easy),
                moderate = self.available(condition, Difficulty::Moderate),
                hard = self.available(condition, Difficulty::Hard),
                "question bank cannot fill the requested difficulty mix"
            );
            return Err(AssessmentError::GenerationCountMismatch {
                expected: counts.total(),
                actual: picked.len(),
            });
        }

        Ok(picked)
    }
}
