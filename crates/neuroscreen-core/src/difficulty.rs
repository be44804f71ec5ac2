//! Adaptive difficulty selection from pre-assessment data.
//!
//! The policy table is evaluated top to bottom and the first matching tier
//! wins. Weights are expressed per ten questions and scaled to the
//! assessment's fixed total with a largest-remainder split, so the three
//! buckets always sum exactly to the total.

use serde::{Deserialize, Serialize};

use crate::model::{AssessmentType, Condition, DifficultyCounts, PreAssessment, ReadingLevel};

/// Which row of the policy table applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    /// Under 7, or cannot read / beginning reader.
    EarlyLearner,
    /// Under 12, or early reader.
    YoungReader,
    /// Self-reported reading difficulty.
    ReadingDifficulty,
    Baseline,
}

impl PlanTier {
    /// Easy/moderate/hard weights per ten questions.
    pub fn weights(&self) -> [usize; 3] {
        match self {
            PlanTier::EarlyLearner => [6, 3, 1],
            PlanTier::YoungReader => [4, 4, 2],
            PlanTier::ReadingDifficulty => [4, 5, 1],
            PlanTier::Baseline => [2, 4, 4],
        }
    }
}

/// Difficulty mix chosen for one assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifficultyPlan {
    pub tier: PlanTier,
    /// Counts across the whole assessment.
    pub counts: DifficultyCounts,
    /// Counts requested from the question source for each condition.
    pub per_condition: Vec<(Condition, DifficultyCounts)>,
    pub customized: bool,
    pub reason: Option<String>,
    pub visual_assessment_recommended: bool,
}

/// Select the difficulty mix for a new assessment.
pub fn select_plan(pre: &PreAssessment, assessment_type: AssessmentType) -> DifficultyPlan {
    let (tier, reason) = classify(pre);
    let weights = tier.weights();

    let per_condition: Vec<_> = assessment_type
        .conditions()
        .iter()
        .map(|&c| (c, distribute(weights, crate::model::QUESTIONS_PER_CONDITION)))
        .collect();

    let counts = per_condition
        .iter()
        .fold(DifficultyCounts::default(), |mut acc, (_, c)| {
            acc.easy += c.easy;
            acc.moderate += c.moderate;
            acc.hard += c.hard;
            acc
        });

    DifficultyPlan {
        tier,
        counts,
        per_condition,
        customized: tier != PlanTier::Baseline,
        reason,
        visual_assessment_recommended: tier == PlanTier::EarlyLearner,
    }
}

fn classify(pre: &PreAssessment) -> (PlanTier, Option<String>) {
    let age = pre.age;
    let level = pre.reading_level;

    if age.is_some_and(|a| a < 7)
        || matches!(
            level,
            Some(ReadingLevel::CannotRead | ReadingLevel::BeginningReader)
        )
    {
        let reason = match age {
            Some(a) if a < 7 => format!("age {a} is under 7"),
            _ => "reading level is below early reader".to_string(),
        };
        return (
            PlanTier::EarlyLearner,
            Some(format!("{reason}; easy-weighted, visual assessment recommended")),
        );
    }

    if age.is_some_and(|a| a < 12) || level == Some(ReadingLevel::EarlyReader) {
        let reason = match age {
            Some(a) if a < 12 => format!("age {a} is under 12"),
            _ => "early reader".to_string(),
        };
        return (
            PlanTier::YoungReader,
            Some(format!("{reason}; moderately easy-weighted")),
        );
    }

    if pre.has_reading_difficulty {
        return (
            PlanTier::ReadingDifficulty,
            Some("self-reported reading difficulty; hard questions de-emphasized".into()),
        );
    }

    (PlanTier::Baseline, None)
}

/// Scale per-ten `weights` to `total`, preserving the exact sum.
///
/// Remainders go to the buckets with the largest fractional part, ties to
/// the easier bucket.
pub fn distribute(weights: [usize; 3], total: usize) -> DifficultyCounts {
    let weight_sum: usize = weights.iter().sum();
    if weight_sum == 0 {
        return DifficultyCounts {
            easy: total,
            moderate: 0,
            hard: 0,
        };
    }

    let mut counts = [0usize; 3];
    let mut remainders = [(0usize, 0usize); 3];
    for (i, w) in weights.iter().enumerate() {
        let scaled = w * total;
        counts[i] = scaled / weight_sum;
        remainders[i] = (scaled % weight_sum, i);
    }

    let assigned: usize = counts.iter().sum();
    remainders.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    for &(_, i) in remainders.iter().take(total - assigned) {
        counts[i] += 1;
    }

    DifficultyCounts {
        easy: counts[0],
        moderate: counts[1],
        hard: counts[2],
    }
}
