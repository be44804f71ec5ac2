//! Scorer: overall, per-condition and per-category accuracy plus risk levels.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{Condition, Response, RiskLevel};

/// Category accuracy strictly below this is `high_risk`.
pub const HIGH_RISK_BELOW: f64 = 40.0;
/// Category accuracy strictly below this (and not high) is `moderate_risk`.
pub const MODERATE_RISK_BELOW: f64 = 60.0;

/// Map a category accuracy percentage to a risk level.
pub fn risk_level(accuracy: f64) -> RiskLevel {
    if accuracy < HIGH_RISK_BELOW {
        RiskLevel::HighRisk
    } else if accuracy < MODERATE_RISK_BELOW {
        RiskLevel::ModerateRisk
    } else {
        RiskLevel::LowRisk
    }
}

/// Correct/total counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub correct: usize,
    pub total: usize,
}

impl Tally {
    pub fn record(&mut self, is_correct: bool) {
        self.total += 1;
        if is_correct {
            self.correct += 1;
        }
    }

    /// Accuracy in percent, or `None` with no responses.
    pub fn accuracy(&self) -> Option<f64> {
        (self.total > 0).then(|| percentage(self.correct, self.total))
    }
}

/// Aggregated scores for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub total_questions: usize,
    pub correct_answers: usize,
    pub overall_accuracy: f64,
    pub dyslexia_score: Option<f64>,
    pub autism_score: Option<f64>,
    pub per_condition: BTreeMap<Condition, Tally>,
    pub category_accuracy: BTreeMap<String, f64>,
    pub risk_indicators: BTreeMap<String, RiskLevel>,
}

/// Score the stored responses of a session.
///
/// `served_questions` is the number of questions the session served; the
/// overall accuracy is measured against it so unanswered questions count as
/// missed. It never drops below the number of responses.
pub fn score_responses(responses: &[Response], served_questions: usize) -> ScoreSummary {
    let mut per_condition: BTreeMap<Condition, Tally> = BTreeMap::new();
    let mut per_category: BTreeMap<String, Tally> = BTreeMap::new();

    for r in responses {
        per_condition.entry(r.condition).or_default().record(r.is_correct);
        let category = r
            .category
            .clone()
            .unwrap_or_else(|| r.condition.to_string());
        per_category.entry(category).or_default().record(r.is_correct);
    }

    let correct_answers = responses.iter().filter(|r| r.is_correct).count();
    let total_questions = served_questions.max(responses.len());
    let overall_accuracy = if total_questions == 0 {
        0.0
    } else {
        percentage(correct_answers, total_questions)
    };

    let mut category_accuracy = BTreeMap::new();
    let mut risk_indicators = BTreeMap::new();
    for (category, tally) in per_category {
        if let Some(acc) = tally.accuracy() {
            category_accuracy.insert(category.clone(), acc);
            risk_indicators.insert(category, risk_level(acc));
        }
    }

    let condition_score = |c: Condition| per_condition.get(&c).and_then(Tally::accuracy);

    ScoreSummary {
        total_questions,
        correct_answers,
        overall_accuracy,
        dyslexia_score: condition_score(Condition::Dyslexia),
        autism_score: condition_score(Condition::Autism),
        per_condition,
        category_accuracy,
        risk_indicators,
    }
}

fn percentage(part: usize, whole: usize) -> f64 {
    (part as f64 * 100.0 / whole as f64).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Difficulty;
    use chrono::Utc;
    use uuid::Uuid;

    fn resp(condition: Condition, category: Option<&str>, correct: bool) -> Response {
        Response {
            session_id: Uuid::nil(),
            question_id: Uuid::new_v4(),
            selected_answer: "A".into(),
            is_correct: correct,
            response_time_seconds: Some(5.0),
            difficulty: Difficulty::Easy,
            condition,
            category: category.map(String::from),
            answered_at: Utc::now(),
        }
    }

    fn batch(condition: Condition, category: Option<&str>, correct: usize, total: usize) -> Vec<Response> {
        (0..total)
            .map(|i| resp(condition, category, i < correct))
            .collect()
    }

    #[test]
    fn risk_thresholds_are_strict() {
        assert_eq!(risk_level(0.0), RiskLevel::HighRisk);
        assert_eq!(risk_level(39.99), RiskLevel::HighRisk);
        assert_eq!(risk_level(40.0), RiskLevel::ModerateRisk);
        assert_eq!(risk_level(59.99), RiskLevel::ModerateRisk);
        assert_eq!(risk_level(60.0), RiskLevel::LowRisk);
        assert_eq!(risk_level(100.0), RiskLevel::LowRisk);
    }

    #[test]
    fn six_of_ten_dyslexia_is_low_risk() {
        let responses = batch(Condition::Dyslexia, None, 6, 10);
        let s = score_responses(&responses, 10);
        assert_eq!(s.dyslexia_score, Some(60.0));
        assert_eq!(s.autism_score, None);
        assert_eq!(s.overall_accuracy, 60.0);
        assert_eq!(s.risk_indicators["dyslexia"], RiskLevel::LowRisk);
    }

    #[test]
    fn condition_score_matches_stored_ratio() {
        let mut responses = batch(Condition::Dyslexia, Some("phonics"), 3, 4);
        responses.extend(batch(Condition::Autism, Some("social"), 1, 5));
        let s = score_responses(&responses, 9);

        assert_eq!(s.dyslexia_score, Some(75.0));
        assert_eq!(s.autism_score, Some(20.0));
        assert_eq!(s.correct_answers, 4);
        assert_eq!(s.per_condition[&Condition::Autism], Tally { correct: 1, total: 5 });
        assert_eq!(s.risk_indicators["phonics"], RiskLevel::LowRisk);
        assert_eq!(s.risk_indicators["social"], RiskLevel::HighRisk);
    }

    #[test]
    fn forty_percent_category_is_moderate() {
        let responses = batch(Condition::Autism, Some("routine"), 2, 5);
        let s = score_responses(&responses, 5);
        assert_eq!(s.category_accuracy["routine"], 40.0);
        assert_eq!(s.risk_indicators["routine"], RiskLevel::ModerateRisk);
    }

    #[test]
    fn categories_without_responses_are_omitted() {
        let responses = batch(Condition::Dyslexia, Some("phonics"), 1, 1);
        let s = score_responses(&responses, 10);
        assert_eq!(s.risk_indicators.len(), 1);
        assert!(!s.risk_indicators.contains_key("dyslexia"));
        assert!(!s.risk_indicators.contains_key("autism"));
    }

    #[test]
    fn unanswered_questions_count_against_overall() {
        let responses = batch(Condition::Dyslexia, None, 5, 5);
        let s = score_responses(&responses, 10);
        assert_eq!(s.overall_accuracy, 50.0);
        assert_eq!(s.dyslexia_score, Some(100.0));
        assert_eq!(s.total_questions, 10);
    }

    #[test]
    fn accuracy_bounded_and_correct_not_above_total() {
        let responses = batch(Condition::Autism, None, 4, 4);
        let s = score_responses(&responses, 2);
        assert!(s.correct_answers <= s.total_questions);
        assert!((0.0..=100.0).contains(&s.overall_accuracy));

        let empty = score_responses(&[], 0);
        assert_eq!(empty.overall_accuracy, 0.0);
        assert!(empty.risk_indicators.is_empty());
    }
}
