//! Session Recorder: verifies answers against stored keys and persists them.
//!
//! Recording runs in two phases. The first resolves every answer against its
//! question and grades it; an unknown question is skipped, while a malformed
//! answer token rejects the whole batch before anything is written. The
//! second phase upserts each verified response and any timing records.

use std::collections::HashMap;

use chrono::Utc;
use uuid::Uuid;

use crate::error::AssessmentError;
use crate::model::{AssessmentSession, Question, QuestionTiming, Response};
use crate::store::AssessmentStore;
use crate::submission::{AnswerInput, TimingInput};

/// What happened to a submitted batch.
#[derive(Debug, Clone, Default)]
pub struct RecordOutcome {
    /// Responses written, in submission order.
    pub recorded: Vec<Response>,
    /// Question ids that were skipped (unknown, foreign, or failed to persist).
    pub skipped: Vec<Uuid>,
    /// Number of timing records written.
    pub timings_recorded: usize,
}

struct Verified<'a> {
    answer: &'a AnswerInput,
    question: Question,
    is_correct: bool,
}

/// Verify and persist a batch of answers for `session`.
pub async fn record_answers(
    store: &dyn AssessmentStore,
    session: &AssessmentSession,
    answers: &[AnswerInput],
    timings: &[TimingInput],
) -> Result<RecordOutcome, AssessmentError> {
    let mut outcome = RecordOutcome::default();

    // The last answer for a question within one batch wins.
    let mut order: Vec<Uuid> = Vec::new();
    let mut latest: HashMap<Uuid, &AnswerInput> = HashMap::new();
    for answer in answers {
        if latest.insert(answer.question_id, answer).is_none() {
            order.push(answer.question_id);
        }
    }

    let mut verified = Vec::with_capacity(order.len());
    for question_id in order {
        let answer = latest[&question_id];

        let question = if session.question_ids.contains(&question_id) {
            store.get_question(question_id).await?
        } else {
            None
        };
        let Some(question) = question else {
            let err = AssessmentError::QuestionNotFound(question_id);
            tracing::warn!(session_id = %session.id, "skipping answer: {err}");
            outcome.skipped.push(question_id);
            continue;
        };

        if let Some(claimed) = answer.is_correct {
            tracing::debug!(%question_id, claimed, "ignoring client correctness claim");
        }
        let is_correct = question.kind.grade(question.id, &answer.selected_answer)?;
        verified.push(Verified {
            answer,
            question,
            is_correct,
        });
    }

    let timing_seconds: HashMap<Uuid, f64> = timings
        .iter()
        .map(|t| (t.question_id, t.response_time))
        .collect();

    let now = Utc::now();
    for v in verified {
        let response_time_seconds = v
            .answer
            .response_time_seconds
            .filter(|t| *t > 0.0)
            .or_else(|| timing_seconds.get(&v.question.id).copied());

        let response = Response {
            session_id: session.id,
            question_id: v.question.id,
            selected_answer: v.answer.selected_answer.trim().to_string(),
            is_correct: v.is_correct,
            response_time_seconds,
            difficulty: v.question.difficulty,
            condition: v.question.condition,
            category: v.question.category.clone(),
            answered_at: now,
        };

        match store.upsert_response(&response).await {
            Ok(()) => outcome.recorded.push(response),
            Err(e) => {
                tracing::error!(
                    session_id = %session.id,
                    question_id = %response.question_id,
                    "failed to persist response: {e}"
                );
                outcome.skipped.push(response.question_id);
            }
        }
    }

    for timing in timings {
        let Some(question) = store_question_meta(store, session, timing.question_id).await else {
            continue;
        };
        let record = QuestionTiming {
            session_id: session.id,
            question_id: timing.question_id,
            start_time: timing.start_time,
            end_time: timing.end_time,
            response_time: timing.response_time,
            difficulty: question.difficulty,
            condition: question.condition,
        };
        match store.upsert_timing(&record).await {
            Ok(()) => outcome.timings_recorded += 1,
            Err(e) => tracing::warn!(
                session_id = %session.id,
                question_id = %timing.question_id,
                "failed to persist question timing: {e}"
            ),
        }
    }

    tracing::info!(
        session_id = %session.id,
        recorded = outcome.recorded.len(),
        skipped = outcome.skipped.len(),
        timings = outcome.timings_recorded,
        "recorded answers"
    );

    Ok(outcome)
}

async fn store_question_meta(
    store: &dyn AssessmentStore,
    session: &AssessmentSession,
    question_id: Uuid,
) -> Option<Question> {
    if !session.question_ids.contains(&question_id) {
        return None;
    }
    match store.get_question(question_id).await {
        Ok(question) => question,
        Err(e) => {
            tracing::warn!(
                session_id = %session.id,
                %question_id,
                "failed to load question for timing record: {e}"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AssessmentType, Condition, Difficulty, QuestionKind};
    use crate::store::MemoryStore;

    fn mc(condition: Condition, correct: usize) -> Question {
        Question {
            id: Uuid::new_v4(),
            text: "Pick one".into(),
            condition,
            difficulty: Difficulty::Moderate,
            category: Some("letters".into()),
            explanation: String::new(),
            kind: QuestionKind::MultipleChoice {
                options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                correct_answer: correct,
            },
            created_at: Utc::now(),
        }
    }

    fn answer(question_id: Uuid, token: &str, time: Option<f64>) -> AnswerInput {
        AnswerInput {
            question_id,
            selected_answer: token.into(),
            response_time_seconds: time,
            is_correct: None,
        }
    }

    async fn setup(n: usize) -> (MemoryStore, AssessmentSession, Vec<Question>) {
        let store = MemoryStore::new();
        let questions: Vec<_> = (0..n).map(|_| mc(Condition::Dyslexia, 0)).collect();
        store.insert_questions(&questions).await.unwrap();
        let mut session = AssessmentSession::new("stu", AssessmentType::Dyslexia);
        session.question_ids = questions.iter().map(|q| q.id).collect();
        store.insert_session(&session).await.unwrap();
        (store, session, questions)
    }

    #[tokio::test]
    async fn correctness_is_derived_server_side() {
        let (store, session, qs) = setup(2).await;
        let mut lying = answer(qs[1].id, "C", Some(4.0));
        lying.is_correct = Some(true);

        let outcome = record_answers(&store, &session, &[answer(qs[0].id, "A", Some(3.0)), lying], &[])
            .await
            .unwrap();

        assert_eq!(outcome.recorded.len(), 2);
        assert!(outcome.recorded[0].is_correct);
        assert!(!outcome.recorded[1].is_correct);
        assert_eq!(outcome.recorded[0].category.as_deref(), Some("letters"));
    }

    #[tokio::test]
    async fn unknown_question_is_skipped_not_fatal() {
        let (store, session, qs) = setup(1).await;
        let stray = Uuid::new_v4();
        let outcome = record_answers(
            &store,
            &session,
            &[answer(stray, "A", None), answer(qs[0].id, "A", None)],
            &[],
        )
        .await
        .unwrap();

        assert_eq!(outcome.skipped, vec![stray]);
        assert_eq!(outcome.recorded.len(), 1);
    }

    #[tokio::test]
    async fn question_outside_session_is_skipped() {
        let (store, session, _) = setup(1).await;
        let foreign = mc(Condition::Dyslexia, 0);
        store.insert_questions(std::slice::from_ref(&foreign)).await.unwrap();

        let outcome = record_answers(&store, &session, &[answer(foreign.id, "A", None)], &[])
            .await
            .unwrap();
        assert_eq!(outcome.skipped, vec![foreign.id]);
        assert!(store.responses_for_session(session.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_token_rejects_batch_before_persisting() {
        let (store, session, qs) = setup(2).await;
        let err = record_answers(
            &store,
            &session,
            &[answer(qs[0].id, "A", None), answer(qs[1].id, "Z", None)],
            &[],
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AssessmentError::InvalidAnswerFormat { .. }));
        assert!(store.responses_for_session(session.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn resubmission_overwrites_without_double_counting() {
        let (store, session, qs) = setup(1).await;
        record_answers(&store, &session, &[answer(qs[0].id, "B", None)], &[])
            .await
            .unwrap();
        record_answers(&store, &session, &[answer(qs[0].id, "A", None)], &[])
            .await
            .unwrap();

        let rows = store.responses_for_session(session.id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].selected_answer, "A");
        assert!(rows[0].is_correct);
    }

    #[tokio::test]
    async fn last_answer_in_batch_wins() {
        let (store, session, qs) = setup(1).await;
        let outcome = record_answers(
            &store,
            &session,
            &[answer(qs[0].id, "A", None), answer(qs[0].id, "D", None)],
            &[],
        )
        .await
        .unwrap();
        assert_eq!(outcome.recorded.len(), 1);
        assert_eq!(outcome.recorded[0].selected_answer, "D");
    }

    /// Fails every lookup of one question id.
    struct BrokenLookupStore {
        inner: MemoryStore,
        broken: Uuid,
    }

    #[async_trait::async_trait]
    impl AssessmentStore for BrokenLookupStore {
        async fn insert_questions(&self, questions: &[Question]) -> Result<(), AssessmentError> {
            self.inner.insert_questions(questions).await
        }

        async fn get_question(&self, id: Uuid) -> Result<Option<Question>, AssessmentError> {
            if id == self.broken {
                return Err(AssessmentError::Storage("question table unavailable".into()));
            }
            self.inner.get_question(id).await
        }

        async fn insert_session(&self, session: &AssessmentSession) -> Result<(), AssessmentError> {
            self.inner.insert_session(session).await
        }

        async fn get_session(&self, id: Uuid) -> Result<Option<AssessmentSession>, AssessmentError> {
            self.inner.get_session(id).await
        }

        async fn update_session(&self, session: &AssessmentSession) -> Result<(), AssessmentError> {
            self.inner.update_session(session).await
        }

        async fn active_session_with_question(
            &self,
            question_id: Uuid,
        ) -> Result<Option<Uuid>, AssessmentError> {
            self.inner.active_session_with_question(question_id).await
        }

        async fn upsert_response(&self, response: &Response) -> Result<(), AssessmentError> {
            self.inner.upsert_response(response).await
        }

        async fn responses_for_session(
            &self,
            session_id: Uuid,
        ) -> Result<Vec<Response>, AssessmentError> {
            self.inner.responses_for_session(session_id).await
        }

        async fn upsert_timing(&self, timing: &QuestionTiming) -> Result<(), AssessmentError> {
            self.inner.upsert_timing(timing).await
        }

        async fn timings_for_session(
            &self,
            session_id: Uuid,
        ) -> Result<Vec<QuestionTiming>, AssessmentError> {
            self.inner.timings_for_session(session_id).await
        }

        async fn get_profile(
            &self,
            student_ref: &str,
        ) -> Result<Option<crate::model::StudentProfile>, AssessmentError> {
            self.inner.get_profile(student_ref).await
        }

        async fn save_profile(
            &self,
            profile: &crate::model::StudentProfile,
        ) -> Result<(), AssessmentError> {
            self.inner.save_profile(profile).await
        }
    }

    #[tokio::test]
    async fn timing_lookup_failure_skips_only_that_timing() {
        let (inner, session, qs) = setup(2).await;
        let store = BrokenLookupStore {
            inner,
            broken: qs[1].id,
        };
        let timings: Vec<_> = qs
            .iter()
            .map(|q| TimingInput {
                question_id: q.id,
                start_time: 0,
                end_time: 3_000,
                response_time: 3.0,
            })
            .collect();

        let outcome = record_answers(&store, &session, &[answer(qs[0].id, "A", None)], &timings)
            .await
            .unwrap();

        assert_eq!(outcome.recorded.len(), 1);
        assert_eq!(outcome.timings_recorded, 1);
        let stored = store.timings_for_session(session.id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].question_id, qs[0].id);
    }

    #[tokio::test]
    async fn timing_fills_missing_response_time() {
        let (store, session, qs) = setup(2).await;
        let timings = vec![
            TimingInput {
                question_id: qs[0].id,
                start_time: 1_000,
                end_time: 8_500,
                response_time: 7.5,
            },
            TimingInput {
                question_id: Uuid::new_v4(),
                start_time: 0,
                end_time: 1,
                response_time: 0.001,
            },
        ];
        let outcome = record_answers(
            &store,
            &session,
            &[answer(qs[0].id, "A", None), answer(qs[1].id, "A", Some(2.0))],
            &timings,
        )
        .await
        .unwrap();

        assert_eq!(outcome.recorded[0].response_time_seconds, Some(7.5));
        assert_eq!(outcome.recorded[1].response_time_seconds, Some(2.0));
        assert_eq!(outcome.timings_recorded, 1);
        assert_eq!(store.timings_for_session(session.id).await.unwrap().len(), 1);
    }
}
