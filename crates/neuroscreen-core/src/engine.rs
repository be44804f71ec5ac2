//! Assessment service orchestrator.
//!
//! Wires the question source, store and risk predictor into the start,
//! submit, results and abandon operations. Within one submission the order
//! is fixed: responses persisted, scores computed, predictions made, session
//! saved, then the profile updated.
//!
//! Submit and abandon hold a per-session lock for their whole
//! read-modify-write, so a session is always written from the responses
//! stored at that moment and a completed session is never overwritten by a
//! stale copy.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use futures::future::try_join_all;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as SessionLock, OwnedMutexGuard};
use uuid::Uuid;

use crate::difficulty::select_plan;
use crate::error::AssessmentError;
use crate::model::{
    AssessmentSession, AssessmentType, Condition, Difficulty, DifficultyCounts, Prediction,
    PredictionLevel, Question, Response, SessionStatus, StudentProfile, QUESTIONS_PER_CONDITION,
};
use crate::predictor::{self, RiskPredictor};
use crate::profile;
use crate::recorder::record_answers;
use crate::scoring::{score_responses, HIGH_RISK_BELOW, MODERATE_RISK_BELOW};
use crate::store::AssessmentStore;
use crate::submission::{
    MissedQuestion, StartRequest, StartedAssessment, SubmissionResult, SubmitRequest,
};
use crate::traits::QuestionSource;

/// Behavior switches for the service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Shuffle the served question order across conditions.
    pub shuffle_questions: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            shuffle_questions: true,
        }
    }
}

/// Static description of the quiz policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizInfo {
    pub conditions: Vec<Condition>,
    pub assessment_types: BTreeMap<String, usize>,
    pub difficulty_levels: Vec<Difficulty>,
    pub questions_per_condition: usize,
    pub question_types: Vec<String>,
    pub high_risk_below: f64,
    pub moderate_risk_below: f64,
    pub prediction_levels: Vec<PredictionLevel>,
    pub question_source: String,
    pub classifier_available: bool,
}

/// The assessment pipeline.
pub struct AssessmentService {
    store: Arc<dyn AssessmentStore>,
    source: Arc<dyn QuestionSource>,
    predictor: RiskPredictor,
    config: ServiceConfig,
    session_locks: Mutex<HashMap<Uuid, Arc<SessionLock<()>>>>,
}

impl AssessmentService {
    pub fn new(
        store: Arc<dyn AssessmentStore>,
        source: Arc<dyn QuestionSource>,
        predictor: RiskPredictor,
    ) -> Self {
        Self {
            store,
            source,
            predictor,
            config: ServiceConfig::default(),
            session_locks: Mutex::default(),
        }
    }

    pub fn with_config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &Arc<dyn AssessmentStore> {
        &self.store
    }

    pub fn predictor(&self) -> &RiskPredictor {
        &self.predictor
    }

    /// Open a session and serve its questions.
    ///
    /// Questions for each condition are requested concurrently. Nothing is
    /// persisted unless the combined count matches the assessment's total.
    pub async fn start(&self, request: StartRequest) -> Result<StartedAssessment, AssessmentError> {
        request.validate()?;
        let assessment_type = request.assessment_type;
        let plan = select_plan(&request.pre_assessment, assessment_type);

        let batches = try_join_all(plan.per_condition.iter().map(|&(condition, counts)| {
            let source = Arc::clone(&self.source);
            async move {
                let questions = source.generate(condition, counts).await?;
                check_mix(&questions, counts)?;
                Ok::<_, AssessmentError>(questions)
            }
        }))
        .await?;

        let mut questions: Vec<Question> = batches.into_iter().flatten().collect();
        let expected = assessment_type.total_questions();
        if questions.len() != expected {
            return Err(AssessmentError::GenerationCountMismatch {
                expected,
                actual: questions.len(),
            });
        }

        if self.config.shuffle_questions {
            let mut rng = rand::thread_rng();
            questions.shuffle(&mut rng);
        }

        self.store.insert_questions(&questions).await?;

        let mut session = AssessmentSession::new(&request.student_ref, assessment_type);
        session.question_ids = questions.iter().map(|q| q.id).collect();
        session.total_questions = questions.len();
        session.pre_assessment = request.pre_assessment;
        session.difficulty_distribution = plan.counts;
        session.difficulty_customized = plan.customized;
        session.customization_reason = plan.reason.clone();
        session.visual_assessment_recommended = plan.visual_assessment_recommended;
        self.store.insert_session(&session).await?;

        tracing::info!(
            session_id = %session.id,
            student_ref = %session.student_ref,
            %assessment_type,
            source = self.source.name(),
            tier = ?plan.tier,
            "started assessment"
        );

        Ok(StartedAssessment {
            session_id: session.id,
            assessment_type,
            total_questions: session.total_questions,
            difficulty_distribution: plan.counts,
            difficulty_customized: plan.customized,
            customization_reason: plan.reason,
            visual_assessment_recommended: plan.visual_assessment_recommended,
            questions: questions.iter().map(Question::view).collect(),
        })
    }

    /// Record, score and classify a batch of answers, completing the session.
    pub async fn submit(&self, request: SubmitRequest) -> Result<SubmissionResult, AssessmentError> {
        request.validate()?;
        let _guard = self.lock_session(request.session_id).await;
        let mut session = self.session(request.session_id).await?;

        if let Some(claimed) = request.assessment_type {
            if claimed != session.assessment_type {
                return Err(AssessmentError::validation(
                    "assessment_type",
                    format!(
                        "session is a {} assessment, not {claimed}",
                        session.assessment_type
                    ),
                ));
            }
        }
        if session.status == SessionStatus::Abandoned {
            return Err(AssessmentError::validation(
                "session_id",
                "session was abandoned and no longer accepts answers",
            ));
        }

        let outcome = record_answers(
            self.store.as_ref(),
            &session,
            &request.answers,
            &request.question_timings,
        )
        .await?;

        let responses = self.store.responses_for_session(session.id).await?;
        let summary = score_responses(&responses, session.total_questions);
        let predictions = self.predict(&session, responses.clone()).await;

        let now = Utc::now();
        session.status = SessionStatus::Completed;
        session.completed_at = Some(now);
        session.total_time = request.total_time.or_else(|| {
            u64::try_from((now - session.started_at).num_seconds()).ok()
        });
        session.total_questions = summary.total_questions;
        session.correct_answers = summary.correct_answers;
        session.overall_accuracy = Some(summary.overall_accuracy);
        session.dyslexia_score = summary.dyslexia_score;
        session.autism_score = summary.autism_score;
        session.category_accuracy = summary.category_accuracy;
        session.risk_indicators = summary.risk_indicators;

        let headline = headline_prediction(&predictions);
        session.predicted_level = headline.map(|p| p.level);
        session.predicted_confidence = headline.map(|p| p.confidence);
        session.predictions = predictions;
        self.store.update_session(&session).await?;

        if let Err(e) = profile::update_profile(self.store.as_ref(), &session).await {
            tracing::error!(
                session_id = %session.id,
                student_ref = %session.student_ref,
                "failed to update student profile: {e}"
            );
        }

        let missed_questions = self.missed_questions(&responses).await?;

        tracing::info!(
            session_id = %session.id,
            correct = session.correct_answers,
            total = session.total_questions,
            accuracy = summary.overall_accuracy,
            predicted = ?session.predicted_level,
            "completed assessment"
        );

        Ok(SubmissionResult {
            session_id: session.id,
            assessment_type: session.assessment_type,
            total_questions: session.total_questions,
            correct_answers: session.correct_answers,
            accuracy_percentage: summary.overall_accuracy,
            dyslexia_score: session.dyslexia_score,
            autism_score: session.autism_score,
            risk_indicators: session.risk_indicators.clone(),
            predictions: session.predictions.clone(),
            predicted_level: session.predicted_level,
            predicted_confidence: session.predicted_confidence,
            missed_questions,
            skipped_questions: outcome.skipped,
            message: format!(
                "Assessment completed: {} of {} correct",
                session.correct_answers, session.total_questions
            ),
        })
    }

    /// The persisted session record.
    pub async fn results(&self, session_id: Uuid) -> Result<AssessmentSession, AssessmentError> {
        self.session(session_id).await
    }

    /// Mark an in-progress session as abandoned. Idempotent.
    pub async fn abandon(&self, session_id: Uuid) -> Result<AssessmentSession, AssessmentError> {
        let _guard = self.lock_session(session_id).await;
        let mut session = self.session(session_id).await?;
        match session.status {
            SessionStatus::Abandoned => Ok(session),
            SessionStatus::Completed => Err(AssessmentError::validation(
                "session_id",
                "completed sessions cannot be abandoned",
            )),
            SessionStatus::InProgress => {
                session.status = SessionStatus::Abandoned;
                self.store.update_session(&session).await?;
                tracing::info!(session_id = %session.id, "abandoned assessment");
                Ok(session)
            }
        }
    }

    /// Full question record including the answer key, for review.
    ///
    /// Refused while any in-progress session serves the question.
    pub async fn question(&self, question_id: Uuid) -> Result<Question, AssessmentError> {
        let question = self
            .store
            .get_question(question_id)
            .await?
            .ok_or(AssessmentError::QuestionNotFound(question_id))?;
        if let Some(session_id) = self.store.active_session_with_question(question_id).await? {
            return Err(AssessmentError::AnswerKeyLocked(session_id));
        }
        Ok(question)
    }

    /// Every question a finished session served, with answer keys, in
    /// served order.
    pub async fn review(&self, session_id: Uuid) -> Result<Vec<Question>, AssessmentError> {
        let session = self.session(session_id).await?;
        if session.status == SessionStatus::InProgress {
            return Err(AssessmentError::AnswerKeyLocked(session_id));
        }
        let mut questions = Vec::with_capacity(session.question_ids.len());
        for &id in &session.question_ids {
            match self.store.get_question(id).await? {
                Some(q) => questions.push(q),
                None => tracing::warn!(%session_id, question_id = %id, "served question missing from store"),
            }
        }
        Ok(questions)
    }

    pub async fn profile(&self, student_ref: &str) -> Result<Option<StudentProfile>, AssessmentError> {
        self.store.get_profile(student_ref).await
    }

    pub fn quiz_info(&self) -> QuizInfo {
        QuizInfo {
            conditions: Condition::ALL.to_vec(),
            assessment_types: [
                AssessmentType::Dyslexia,
                AssessmentType::Autism,
                AssessmentType::Both,
            ]
            .into_iter()
            .map(|t| (t.to_string(), t.total_questions()))
            .collect(),
            difficulty_levels: Difficulty::ALL.to_vec(),
            questions_per_condition: QUESTIONS_PER_CONDITION,
            question_types: ["multiple_choice", "true_false", "sequencing", "audio_response"]
                .into_iter()
                .map(String::from)
                .collect(),
            high_risk_below: HIGH_RISK_BELOW,
            moderate_risk_below: MODERATE_RISK_BELOW,
            prediction_levels: PredictionLevel::ALL.to_vec(),
            question_source: self.source.name().to_string(),
            classifier_available: self.predictor.is_available(),
        }
    }

    /// Serialize submit and abandon per session.
    async fn lock_session(&self, session_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self
                .session_locks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(session_id).or_default())
        };
        lock.lock_owned().await
    }

    async fn session(&self, session_id: Uuid) -> Result<AssessmentSession, AssessmentError> {
        self.store
            .get_session(session_id)
            .await?
            .ok_or(AssessmentError::SessionNotFound(session_id))
    }

    /// Run the classifier on the blocking pool. Every condition the session
    /// covers gets a prediction; conditions without responses get `no`.
    async fn predict(
        &self,
        session: &AssessmentSession,
        responses: Vec<Response>,
    ) -> BTreeMap<Condition, Prediction> {
        let worker = self.predictor.clone();
        let mut per_condition: BTreeMap<Condition, usize> = BTreeMap::new();
        for r in &responses {
            *per_condition.entry(r.condition).or_default() += 1;
        }

        let mut predictions =
            match tokio::task::spawn_blocking(move || worker.predict_by_condition(&responses)).await
            {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(session_id = %session.id, "prediction task failed: {e}");
                    per_condition
                        .into_iter()
                        .map(|(c, n)| (c, predictor::fallback(n)))
                        .collect()
                }
            };

        for &condition in session.assessment_type.conditions() {
            predictions
                .entry(condition)
                .or_insert_with(|| self.predictor.predict(&[]));
        }
        predictions
    }

    async fn missed_questions(
        &self,
        responses: &[Response],
    ) -> Result<Vec<MissedQuestion>, AssessmentError> {
        let mut missed = Vec::new();
        for r in responses.iter().filter(|r| !r.is_correct) {
            let correct_answer = match self.store.get_question(r.question_id).await? {
                Some(q) => q.kind.correct_answer_display(),
                None => String::new(),
            };
            missed.push(MissedQuestion {
                question_id: r.question_id,
                condition: r.condition,
                difficulty: r.difficulty,
                selected_answer: r.selected_answer.clone(),
                correct_answer,
            });
        }
        Ok(missed)
    }
}

/// A source batch must match the requested total and every difficulty bucket.
fn check_mix(questions: &[Question], counts: DifficultyCounts) -> Result<(), AssessmentError> {
    if questions.len() != counts.total() {
        return Err(AssessmentError::GenerationCountMismatch {
            expected: counts.total(),
            actual: questions.len(),
        });
    }
    for difficulty in Difficulty::ALL {
        let actual = questions.iter().filter(|q| q.difficulty == difficulty).count();
        if actual != counts.get(difficulty) {
            return Err(AssessmentError::DifficultyMismatch {
                difficulty,
                expected: counts.get(difficulty),
                actual,
            });
        }
    }
    Ok(())
}

/// Dyslexia's prediction when it has responses, otherwise autism's.
fn headline_prediction(predictions: &BTreeMap<Condition, Prediction>) -> Option<&Prediction> {
    [Condition::Dyslexia, Condition::Autism]
        .iter()
        .filter_map(|c| predictions.get(c))
        .find(|p| p.question_count > 0)
        .or_else(|| predictions.values().next())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::BankSource;
    use crate::error::PredictionError;
    use crate::model::QuestionKind;
    use crate::parser::QuestionBank;
    use crate::store::MemoryStore;
    use crate::submission::AnswerInput;
    use crate::traits::{ClassPrediction, Classifier, ResponseFeatures};
    use async_trait::async_trait;

    struct ConstClassifier(PredictionLevel);

    impl Classifier for ConstClassifier {
        fn version(&self) -> &str {
            "const"
        }

        fn predict(&self, rows: &[ResponseFeatures]) -> Result<Vec<ClassPrediction>, PredictionError> {
            Ok(rows
                .iter()
                .map(|_| ClassPrediction {
                    label: self.0,
                    probabilities: vec![0.1, 0.1, 0.1, 0.7],
                })
                .collect())
        }
    }

    struct ExplodingClassifier;

    impl Classifier for ExplodingClassifier {
        fn version(&self) -> &str {
            "exploding"
        }

        fn predict(&self, _: &[ResponseFeatures]) -> Result<Vec<ClassPrediction>, PredictionError> {
            Err(PredictionError::Inference("model file truncated".into()))
        }
    }

    /// Always returns one question too few.
    struct ShortSource;

    #[async_trait]
    impl QuestionSource for ShortSource {
        fn name(&self) -> &str {
            "short"
        }

        async fn generate(
            &self,
            condition: Condition,
            counts: crate::model::DifficultyCounts,
        ) -> Result<Vec<Question>, AssessmentError> {
            Ok((1..counts.total()).map(|_| tf(condition, Difficulty::Easy)).collect())
        }
    }

    /// Right total, but every question is hard.
    struct AllHardSource;

    #[async_trait]
    impl QuestionSource for AllHardSource {
        fn name(&self) -> &str {
            "all-hard"
        }

        async fn generate(
            &self,
            condition: Condition,
            counts: crate::model::DifficultyCounts,
        ) -> Result<Vec<Question>, AssessmentError> {
            Ok((0..counts.total()).map(|_| tf(condition, Difficulty::Hard)).collect())
        }
    }

    /// Every question's correct answer is "true".
    fn tf(condition: Condition, difficulty: Difficulty) -> Question {
        Question {
            id: Uuid::new_v4(),
            text: "True?".into(),
            condition,
            difficulty,
            category: Some(format!("{condition}_skills")),
            explanation: String::new(),
            kind: QuestionKind::TrueFalse {
                correct_answer: true,
            },
            created_at: Utc::now(),
        }
    }

    fn bank() -> QuestionBank {
        let mut questions = Vec::new();
        for c in Condition::ALL {
            for d in Difficulty::ALL {
                questions.extend((0..12).map(|_| tf(c, d)));
            }
        }
        QuestionBank::new("test", "Test", questions)
    }

    fn service(predictor: RiskPredictor) -> (AssessmentService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let svc = AssessmentService::new(store.clone(), Arc::new(BankSource::new(bank())), predictor);
        (svc, store)
    }

    fn start_request(assessment_type: AssessmentType, age: Option<u32>) -> StartRequest {
        StartRequest {
            student_ref: "stu-1".into(),
            assessment_type,
            pre_assessment: crate::model::PreAssessment {
                age,
                ..Default::default()
            },
        }
    }

    /// Answer the first `correct` questions right and the rest wrong.
    fn submit_request(started: &StartedAssessment, correct: usize) -> SubmitRequest {
        SubmitRequest {
            session_id: started.session_id,
            assessment_type: Some(started.assessment_type),
            answers: started
                .questions
                .iter()
                .enumerate()
                .map(|(i, q)| AnswerInput {
                    question_id: q.id,
                    selected_answer: if i < correct { "true" } else { "false" }.into(),
                    response_time_seconds: Some(4.0),
                    is_correct: Some(true),
                })
                .collect(),
            question_timings: vec![],
            total_time: Some(300),
            total_questions: None,
            correct_answers: None,
        }
    }

    #[tokio::test]
    async fn young_child_combined_assessment() {
        let (svc, store) = service(RiskPredictor::unavailable());
        let started = svc
            .start(start_request(AssessmentType::Both, Some(5)))
            .await
            .unwrap();

        assert_eq!(started.questions.len(), 20);
        assert_eq!(started.total_questions, 20);
        assert!(started.visual_assessment_recommended);
        assert_eq!(started.difficulty_distribution.easy, 12);

        let session = store.get_session(started.session_id).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::InProgress);
        assert_eq!(session.question_ids.len(), 20);
        assert_eq!(store.snapshot().unwrap().questions.len(), 20);
    }

    #[tokio::test]
    async fn count_mismatch_persists_nothing() {
        let store = Arc::new(MemoryStore::new());
        let svc = AssessmentService::new(store.clone(), Arc::new(ShortSource), RiskPredictor::unavailable());
        let err = svc
            .start(start_request(AssessmentType::Both, Some(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, AssessmentError::GenerationCountMismatch { .. }));
        let snapshot = store.snapshot().unwrap();
        assert!(snapshot.questions.is_empty());
        assert!(snapshot.sessions.is_empty());
    }

    #[tokio::test]
    async fn invalid_age_rejected() {
        let (svc, _) = service(RiskPredictor::unavailable());
        let err = svc
            .start(start_request(AssessmentType::Dyslexia, Some(2)))
            .await
            .unwrap_err();
        assert_eq!(err.field(), Some("age"));
    }

    #[tokio::test]
    async fn submit_scores_and_predicts() {
        let (svc, store) =
            service(RiskPredictor::new(Arc::new(ConstClassifier(PredictionLevel::High))));
        let started = svc
            .start(start_request(AssessmentType::Dyslexia, Some(20)))
            .await
            .unwrap();

        let result = svc.submit(submit_request(&started, 6)).await.unwrap();
        assert_eq!(result.correct_answers, 6);
        assert_eq!(result.total_questions, 10);
        assert_eq!(result.accuracy_percentage, 60.0);
        assert_eq!(result.dyslexia_score, Some(60.0));
        assert_eq!(result.autism_score, None);
        assert_eq!(result.predicted_level, Some(PredictionLevel::High));
        assert!((result.predicted_confidence.unwrap() - 0.7).abs() < 1e-9);
        assert_eq!(result.missed_questions.len(), 4);
        assert_eq!(result.missed_questions[0].correct_answer, "true");
        assert_eq!(result.missed_questions[0].selected_answer, "false");

        let session = svc.results(started.session_id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.total_time, Some(300));

        let profile = store.get_profile("stu-1").await.unwrap().unwrap();
        assert_eq!(profile.assessment_score, Some(60.0));
        assert_eq!(profile.dyslexia_prediction_level, Some(PredictionLevel::High));
        assert!(profile.autism_prediction_level.is_none());
    }

    #[tokio::test]
    async fn classifier_failure_still_completes() {
        let (svc, _) = service(RiskPredictor::new(Arc::new(ExplodingClassifier)));
        let started = svc
            .start(start_request(AssessmentType::Autism, None))
            .await
            .unwrap();

        let mut request = submit_request(&started, 3);
        request.answers.truncate(5);
        let result = svc.submit(request).await.unwrap();

        assert_eq!(result.predicted_level, Some(PredictionLevel::Low));
        assert_eq!(result.predicted_confidence, Some(0.5));
        assert!(result.predictions[&Condition::Autism].fallback);
        assert_eq!(result.correct_answers, 3);
        assert_eq!(result.accuracy_percentage, 30.0);

        let session = svc.results(started.session_id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.autism_score, Some(60.0));
    }

    #[tokio::test]
    async fn combined_headline_mirrors_dyslexia() {
        let (svc, _) = service(RiskPredictor::new(Arc::new(ConstClassifier(PredictionLevel::Medium))));
        let started = svc
            .start(start_request(AssessmentType::Both, Some(30)))
            .await
            .unwrap();

        // Answer only autism questions.
        let autism_ids: Vec<Uuid> = started
            .questions
            .iter()
            .filter(|q| q.condition == Condition::Autism)
            .map(|q| q.id)
            .collect();
        let mut request = submit_request(&started, 20);
        request.answers.retain(|a| autism_ids.contains(&a.question_id));

        let result = svc.submit(request).await.unwrap();
        assert_eq!(result.dyslexia_score, None);
        assert_eq!(result.autism_score, Some(100.0));
        assert_eq!(result.predictions[&Condition::Dyslexia].level, PredictionLevel::No);
        assert_eq!(result.predictions[&Condition::Dyslexia].confidence, 0.0);
        assert_eq!(result.predicted_level, Some(PredictionLevel::Medium));
    }

    #[tokio::test]
    async fn resubmission_is_idempotent() {
        let (svc, store) = service(RiskPredictor::unavailable());
        let started = svc
            .start(start_request(AssessmentType::Dyslexia, None))
            .await
            .unwrap();

        svc.submit(submit_request(&started, 2)).await.unwrap();
        let again = svc.submit(submit_request(&started, 8)).await.unwrap();

        assert_eq!(again.correct_answers, 8);
        assert_eq!(
            store.responses_for_session(started.session_id).await.unwrap().len(),
            10
        );
    }

    #[tokio::test]
    async fn abandoned_sessions_reject_submissions() {
        let (svc, _) = service(RiskPredictor::unavailable());
        let started = svc
            .start(start_request(AssessmentType::Autism, None))
            .await
            .unwrap();

        let abandoned = svc.abandon(started.session_id).await.unwrap();
        assert_eq!(abandoned.status, SessionStatus::Abandoned);
        assert!(svc.abandon(started.session_id).await.is_ok());

        let err = svc.submit(submit_request(&started, 5)).await.unwrap_err();
        assert_eq!(err.field(), Some("session_id"));
    }

    #[tokio::test]
    async fn completed_sessions_cannot_be_abandoned() {
        let (svc, _) = service(RiskPredictor::unavailable());
        let started = svc
            .start(start_request(AssessmentType::Autism, None))
            .await
            .unwrap();
        svc.submit(submit_request(&started, 5)).await.unwrap();
        assert!(svc.abandon(started.session_id).await.is_err());
    }

    #[tokio::test]
    async fn submission_errors() {
        let (svc, _) = service(RiskPredictor::unavailable());
        let started = svc
            .start(start_request(AssessmentType::Autism, None))
            .await
            .unwrap();

        let mut wrong_type = submit_request(&started, 5);
        wrong_type.assessment_type = Some(AssessmentType::Dyslexia);
        assert_eq!(
            svc.submit(wrong_type).await.unwrap_err().field(),
            Some("assessment_type")
        );

        let mut unknown = submit_request(&started, 5);
        unknown.session_id = Uuid::new_v4();
        assert!(matches!(
            svc.submit(unknown).await.unwrap_err(),
            AssessmentError::SessionNotFound(_)
        ));

        let mut stray = submit_request(&started, 5);
        let stray_id = Uuid::new_v4();
        stray.answers[0].question_id = stray_id;
        let result = svc.submit(stray).await.unwrap();
        assert_eq!(result.skipped_questions, vec![stray_id]);
    }

    #[tokio::test]
    async fn answer_keys_hidden_until_session_ends() {
        let (svc, _) = service(RiskPredictor::unavailable());
        let started = svc
            .start(start_request(AssessmentType::Autism, None))
            .await
            .unwrap();
        let first = started.questions[0].id;

        let err = svc.question(first).await.unwrap_err();
        assert!(matches!(err, AssessmentError::AnswerKeyLocked(id) if id == started.session_id));
        assert!(matches!(
            svc.review(started.session_id).await.unwrap_err(),
            AssessmentError::AnswerKeyLocked(_)
        ));

        svc.submit(submit_request(&started, 5)).await.unwrap();

        let q = svc.question(first).await.unwrap();
        assert_eq!(q.kind, QuestionKind::TrueFalse { correct_answer: true });
        let reviewed = svc.review(started.session_id).await.unwrap();
        assert_eq!(reviewed.len(), 10);
        assert_eq!(reviewed[0].id, first);

        assert!(matches!(
            svc.question(Uuid::new_v4()).await.unwrap_err(),
            AssessmentError::QuestionNotFound(_)
        ));
    }

    #[tokio::test]
    async fn abandoned_session_can_be_reviewed() {
        let (svc, _) = service(RiskPredictor::unavailable());
        let started = svc
            .start(start_request(AssessmentType::Dyslexia, None))
            .await
            .unwrap();
        svc.abandon(started.session_id).await.unwrap();
        assert_eq!(svc.review(started.session_id).await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn source_with_wrong_difficulty_mix_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let svc = AssessmentService::new(store.clone(), Arc::new(AllHardSource), RiskPredictor::unavailable());
        let err = svc
            .start(start_request(AssessmentType::Dyslexia, Some(5)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AssessmentError::DifficultyMismatch {
                difficulty: Difficulty::Easy,
                expected: 6,
                actual: 0
            }
        ));
        assert!(store.snapshot().unwrap().sessions.is_empty());
    }

    /// Delegates to a `MemoryStore`, stalling the first response read.
    struct StallingStore {
        inner: MemoryStore,
        stalled: std::sync::atomic::AtomicBool,
    }

    impl StallingStore {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                stalled: std::sync::atomic::AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl AssessmentStore for StallingStore {
        async fn insert_questions(&self, questions: &[Question]) -> Result<(), AssessmentError> {
            self.inner.insert_questions(questions).await
        }

        async fn get_question(&self, id: Uuid) -> Result<Option<Question>, AssessmentError> {
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
            let rows = self.inner.responses_for_session(session_id).await?;
            if !self.stalled.swap(true, std::sync::atomic::Ordering::SeqCst) {
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            }
            Ok(rows)
        }

        async fn upsert_timing(
            &self,
            timing: &crate::model::QuestionTiming,
        ) -> Result<(), AssessmentError> {
            self.inner.upsert_timing(timing).await
        }

        async fn timings_for_session(
            &self,
            session_id: Uuid,
        ) -> Result<Vec<crate::model::QuestionTiming>, AssessmentError> {
            self.inner.timings_for_session(session_id).await
        }

        async fn get_profile(
            &self,
            student_ref: &str,
        ) -> Result<Option<StudentProfile>, AssessmentError> {
            self.inner.get_profile(student_ref).await
        }

        async fn save_profile(&self, profile: &StudentProfile) -> Result<(), AssessmentError> {
            self.inner.save_profile(profile).await
        }
    }

    fn stalling_service() -> (AssessmentService, Arc<StallingStore>) {
        let store = Arc::new(StallingStore::new());
        let svc = AssessmentService::new(
            store.clone(),
            Arc::new(BankSource::new(bank())),
            RiskPredictor::unavailable(),
        );
        (svc, store)
    }

    #[tokio::test]
    async fn concurrent_submits_score_every_stored_response() {
        let (svc, store) = stalling_service();
        let started = svc
            .start(start_request(AssessmentType::Dyslexia, None))
            .await
            .unwrap();

        // Both halves answered correctly, sent as two racing batches.
        let full = submit_request(&started, 10);
        let mut first = submit_request(&started, 10);
        first.answers = full.answers[..5].to_vec();
        let mut second = submit_request(&started, 10);
        second.answers = full.answers[5..].to_vec();

        let (a, b) = tokio::join!(svc.submit(first), svc.submit(second));
        a.unwrap();
        b.unwrap();

        let responses = store.responses_for_session(started.session_id).await.unwrap();
        assert_eq!(responses.len(), 10);
        assert!(responses.iter().all(|r| r.is_correct));

        let session = svc.results(started.session_id).await.unwrap();
        assert_eq!(session.correct_answers, 10);
        assert_eq!(session.overall_accuracy, Some(100.0));
        assert_eq!(session.dyslexia_score, Some(100.0));
    }

    #[tokio::test]
    async fn abandon_racing_submit_keeps_completed_scores() {
        let (svc, _) = stalling_service();
        let started = svc
            .start(start_request(AssessmentType::Dyslexia, None))
            .await
            .unwrap();

        let (submitted, abandoned) = tokio::join!(
            svc.submit(submit_request(&started, 6)),
            svc.abandon(started.session_id)
        );
        assert_eq!(submitted.unwrap().accuracy_percentage, 60.0);
        assert_eq!(abandoned.unwrap_err().field(), Some("session_id"));

        let session = svc.results(started.session_id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.overall_accuracy, Some(60.0));
        assert_eq!(session.dyslexia_score, Some(60.0));
    }

    #[test]
    fn quiz_info_describes_policy() {
        let (svc, _) = service(RiskPredictor::unavailable());
        let info = svc.quiz_info();
        assert_eq!(info.assessment_types["both"], 20);
        assert_eq!(info.assessment_types["dyslexia"], 10);
        assert_eq!(info.question_source, "bank:test");
        assert!(!info.classifier_available);
        assert_eq!(info.high_risk_below, 40.0);
    }
}
