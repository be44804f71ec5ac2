//! Persistence seam for questions, sessions, responses and profiles.
//!
//! `MemoryStore` keeps everything behind one mutex and can be snapshotted to
//! JSON. Responses and timings are upserted by their natural
//! (session, question) key inside a single lock acquisition.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AssessmentError;
use crate::model::{
    AssessmentSession, Question, QuestionTiming, Response, SessionStatus, StudentProfile,
};

/// Storage backend used by the assessment pipeline.
#[async_trait]
pub trait AssessmentStore: Send + Sync {
    /// Insert questions that are not yet stored. Existing questions are
    /// left untouched. All-or-nothing.
    async fn insert_questions(&self, questions: &[Question]) -> Result<(), AssessmentError>;

    async fn get_question(&self, id: Uuid) -> Result<Option<Question>, AssessmentError>;

    async fn insert_session(&self, session: &AssessmentSession) -> Result<(), AssessmentError>;

    async fn get_session(&self, id: Uuid) -> Result<Option<AssessmentSession>, AssessmentError>;

    async fn update_session(&self, session: &AssessmentSession) -> Result<(), AssessmentError>;

    /// An in-progress session that serves `question_id`, if any.
    async fn active_session_with_question(
        &self,
        question_id: Uuid,
    ) -> Result<Option<Uuid>, AssessmentError>;

    /// Insert or replace the response for (session, question).
    async fn upsert_response(&self, response: &Response) -> Result<(), AssessmentError>;

    /// Responses for a session, in first-answered order.
    async fn responses_for_session(&self, session_id: Uuid)
        -> Result<Vec<Response>, AssessmentError>;

    /// Insert or replace the timing for (session, question).
    async fn upsert_timing(&self, timing: &QuestionTiming) -> Result<(), AssessmentError>;

    async fn timings_for_session(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<QuestionTiming>, AssessmentError>;

    async fn get_profile(&self, student_ref: &str)
        -> Result<Option<StudentProfile>, AssessmentError>;

    async fn save_profile(&self, profile: &StudentProfile) -> Result<(), AssessmentError>;
}

/// Serializable contents of a `MemoryStore`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub questions: HashMap<Uuid, Question>,
    #[serde(default)]
    pub sessions: HashMap<Uuid, AssessmentSession>,
    #[serde(default)]
    pub responses: HashMap<Uuid, Vec<Response>>,
    #[serde(default)]
    pub timings: HashMap<Uuid, Vec<QuestionTiming>>,
    #[serde(default)]
    pub profiles: HashMap<String, StudentProfile>,
}

impl StoreSnapshot {
    /// Save the snapshot as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize snapshot")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write snapshot to {}", path.display()))?;
        Ok(())
    }

    /// Load a snapshot from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read snapshot from {}", path.display()))?;
        let snapshot: StoreSnapshot =
            serde_json::from_str(&content).context("failed to parse snapshot JSON")?;
        Ok(snapshot)
    }
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<StoreSnapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            state: Mutex::new(snapshot),
        }
    }

    /// Restore from `path` if it exists, otherwise start empty.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let snapshot = StoreSnapshot::load_json(path)?;
        tracing::info!(
            path = %path.display(),
            sessions = snapshot.sessions.len(),
            questions = snapshot.questions.len(),
            "restored store snapshot"
        );
        Ok(Self::from_snapshot(snapshot))
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> Result<StoreSnapshot> {
        Ok(self.lock()?.clone())
    }

    /// Write the current contents to `path`.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let snapshot = self.snapshot()?;
        snapshot.save_json(path)?;
        tracing::info!(
            path = %path.display(),
            sessions = snapshot.sessions.len(),
            "saved store snapshot"
        );
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreSnapshot>, AssessmentError> {
        self.state
            .lock()
            .map_err(|_| AssessmentError::Storage("store lock poisoned".into()))
    }
}

#[async_trait]
impl AssessmentStore for MemoryStore {
    async fn insert_questions(&self, questions: &[Question]) -> Result<(), AssessmentError> {
        let mut state = self.lock()?;
        for q in questions {
            state.questions.entry(q.id).or_insert_with(|| q.clone());
        }
        Ok(())
    }

    async fn get_question(&self, id: Uuid) -> Result<Option<Question>, AssessmentError> {
        Ok(self.lock()?.questions.get(&id).cloned())
    }

    async fn insert_session(&self, session: &AssessmentSession) -> Result<(), AssessmentError> {
        let mut state = self.lock()?;
        if state.sessions.contains_key(&session.id) {
            return Err(AssessmentError::Storage(format!(
                "session {} already exists",
                session.id
            )));
        }
        state.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<AssessmentSession>, AssessmentError> {
        Ok(self.lock()?.sessions.get(&id).cloned())
    }

    async fn update_session(&self, session: &AssessmentSession) -> Result<(), AssessmentError> {
        let mut state = self.lock()?;
        match state.sessions.get_mut(&session.id) {
            Some(slot) => {
                *slot = session.clone();
                Ok(())
            }
            None => Err(AssessmentError::SessionNotFound(session.id)),
        }
    }

    async fn active_session_with_question(
        &self,
        question_id: Uuid,
    ) -> Result<Option<Uuid>, AssessmentError> {
        Ok(self
            .lock()?
            .sessions
            .values()
            .find(|s| s.status == SessionStatus::InProgress && s.question_ids.contains(&question_id))
            .map(|s| s.id))
    }

    async fn upsert_response(&self, response: &Response) -> Result<(), AssessmentError> {
        let mut state = self.lock()?;
        let rows = state.responses.entry(response.session_id).or_default();
        match rows.iter_mut().find(|r| r.question_id == response.question_id) {
            Some(existing) => *existing = response.clone(),
            None => rows.push(response.clone()),
        }
        Ok(())
    }

    async fn responses_for_session(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<Response>, AssessmentError> {
        Ok(self
            .lock()?
            .responses
            .get(&session_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn upsert_timing(&self, timing: &QuestionTiming) -> Result<(), AssessmentError> {
        let mut state = self.lock()?;
        let rows = state.timings.entry(timing.session_id).or_default();
        match rows.iter_mut().find(|t| t.question_id == timing.question_id) {
            Some(existing) => *existing = timing.clone(),
            None => rows.push(timing.clone()),
        }
        Ok(())
    }

    async fn timings_for_session(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<QuestionTiming>, AssessmentError> {
        Ok(self
            .lock()?
            .timings
            .get(&session_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_profile(
        &self,
        student_ref: &str,
    ) -> Result<Option<StudentProfile>, AssessmentError> {
        Ok(self.lock()?.profiles.get(student_ref).cloned())
    }

    async fn save_profile(&self, profile: &StudentProfile) -> Result<(), AssessmentError> {
        self.lock()?
            .profiles
            .insert(profile.student_ref.clone(), profile.clone());
        Ok(())
    }
}
