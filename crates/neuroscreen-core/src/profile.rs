//! Profile Updater: writes a completed session's outcome to the student profile.

use chrono::Utc;

use crate::error::AssessmentError;
use crate::model::{AssessmentSession, Condition, StudentProfile};
use crate::store::AssessmentStore;

/// Get the profile for `student_ref`, creating an empty one if needed.
pub async fn get_or_create_profile(
    store: &dyn AssessmentStore,
    student_ref: &str,
) -> Result<StudentProfile, AssessmentError> {
    match store.get_profile(student_ref).await? {
        Some(profile) => Ok(profile),
        None => {
            let profile = StudentProfile::new(student_ref);
            store.save_profile(&profile).await?;
            tracing::info!(student_ref, "created student profile");
            Ok(profile)
        }
    }
}

/// Apply a session's scores and predictions to a profile.
///
/// Condition fields are only touched for conditions the session assessed, so
/// a single-condition attempt keeps the other condition's history.
pub fn apply_session(profile: &mut StudentProfile, session: &AssessmentSession) {
    let stamp = session.completed_at.unwrap_or_else(Utc::now);

    if let Some(accuracy) = session.overall_accuracy {
        profile.assessment_score = Some(accuracy);
    }

    for &condition in session.assessment_type.conditions() {
        let score = session.condition_score(condition);
        let prediction = session.predictions.get(&condition);
        match condition {
            Condition::Dyslexia => {
                if score.is_some() {
                    profile.dyslexia_score = score;
                }
                if let Some(p) = prediction {
                    profile.dyslexia_prediction_level = Some(p.level);
                    profile.dyslexia_prediction_confidence = Some(p.confidence);
                    profile.dyslexia_prediction_date = Some(stamp);
                }
            }
            Condition::Autism => {
                if score.is_some() {
                    profile.autism_score = score;
                }
                if let Some(p) = prediction {
                    profile.autism_prediction_level = Some(p.level);
                    profile.autism_prediction_confidence = Some(p.confidence);
                    profile.autism_prediction_date = Some(stamp);
                }
            }
        }
    }

    profile.updated_at = Utc::now();
}

/// Persist a completed session's outcome to the student's profile.
pub async fn update_profile(
    store: &dyn AssessmentStore,
    session: &AssessmentSession,
) -> Result<StudentProfile, AssessmentError> {
    let mut profile = get_or_create_profile(store, &session.student_ref).await?;
    apply_session(&mut profile, session);
    store.save_profile(&profile).await?;
    tracing::info!(
        student_ref = %session.student_ref,
        session_id = %session.id,
        "updated student profile"
    );
    Ok(profile)
}
