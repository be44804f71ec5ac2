//! The `neuroscreen score` command: grade a saved submission offline.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;

use neuroscreen_core::engine::AssessmentService;
use neuroscreen_core::model::{AssessmentSession, AssessmentType, Condition};
use neuroscreen_core::store::{AssessmentStore, MemoryStore};
use neuroscreen_core::submission::{AnswerInput, SubmissionResult, SubmitRequest, TimingInput};

use crate::app;

/// A submission recorded outside a live session.
#[derive(Debug, Deserialize)]
struct OfflineSubmission {
    #[serde(default = "default_student_ref")]
    student_ref: String,
    #[serde(default)]
    assessment_type: Option<AssessmentType>,
    answers: Vec<AnswerInput>,
    #[serde(default)]
    question_timings: Vec<TimingInput>,
    #[serde(default)]
    total_time: Option<u64>,
}

fn default_student_ref() -> String {
    "offline".to_string()
}

pub async fn execute(
    bank_path: PathBuf,
    submission_path: PathBuf,
    classifier: Option<PathBuf>,
    format: String,
) -> Result<()> {
    anyhow::ensure!(
        matches!(format.as_str(), "text" | "json"),
        "unknown format '{format}', expected text or json"
    );

    let content = std::fs::read_to_string(&submission_path)
        .with_context(|| format!("failed to read submission: {}", submission_path.display()))?;
    let submission: OfflineSubmission = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse submission: {}", submission_path.display()))?;

    let source = app::load_bank_source(&bank_path)?;
    let bank_questions = source.questions().to_vec();

    // The session serves exactly the bank questions the submission answered.
    let answered: HashSet<_> = submission.answers.iter().map(|a| a.question_id).collect();
    let served: Vec<_> = bank_questions
        .iter()
        .filter(|q| answered.contains(&q.id))
        .collect();
    anyhow::ensure!(
        !served.is_empty(),
        "none of the answered questions are in the bank {}",
        bank_path.display()
    );

    let assessment_type = submission.assessment_type.unwrap_or_else(|| {
        let dyslexia = served.iter().any(|q| q.condition == Condition::Dyslexia);
        let autism = served.iter().any(|q| q.condition == Condition::Autism);
        match (dyslexia, autism) {
            (true, false) => AssessmentType::Dyslexia,
            (false, true) => AssessmentType::Autism,
            _ => AssessmentType::Both,
        }
    });

    let store = Arc::new(MemoryStore::new());
    store.insert_questions(&bank_questions).await?;
    let mut session = AssessmentSession::new(&submission.student_ref, assessment_type);
    session.question_ids = served.iter().map(|q| q.id).collect();
    session.total_questions = served.len();
    store.insert_session(&session).await?;

    let predictor = app::risk_predictor(classifier.as_deref());
    let service = AssessmentService::new(store, Arc::new(source), predictor);

    let result = service
        .submit(SubmitRequest {
            session_id: session.id,
            assessment_type: None,
            answers: submission.answers,
            question_timings: submission.question_timings,
            total_time: submission.total_time,
            total_questions: None,
            correct_answers: None,
        })
        .await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }

    Ok(())
}

fn print_result(result: &SubmissionResult) {
    use comfy_table::{Cell, Table};

    println!(
        "Accuracy: {:.1}% ({} of {} correct)",
        result.accuracy_percentage, result.correct_answers, result.total_questions
    );

    let mut conditions = Table::new();
    conditions.set_header(vec!["Condition", "Score", "Prediction", "Confidence", "Questions"]);
    for (condition, prediction) in &result.predictions {
        let score = match condition {
            Condition::Dyslexia => result.dyslexia_score,
            Condition::Autism => result.autism_score,
        };
        let level = if prediction.fallback {
            format!("{} (fallback)", prediction.level)
        } else {
            prediction.level.to_string()
        };
        conditions.add_row(vec![
            Cell::new(condition),
            Cell::new(score.map(|s| format!("{s:.1}%")).unwrap_or_else(|| "-".into())),
            Cell::new(level),
            Cell::new(format!("{:.2}", prediction.confidence)),
            Cell::new(prediction.question_count),
        ]);
    }
    println!("{conditions}");

    let mut categories = Table::new();
    categories.set_header(vec!["Category", "Risk"]);
    for (category, risk) in &result.risk_indicators {
        categories.add_row(vec![Cell::new(category), Cell::new(risk)]);
    }
    println!("{categories}");

    if !result.missed_questions.is_empty() {
        println!("Missed questions:");
        for missed in &result.missed_questions {
            println!(
                "  {} [{} / {}] answered '{}', expected '{}'",
                missed.question_id,
                missed.condition,
                missed.difficulty,
                missed.selected_answer,
                missed.correct_answer
            );
        }
    }
    if !result.skipped_questions.is_empty() {
        println!("{} answer(s) skipped: unknown question id", result.skipped_questions.len());
    }
}
