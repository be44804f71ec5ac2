//! The `neuroscreen generate` command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use futures::future::try_join_all;

use neuroscreen_core::generation::LlmQuestionSource;
use neuroscreen_core::model::{AssessmentType, Difficulty, DifficultyCounts, Question};
use neuroscreen_core::parser::{validate_bank, QuestionBank};
use neuroscreen_core::traits::{LlmProvider, QuestionSource};
use neuroscreen_providers::config::load_config_from;
use neuroscreen_providers::create_provider;

pub async fn execute(
    assessment_type: String,
    [easy, moderate, hard]: [usize; 3],
    provider_name: Option<String>,
    model: Option<String>,
    output: PathBuf,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let assessment_type: AssessmentType = assessment_type
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;
    let counts = DifficultyCounts {
        easy,
        moderate,
        hard,
    };
    anyhow::ensure!(counts.total() > 0, "at least one question must be requested");

    let config = load_config_from(config_path.as_deref())?;
    let (name, provider_config) = config.provider(provider_name.as_deref())?;
    let provider: Arc<dyn LlmProvider> = Arc::from(create_provider(provider_config));
    let generation = config.generation_config(model.as_deref());
    let model_id = generation.model.clone();

    eprintln!(
        "Generating {} question(s) per condition for {assessment_type} with {name}/{model_id}",
        counts.total()
    );

    let source = LlmQuestionSource::new(provider, generation);
    let batches = try_join_all(
        assessment_type
            .conditions()
            .iter()
            .map(|&condition| source.generate(condition, counts)),
    )
    .await?;
    let questions: Vec<Question> = batches.into_iter().flatten().collect();

    let id = output
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("generated")
        .to_string();
    let mut bank = QuestionBank::new(&id, &format!("Generated {assessment_type} questions"), questions);
    bank.description = format!("Generated by {name}/{model_id}");

    let warnings = validate_bank(&bank);
    for w in &warnings {
        eprintln!("  WARNING: {}", w.message);
    }

    bank.save(&output)?;
    print_summary(&bank);
    println!("Wrote {} questions to {}", bank.questions.len(), output.display());

    Ok(())
}

fn print_summary(bank: &QuestionBank) {
    use comfy_table::{Cell, Table};

    let mut table = Table::new();
    table.set_header(vec!["Condition", "Easy", "Moderate", "Hard", "Total"]);

    for condition in AssessmentType::Both.conditions() {
        let count = |d: Difficulty| {
            bank.questions
                .iter()
                .filter(|q| q.condition == *condition && q.difficulty == d)
                .count()
        };
        let total: usize = Difficulty::ALL.iter().map(|&d| count(d)).sum();
        if total == 0 {
            continue;
        }
        table.add_row(vec![
            Cell::new(condition),
            Cell::new(count(Difficulty::Easy)),
            Cell::new(count(Difficulty::Moderate)),
            Cell::new(count(Difficulty::Hard)),
            Cell::new(total),
        ]);
    }

    println!("{table}");
}
