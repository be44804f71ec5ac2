//! The `neuroscreen init` command.

use std::path::Path;

use anyhow::Result;

use neuroscreen_classifier::DEFAULT_ARTIFACT;

pub fn execute() -> Result<()> {
    write_if_missing(Path::new("neuroscreen.toml"), SAMPLE_CONFIG)?;
    write_if_missing(Path::new("banks/starter.toml"), STARTER_BANK)?;
    write_if_missing(Path::new("models/risk_classifier.json"), DEFAULT_ARTIFACT)?;

    println!("\nNext steps:");
    println!("  1. Edit neuroscreen.toml with your API keys, or keep the static bank");
    println!("  2. Run: neuroscreen validate --bank banks/starter.toml");
    println!("  3. Run: neuroscreen serve");

    Ok(())
}

fn write_if_missing(path: &Path, content: &str) -> Result<()> {
    if path.exists() {
        println!("{} already exists, skipping.", path.display());
        return Ok(());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    println!("Created {}", path.display());
    Ok(())
}

const STARTER_BANK: &str = include_str!("../../../../banks/starter.toml");

const SAMPLE_CONFIG: &str = r#"# neuroscreen configuration

default_provider = "anthropic"
default_model = "claude-sonnet-4-20250514"
default_temperature = 0.7
max_retries = 3
retry_delay_ms = 1000

# Serve questions from a static bank. Remove to generate them with the LLM.
question_bank = "banks/starter.toml"
classifier_path = "models/risk_classifier.json"
data_path = "neuroscreen-data.json"
bind_addr = "0.0.0.0:8000"
shuffle_questions = true

[providers.anthropic]
type = "anthropic"
api_key = "${ANTHROPIC_API_KEY}"

[providers.openai]
type = "openai"
api_key = "${OPENAI_API_KEY}"

[providers.ollama]
type = "ollama"
base_url = "http://localhost:11434"
"#;
