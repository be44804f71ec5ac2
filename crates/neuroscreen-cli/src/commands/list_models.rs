//! The `neuroscreen list-models` command.

use std::path::PathBuf;

use anyhow::Result;

use neuroscreen_core::traits::ModelInfo;
use neuroscreen_providers::config::load_config_from;
use neuroscreen_providers::ollama::OllamaProvider;
use neuroscreen_providers::{create_provider, ProviderConfig};

pub async fn execute(provider_filter: Option<String>, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;

    let mut names: Vec<&String> = config.providers.keys().collect();
    names.sort();

    let mut found_any = false;

    for name in names {
        if provider_filter.as_ref().is_some_and(|filter| filter != name) {
            continue;
        }

        let models: Vec<ModelInfo> = match &config.providers[name] {
            ProviderConfig::Ollama { base_url } => {
                match OllamaProvider::new(base_url).list_models_async().await {
                    Ok(models) => models,
                    Err(e) => {
                        eprintln!("Provider {name}: {e}");
                        continue;
                    }
                }
            }
            other => create_provider(other).available_models(),
        };

        if !models.is_empty() {
            found_any = true;
            println!("Provider: {name}");
            for model in &models {
                if model.max_context > 0 {
                    println!(
                        "  {} - {} ({}K context, ${:.4}/{:.4} per 1K tokens)",
                        model.id,
                        model.name,
                        model.max_context / 1000,
                        model.cost_per_1k_input,
                        model.cost_per_1k_output,
                    );
                } else {
                    println!("  {} (local)", model.id);
                }
            }
            println!();
        }
    }

    if !found_any {
        println!("No providers configured. Run `neuroscreen init` to create a config file.");
    }

    Ok(())
}
