//! neuroscreen CLI: serve the assessment API and manage question banks.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod app;
mod commands;

#[derive(Parser)]
#[command(name = "neuroscreen", version, about = "Dyslexia and autism screening service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the assessment HTTP API
    Serve {
        /// Address to listen on (default from config: 0.0.0.0:8000)
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Serve questions from this TOML bank (file or directory) instead of an LLM
        #[arg(long)]
        bank: Option<PathBuf>,

        /// JSON snapshot loaded at start and written at shutdown
        #[arg(long)]
        data: Option<PathBuf>,

        /// Risk classifier artifact (JSON)
        #[arg(long)]
        classifier: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Generate a question bank with an LLM
    Generate {
        /// dyslexia, autism or both
        #[arg(long, default_value = "both")]
        assessment_type: String,

        /// Easy questions per condition
        #[arg(long, default_value = "2")]
        easy: usize,

        /// Moderate questions per condition
        #[arg(long, default_value = "4")]
        moderate: usize,

        /// Hard questions per condition
        #[arg(long, default_value = "4")]
        hard: usize,

        /// Provider name from the config (default: default_provider)
        #[arg(long)]
        provider: Option<String>,

        /// Model id (default: default_model)
        #[arg(long)]
        model: Option<String>,

        /// Output TOML file
        #[arg(long, default_value = "banks/generated.toml")]
        output: PathBuf,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Score a submission offline against a question bank
    Score {
        /// Question bank file or directory
        #[arg(long)]
        bank: PathBuf,

        /// Submission JSON file
        #[arg(long)]
        submission: PathBuf,

        /// Risk classifier artifact (default: built-in model)
        #[arg(long)]
        classifier: Option<PathBuf>,

        /// Output format: text or json
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Validate question bank TOML files
    Validate {
        /// Question bank file or directory
        #[arg(long)]
        bank: PathBuf,

        /// Also check a classifier artifact
        #[arg(long)]
        classifier: Option<PathBuf>,
    },

    /// List available models
    ListModels {
        /// Filter to specific provider
        #[arg(long)]
        provider: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Create starter config, question bank and classifier artifact
    Init,
}

#[tokio::main]
async fn main() {
    let filter = match "neuroscreen=info".parse() {
        Ok(directive) => tracing_subscriber::EnvFilter::from_default_env().add_directive(directive),
        Err(_) => tracing_subscriber::EnvFilter::from_default_env(),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve {
            bind,
            bank,
            data,
            classifier,
            config,
        } => {
            commands::serve::execute(commands::serve::ServeArgs {
                bind,
                bank,
                data,
                classifier,
                config,
            })
            .await
        }
        Commands::Generate {
            assessment_type,
            easy,
            moderate,
            hard,
            provider,
            model,
            output,
            config,
        } => {
            commands::generate::execute(
                assessment_type,
                [easy, moderate, hard],
                provider,
                model,
                output,
                config,
            )
            .await
        }
        Commands::Score {
            bank,
            submission,
            classifier,
            format,
        } => commands::score::execute(bank, submission, classifier, format).await,
        Commands::Validate { bank, classifier } => commands::validate::execute(bank, classifier),
        Commands::ListModels { provider, config } => {
            commands::list_models::execute(provider, config).await
        }
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
