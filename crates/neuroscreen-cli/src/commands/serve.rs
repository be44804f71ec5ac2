//! The `neuroscreen serve` command.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use neuroscreen_core::engine::{AssessmentService, ServiceConfig};
use neuroscreen_core::store::MemoryStore;
use neuroscreen_providers::config::load_config_from;
use neuroscreen_server::shutdown_signal;

use crate::app;

pub struct ServeArgs {
    pub bind: Option<SocketAddr>,
    pub bank: Option<PathBuf>,
    pub data: Option<PathBuf>,
    pub classifier: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

pub async fn execute(args: ServeArgs) -> Result<()> {
    let mut config = load_config_from(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if args.bank.is_some() {
        config.question_bank = args.bank;
    }
    if let Some(data) = args.data {
        config.data_path = data;
    }
    if args.classifier.is_some() {
        config.classifier_path = args.classifier;
    }

    let store = Arc::new(MemoryStore::open(&config.data_path)?);
    let source = app::question_source(&config)?;
    let predictor = app::risk_predictor(config.classifier_path.as_deref());

    let service = AssessmentService::new(store.clone(), source, predictor).with_config(ServiceConfig {
        shuffle_questions: config.shuffle_questions,
    });

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    eprintln!(
        "neuroscreen listening on http://{}. Press Ctrl+C to stop.",
        listener.local_addr()?
    );

    neuroscreen_server::serve(listener, Arc::new(service), shutdown_signal()).await?;

    store.save_json(&config.data_path)
}
