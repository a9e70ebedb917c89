/*
summariser - HTTP summarisation server
Loads configuration, builds the model backend and serves the API until shutdown.
*/

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use common::Config;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use summariser::cache::{CacheSettings, SummaryCache};
use summariser::extraction::{ContentExtractor, ExtractorSettings, MIN_CONTENT_CHARS};
use summariser::model;
use summariser::server::{launch_rocket, AppState};
use summariser::service::{SummarisationService, DEFAULT_MAX_INPUT_TOKENS};
use summariser::tasks::{TaskSettings, TaskStore};

#[derive(Parser, Debug)]
#[command(name = "summariser", about = "Abstractive summarisation HTTP API")]
struct Args {
    /// Path to config.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override log level (info, debug, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let default_path = PathBuf::from("config.default.toml");
    let override_path = if let Some(p) = args.config {
        if !p.exists() {
            error!(path = ?p, "specified config file not found");
            return Err(anyhow::anyhow!("Config file not found: {}", p.display()));
        }
        Some(p)
    } else {
        let p = PathBuf::from("config.toml");
        if p.exists() { Some(p) } else { None }
    };

    let config = match Config::load_with_defaults(Some(default_path.as_path()), override_path.as_deref()).await {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(%e, "failed to load configuration");
            return Err(e);
        }
    };
    info!(default = ?default_path, override = ?override_path, "configuration loaded");

    let model = match model::from_config(config.model.as_ref()).await {
        Ok(m) => m,
        Err(e) => {
            error!(error = %e, "failed to load model backend");
            return Err(e);
        }
    };

    let max_input_tokens = config
        .model
        .as_ref()
        .and_then(|m| m.max_input_tokens)
        .unwrap_or(DEFAULT_MAX_INPUT_TOKENS);
    let cache = SummaryCache::new(CacheSettings::from(config.cache.as_ref()));
    let service = Arc::new(SummarisationService::new(model, cache, max_input_tokens));

    let extractor = Arc::new(ContentExtractor::new(ExtractorSettings::from(config.extraction.as_ref()))?);
    let min_content_chars = config
        .extraction
        .as_ref()
        .and_then(|e| e.min_content_chars)
        .unwrap_or(MIN_CONTENT_CHARS);

    let tasks = Arc::new(TaskStore::new(TaskSettings::from(config.tasks.as_ref())));
    let sweeper = tasks.spawn_sweeper();

    let state = AppState {
        service,
        extractor,
        tasks,
        min_content_chars,
    };

    info!("Launching Rocket HTTP server");
    let outcome = launch_rocket(state, &config).await;
    sweeper.abort();

    if let Err(ref e) = outcome {
        error!(%e, "Rocket server failed");
    }
    info!("Shutdown complete");
    outcome
}
