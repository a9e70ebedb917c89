use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use common::Config;

use summariser::cache::{CacheSettings, SummaryCache};
use summariser::model;
use summariser::service::{SummarisationService, SummaryParams, DEFAULT_MAX_INPUT_TOKENS};

/// Load the configured model backend and summarise a sample paragraph.
#[derive(Parser, Debug)]
#[command(name = "check_model")]
struct Args {
    /// Path to config.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

const SAMPLE: &str = r#"
Rust is a systems programming language that runs blazingly fast, prevents
segfaults, and guarantees thread safety. It accomplishes these goals through
a unique ownership system that enforces memory safety without requiring a
garbage collector. Many companies are adopting Rust for critical
infrastructure, including operating systems, web servers and embedded systems.
"#;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();
    let default_path = PathBuf::from("config.default.toml");
    let config = Config::load_with_defaults(Some(default_path.as_path()), args.config.as_deref()).await?;

    println!("\n{}", "=".repeat(60));
    println!("Checking model backend");
    println!("{}", "=".repeat(60));

    let loaded = Instant::now();
    let model = model::from_config(config.model.as_ref()).await?;
    println!("Model:  {}", model.name());
    println!("Device: {}", model.device());
    println!("Loaded in {:.2}s", loaded.elapsed().as_secs_f64());

    let service = SummarisationService::new(
        model,
        SummaryCache::new(CacheSettings {
            enabled: false,
            ..CacheSettings::default()
        }),
        DEFAULT_MAX_INPUT_TOKENS,
    );

    let started = Instant::now();
    match service.summarise(SAMPLE.trim(), &SummaryParams::default()).await {
        Ok(result) => {
            println!("\n✓ Success in {:.2}s", started.elapsed().as_secs_f64());
            println!("  Summary: {}", result.summary);
            println!(
                "  Words: {} -> {} ({}%)",
                result.metadata.input_word_count,
                result.metadata.output_word_count,
                result.metadata.compression_ratio
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Failed: {}", e);
            Err(e.into())
        }
    }
}
