/*!
common/src/lib.rs

Shared configuration types for the summariser service.

This file provides:
- Config data structures (deserialized from TOML)
- An async loader for a TOML config file
- Layered loading: a defaults file merged with an optional override file
*/

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// HTTP server section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind (e.g. "0.0.0.0")
    pub bind: Option<String>,
    pub port: Option<u16>,
    /// Origins allowed to call the API from a browser
    pub cors_origins: Option<Vec<String>>,
}

/// Model backend section.
///
/// `backend = "huggingface"` calls a hosted summarisation checkpoint,
/// `backend = "remote"` talks to a model-serving sidecar over HTTP and
/// `backend = "extractive"` uses the built-in lead-sentence backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    pub backend: Option<String>,
    pub name: Option<String>,
    pub api_url: Option<String>,
    /// Name of the env var holding the API key (no auth header if unset)
    pub api_key_env: Option<String>,
    /// Timeout for tokenize/decode/info calls. Generation itself is not timed out.
    pub timeout_seconds: Option<u64>,
    pub max_input_tokens: Option<usize>,
}

/// URL content extraction section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionConfig {
    pub timeout_seconds: Option<u64>,
    pub user_agent: Option<String>,
    pub min_content_chars: Option<usize>,
    /// Pages larger than this are rejected instead of buffered
    pub max_response_bytes: Option<u64>,
}

/// Background task store section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TasksConfig {
    pub ttl_seconds: Option<u64>,
    pub max_entries: Option<usize>,
    pub sweep_interval_seconds: Option<u64>,
}

/// Summary cache section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: Option<bool>,
    pub capacity: Option<usize>,
    pub ttl_seconds: Option<u64>,
}

/// Top-level application configuration (deserialized from config.toml).
/// Every section is optional; an empty file yields a working configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub server: Option<ServerConfig>,
    pub model: Option<ModelConfig>,
    pub extraction: Option<ExtractionConfig>,
    pub tasks: Option<TasksConfig>,
    pub cache: Option<CacheConfig>,
}

impl Config {
    /// Load configuration from a TOML file asynchronously.
    ///
    /// Example:
    ///   let cfg = Config::from_file("config.toml").await?;
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = tokio::fs::read_to_string(path.as_ref())
            .await
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let cfg: Config = toml::from_str(&data).context("Failed to parse TOML configuration")?;
        Ok(cfg)
    }

    /// Load configuration with an optional default file and an optional override file.
    /// If both are present, they are merged (override takes precedence).
    pub async fn load_with_defaults(default_path: Option<&Path>, override_path: Option<&Path>) -> Result<Self> {
        let mut config_value = toml::Value::Table(toml::map::Map::new());

        for (label, path) in [("default", default_path), ("override", override_path)] {
            let Some(path) = path else { continue };
            if !path.exists() {
                continue;
            }
            let data = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {} config: {}", label, path.display()))?;
            let val: toml::Value = toml::from_str(&data)
                .with_context(|| format!("Failed to parse {} configuration", label))?;
            merge_toml(&mut config_value, val);
        }

        let cfg: Config = config_value.try_into().context("Failed to parse merged configuration")?;
        Ok(cfg)
    }

    /// Port to listen on. `PORT` from the environment wins over the file.
    pub fn port(&self) -> u16 {
        std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .or_else(|| self.server.as_ref().and_then(|s| s.port))
            .unwrap_or(8000)
    }

    pub fn bind(&self) -> String {
        self.server
            .as_ref()
            .and_then(|s| s.bind.clone())
            .unwrap_or_else(|| "0.0.0.0".to_string())
    }

    pub fn cors_origins(&self) -> Vec<String> {
        self.server
            .as_ref()
            .and_then(|s| s.cors_origins.clone())
            .unwrap_or_else(|| {
                vec![
                    "https://ai-content-summariser.vercel.app".to_string(),
                    "http://localhost:3000".to_string(),
                ]
            })
    }
}

fn merge_toml(a: &mut toml::Value, b: toml::Value) {
    match (a, b) {
        (toml::Value::Table(a_map), toml::Value::Table(b_map)) => {
            for (k, v) in b_map {
                if let Some(a_val) = a_map.get_mut(&k) {
                    merge_toml(a_val, v);
                } else {
                    a_map.insert(k, v);
                }
            }
        }
        (a_val, b_val) => *a_val = b_val,
    }
}
