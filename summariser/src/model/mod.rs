use std::sync::Arc;

use anyhow::Result;
use common::ModelConfig;
use serde::{Deserialize, Serialize};
use tracing::info;

pub mod extractive;
pub mod huggingface;
pub mod remote;

/// Default model checkpoint name reported when the config does not name one
pub const DEFAULT_MODEL_NAME: &str = "facebook/bart-large-cnn";

/// Core trait for sequence-to-sequence generation backends (local or remote).
///
/// The service never looks inside the model: it tokenizes, asks for
/// generated sequences, and decodes the first one.
#[async_trait::async_trait]
pub trait SequenceModel: Send + Sync {
    /// Model identifier reported in summary metadata
    fn name(&self) -> &str;

    /// Where inference runs
    fn device(&self) -> Device;

    /// Convert text to input token ids (untruncated)
    async fn tokenize(&self, text: &str) -> Result<Vec<u32>>;

    /// Generate candidate output sequences. The first one is the selected output.
    async fn generate(&self, input_ids: &[u32], params: &GenerationParameters) -> Result<Vec<Vec<u32>>>;

    /// Convert token ids back to text, skipping special tokens
    async fn decode(&self, ids: &[u32]) -> Result<String>;
}

/// Compute device the backend runs inference on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cpu,
    Cuda,
    /// Hosted service that does not report its hardware
    Remote,
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
            Device::Cuda => f.write_str("cuda"),
            Device::Remote => f.write_str("remote"),
        }
    }
}

/// Parameters handed to `SequenceModel::generate`. Built fresh per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParameters {
    pub max_new_tokens: usize,
    pub min_new_tokens: usize,
    pub num_beams: u32,
    pub length_penalty: f32,
    pub early_stopping: bool,
    pub no_repeat_ngram_size: u32,
    pub top_k: u32,
    pub top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub do_sample: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl GenerationParameters {
    /// Fixed beam-search defaults with the given token budget. Sampling is off.
    pub fn beam_search(max_new_tokens: usize, min_new_tokens: usize) -> Self {
        Self {
            max_new_tokens,
            min_new_tokens,
            num_beams: 4,
            length_penalty: 2.0,
            early_stopping: true,
            no_repeat_ngram_size: 3,
            top_k: 50,
            top_p: 0.95,
            do_sample: None,
            temperature: None,
        }
    }

    pub fn with_sampling(mut self, temperature: f32) -> Self {
        self.do_sample = Some(true);
        self.temperature = Some(temperature);
        self
    }

    pub fn is_sampling(&self) -> bool {
        self.do_sample.unwrap_or(false)
    }
}

fn api_key(cfg: &ModelConfig) -> Result<Option<String>> {
    match cfg.api_key_env.as_deref() {
        Some(var) => std::env::var(var)
            .map(Some)
            .map_err(|_| anyhow::anyhow!("Model API key env var '{}' not set", var)),
        None => Ok(None),
    }
}

/// Build the configured backend. The sidecar backend is contacted once here, so a
/// sidecar that cannot serve the model fails startup rather than the first request.
pub async fn from_config(config: Option<&ModelConfig>) -> Result<Arc<dyn SequenceModel>> {
    let backend = config.and_then(|c| c.backend.as_deref()).unwrap_or("extractive");
    let name = config
        .and_then(|c| c.name.clone())
        .unwrap_or_else(|| DEFAULT_MODEL_NAME.to_string());
    let cfg = config.cloned().unwrap_or_default();

    match backend {
        "extractive" => {
            info!("Model backend: built-in extractive");
            Ok(Arc::new(extractive::ExtractiveModel::new()))
        }
        "huggingface" => {
            let api_url = cfg
                .api_url
                .clone()
                .unwrap_or_else(|| huggingface::DEFAULT_API_URL.to_string());
            let model = huggingface::HuggingFaceModel::new(&api_url, name).with_api_key(api_key(&cfg)?);
            info!(model = model.name(), url = %api_url, "Model backend: huggingface");
            Ok(Arc::new(model))
        }
        "remote" => {
            let api_url = cfg
                .api_url
                .clone()
                .unwrap_or_else(|| "http://localhost:8080".to_string());
            let model = remote::RemoteModel::new(&api_url, name)
                .with_api_key(api_key(&cfg)?)
                .with_timeout(cfg.timeout_seconds.unwrap_or(30))
                .connect()
                .await?;
            info!(model = model.name(), device = %model.device(), url = %api_url, "Model backend: remote");
            Ok(Arc::new(model))
        }
        other => anyhow::bail!("Unknown model backend: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn beam_search_params_omit_sampling_fields() {
        let params = GenerationParameters::beam_search(37, 2);
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["num_beams"], 4);
        assert_eq!(json["max_new_tokens"], 37);
        assert!(json.get("do_sample").is_none());
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn sampling_params_serialize_temperature() {
        let params = GenerationParameters::beam_search(10, 1).with_sampling(1.5);
        assert!(params.is_sampling());
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["do_sample"], true);
        assert_eq!(json["temperature"], 1.5);
    }

    #[tokio::test]
    async fn huggingface_backend_needs_no_network_to_build() {
        let cfg = ModelConfig {
            backend: Some("huggingface".to_string()),
            api_url: Some("http://127.0.0.1:9".to_string()),
            ..Default::default()
        };
        let model = from_config(Some(&cfg)).await.unwrap();
        assert_eq!(model.name(), DEFAULT_MODEL_NAME);
        assert_eq!(model.device(), Device::Remote);
    }

    #[tokio::test]
    async fn missing_api_key_variable_is_an_error() {
        let cfg = ModelConfig {
            backend: Some("huggingface".to_string()),
            api_key_env: Some("SUMMARISER_TEST_UNSET_KEY_VAR".to_string()),
            ..Default::default()
        };
        let err = from_config(Some(&cfg)).await.err().expect("should fail");
        assert!(err.to_string().contains("SUMMARISER_TEST_UNSET_KEY_VAR"));
    }

    #[tokio::test]
    async fn unknown_backend_is_rejected() {
        let cfg = ModelConfig {
            backend: Some("quantum".to_string()),
            ..Default::default()
        };
        let err = from_config(Some(&cfg)).await.err().expect("should fail");
        assert!(err.to_string().contains("quantum"));
    }
}
