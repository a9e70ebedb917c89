use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{Device, GenerationParameters, SequenceModel};

/// Remote model backend talking to a model-serving sidecar over JSON/HTTP.
///
/// The sidecar owns the weights, tokenizer and accelerator; this side only
/// forwards ids and parameters.
pub struct RemoteModel {
    base_url: String,
    api_key: Option<String>,
    model: String,
    device: Device,
    timeout: Duration,
    client: reqwest::Client,
}

impl RemoteModel {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            model: model.into(),
            device: Device::Cpu,
            timeout: Duration::from_secs(30),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout = Duration::from_secs(timeout_secs);
        self
    }

    /// Ask the sidecar which model it serves and on which device.
    /// A failure here means the model is not loaded.
    pub async fn connect(mut self) -> Result<Self> {
        let response = self
            .request(reqwest::Method::GET, "/info")
            .timeout(self.timeout)
            .send()
            .await
            .context("Model sidecar unreachable")?;
        let info: InfoResponse = read_json(response, "info").await?;

        if let Some(model) = info.model {
            self.model = model;
        }
        self.device = info.device.unwrap_or(Device::Cpu);
        Ok(self)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .header("Content-Type", "application/json");
        match &self.api_key {
            Some(key) => builder.header("Authorization", format!("Bearer {}", key)),
            None => builder,
        }
    }
}

/// Decode a JSON body, turning non-2xx statuses into errors carrying the body.
pub(super) async fn read_json<T: for<'de> Deserialize<'de>>(response: reqwest::Response, op: &str) -> Result<T> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("Model {} error {}: {}", op, status, body);
    }
    response
        .json()
        .await
        .with_context(|| format!("Failed to parse model {} response", op))
}

#[async_trait::async_trait]
impl SequenceModel for RemoteModel {
    fn name(&self) -> &str {
        &self.model
    }

    fn device(&self) -> Device {
        self.device
    }

    async fn tokenize(&self, text: &str) -> Result<Vec<u32>> {
        let response = self
            .request(reqwest::Method::POST, "/tokenize")
            .timeout(self.timeout)
            .json(&TokenizeRequest { text })
            .send()
            .await
            .context("Model tokenize request failed")?;
        let body: TokenizeResponse = read_json(response, "tokenize").await?;
        Ok(body.input_ids)
    }

    async fn generate(&self, input_ids: &[u32], params: &GenerationParameters) -> Result<Vec<Vec<u32>>> {
        // No timeout: generation runs to completion or failure.
        let response = self
            .request(reqwest::Method::POST, "/generate")
            .json(&GenerateRequest {
                input_ids,
                parameters: params,
            })
            .send()
            .await
            .context("Model generate request failed")?;
        let body: GenerateResponse = read_json(response, "generate").await?;

        if body.sequences.is_empty() {
            anyhow::bail!("Model generate response has no sequences");
        }
        Ok(body.sequences)
    }

    async fn decode(&self, ids: &[u32]) -> Result<String> {
        let response = self
            .request(reqwest::Method::POST, "/decode")
            .timeout(self.timeout)
            .json(&DecodeRequest {
                ids,
                skip_special_tokens: true,
            })
            .send()
            .await
            .context("Model decode request failed")?;
        let body: DecodeResponse = read_json(response, "decode").await?;
        Ok(body.text)
    }
}

// Sidecar wire structures
#[derive(Debug, Deserialize)]
struct InfoResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    device: Option<Device>,
}

#[derive(Debug, Serialize)]
struct TokenizeRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenizeResponse {
    input_ids: Vec<u32>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    input_ids: &'a [u32],
    parameters: &'a GenerationParameters,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    sequences: Vec<Vec<u32>>,
}

#[derive(Debug, Serialize)]
struct DecodeRequest<'a> {
    ids: &'a [u32],
    skip_special_tokens: bool,
}

#[derive(Debug, Deserialize)]
struct DecodeResponse {
    text: String,
}
