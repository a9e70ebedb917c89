use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::remote::read_json;
use super::{Device, GenerationParameters, SequenceModel};

/// Default endpoint of the hosted Hugging Face inference service
pub const DEFAULT_API_URL: &str = "https://router.huggingface.co/hf-inference/models";

const BYTES_PER_TOKEN: usize = 4;

/// Backend for a pretrained summarisation checkpoint served by the Hugging
/// Face inference API (or any server speaking its summarisation protocol).
///
/// The service tokenizes on its side, so ids here are the input's UTF-8 bytes
/// packed four to a `u32`. That keeps input truncation and token counts
/// meaningful without a local tokenizer.
pub struct HuggingFaceModel {
    base_url: String,
    api_key: Option<String>,
    model: String,
    client: reqwest::Client,
}

impl HuggingFaceModel {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/{}", self.base_url, self.model)
    }
}

#[async_trait::async_trait]
impl SequenceModel for HuggingFaceModel {
    fn name(&self) -> &str {
        &self.model
    }

    fn device(&self) -> Device {
        Device::Remote
    }

    async fn tokenize(&self, text: &str) -> Result<Vec<u32>> {
        Ok(pack(text))
    }

    async fn generate(&self, input_ids: &[u32], params: &GenerationParameters) -> Result<Vec<Vec<u32>>> {
        let inputs = unpack(input_ids);
        let request = SummarizationRequest {
            inputs: &inputs,
            parameters: SummarizationParameters::from(params),
        };

        let mut builder = self
            .client
            .post(self.endpoint())
            .header("X-Wait-For-Model", "true")
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        // No timeout: generation runs to completion or failure.
        let response = builder.send().await.context("Model generate request failed")?;
        let body: SummarizationResponse = read_json(response, "generate").await?;

        let summaries = body.into_summaries();
        if summaries.is_empty() {
            anyhow::bail!("Model generate response has no summaries");
        }
        Ok(summaries.iter().map(|s| pack(&s.summary_text)).collect())
    }

    async fn decode(&self, ids: &[u32]) -> Result<String> {
        Ok(unpack(ids))
    }
}

/// Pack UTF-8 bytes big-endian into ids, zero-padding the last one.
/// NUL bytes are dropped since zero marks padding.
fn pack(text: &str) -> Vec<u32> {
    let bytes: Vec<u8> = text.bytes().filter(|&b| b != 0).collect();
    bytes
        .chunks(BYTES_PER_TOKEN)
        .map(|chunk| {
            let mut word = [0u8; BYTES_PER_TOKEN];
            word[..chunk.len()].copy_from_slice(chunk);
            u32::from_be_bytes(word)
        })
        .collect()
}

/// Inverse of `pack`. A character cut by input truncation is dropped.
fn unpack(ids: &[u32]) -> String {
    let bytes: Vec<u8> = ids
        .iter()
        .flat_map(|id| id.to_be_bytes())
        .filter(|&b| b != 0)
        .collect();
    String::from_utf8_lossy(&bytes)
        .trim_end_matches(char::REPLACEMENT_CHARACTER)
        .to_string()
}

// Inference API wire structures
#[derive(Debug, Serialize)]
struct SummarizationRequest<'a> {
    inputs: &'a str,
    parameters: SummarizationParameters,
}

#[derive(Debug, Serialize)]
struct SummarizationParameters {
    max_length: usize,
    min_length: usize,
    num_beams: u32,
    length_penalty: f32,
    early_stopping: bool,
    no_repeat_ngram_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    do_sample: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    truncation: &'static str,
}

impl From<&GenerationParameters> for SummarizationParameters {
    fn from(params: &GenerationParameters) -> Self {
        let sampling = params.is_sampling();
        Self {
            max_length: params.max_new_tokens,
            min_length: params.min_new_tokens,
            num_beams: params.num_beams,
            length_penalty: params.length_penalty,
            early_stopping: params.early_stopping,
            no_repeat_ngram_size: params.no_repeat_ngram_size,
            do_sample: params.do_sample,
            temperature: params.temperature,
            top_k: sampling.then_some(params.top_k),
            top_p: sampling.then_some(params.top_p),
            truncation: "only_first",
        }
    }
}

#[derive(Debug, Deserialize)]
struct Summary {
    summary_text: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SummarizationResponse {
    Many(Vec<Summary>),
    One(Summary),
}

impl SummarizationResponse {
    fn into_summaries(self) -> Vec<Summary> {
        match self {
            SummarizationResponse::Many(all) => all,
            SummarizationResponse::One(one) => vec![one],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_and_unpack_preserve_text() {
        for text in ["", "abc", "abcd", "Éléphant énorme, ça va.", "emoji 🦀 crab"] {
            assert_eq!(unpack(&pack(text)), text);
        }
        assert_eq!(pack("abcdefgh").len(), 2);
        assert_eq!(pack("abcdefghi").len(), 3);
    }

    #[test]
    fn truncation_inside_a_character_drops_it() {
        // "ab" + 4-byte crab emoji: the second id holds its last two bytes
        let ids = pack("ab🦀");
        assert_eq!(ids.len(), 2);
        assert_eq!(unpack(&ids[..1]), "ab");
    }

    #[test]
    fn sampling_fields_only_sent_when_sampling() {
        let beam = SummarizationParameters::from(&GenerationParameters::beam_search(60, 10));
        let json = serde_json::to_value(&beam).unwrap();
        assert_eq!(json["max_length"], 60);
        assert_eq!(json["min_length"], 10);
        assert_eq!(json["num_beams"], 4);
        assert!(json.get("temperature").is_none());
        assert!(json.get("top_k").is_none());

        let sampled =
            SummarizationParameters::from(&GenerationParameters::beam_search(60, 10).with_sampling(0.7));
        let json = serde_json::to_value(&sampled).unwrap();
        assert_eq!(json["do_sample"], true);
        assert_eq!(json["top_k"], 50);
    }

    #[test]
    fn response_accepts_list_or_single_object() {
        let many: SummarizationResponse =
            serde_json::from_str(r#"[{"summary_text":"a"},{"summary_text":"b"}]"#).unwrap();
        assert_eq!(many.into_summaries().len(), 2);
        let one: SummarizationResponse = serde_json::from_str(r#"{"summary_text":"a"}"#).unwrap();
        assert_eq!(one.into_summaries()[0].summary_text, "a");
    }
}
