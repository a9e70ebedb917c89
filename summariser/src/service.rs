//! Summarisation orchestrator.
//!
//! Composes tokenization, generation with fallback, decoding and cleanup
//! into a single `summarise` call, reporting progress to the job tracker.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cache::{CacheKey, SummaryCache};
use crate::error::SummariseError;
use crate::generation;
use crate::job_status::{estimate_seconds, JobTracker, Stage};
use crate::model::{Device, SequenceModel};
use crate::postprocess::clean;
use crate::preprocess::preprocess;

/// Default cap on tokens handed to the model (BART's positional limit)
pub const DEFAULT_MAX_INPUT_TOKENS: usize = 1024;

pub const MIN_TEXT_CHARS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryParams {
    pub max_length: usize,
    pub min_length: usize,
    pub do_sample: bool,
    pub temperature: f32,
}

impl Default for SummaryParams {
    fn default() -> Self {
        Self {
            max_length: 150,
            min_length: 50,
            do_sample: false,
            temperature: 1.0,
        }
    }
}

impl SummaryParams {
    /// Check field ranges. `min_length > max_length` is allowed.
    pub fn validate(&self) -> Result<(), SummariseError> {
        if !(30..=500).contains(&self.max_length) {
            return Err(SummariseError::Validation(format!(
                "max_length must be between 30 and 500, got {}",
                self.max_length
            )));
        }
        if !(10..=200).contains(&self.min_length) {
            return Err(SummariseError::Validation(format!(
                "min_length must be between 10 and 200, got {}",
                self.min_length
            )));
        }
        if !(0.7..=2.0).contains(&self.temperature) {
            return Err(SummariseError::Validation(format!(
                "temperature must be between 0.7 and 2.0, got {}",
                self.temperature
            )));
        }
        Ok(())
    }
}

/// Text must carry at least `MIN_TEXT_CHARS` characters.
pub fn validate_text(text: &str) -> Result<(), SummariseError> {
    let chars = text.chars().count();
    if chars < MIN_TEXT_CHARS {
        return Err(SummariseError::Validation(format!(
            "text must be at least {} characters, got {}",
            MIN_TEXT_CHARS, chars
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryMetadata {
    pub input_word_count: usize,
    pub output_word_count: usize,
    /// Output words as a percentage of input words
    pub compression_ratio: f64,
    pub model_used: String,
    pub processing_device: Device,
    pub input_token_count: usize,
    pub truncated: bool,
    pub estimated_time_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryResult {
    pub summary: String,
    pub metadata: SummaryMetadata,
}

pub fn compression_ratio(input_words: usize, output_words: usize) -> f64 {
    if input_words == 0 {
        return 0.0;
    }
    let pct = output_words as f64 / input_words as f64 * 100.0;
    (pct * 100.0).round() / 100.0
}

pub struct SummarisationService {
    model: Arc<dyn SequenceModel>,
    tracker: Arc<JobTracker>,
    cache: SummaryCache,
    max_input_tokens: usize,
}

impl SummarisationService {
    pub fn new(model: Arc<dyn SequenceModel>, cache: SummaryCache, max_input_tokens: usize) -> Self {
        Self {
            model,
            tracker: Arc::new(JobTracker::new()),
            cache,
            max_input_tokens: max_input_tokens.max(1),
        }
    }

    pub fn tracker(&self) -> &JobTracker {
        &self.tracker
    }

    /// Summarise `text` with `params`. The tracked job is completed on every
    /// exit path, including errors.
    pub async fn summarise(&self, text: &str, params: &SummaryParams) -> Result<SummaryResult, SummariseError> {
        let job = self.tracker.start(text);

        let key = CacheKey::new(text, params);
        if let Some(hit) = self.cache.get(&key) {
            debug!(key = key.as_str(), "summary cache hit");
            return Ok(hit);
        }

        job.advance(Stage::Tokenizing, 10);
        let mut input_ids = self.model.tokenize(text).await?;
        let truncated = input_ids.len() > self.max_input_tokens;
        input_ids.truncate(self.max_input_tokens);

        job.advance(Stage::Generating, 30);
        let generated = generation::invoke(
            self.model.as_ref(),
            &input_ids,
            params.max_length,
            params.min_length,
            params.do_sample,
            params.temperature,
        )
        .await?;

        job.advance(Stage::PostProcessing, 80);
        let raw = self.model.decode(&generated.tokens).await?;
        let summary = clean(&raw, params.max_length);

        let input_word_count = text.split_whitespace().count();
        let output_word_count = summary.split_whitespace().count();
        let result = SummaryResult {
            metadata: SummaryMetadata {
                input_word_count,
                output_word_count,
                compression_ratio: compression_ratio(input_word_count, output_word_count),
                model_used: self.model.name().to_string(),
                processing_device: self.model.device(),
                input_token_count: input_ids.len(),
                truncated,
                estimated_time_seconds: estimate_seconds(input_word_count),
            },
            summary,
        };

        info!(
            input_words = input_word_count,
            output_words = output_word_count,
            tier = generated.tier,
            truncated,
            "summary generated"
        );
        self.cache.insert(key, result.clone());
        Ok(result)
    }

    /// Summarise text that came from a web page: normalize it first.
    pub async fn summarise_web_content(&self, raw: &str, params: &SummaryParams) -> Result<SummaryResult, SummariseError> {
        let text = preprocess(raw);
        self.summarise(&text, params).await
    }
}
