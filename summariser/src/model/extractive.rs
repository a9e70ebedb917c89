// Built-in extractive backend
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use super::{Device, GenerationParameters, SequenceModel};

/// End-of-sequence id, never produced by `tokenize` and skipped by `decode`
pub const EOS_TOKEN: u32 = 0;

/// Distinct words held by one vocabulary generation unless configured otherwise
pub const DEFAULT_VOCABULARY_CAPACITY: usize = 50_000;

// Low bits index a word inside its generation, high bits tag the generation.
const INDEX_BITS: u32 = 24;
const INDEX_MASK: u32 = (1 << INDEX_BITS) - 1;

/// Lead-sentence backend that needs no external model.
///
/// Tokens are whitespace-separated words interned into a shared vocabulary.
/// Generation selects whole input sentences in document order until the
/// token budget runs out.
///
/// The vocabulary is bounded: once the current generation holds `capacity`
/// words, the next `tokenize` call starts a fresh one. The previous generation
/// stays decodable, so ids stay valid until two rotations later.
pub struct ExtractiveModel {
    vocab: Mutex<Vocabulary>,
}

struct Generation {
    tag: u32,
    index: HashMap<String, u32>,
    words: Vec<String>,
}

impl Generation {
    fn new(tag: u32) -> Self {
        Self {
            tag,
            index: HashMap::new(),
            words: Vec::new(),
        }
    }

    fn word(&self, id: u32) -> Option<&str> {
        if id >> INDEX_BITS != self.tag {
            return None;
        }
        let pos = (id & INDEX_MASK).checked_sub(1)?;
        self.words.get(pos as usize).map(String::as_str)
    }
}

struct Vocabulary {
    capacity: usize,
    current: Generation,
    previous: Option<Generation>,
}

impl Vocabulary {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.clamp(1, INDEX_MASK as usize),
            current: Generation::new(0),
            previous: None,
        }
    }

    /// Start a new generation if the current one is full.
    fn rotate_if_full(&mut self) {
        if self.current.words.len() < self.capacity {
            return;
        }
        let tag = (self.current.tag + 1) & (u32::MAX >> INDEX_BITS);
        let retired = std::mem::replace(&mut self.current, Generation::new(tag));
        debug!(tag, retired_words = retired.words.len(), "extractive vocabulary rotated");
        self.previous = Some(retired);
    }

    fn intern(&mut self, word: &str) -> Result<u32> {
        let current = &mut self.current;
        if let Some(&id) = current.index.get(word) {
            return Ok(id);
        }
        // positions start at 1 so that no id equals EOS
        let pos = current.words.len() as u32 + 1;
        if pos > INDEX_MASK {
            anyhow::bail!("too many distinct words in one input");
        }
        let id = (current.tag << INDEX_BITS) | pos;
        current.words.push(word.to_string());
        current.index.insert(word.to_string(), id);
        Ok(id)
    }

    fn word(&self, id: u32) -> Option<&str> {
        if id == EOS_TOKEN {
            return None;
        }
        self.current
            .word(id)
            .or_else(|| self.previous.as_ref().and_then(|g| g.word(id)))
    }

    fn len(&self) -> usize {
        self.current.words.len() + self.previous.as_ref().map_or(0, |g| g.words.len())
    }
}

impl ExtractiveModel {
    pub fn new() -> Self {
        Self::with_vocabulary_capacity(DEFAULT_VOCABULARY_CAPACITY)
    }

    pub fn with_vocabulary_capacity(capacity: usize) -> Self {
        Self {
            vocab: Mutex::new(Vocabulary::new(capacity)),
        }
    }

    /// Words currently held across both vocabulary generations.
    pub fn vocabulary_len(&self) -> usize {
        self.vocab.lock().map(|v| v.len()).unwrap_or(0)
    }

    fn vocab(&self) -> Result<std::sync::MutexGuard<'_, Vocabulary>> {
        self.vocab.lock().map_err(|_| anyhow!("vocabulary lock poisoned"))
    }

    /// Split ids into sentences at words ending in `.`, `!` or `?`.
    fn sentences(&self, ids: &[u32]) -> Result<Vec<Vec<u32>>> {
        let vocab = self.vocab()?;
        let mut sentences = Vec::new();
        let mut current = Vec::new();

        for &id in ids {
            if id == EOS_TOKEN {
                continue;
            }
            let word = vocab
                .word(id)
                .ok_or_else(|| anyhow!("unknown token id {}", id))?;
            current.push(id);
            if word.ends_with(['.', '!', '?']) {
                sentences.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            sentences.push(current);
        }
        Ok(sentences)
    }
}

impl Default for ExtractiveModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SequenceModel for ExtractiveModel {
    fn name(&self) -> &str {
        "extractive-lead"
    }

    fn device(&self) -> Device {
        Device::Cpu
    }

    async fn tokenize(&self, text: &str) -> Result<Vec<u32>> {
        let mut vocab = self.vocab()?;
        // one call never straddles a rotation
        vocab.rotate_if_full();
        text.split_whitespace().map(|w| vocab.intern(w)).collect()
    }

    async fn generate(&self, input_ids: &[u32], params: &GenerationParameters) -> Result<Vec<Vec<u32>>> {
        let budget = params.max_new_tokens.max(1);

        // Repeated sentences are dropped, mirroring no-repeat-ngram behaviour.
        let mut seen = HashSet::new();
        let candidates: Vec<(usize, Vec<u32>)> = self
            .sentences(input_ids)?
            .into_iter()
            .enumerate()
            .filter(|(_, s)| seen.insert(s.clone()))
            .collect();

        let Some((_, first)) = candidates.first() else {
            return Ok(vec![vec![EOS_TOKEN]]);
        };
        if first.len() > budget {
            let mut cut = first[..budget].to_vec();
            cut.push(EOS_TOKEN);
            return Ok(vec![cut]);
        }

        let selected = if params.is_sampling() {
            let temperature = params.temperature.unwrap_or(1.0);
            if !temperature.is_finite() || temperature <= 0.0 {
                anyhow::bail!("invalid sampling temperature {}", temperature);
            }
            sample_sentences(candidates, budget, params.top_k.max(1) as usize, temperature)?
        } else {
            lead_sentences(candidates, budget)
        };

        let mut output: Vec<u32> = selected.into_iter().flatten().collect();
        output.push(EOS_TOKEN);
        Ok(vec![output])
    }

    async fn decode(&self, ids: &[u32]) -> Result<String> {
        let vocab = self.vocab()?;
        let mut words = Vec::with_capacity(ids.len());
        for &id in ids.iter().filter(|&&id| id != EOS_TOKEN) {
            words.push(vocab.word(id).ok_or_else(|| anyhow!("unknown token id {}", id))?);
        }
        Ok(words.join(" "))
    }
}

/// Take sentences in order while they fit.
fn lead_sentences(candidates: Vec<(usize, Vec<u32>)>, budget: usize) -> Vec<Vec<u32>> {
    let mut used = 0;
    let mut selected = Vec::new();
    for (_, sentence) in candidates {
        if used + sentence.len() > budget {
            break;
        }
        used += sentence.len();
        selected.push(sentence);
    }
    selected
}

/// Draw among the next `top_k` remaining sentences with weight `exp(-rank / temperature)`,
/// then restore document order.
fn sample_sentences(
    mut remaining: Vec<(usize, Vec<u32>)>,
    budget: usize,
    top_k: usize,
    temperature: f32,
) -> Result<Vec<Vec<u32>>> {
    let mut rng = StdRng::from_entropy();
    let mut used = 0;
    let mut picked: Vec<(usize, Vec<u32>)> = Vec::new();

    loop {
        remaining.retain(|(_, s)| used + s.len() <= budget);
        if remaining.is_empty() {
            break;
        }
        let window = remaining.len().min(top_k);
        let weights: Vec<f64> = (0..window)
            .map(|rank| (-(rank as f64) / temperature as f64).exp())
            .collect();
        let dist = WeightedIndex::new(&weights).map_err(|e| anyhow!("sampling failed: {}", e))?;
        let choice = remaining.remove(dist.sample(&mut rng));
        used += choice.1.len();
        picked.push(choice);
    }

    picked.sort_by_key(|(pos, _)| *pos);
    Ok(picked.into_iter().map(|(_, s)| s).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = "The council approved the budget. Roads will be repaired first. \
                        Parks get new benches. The council approved the budget.";

    #[tokio::test]
    async fn tokenize_decode_round_trip_preserves_words() {
        let model = ExtractiveModel::new();
        let ids = model.tokenize("Hello  world.\nAgain").await.unwrap();
        assert_eq!(ids.len(), 3);
        assert_eq!(model.decode(&ids).await.unwrap(), "Hello world. Again");
    }

    #[tokio::test]
    async fn generate_keeps_lead_sentences_within_budget() {
        let model = ExtractiveModel::new();
        let ids = model.tokenize(TEXT).await.unwrap();
        let params = GenerationParameters::beam_search(11, 1);

        let out = model.generate(&ids, &params).await.unwrap();
        let text = model.decode(&out[0]).await.unwrap();
        assert_eq!(text, "The council approved the budget. Roads will be repaired first.");
    }

    #[tokio::test]
    async fn generate_cuts_an_oversized_first_sentence() {
        let model = ExtractiveModel::new();
        let ids = model.tokenize(TEXT).await.unwrap();
        let params = GenerationParameters::beam_search(3, 1);

        let out = model.generate(&ids, &params).await.unwrap();
        assert_eq!(model.decode(&out[0]).await.unwrap(), "The council approved");
    }

    #[tokio::test]
    async fn generate_drops_repeated_sentences() {
        let model = ExtractiveModel::new();
        let ids = model.tokenize(TEXT).await.unwrap();
        let params = GenerationParameters::beam_search(100, 1);

        let out = model.generate(&ids, &params).await.unwrap();
        let text = model.decode(&out[0]).await.unwrap();
        assert_eq!(text.matches("approved the budget").count(), 1);
    }

    #[tokio::test]
    async fn sampling_preserves_document_order() {
        let model = ExtractiveModel::new();
        let ids = model.tokenize(TEXT).await.unwrap();
        let params = GenerationParameters::beam_search(100, 1).with_sampling(1.3);

        let out = model.generate(&ids, &params).await.unwrap();
        let text = model.decode(&out[0]).await.unwrap();
        // budget admits every unique sentence, so sampling picks them all
        assert_eq!(
            text,
            "The council approved the budget. Roads will be repaired first. Parks get new benches."
        );
    }

    #[tokio::test]
    async fn vocabulary_stays_bounded_under_distinct_inputs() {
        let model = ExtractiveModel::with_vocabulary_capacity(100);
        for i in 0..20_000 {
            model.tokenize(&format!("word{} other{}.", i, i)).await.unwrap();
        }
        assert!(model.vocabulary_len() <= 2 * 100 + 2);
    }

    #[tokio::test]
    async fn ids_survive_one_rotation_but_not_two() {
        let model = ExtractiveModel::with_vocabulary_capacity(2);
        let first = model.tokenize("alpha beta").await.unwrap();

        let second = model.tokenize("gamma delta").await.unwrap();
        assert_eq!(model.decode(&first).await.unwrap(), "alpha beta");
        assert_eq!(model.decode(&second).await.unwrap(), "gamma delta");

        model.tokenize("epsilon zeta").await.unwrap();
        assert!(model.decode(&first).await.is_err());
        assert_eq!(model.decode(&second).await.unwrap(), "gamma delta");
    }

    #[tokio::test]
    async fn one_large_input_is_never_split_across_generations() {
        let model = ExtractiveModel::with_vocabulary_capacity(3);
        let ids = model.tokenize("one two three four five six.").await.unwrap();
        assert_eq!(model.decode(&ids).await.unwrap(), "one two three four five six.");

        let out = model
            .generate(&ids, &GenerationParameters::beam_search(10, 1))
            .await
            .unwrap();
        assert_eq!(model.decode(&out[0]).await.unwrap(), "one two three four five six.");
    }

    #[tokio::test]
    async fn sampling_rejects_non_positive_temperature() {
        let model = ExtractiveModel::new();
        let ids = model.tokenize(TEXT).await.unwrap();
        let params = GenerationParameters::beam_search(100, 1).with_sampling(0.0);
        assert!(model.generate(&ids, &params).await.is_err());
    }
}
