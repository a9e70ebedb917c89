//! Generation invoker: maps character-length bounds to a token budget and
//! runs the model through an ordered list of fallback tiers.

use thiserror::Error;
use tracing::{info, warn};

use crate::model::{GenerationParameters, SequenceModel};

/// Rough characters-per-token ratio used to turn character bounds into a token budget.
/// Exact output length is enforced later by `postprocess::clean`.
pub const CHARS_PER_TOKEN: usize = 4;

/// Temperature used by the second tier when the caller's value fails
pub const DEFAULT_TEMPERATURE: f32 = 1.0;

/// What the loop does when a tier's attempt fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnFailure {
    Continue,
    Fail,
}

#[derive(Debug, Clone)]
pub struct Tier {
    pub label: &'static str,
    pub params: GenerationParameters,
    pub on_failure: OnFailure,
}

/// Result of evaluating a tier list
#[derive(Debug)]
pub enum TierOutcome {
    Success(Generated),
    Exhausted { attempts: usize, last_error: anyhow::Error },
}

/// A successful generation and the parameters that produced it
#[derive(Debug, Clone)]
pub struct Generated {
    pub tokens: Vec<u32>,
    pub params: GenerationParameters,
    /// 1-based index of the tier that succeeded
    pub tier: usize,
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation failed after {attempts} attempt(s): {last_error}")]
    Exhausted { attempts: usize, last_error: anyhow::Error },
}

/// Convert a character count to a token budget, never below one token.
pub fn chars_to_tokens(chars: usize) -> usize {
    (chars / CHARS_PER_TOKEN).max(1)
}

/// Build the ordered tiers for a request.
///
/// Beam search only: a single fatal tier. With sampling: caller temperature,
/// then the default temperature, then plain beam search.
pub fn fallback_tiers(base: &GenerationParameters, do_sample: bool, temperature: f32) -> Vec<Tier> {
    let mut plain = base.clone();
    plain.do_sample = None;
    plain.temperature = None;

    if !do_sample {
        return vec![Tier {
            label: "beam search",
            params: plain,
            on_failure: OnFailure::Fail,
        }];
    }

    vec![
        Tier {
            label: "sampling",
            params: plain.clone().with_sampling(temperature),
            on_failure: OnFailure::Continue,
        },
        Tier {
            label: "sampling with default temperature",
            params: plain.clone().with_sampling(DEFAULT_TEMPERATURE),
            on_failure: OnFailure::Continue,
        },
        Tier {
            label: "beam search",
            params: plain,
            on_failure: OnFailure::Fail,
        },
    ]
}

/// Evaluate tiers in order, returning the first success.
pub async fn run_tiers<M: SequenceModel + ?Sized>(model: &M, input_ids: &[u32], tiers: Vec<Tier>) -> TierOutcome {
    let mut last_error = anyhow::anyhow!("no generation tiers to run");
    let mut attempts = 0;

    for (idx, tier) in tiers.into_iter().enumerate() {
        attempts += 1;
        match model.generate(input_ids, &tier.params).await {
            Ok(mut sequences) if !sequences.is_empty() => {
                if idx > 0 {
                    info!(tier = idx + 1, label = tier.label, "generation succeeded on fallback tier");
                }
                return TierOutcome::Success(Generated {
                    tokens: sequences.swap_remove(0),
                    params: tier.params,
                    tier: idx + 1,
                });
            }
            Ok(_) => {
                last_error = anyhow::anyhow!("model returned no sequences");
            }
            Err(e) => {
                last_error = e;
            }
        }

        match tier.on_failure {
            OnFailure::Continue => warn!(
                tier = idx + 1,
                label = tier.label,
                error = %last_error,
                "generation attempt failed, falling back"
            ),
            OnFailure::Fail => break,
        }
    }

    TierOutcome::Exhausted { attempts, last_error }
}

/// Generate a summary token sequence for already-tokenized input.
///
/// `max_length` and `min_length` are character bounds; `min_length > max_length`
/// is passed through unchanged.
pub async fn invoke<M: SequenceModel + ?Sized>(
    model: &M,
    input_ids: &[u32],
    max_length: usize,
    min_length: usize,
    do_sample: bool,
    temperature: f32,
) -> Result<Generated, GenerationError> {
    let base = GenerationParameters::beam_search(chars_to_tokens(max_length), chars_to_tokens(min_length));
    let tiers = fallback_tiers(&base, do_sample, temperature);

    match run_tiers(model, input_ids, tiers).await {
        TierOutcome::Success(generated) => Ok(generated),
        TierOutcome::Exhausted { attempts, last_error } => {
            Err(GenerationError::Exhausted { attempts, last_error })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_budget_floors_at_one() {
        assert_eq!(chars_to_tokens(0), 1);
        assert_eq!(chars_to_tokens(3), 1);
        assert_eq!(chars_to_tokens(150), 37);
    }

    #[test]
    fn beam_search_has_single_fatal_tier() {
        let base = GenerationParameters::beam_search(10, 2);
        let tiers = fallback_tiers(&base, false, 1.7);
        assert_eq!(tiers.len(), 1);
        assert_eq!(tiers[0].on_failure, OnFailure::Fail);
        assert_eq!(tiers[0].params.do_sample, None);
        assert_eq!(tiers[0].params.temperature, None);
    }

    #[test]
    fn sampling_has_three_tiers_ending_in_plain_beam_search() {
        let base = GenerationParameters::beam_search(10, 2);
        let tiers = fallback_tiers(&base, true, 1.7);

        assert_eq!(tiers.len(), 3);
        assert_eq!(tiers[0].params.temperature, Some(1.7));
        assert_eq!(tiers[1].params.temperature, Some(DEFAULT_TEMPERATURE));
        assert_eq!(tiers[1].params.do_sample, Some(true));
        assert_eq!(tiers[2].params.do_sample, None);
        assert_eq!(tiers[2].params.temperature, None);
        assert_eq!(tiers[2].params.num_beams, base.num_beams);
        assert_eq!(
            tiers.iter().map(|t| t.on_failure).collect::<Vec<_>>(),
            vec![OnFailure::Continue, OnFailure::Continue, OnFailure::Fail]
        );
    }
}
