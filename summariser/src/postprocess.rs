//! Summary cleanup applied to raw decoded model output.

const SENTENCE_END: [char; 3] = ['.', '!', '?'];

/// Clean a raw summary and fit it into `max_length` characters.
///
/// - everything before the first letter or digit is stripped
/// - the first letter is capitalized
/// - a dangling trailing fragment is cut back to the last sentence end,
///   or a period is appended when there is none
/// - over-long results keep as many whole sentences as fit; when not even
///   one fits the text is hard-truncated and closed with a period
///
/// Pure and idempotent: `clean(&clean(s, n), n) == clean(s, n)`.
pub fn clean(raw: &str, max_length: usize) -> String {
    let trimmed = raw
        .trim_start_matches(|c: char| !c.is_alphanumeric())
        .trim_end();
    if trimmed.is_empty() {
        return String::new();
    }

    let mut text = capitalize_first(trimmed);

    if !text.ends_with(SENTENCE_END) {
        match text.rfind(SENTENCE_END) {
            // sentence-ending marks are single-byte
            Some(pos) => text.truncate(pos + 1),
            None => text.push('.'),
        }
    }

    if text.chars().count() > max_length {
        text = fit_sentences(&text, max_length);
    }

    text.trim_end().to_string()
}

fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Greedily keep whole sentences (split on ". ") up to `max_length` characters.
fn fit_sentences(text: &str, max_length: usize) -> String {
    let pieces: Vec<&str> = text.split(". ").collect();
    let last = pieces.len() - 1;

    let mut out = String::new();
    let mut out_len = 0;
    for (i, piece) in pieces.iter().enumerate() {
        let sentence = if i < last {
            format!("{}.", piece)
        } else {
            piece.to_string()
        };
        let sep = usize::from(!out.is_empty());
        let len = sentence.chars().count();
        if out_len + sep + len > max_length {
            break;
        }
        if sep == 1 {
            out.push(' ');
        }
        out.push_str(&sentence);
        out_len += sep + len;
    }

    if !out.is_empty() {
        return out;
    }
    hard_truncate(text, max_length)
}

/// Cut to `max_length - 1` characters and close with a period, so the
/// result stays within budget and already satisfies the ending rule.
fn hard_truncate(text: &str, max_length: usize) -> String {
    let body: String = text.chars().take(max_length.saturating_sub(1)).collect();
    let body = body.trim_end();
    if body.is_empty() {
        return String::new();
    }
    format!("{}.", body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_leading_punctuation_and_capitalizes() {
        assert_eq!(clean(" ,; the summary is here.", 100), "The summary is here.");
    }

    #[test]
    fn strips_leading_unicode_punctuation() {
        assert_eq!(clean("— the dam opened.", 100), "The dam opened.");
        assert_eq!(clean("« le barrage ouvre.", 100), "Le barrage ouvre.");
        assert_eq!(clean("\u{201c}quoted start.", 100), "Quoted start.");
        assert_eq!(clean("\u{2022} \u{2026}bullet item.", 100), "Bullet item.");
        assert_eq!(clean(" — … ", 100), "");
        // digits are kept
        assert_eq!(clean("… 3 bridges reopened.", 100), "3 bridges reopened.");
    }

    #[test]
    fn truncates_to_last_sentence_end() {
        assert_eq!(
            clean("First point. Second point! Third point is cut", 100),
            "First point. Second point!"
        );
    }

    #[test]
    fn appends_period_without_sentence_end() {
        assert_eq!(clean("no punctuation at all", 100), "No punctuation at all.");
    }

    #[test]
    fn keeps_whole_sentences_within_budget() {
        let raw = "Alpha beta gamma. Delta epsilon zeta. Eta theta iota.";
        let cleaned = clean(raw, 40);
        assert_eq!(cleaned, "Alpha beta gamma. Delta epsilon zeta.");
        assert!(cleaned.chars().count() <= 40);
    }

    #[test]
    fn hard_truncates_when_no_sentence_fits() {
        let raw = "This single sentence is far longer than the tiny budget allows.";
        let cleaned = clean(raw, 20);
        assert!(cleaned.chars().count() <= 20);
        assert!(cleaned.ends_with('.'));
        assert!(cleaned.starts_with("This single"));
    }

    #[test]
    fn empty_and_punctuation_only_inputs_are_empty() {
        assert_eq!(clean("", 50), "");
        assert_eq!(clean("  ...!? ", 50), "");
    }

    #[test]
    fn is_idempotent() {
        let inputs = [
            "- the model said this. and then that, and",
            "— «quoted» opening. then more",
            "Alpha beta gamma. Delta epsilon zeta. Eta theta iota.",
            "This single sentence is far longer than the tiny budget allows.",
            "über straße. ärger folgt",
            "Short!",
            "x",
        ];
        for raw in inputs {
            for budget in [1, 5, 20, 40, 200] {
                let once = clean(raw, budget);
                assert_eq!(clean(&once, budget), once, "raw={:?} budget={}", raw, budget);
            }
        }
    }

    #[test]
    fn non_empty_output_always_ends_a_sentence() {
        for raw in ["one two three", "done. partial", "Why? because", "Wow!"] {
            let out = clean(raw, 200);
            assert!(out.ends_with(['.', '!', '?']), "{:?}", out);
        }
    }

    #[test]
    fn handles_multibyte_characters_in_budget() {
        let raw = "Éléphant énorme. Ça va très bien.";
        let out = clean(raw, 17);
        assert_eq!(out, "Éléphant énorme.");
    }
}
