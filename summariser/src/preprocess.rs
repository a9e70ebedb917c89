//! Input normalization for web-derived text before tokenization.

use std::sync::OnceLock;

use regex::Regex;

/// Maximum characters handed to the tokenizer. Leading content is kept.
pub const MAX_INPUT_CHARS: usize = 10_000;

// Best-effort denylist of navigation and chrome text that leaks out of pages.
const BOILERPLATE_PATTERNS: &[&str] = &[
    r"(?i)\bskip to (?:the )?(?:main )?(?:content|navigation|search)\b",
    r"(?i)\b(?:toggle|open|close) (?:the )?(?:navigation|menu|search)\b",
    r"(?i)\b(?:main|primary|site|mobile) (?:menu|navigation)\b",
    r"(?i)\bsearch this site\b\s*(?::|\.{3}|…)?",
    r"(?i)\bsearch(?: for)?\s*(?::|\.{3}|…)",
    r"(?i)\bshare (?:this|on) (?:article|story|page|facebook|twitter|linkedin)\b",
    r"(?i)\b(?:accept|manage|reject) (?:all )?cookies\b",
    r"(?i)\b(?:subscribe to our newsletter|sign up for our newsletter)\b",
];

fn boilerplate() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        BOILERPLATE_PATTERNS
            .iter()
            .map(|p| Regex::new(p).expect("boilerplate pattern is valid"))
            .collect()
    })
}

fn whitespace() -> &'static Regex {
    static WS: OnceLock<Regex> = OnceLock::new();
    WS.get_or_init(|| Regex::new(r"\s+").expect("whitespace pattern is valid"))
}

/// Collapse every whitespace run to a single space and trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    whitespace().replace_all(text, " ").trim().to_string()
}

/// Remove denylisted navigation/search/menu phrases.
pub fn strip_boilerplate(text: &str) -> String {
    boilerplate()
        .iter()
        .fold(text.to_string(), |acc, re| re.replace_all(&acc, "").into_owned())
}

/// Keep at most `max_chars` characters from the start of `text`.
pub fn cap_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Normalize raw page text: collapse whitespace, drop boilerplate, cap length.
pub fn preprocess(raw: &str) -> String {
    let collapsed = collapse_whitespace(raw);
    let cleaned = collapse_whitespace(&strip_boilerplate(&collapsed));
    cap_chars(&cleaned, MAX_INPUT_CHARS).trim_end().to_string()
}
