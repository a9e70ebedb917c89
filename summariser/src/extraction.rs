use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use scraper::{ElementRef, Html, Node, Selector};
use thiserror::Error;
use tracing::{info, warn};

use crate::preprocess::{collapse_whitespace, strip_boilerplate};

/// Below this many characters an extraction is "insufficient content"
pub const MIN_CONTENT_CHARS: usize = 100;

/// Largest page body read before giving up
pub const MAX_RESPONSE_BYTES: u64 = 5 * 1024 * 1024;

// Subtrees dropped before text extraction
const EXCLUDED_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "iframe", "nav", "header", "footer",
];

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("page fetch failed with status: {0}")]
    Status(reqwest::StatusCode),
    #[error("page is larger than {limit} bytes")]
    TooLarge { limit: u64 },
}

#[derive(Debug, Clone)]
pub struct ExtractorSettings {
    pub timeout: Duration,
    pub user_agent: String,
    pub max_response_bytes: u64,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: "Summariser/0.1.0".to_string(),
            max_response_bytes: MAX_RESPONSE_BYTES,
        }
    }
}

impl From<Option<&common::ExtractionConfig>> for ExtractorSettings {
    fn from(cfg: Option<&common::ExtractionConfig>) -> Self {
        let defaults = Self::default();
        Self {
            timeout: cfg
                .and_then(|c| c.timeout_seconds)
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            user_agent: cfg
                .and_then(|c| c.user_agent.clone())
                .unwrap_or(defaults.user_agent),
            max_response_bytes: cfg
                .and_then(|c| c.max_response_bytes)
                .unwrap_or(defaults.max_response_bytes),
        }
    }
}

/// Fetches pages and pulls out their main readable text.
pub struct ContentExtractor {
    client: Client,
    max_response_bytes: u64,
}

impl ContentExtractor {
    pub fn new(settings: ExtractorSettings) -> Result<Self, ExtractionError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .user_agent(settings.user_agent)
            .build()?;
        Ok(Self {
            client,
            max_response_bytes: settings.max_response_bytes,
        })
    }

    /// Fetch `url` and return its main content as plain text.
    ///
    /// Errors are typed: a bad URL is the caller's fault, anything network or
    /// status related is an extraction failure. Short results are returned as-is;
    /// the caller decides whether they are sufficient.
    pub async fn extract(&self, url: &str) -> Result<String, ExtractionError> {
        let parsed = validate_url(url)?;

        let response = self.client.get(parsed).send().await.map_err(|e| {
            warn!("extraction: fetch failed for {}: {}", url, e);
            ExtractionError::Request(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!("extraction: {} returned status {}", url, status);
            return Err(ExtractionError::Status(status));
        }

        let html = self.read_body(response).await.map_err(|e| {
            warn!("extraction: reading {} failed: {}", url, e);
            e
        })?;
        let text = extract_main_content(&html);
        info!("extraction: {} chars of main content from {}", text.chars().count(), url);
        Ok(text)
    }

    /// Read the body chunk by chunk, stopping once it exceeds the size limit.
    async fn read_body(&self, mut response: reqwest::Response) -> Result<String, ExtractionError> {
        let limit = self.max_response_bytes;
        if response.content_length().is_some_and(|len| len > limit) {
            return Err(ExtractionError::TooLarge { limit });
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if (body.len() + chunk.len()) as u64 > limit {
                return Err(ExtractionError::TooLarge { limit });
            }
            body.extend_from_slice(&chunk);
        }
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

/// Accept only absolute http(s) URLs with a host.
pub fn validate_url(url: &str) -> Result<url::Url, ExtractionError> {
    let invalid = |reason: &str| ExtractionError::InvalidUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    };
    let parsed = url::Url::parse(url).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    if parsed.host_str().is_none() {
        return Err(invalid("missing host"));
    }
    Ok(parsed)
}

fn comment_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)comment").expect("comment pattern is valid"))
}

// A content word anywhere in a dash/underscore separated class or id,
// e.g. `content`, `main-content`, `post_body`, `single-entry`.
fn content_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:^|[-_])(?:content|post|article|entry|story)(?:[-_]|$)")
            .expect("content pattern is valid")
    })
}

// Parts of a post that are not its body: `post-meta`, `entry-author`, ...
fn non_content_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:^|[-_])(?:meta|author|byline|date|tags?|share|related|title|header|footer|nav)(?:[-_]|$)")
            .expect("non-content pattern is valid")
    })
}

fn sentence_break() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"([.!?])\s+([A-Z0-9"“])"#).expect("sentence pattern is valid"))
}

fn class_or_id_matches(el: &ElementRef, re: &Regex) -> bool {
    let value = el.value();
    value.id().is_some_and(|id| re.is_match(id)) || value.classes().any(|c| re.is_match(c))
}

fn is_excluded(el: &ElementRef) -> bool {
    EXCLUDED_TAGS.contains(&el.value().name()) || class_or_id_matches(el, comment_pattern())
}

/// An element is usable as a container when neither it nor any ancestor is excluded.
fn is_usable(el: &ElementRef) -> bool {
    !is_excluded(el) && !el.ancestors().filter_map(ElementRef::wrap).any(|a| is_excluded(&a))
}

/// Pick the main content container: `<article>`, then a content-like class/id,
/// then `<main>`, then `<body>`.
fn select_container(doc: &Html) -> ElementRef<'_> {
    let first_usable = |css: &str| {
        Selector::parse(css)
            .ok()
            .and_then(|sel| doc.select(&sel).find(is_usable))
    };

    if let Some(article) = first_usable("article") {
        return article;
    }
    if let Ok(any) = Selector::parse("[class], [id]") {
        if let Some(el) = doc
            .select(&any)
            .find(|el| {
                class_or_id_matches(el, content_pattern())
                    && !class_or_id_matches(el, non_content_pattern())
                    && is_usable(el)
            })
        {
            return el;
        }
    }
    first_usable("main")
        .or_else(|| first_usable("body"))
        .unwrap_or_else(|| doc.root_element())
}

fn collect_text(el: ElementRef, out: &mut Vec<String>) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => out.push(text.to_string()),
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    if !is_excluded(&child_el) {
                        collect_text(child_el, out);
                    }
                }
            }
            _ => {}
        }
    }
}

/// Derive cleaned plain text from an HTML document.
///
/// Visible text nodes of the chosen container are joined with single spaces,
/// whitespace is collapsed, a paragraph break follows each sentence end, and
/// boilerplate phrases are dropped.
pub fn extract_main_content(html: &str) -> String {
    let doc = Html::parse_document(html);
    let container = select_container(&doc);

    let mut pieces = Vec::new();
    collect_text(container, &mut pieces);

    let flat = collapse_whitespace(&pieces.join(" "));
    let broken = sentence_break().replace_all(&flat, "$1\n\n$2");

    broken
        .split("\n\n")
        .map(|para| collapse_whitespace(&strip_boilerplate(para)))
        .filter(|para| !para.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}
