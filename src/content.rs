use regex::{Captures, Regex};
use serde::Serialize;
use std::future::Future;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;

use crate::config::ContentConfig;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("Failed to fetch {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Fetching {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },
    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("No readable text found at {url}")]
    Empty { url: String },
}

/// Extracted text of a page, cut to the configured character budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedContent {
    pub url: String,
    pub text: String,
    pub truncated: bool,
    pub original_chars: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentInfo {
    pub url: String,
    pub chars_used: usize,
    pub original_chars: usize,
    pub truncated: bool,
}

impl FetchedContent {
    pub fn new(url: impl Into<String>, text: &str, max_chars: usize) -> Self {
        let (text, original_chars, truncated) = truncate_chars(text, max_chars);
        Self {
            url: url.into(),
            text,
            truncated,
            original_chars,
        }
    }

    pub fn info(&self) -> ContentInfo {
        ContentInfo {
            url: self.url.clone(),
            chars_used: self.text.chars().count(),
            original_chars: self.original_chars,
            truncated: self.truncated,
        }
    }
}

pub trait ContentSource: Send + Sync {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<FetchedContent, FetchError>> + Send;
}

pub struct HttpContentSource {
    client: reqwest::Client,
    max_chars: usize,
    timeout: Duration,
}

impl HttpContentSource {
    pub fn new(config: &ContentConfig) -> Result<Self, reqwest::Error> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            max_chars: config.max_chars,
            timeout,
        })
    }

    fn map_reqwest_error(&self, url: &str, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
                timeout: self.timeout,
            }
        } else {
            FetchError::Http {
                url: url.to_string(),
                source: err,
            }
        }
    }
}

impl ContentSource for HttpContentSource {
    #[tracing::instrument(skip(self), fields(http.url = %url))]
    async fn fetch(&self, url: &str) -> Result<FetchedContent, FetchError> {
        let parsed = validate_url(url)?;

        tracing::debug!("Fetching page content");
        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(http.status = %status, "Content fetch failed");
            return Err(status_error(url, status));
        }

        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_ascii_lowercase().contains("html"))
            .unwrap_or(true);

        let body = response
            .text()
            .await
            .map_err(|e| self.map_reqwest_error(url, e))?;

        let text = extract_text(is_html, &body, url)?;

        let content = FetchedContent::new(url, &text, self.max_chars);
        if content.truncated {
            tracing::info!(
                content.original_chars = content.original_chars,
                content.max_chars = self.max_chars,
                "Content is long, using only its beginning for quiz generation"
            );
        } else {
            tracing::info!(
                content.chars = content.original_chars,
                "Fetched page content"
            );
        }

        Ok(content)
    }
}

fn status_error(url: &str, status: reqwest::StatusCode) -> FetchError {
    FetchError::Status {
        url: url.to_string(),
        status: status.as_u16(),
    }
}

fn validate_url(url: &str) -> Result<reqwest::Url, FetchError> {
    let parsed = reqwest::Url::parse(url.trim()).map_err(|e| FetchError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(FetchError::InvalidUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme '{other}'"),
        }),
    }
}

/// Turns a response body into quiz source text. A page with no visible text is
/// an error rather than an empty quiz.
fn extract_text(is_html: bool, body: &str, url: &str) -> Result<String, FetchError> {
    let text = if is_html {
        html_to_text(body)
    } else {
        normalize_whitespace(body)
    };

    if text.is_empty() {
        return Err(FetchError::Empty {
            url: url.to_string(),
        });
    }
    Ok(text)
}

/// Keeps the first `max_chars` characters. Returns the kept text, the original
/// character count and whether anything was cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> (String, usize, bool) {
    let original_chars = text.chars().count();
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (text[..byte_idx].to_string(), original_chars, true),
        None => (text.to_string(), original_chars, false),
    }
}

static HIDDEN_BLOCKS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)<!--.*?-->|<script\b.*?</script\s*>|<style\b.*?</style\s*>|<noscript\b.*?</noscript\s*>|<head\b.*?</head\s*>|<template\b.*?</template\s*>",
    )
    .expect("hidden block pattern is valid")
});

static BLOCK_TAGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)</?(?:p|div|br|li|ul|ol|h[1-6]|tr|td|th|table|section|article|header|footer|nav|main|aside|blockquote|pre|dd|dt|figcaption)\b[^>]*>",
    )
    .expect("block tag pattern is valid")
});

static ANY_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("tag pattern is valid"));

static NUMERIC_ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&#(?:[xX]([0-9a-fA-F]{1,6})|([0-9]{1,7}));").expect("entity pattern is valid")
});

static INLINE_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\u{a0}\r\f\v]+").expect("space pattern is valid"));

/// Reduces an HTML document to its visible text, one block per line.
pub fn html_to_text(html: &str) -> String {
    let visible = HIDDEN_BLOCKS.replace_all(html, " ");
    let with_breaks = BLOCK_TAGS.replace_all(&visible, "\n");
    let stripped = ANY_TAG.replace_all(&with_breaks, "");
    normalize_whitespace(&decode_entities(&stripped))
}

fn decode_entities(text: &str) -> String {
    let numeric = NUMERIC_ENTITY.replace_all(text, |caps: &Captures| {
        let code = match (caps.get(1), caps.get(2)) {
            (Some(hex), _) => u32::from_str_radix(hex.as_str(), 16).ok(),
            (None, Some(dec)) => dec.as_str().parse::<u32>().ok(),
            _ => None,
        };
        code.and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default()
    });

    // &amp; last so "&amp;lt;" stays "&lt;"
    numeric
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&mdash;", "\u{2014}")
        .replace("&ndash;", "\u{2013}")
        .replace("&hellip;", "\u{2026}")
        .replace("&amp;", "&")
}

fn normalize_whitespace(text: &str) -> String {
    text.lines()
        .map(|line| INLINE_SPACE.replace_all(line, " ").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
