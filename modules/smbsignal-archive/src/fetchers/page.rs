// Plain HTTP page fetcher with browser-like headers.

use std::time::Duration;

use async_trait::async_trait;
use rand::seq::IndexedRandom;
use tracing::{info, warn};

use crate::readability::{cap_markup, cap_text, html_to_text};
use crate::text_extract::extract_title;

/// Pages whose cleaned text is shorter than this carry no usable content.
pub const MIN_TEXT_CHARS: usize = 100;

const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

const BROWSER_HEADERS: &[(&str, &str)] = &[
    (
        "Mozilla/5.0 (X11; Linux aarch64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "sv-SE,sv;q=0.9,en;q=0.8",
    ),
    (
        "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
        "sv-SE,sv;q=0.9,en-US;q=0.8,en;q=0.7",
    ),
];

/// A fetched page, cleaned and capped.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: u16,
    pub content_type: String,
    pub markup: String,
    pub text: String,
    pub title: Option<String>,
}

/// Why a page produced no capture. `Transient` is a network failure that
/// the next scheduled run retries; the rest are content problems.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PageFetchError {
    #[error("HTTP {0}")]
    Http(u16),
    #[error("not a text document: {0}")]
    NotText(String),
    #[error("body too short ({0} chars)")]
    TooShort(usize),
    #[error("transient network failure: {0}")]
    Transient(String),
}

impl PageFetchError {
    /// Timeouts and connection failures, as opposed to content problems.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, PageFetchError>;
}

pub struct HttpPageFetcher {
    client: reqwest::Client,
}

impl HttpPageFetcher {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {e}"))?;
        Ok(Self { client })
    }
}

/// Clean a fetched body into a page, enforcing the minimum text length.
pub fn build_page(
    url: &str,
    status: u16,
    content_type: &str,
    body: &str,
) -> Result<FetchedPage, PageFetchError> {
    let is_html = content_type.contains("text/html");
    if !is_html && !content_type.contains("text/plain") {
        return Err(PageFetchError::NotText(content_type.to_string()));
    }

    let (text, title) = if is_html {
        (html_to_text(body.as_bytes(), Some(url)), extract_title(body))
    } else {
        (cap_text(body), None)
    };

    let len = text.chars().count();
    if len < MIN_TEXT_CHARS {
        return Err(PageFetchError::TooShort(len));
    }

    Ok(FetchedPage {
        status,
        content_type: content_type.to_string(),
        markup: cap_markup(body),
        text,
        title,
    })
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, PageFetchError> {
        let (user_agent, language) = BROWSER_HEADERS
            .choose(&mut rand::rng())
            .copied()
            .unwrap_or(BROWSER_HEADERS[0]);

        info!(url, "Fetching page");
        let resp = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, user_agent)
            .header(reqwest::header::ACCEPT_LANGUAGE, language)
            .header(
                reqwest::header::ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .send()
            .await
            .map_err(|e| {
                warn!(url, error = %e, "Page fetch failed");
                PageFetchError::Transient(e.to_string())
            })?;

        let status = resp.status().as_u16();
        if status != 200 {
            return Err(PageFetchError::Http(status));
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if !content_type.contains("text/html") && !content_type.contains("text/plain") {
            return Err(PageFetchError::NotText(content_type));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| PageFetchError::Transient(e.to_string()))?;

        let page = build_page(url, status, &content_type, &body)?;
        info!(url, chars = page.text.len(), "Fetched successfully");
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_text_content() {
        let err = build_page("https://x.se/a.pdf", 200, "application/pdf", "%PDF").unwrap_err();
        assert!(matches!(err, PageFetchError::NotText(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn only_network_failures_are_transient() {
        assert!(PageFetchError::Transient("timed out".into()).is_transient());
        assert!(!PageFetchError::Http(503).is_transient());
        assert!(!PageFetchError::TooShort(3).is_transient());
    }

    #[test]
    fn rejects_short_bodies() {
        let err = build_page("https://x.se/", 200, "text/plain", "för kort").unwrap_err();
        assert!(matches!(err, PageFetchError::TooShort(8)));
    }

    #[test]
    fn plain_text_is_kept_as_is() {
        let body = "Vi lägger varje fredag tre timmar på att stämma av kvitton manuellt. ".repeat(3);
        let page = build_page("https://x.se/t.txt", 200, "text/plain; charset=utf-8", &body).unwrap();
        assert_eq!(page.text, body.trim());
        assert!(page.title.is_none());
        assert_eq!(page.markup, body);
    }
}
