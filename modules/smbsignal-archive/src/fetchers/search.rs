// Web search backends (Tavily, Serper) behind one trait.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use smbsignal_common::domain_of;
use tracing::info;

/// One organic search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub url: String,
    pub domain: String,
    pub title: String,
    pub snippet: String,
    /// Full page text, when the backend returns it.
    pub content: Option<String>,
}

impl SearchResult {
    pub fn new(url: impl Into<String>, title: impl Into<String>, snippet: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            domain: domain_of(&url),
            url,
            title: title.into(),
            snippet: snippet.into(),
            content: None,
        }
    }
}

#[async_trait]
pub trait WebSearcher: Send + Sync {
    /// Run `query`, optionally restricted to `include_domains`, returning at
    /// most `max_results` hits. No hits is `Ok(vec![])`, not an error.
    async fn search(
        &self,
        query: &str,
        include_domains: &[String],
        max_results: usize,
    ) -> Result<Vec<SearchResult>>;

    fn name(&self) -> &'static str;
}

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("Failed to build HTTP client")
}

// --- Tavily ---

#[derive(Debug, serde::Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, serde::Deserialize)]
struct TavilyResult {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    raw_content: Option<String>,
}

pub struct TavilySearcher {
    api_key: String,
    client: reqwest::Client,
    endpoint: String,
}

impl TavilySearcher {
    pub fn new(api_key: &str) -> Result<Self> {
        Ok(Self {
            api_key: api_key.to_string(),
            client: http_client()?,
            endpoint: "https://api.tavily.com/search".to_string(),
        })
    }
}

#[async_trait]
impl WebSearcher for TavilySearcher {
    async fn search(
        &self,
        query: &str,
        include_domains: &[String],
        max_results: usize,
    ) -> Result<Vec<SearchResult>> {
        info!(query, max_results, domains = include_domains.len(), "Tavily search");

        let mut body = serde_json::json!({
            "query": query,
            "max_results": max_results,
            "search_depth": "basic",
            "include_raw_content": true,
        });
        if !include_domains.is_empty() {
            body["include_domains"] = serde_json::json!(include_domains);
        }

        let data: TavilyResponse = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("Tavily API request failed")?
            .error_for_status()
            .context("Tavily API returned an error status")?
            .json()
            .await
            .context("Failed to parse Tavily response")?;

        let results: Vec<SearchResult> = data
            .results
            .into_iter()
            .filter(|r| !r.url.is_empty())
            .take(max_results)
            .map(|r| SearchResult {
                domain: domain_of(&r.url),
                url: r.url,
                title: r.title,
                snippet: r.content,
                content: r.raw_content.filter(|c| !c.trim().is_empty()),
            })
            .collect();

        info!(query, count = results.len(), "Tavily search complete");
        Ok(results)
    }

    fn name(&self) -> &'static str {
        "tavily"
    }
}

// --- Serper (Google Search) ---

#[derive(Debug, serde::Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperResult>,
}

#[derive(Debug, serde::Deserialize)]
struct SerperResult {
    #[serde(default)]
    link: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
}

pub struct SerperSearcher {
    api_key: String,
    client: reqwest::Client,
    endpoint: String,
}

impl SerperSearcher {
    pub fn new(api_key: &str) -> Result<Self> {
        Ok(Self {
            api_key: api_key.to_string(),
            client: http_client()?,
            endpoint: "https://google.serper.dev/search".to_string(),
        })
    }
}

/// Serper has no domain filter; the allow-list becomes `site:` OR-clauses.
pub fn with_site_clauses(query: &str, include_domains: &[String]) -> String {
    match include_domains {
        [] => query.to_string(),
        [one] => format!("{query} site:{one}"),
        many => {
            let sites: Vec<String> = many.iter().map(|d| format!("site:{d}")).collect();
            format!("{query} ({})", sites.join(" OR "))
        }
    }
}

#[async_trait]
impl WebSearcher for SerperSearcher {
    async fn search(
        &self,
        query: &str,
        include_domains: &[String],
        max_results: usize,
    ) -> Result<Vec<SearchResult>> {
        let q = with_site_clauses(query, include_domains);
        info!(query = q.as_str(), max_results, "Serper search");

        let body = serde_json::json!({
            "q": q,
            "num": max_results,
            "gl": "se",
            "hl": "sv",
        });

        let data: SerperResponse = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .context("Serper API request failed")?
            .error_for_status()
            .context("Serper API returned an error status")?
            .json()
            .await
            .context("Failed to parse Serper response")?;

        let results: Vec<SearchResult> = data
            .organic
            .into_iter()
            .filter(|r| !r.link.is_empty())
            .take(max_results)
            .map(|r| SearchResult::new(r.link, r.title, r.snippet))
            .collect();

        info!(query = q.as_str(), count = results.len(), "Serper search complete");
        Ok(results)
    }

    fn name(&self) -> &'static str {
        "serper"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn site_clauses() {
        assert_eq!(with_site_clauses("bokföring", &[]), "bokföring");
        assert_eq!(
            with_site_clauses("bokföring", &["flashback.org".to_string()]),
            "bokföring site:flashback.org"
        );
        assert_eq!(
            with_site_clauses("bokföring", &["a.se".to_string(), "b.se".to_string()]),
            "bokföring (site:a.se OR site:b.se)"
        );
    }

    #[test]
    fn result_domain_strips_www() {
        let r = SearchResult::new("https://www.Breakit.se/artikel/1", "t", "s");
        assert_eq!(r.domain, "breakit.se");
        assert!(r.content.is_none());
    }

    #[test]
    fn tavily_payload_tolerates_missing_fields() {
        let json = r#"{"results": [{"url": "https://di.se/a", "title": "A"}, {"title": "no url"}]}"#;
        let parsed: TavilyResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.results.len(), 2);
        assert!(parsed.results[0].raw_content.is_none());
    }
}
