// Test mocks for the scout pipeline.
//
// One mock per collaborator boundary, each configured builder-style:
// - MockSearcher (WebSearcher): query text -> results, records every query
// - MockPageFetcher (PageFetcher): URL -> page or failure
// - MockProber (UrlProber): URL -> UrlCheck, default live
// - MockRegistry (CompanyRegistry): company name -> hit
// - MockExtractor (SignalExtractor): URL -> raw response text
// - MockAdvisor (KeywordAdvisor): one fixed raw response
//
// Plus helpers for building pages and keyword files.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use smbsignal_archive::{build_page, FetchedPage, PageFetchError, PageFetcher, SearchResult, WebSearcher};
use smbsignal_common::UrlCheck;

use crate::extraction::{ExtractionRequest, SignalExtractor};
use crate::feedback::{KeywordAdvisor, SuggestionRequest};
use crate::keywords::KeywordFile;
use crate::verify::{CompanyRegistry, RegistryHit, UrlProber};

// ---------------------------------------------------------------------------
// MockSearcher
// ---------------------------------------------------------------------------

/// Query-keyed searcher. Unregistered queries return no results.
/// `.on_query()` registers hits, `.failing()` makes a query error out.
#[derive(Default)]
pub struct MockSearcher {
    results: HashMap<String, Vec<SearchResult>>,
    /// Returned for any query without its own entry.
    fallback: Vec<SearchResult>,
    failing: Vec<String>,
    calls: Mutex<Vec<String>>,
}

impl MockSearcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_query(mut self, query: &str, results: Vec<SearchResult>) -> Self {
        self.results.insert(query.to_string(), results);
        self
    }

    pub fn on_any_query(mut self, results: Vec<SearchResult>) -> Self {
        self.fallback = results;
        self
    }

    pub fn failing(mut self, query: &str) -> Self {
        self.failing.push(query.to_string());
        self
    }

    /// Every query text searched so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebSearcher for MockSearcher {
    async fn search(
        &self,
        query: &str,
        _include_domains: &[String],
        max_results: usize,
    ) -> Result<Vec<SearchResult>> {
        self.calls.lock().unwrap().push(query.to_string());
        if self.failing.iter().any(|q| q == query) {
            bail!("MockSearcher: search failed for {query}");
        }
        let hits = self.results.get(query).unwrap_or(&self.fallback);
        Ok(hits.iter().take(max_results).cloned().collect())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

// ---------------------------------------------------------------------------
// MockPageFetcher
// ---------------------------------------------------------------------------

/// URL-keyed fetcher. Unregistered URLs answer HTTP 404.
#[derive(Default)]
pub struct MockPageFetcher {
    pages: HashMap<String, Result<FetchedPage, PageFetchError>>,
    calls: Mutex<Vec<String>>,
}

impl MockPageFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `html` as a 200 `text/html` page.
    pub fn on_html(mut self, url: &str, html: &str) -> Self {
        let page = build_page(url, 200, "text/html; charset=utf-8", html);
        self.pages.insert(url.to_string(), page);
        self
    }

    pub fn on_error(mut self, url: &str, error: PageFetchError) -> Self {
        self.pages.insert(url.to_string(), Err(error));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for MockPageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, PageFetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        self.pages
            .get(url)
            .cloned()
            .unwrap_or(Err(PageFetchError::Http(404)))
    }
}

// ---------------------------------------------------------------------------
// MockProber
// ---------------------------------------------------------------------------

/// Every URL is live unless registered otherwise.
#[derive(Default)]
pub struct MockProber {
    checks: HashMap<String, UrlCheck>,
}

impl MockProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_url(mut self, url: &str, check: UrlCheck) -> Self {
        self.checks.insert(url.to_string(), check);
        self
    }
}

#[async_trait]
impl UrlProber for MockProber {
    async fn probe(&self, url: &str) -> UrlCheck {
        self.checks.get(url).copied().unwrap_or(UrlCheck::Live)
    }
}

// ---------------------------------------------------------------------------
// MockRegistry
// ---------------------------------------------------------------------------

/// Name-keyed registry. Unknown companies are not found.
#[derive(Default)]
pub struct MockRegistry {
    companies: HashMap<String, RegistryHit>,
    lookups: Mutex<Vec<String>>,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_company(mut self, name: &str, org_number: &str) -> Self {
        self.companies.insert(
            name.to_string(),
            RegistryHit {
                org_number: Some(org_number.to_string()),
                snippet: format!("{name} {org_number}"),
                search_url: format!("https://registry.test/search?q={name}"),
            },
        );
        self
    }

    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompanyRegistry for MockRegistry {
    async fn lookup(&self, company_name: &str) -> Result<Option<RegistryHit>> {
        self.lookups.lock().unwrap().push(company_name.to_string());
        Ok(self.companies.get(company_name).cloned())
    }
}

// ---------------------------------------------------------------------------
// MockExtractor
// ---------------------------------------------------------------------------

/// URL-keyed extractor returning canned raw responses. Unregistered URLs
/// get an empty signal list.
#[derive(Default)]
pub struct MockExtractor {
    responses: HashMap<String, String>,
    failing: Vec<String>,
}

impl MockExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_url(mut self, url: &str, raw: impl Into<String>) -> Self {
        self.responses.insert(url.to_string(), raw.into());
        self
    }

    /// Response built from `signals`, a JSON array of records.
    pub fn on_url_signals(self, url: &str, signals: serde_json::Value) -> Self {
        self.on_url(url, serde_json::json!({ "signals": signals }).to_string())
    }

    pub fn failing(mut self, url: &str) -> Self {
        self.failing.push(url.to_string());
        self
    }
}

#[async_trait]
impl SignalExtractor for MockExtractor {
    async fn extract(&self, request: &ExtractionRequest<'_>) -> Result<String> {
        if self.failing.iter().any(|u| u == request.url) {
            bail!("MockExtractor: extraction failed for {}", request.url);
        }
        Ok(self
            .responses
            .get(request.url)
            .cloned()
            .unwrap_or_else(|| r#"{"signals": []}"#.to_string()))
    }
}

// ---------------------------------------------------------------------------
// MockAdvisor
// ---------------------------------------------------------------------------

/// Returns the same raw response to every request and keeps the requests.
pub struct MockAdvisor {
    response: String,
    requests: Mutex<Vec<SuggestionRequest>>,
}

impl MockAdvisor {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Advisor suggesting `new_terms` and retiring `retire`.
    pub fn suggesting(new_terms: &[&str], retire: &[&str]) -> Self {
        let new_keywords: Vec<_> = new_terms
            .iter()
            .map(|k| serde_json::json!({ "keyword": k, "reason": "seen in verified signals" }))
            .collect();
        let retire_candidates: Vec<_> = retire
            .iter()
            .map(|k| serde_json::json!({ "keyword": k, "reason": "no hits" }))
            .collect();
        Self::new(
            serde_json::json!({
                "new_keywords": new_keywords,
                "retire_candidates": retire_candidates,
            })
            .to_string(),
        )
    }

    pub fn requests(&self) -> Vec<SuggestionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl KeywordAdvisor for MockAdvisor {
    async fn suggest(&self, request: &SuggestionRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(self.response.clone())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// An HTML page whose readable text is `body` repeated until it is long
/// enough to be stored.
pub fn html_page(title: &str, body: &str) -> String {
    let mut text = body.to_string();
    while text.chars().count() < 400 {
        text.push(' ');
        text.push_str(body);
    }
    format!(
        "<html><head><title>{title}</title></head><body><article><h1>{title}</h1><p>{text}</p></article></body></html>"
    )
}

/// A small but valid keyword file.
pub fn keyword_file_json(queries_per_run: usize, core_ratio: f64) -> String {
    serde_json::json!({
        "core_keywords": {
            "pain_signals": ["tidskrävande", "manuellt", "krångligt"],
            "ai_awareness": ["AI verktyg", "automatisering"],
            "business_context": ["småföretag", "egenföretagare"],
            "specific_tasks": ["fakturering", "bokföring"]
        },
        "discovery_keywords": {
            "from_signals": ["kvittohantering"],
            "adjacent_terms": ["pappersarbete"]
        },
        "rotation": {
            "queries_per_run": queries_per_run,
            "core_ratio": core_ratio,
            "cooldown_days_before_reuse": 3
        },
        "site_targets": {
            "open_web": [],
            "forums": ["flashback.org"],
            "business_press": ["breakit.se"],
            "professional_network": ["linkedin.com"]
        }
    })
    .to_string()
}

pub fn keyword_file(queries_per_run: usize, core_ratio: f64) -> KeywordFile {
    KeywordFile::from_json(&keyword_file_json(queries_per_run, core_ratio))
        .expect("valid keyword file")
}
