//! Source acquirer: runs planned queries against the search backend,
//! fetches result pages and stores new captures.

use anyhow::Result;
use rand::Rng;
use serde::Serialize;
use smbsignal_archive::text_extract::extract_content_date;
use smbsignal_archive::{
    cap_text, NewCapture, NewQueryLog, PageFetchError, PageFetcher, SearchResult, SignalStore,
    WebSearcher, MIN_TEXT_CHARS,
};
use smbsignal_common::{domain_of, PlannedQuery};
use tracing::{debug, info, warn};

use crate::pacing::{pause, Pacing};

/// Results fetched per query.
pub const MAX_RESULTS_PER_QUERY: usize = 5;

/// Hosts that never carry first-hand business text: video, social,
/// marketplaces, encyclopedias. Matched on the domain or any subdomain.
pub const SKIP_DOMAINS: &[&str] = &[
    "youtube.com",
    "youtu.be",
    "facebook.com",
    "instagram.com",
    "twitter.com",
    "x.com",
    "tiktok.com",
    "pinterest.com",
    "wikipedia.org",
    "amazon.com",
    "amazon.se",
];

/// Whether results from `domain` are skipped without fetching.
pub fn is_skipped_domain(domain: &str) -> bool {
    let domain = domain.trim_start_matches("www.").to_ascii_lowercase();
    // Search engine result pages under any country TLD.
    if domain.split('.').any(|label| label == "google") {
        return true;
    }
    SKIP_DOMAINS
        .iter()
        .any(|d| domain == *d || domain.ends_with(&format!(".{d}")))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AcquireStats {
    pub queries_run: u32,
    pub search_errors: u32,
    pub results_found: u32,
    pub skipped_domains: u32,
    pub known_urls: u32,
    pub pages_fetched: u32,
    pub pages_stored: u32,
    pub duplicates: u32,
    pub content_errors: u32,
    pub http_errors: u32,
    pub transient_errors: u32,
    pub long_pauses: u32,
}

impl std::fmt::Display for AcquireStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Acquisition Complete ===")?;
        writeln!(f, "Queries run:        {}", self.queries_run)?;
        writeln!(f, "Search errors:      {}", self.search_errors)?;
        writeln!(f, "Results found:      {}", self.results_found)?;
        writeln!(f, "Skipped domains:    {}", self.skipped_domains)?;
        writeln!(f, "Known URLs:         {}", self.known_urls)?;
        writeln!(f, "Pages fetched:      {}", self.pages_fetched)?;
        writeln!(f, "Pages stored:       {}", self.pages_stored)?;
        writeln!(f, "Duplicates:         {}", self.duplicates)?;
        writeln!(f, "Content errors:     {}", self.content_errors)?;
        writeln!(f, "HTTP errors:        {}", self.http_errors)?;
        writeln!(f, "Transient errors:   {}", self.transient_errors)?;
        write!(f, "Long pauses:        {}", self.long_pauses)
    }
}

/// Text and metadata for one result, whichever way it was obtained.
struct PageContent {
    text: String,
    markup: Option<String>,
    title: Option<String>,
    status: Option<i64>,
}

pub struct Acquirer<'a> {
    store: &'a SignalStore,
    searcher: &'a dyn WebSearcher,
    fetcher: &'a dyn PageFetcher,
    pacing: Pacing,
}

impl<'a> Acquirer<'a> {
    pub fn new(
        store: &'a SignalStore,
        searcher: &'a dyn WebSearcher,
        fetcher: &'a dyn PageFetcher,
        pacing: Pacing,
    ) -> Self {
        Self {
            store,
            searcher,
            fetcher,
            pacing,
        }
    }

    /// Execute every query in order. Per-item failures are counted, never
    /// propagated; only store failures on the query log abort the run.
    pub async fn run<R: Rng + Send + ?Sized>(
        &self,
        queries: &[PlannedQuery],
        rng: &mut R,
    ) -> Result<AcquireStats> {
        let mut stats = AcquireStats::default();
        let mut empty_streak = 0usize;

        info!(
            queries = queries.len(),
            backend = self.searcher.name(),
            "Starting acquisition"
        );

        for (i, query) in queries.iter().enumerate() {
            info!(
                n = i + 1,
                of = queries.len(),
                kind = %query.kind,
                target = query.target.as_str(),
                query = query.text.as_str(),
                "Running query"
            );

            let results = match self
                .searcher
                .search(&query.text, &query.include_domains, MAX_RESULTS_PER_QUERY)
                .await
            {
                Ok(results) => Some(results),
                Err(e) => {
                    warn!(query = query.text.as_str(), error = %e, "Search failed");
                    stats.search_errors += 1;
                    None
                }
            };

            let found = results.as_ref().map_or(0, Vec::len);
            if found == 0 {
                empty_streak += 1;
            } else {
                empty_streak = 0;
            }

            if let Some(results) = results {
                stats.queries_run += 1;
                stats.results_found += found as u32;
                let log_id = self.record_execution(query, found).await?;
                for result in results.iter().take(MAX_RESULTS_PER_QUERY) {
                    self.acquire_result(query, log_id, result, &mut stats).await;
                }
            }

            if empty_streak >= self.pacing.zero_result_streak {
                warn!(
                    streak = empty_streak,
                    pause_secs = self.pacing.zero_result_pause.as_secs(),
                    "Long run of empty searches, possible blocking; pausing"
                );
                stats.long_pauses += 1;
                empty_streak = 0;
                pause(self.pacing.zero_result_pause).await;
            }

            if i + 1 < queries.len() {
                pause(self.pacing.search_delay(rng)).await;
            }
        }

        info!(
            stored = stats.pages_stored,
            duplicates = stats.duplicates,
            "Acquisition complete"
        );
        Ok(stats)
    }

    /// Log the executed query and count one use of each embedded keyword.
    async fn record_execution(&self, query: &PlannedQuery, result_count: usize) -> Result<i64> {
        let log_id = self
            .store
            .log_query(&NewQueryLog {
                query_text: &query.text,
                kind: query.kind,
                target: &query.target,
                include_domains: &query.include_domains,
                keywords_used: &query.keywords_used,
                result_count: result_count as i64,
            })
            .await?;

        for term in &query.keywords_used {
            if let Err(e) = self.store.record_keyword_use(term).await {
                warn!(term = term.as_str(), error = %e, "Failed to count keyword use");
            }
        }
        Ok(log_id)
    }

    async fn acquire_result(
        &self,
        query: &PlannedQuery,
        log_id: i64,
        result: &SearchResult,
        stats: &mut AcquireStats,
    ) {
        let url = result.url.as_str();
        let domain = if result.domain.is_empty() {
            domain_of(url)
        } else {
            result.domain.clone()
        };

        if is_skipped_domain(&domain) {
            debug!(url, "Skipping non-content domain");
            stats.skipped_domains += 1;
            return;
        }

        match self.store.url_exists(url).await {
            Ok(true) => {
                stats.known_urls += 1;
                return;
            }
            Ok(false) => {}
            Err(e) => {
                warn!(url, error = %e, "URL lookup failed");
                return;
            }
        }

        let Some(page) = self.content_for(result, stats).await else {
            return;
        };
        stats.pages_fetched += 1;

        let capture = NewCapture {
            url: url.to_string(),
            domain,
            content_date: extract_content_date(&page.text),
            title: page
                .title
                .or_else(|| Some(result.title.clone()).filter(|t| !t.is_empty())),
            raw_text: page.text,
            raw_markup: page.markup,
            query: Some(query.text.clone()),
            query_type: Some(query.kind),
            query_log_id: Some(log_id),
            http_status: page.status,
        };

        match self.store.insert_capture(&capture).await {
            Ok(Some(identity)) => {
                stats.pages_stored += 1;
                info!(url, identity = identity.as_str(), "Stored capture");
            }
            Ok(None) => {
                stats.duplicates += 1;
                debug!(url, "Duplicate content");
            }
            Err(e) => warn!(url, error = %e, "Failed to store capture"),
        }
    }

    /// Backend-supplied text when long enough, otherwise a page fetch.
    async fn content_for(&self, result: &SearchResult, stats: &mut AcquireStats) -> Option<PageContent> {
        if let Some(content) = result.content.as_deref() {
            let text = cap_text(content);
            if text.chars().count() >= MIN_TEXT_CHARS {
                return Some(PageContent {
                    text,
                    markup: None,
                    title: None,
                    status: None,
                });
            }
        }

        pause(self.pacing.page_fetch_delay).await;
        match self.fetcher.fetch(&result.url).await {
            Ok(page) => Some(PageContent {
                text: page.text,
                markup: Some(page.markup),
                title: page.title,
                status: Some(i64::from(page.status)),
            }),
            Err(e) if e.is_transient() => {
                stats.transient_errors += 1;
                warn!(url = result.url.as_str(), error = %e, "Page fetch failed, retried next run");
                None
            }
            Err(e) => {
                match e {
                    PageFetchError::Http(_) => stats.http_errors += 1,
                    _ => stats.content_errors += 1,
                }
                debug!(url = result.url.as_str(), error = %e, "Page skipped");
                None
            }
        }
    }
}
