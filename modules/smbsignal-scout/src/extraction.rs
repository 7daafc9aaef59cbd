//! Ingestion side of the external extraction collaborator.
//!
//! The collaborator turns a capture's text into zero or more candidate
//! records. This module decides which captures to send, parses whatever
//! comes back, enforces the structural minimum, and stores the result.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use smbsignal_archive::{NewCandidate, SignalStore};
use smbsignal_common::{Capture, ExtractedSignal, SmbSignalError};
use tracing::{debug, info, warn};

use crate::response_json::parse_json_object;

/// Captures with this much text or less are not worth extracting.
pub const MIN_EXTRACTION_CHARS: i64 = 100;
/// Text sent to the collaborator is capped at this many characters.
pub const MAX_EXTRACTION_CHARS: usize = 8_000;
/// Quotes are stored at most this long.
pub const MAX_QUOTE_CHARS: usize = 500;

#[derive(Debug, Clone, Serialize)]
pub struct ExtractionRequest<'a> {
    pub capture_id: &'a str,
    pub url: &'a str,
    pub title: Option<&'a str>,
    pub text: &'a str,
    pub query: Option<&'a str>,
}

impl<'a> ExtractionRequest<'a> {
    pub fn for_capture(capture: &'a Capture) -> Self {
        Self {
            capture_id: &capture.identity,
            url: &capture.url,
            title: capture.title.as_deref(),
            text: char_prefix(&capture.raw_text, MAX_EXTRACTION_CHARS),
            query: capture.query.as_deref(),
        }
    }
}

fn char_prefix(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Opaque text-to-records capability. Returns the raw response text;
/// parsing is done here so every implementation is held to the same rules.
#[async_trait]
pub trait SignalExtractor: Send + Sync {
    async fn extract(&self, request: &ExtractionRequest<'_>) -> Result<String>;
}

/// Extraction service reached over HTTP: the request is POSTed as JSON and
/// the response body is returned verbatim.
pub struct HttpSignalExtractor {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSignalExtractor {
    pub fn new(endpoint: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("Failed to build extractor client")?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl SignalExtractor for HttpSignalExtractor {
    async fn extract(&self, request: &ExtractionRequest<'_>) -> Result<String> {
        self.client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .context("Extractor request failed")?
            .error_for_status()
            .context("Extractor returned an error status")?
            .text()
            .await
            .context("Failed to read extractor response")
    }
}

#[derive(Debug, Deserialize)]
struct ExtractionResponse {
    #[serde(default)]
    signals: Vec<serde_json::Value>,
}

#[derive(Debug, Default, PartialEq)]
pub struct ParsedExtraction {
    pub signals: Vec<ExtractedSignal>,
    /// Records that were malformed or lacked both a quote and a problem.
    pub dropped: usize,
}

/// Parse a collaborator response. An unparseable envelope is an error; a
/// malformed or insubstantial individual record is only dropped.
pub fn parse_extraction_response(raw: &str) -> std::result::Result<ParsedExtraction, SmbSignalError> {
    let response: ExtractionResponse = parse_json_object(raw)?;
    let mut parsed = ParsedExtraction::default();

    for value in response.signals {
        let mut signal: ExtractedSignal = match serde_json::from_value(value) {
            Ok(s) => s,
            Err(e) => {
                debug!(error = %e, "Dropping malformed record");
                parsed.dropped += 1;
                continue;
            }
        };
        if !signal.has_substance() {
            parsed.dropped += 1;
            continue;
        }
        if let Some(quote) = signal.content.original_quote.as_mut() {
            let capped = char_prefix(quote, MAX_QUOTE_CHARS).len();
            quote.truncate(capped);
        }
        parsed.signals.push(signal);
    }
    Ok(parsed)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractStats {
    pub captures_processed: u32,
    pub signals_stored: u32,
    pub signals_dropped: u32,
    pub parse_errors: u32,
    pub collaborator_errors: u32,
    pub store_errors: u32,
}

/// Send every unprocessed capture to the collaborator and store the
/// candidates. Captures whose response cannot be parsed stay unprocessed
/// and are retried on the next run.
pub async fn run_extraction(
    store: &SignalStore,
    extractor: &dyn SignalExtractor,
    limit: i64,
) -> Result<ExtractStats> {
    let pending = store
        .captures_pending_extraction(MIN_EXTRACTION_CHARS, limit)
        .await?;
    info!(count = pending.len(), "Extracting candidates");

    let mut stats = ExtractStats::default();
    for capture in &pending {
        let request = ExtractionRequest::for_capture(capture);
        let raw = match extractor.extract(&request).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(url = capture.url.as_str(), error = %e, "Extraction call failed");
                stats.collaborator_errors += 1;
                continue;
            }
        };

        let parsed = match parse_extraction_response(&raw) {
            Ok(p) => p,
            Err(e) => {
                warn!(url = capture.url.as_str(), error = %e, "Unparseable extraction response");
                stats.parse_errors += 1;
                continue;
            }
        };

        let candidates: Vec<NewCandidate> = parsed
            .signals
            .into_iter()
            .map(|signal| NewCandidate {
                capture_identity: capture.identity.clone(),
                signal,
            })
            .collect();

        match store.record_extraction(&capture.identity, &candidates).await {
            Ok(true) => {
                stats.captures_processed += 1;
                stats.signals_stored += candidates.len() as u32;
                stats.signals_dropped += parsed.dropped as u32;
                debug!(
                    url = capture.url.as_str(),
                    stored = candidates.len(),
                    dropped = parsed.dropped,
                    "Capture extracted"
                );
            }
            Ok(false) => {}
            Err(e) => {
                warn!(url = capture.url.as_str(), error = %e, "Failed to store candidates");
                stats.store_errors += 1;
            }
        }
    }

    info!(
        processed = stats.captures_processed,
        stored = stats.signals_stored,
        parse_errors = stats.parse_errors,
        "Extraction complete"
    );
    Ok(stats)
}
