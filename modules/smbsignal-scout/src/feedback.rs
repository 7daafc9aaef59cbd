//! Feedback loop: credit queries that led to verified signals, then let the
//! keyword advisor grow and prune the discovery vocabulary.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use smbsignal_archive::{SignalStore, VerifiedSignalRow};
use smbsignal_common::{KeywordKind, KeywordOrigin, KeywordPerformance};
use tracing::{info, warn};

use crate::keywords::{KeywordFile, KeywordStore};
use crate::response_json::parse_json_object;

/// Verified signals sent to the advisor per request.
pub const MAX_SUGGESTION_SIGNALS: i64 = 50;
/// Quotes in the suggestion request are cut to this many characters.
pub const SUGGESTION_QUOTE_CHARS: usize = 200;
/// A term needs this many uses before it can be called underperforming.
pub const UNDERPERFORMING_MIN_USES: i64 = 5;
pub const UNDERPERFORMING_HIT_RATE: f64 = 0.05;
pub const HIGH_PERFORMER_HIT_RATE: f64 = 0.2;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalSummary {
    pub quote: Option<String>,
    pub problem: Option<String>,
    pub need: Option<String>,
    pub company: Option<String>,
}

impl From<&VerifiedSignalRow> for SignalSummary {
    fn from(row: &VerifiedSignalRow) -> Self {
        Self {
            quote: row.original_quote.as_deref().map(|q| {
                q.chars().take(SUGGESTION_QUOTE_CHARS).collect()
            }),
            problem: row.expressed_problem.clone(),
            need: row.expressed_need.clone(),
            company: row.company_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceLabel {
    Underperforming,
    HighPerformer,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceNote {
    pub keyword: String,
    pub label: PerformanceLabel,
    pub usage_count: i64,
    pub hit_rate: f64,
}

/// Classify a term by its counters. Most terms get no note.
pub fn performance_label(perf: &KeywordPerformance) -> Option<PerformanceLabel> {
    if perf.usage_count >= UNDERPERFORMING_MIN_USES && perf.hit_rate < UNDERPERFORMING_HIT_RATE {
        Some(PerformanceLabel::Underperforming)
    } else if perf.hit_rate > HIGH_PERFORMER_HIT_RATE {
        Some(PerformanceLabel::HighPerformer)
    } else {
        None
    }
}

fn performance_notes(
    file: &KeywordFile,
    performance: &HashMap<String, KeywordPerformance>,
) -> Vec<PerformanceNote> {
    file.all_terms()
        .into_iter()
        .filter_map(|(term, _)| {
            let perf = performance.get(&term)?;
            performance_label(perf).map(|label| PerformanceNote {
                keyword: term,
                label,
                usage_count: perf.usage_count,
                hit_rate: perf.hit_rate,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct SuggestionRequest {
    pub signals: Vec<SignalSummary>,
    pub core_keywords: Vec<String>,
    pub discovery_keywords: Vec<String>,
    pub performance: Vec<PerformanceNote>,
}

impl SuggestionRequest {
    pub fn build(
        signals: &[VerifiedSignalRow],
        file: &KeywordFile,
        performance: &HashMap<String, KeywordPerformance>,
    ) -> Self {
        let (core, discovery): (Vec<_>, Vec<_>) = file
            .all_terms()
            .into_iter()
            .partition(|(_, kind)| *kind == KeywordKind::Core);
        Self {
            signals: signals.iter().map(SignalSummary::from).collect(),
            core_keywords: core.into_iter().map(|(t, _)| t).collect(),
            discovery_keywords: discovery.into_iter().map(|(t, _)| t).collect(),
            performance: performance_notes(file, performance),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SuggestedKeyword {
    pub keyword: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub derived_from: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RetireCandidate {
    pub keyword: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct KeywordSuggestions {
    #[serde(default)]
    pub new_keywords: Vec<SuggestedKeyword>,
    #[serde(default)]
    pub retire_candidates: Vec<RetireCandidate>,
}

/// External keyword-suggestion capability. Returns raw response text.
#[async_trait]
pub trait KeywordAdvisor: Send + Sync {
    async fn suggest(&self, request: &SuggestionRequest) -> Result<String>;
}

pub struct HttpKeywordAdvisor {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpKeywordAdvisor {
    pub fn new(endpoint: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("Failed to build keyword advisor client")?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl KeywordAdvisor for HttpKeywordAdvisor {
    async fn suggest(&self, request: &SuggestionRequest) -> Result<String> {
        self.client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .context("Keyword advisor request failed")?
            .error_for_status()
            .context("Keyword advisor returned an error status")?
            .text()
            .await
            .context("Failed to read keyword advisor response")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeedbackStats {
    pub queries_credited: u32,
    pub verified_signals: u32,
    pub keywords_added: Vec<String>,
    pub keywords_retired: Vec<String>,
    pub advisor_errors: u32,
    pub parse_errors: u32,
}

/// Give one success to every keyword of each query execution whose
/// captures produced a verified candidate. Each execution is credited once.
pub async fn credit_verified_queries(store: &SignalStore) -> Result<u32> {
    let mut credited = 0;
    for entry in store.uncredited_queries_with_verified().await? {
        match store.credit_query_success(entry.id, &entry.keywords_used).await {
            Ok(true) => credited += 1,
            Ok(false) => {}
            Err(e) => warn!(query_id = entry.id, error = %e, "Failed to credit query"),
        }
    }
    if credited > 0 {
        info!(credited, "Credited successful queries");
    }
    Ok(credited)
}

/// Ask the advisor for vocabulary changes and apply them to the keyword
/// file and the counter table.
pub async fn evolve_keywords(
    store: &SignalStore,
    keyword_store: &KeywordStore,
    advisor: &dyn KeywordAdvisor,
    stats: &mut FeedbackStats,
) -> Result<()> {
    let signals = store.recent_verified_signals(MAX_SUGGESTION_SIGNALS).await?;
    stats.verified_signals = signals.len() as u32;
    if signals.is_empty() {
        info!("No verified signals yet, skipping keyword evolution");
        return Ok(());
    }

    let file = keyword_store.load()?;
    let performance = store.keyword_performance().await?;
    let request = SuggestionRequest::build(&signals, &file, &performance);

    let raw = match advisor.suggest(&request).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "Keyword advisor call failed");
            stats.advisor_errors += 1;
            return Ok(());
        }
    };
    let suggestions: KeywordSuggestions = match parse_json_object(&raw) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "Unparseable keyword suggestions");
            stats.parse_errors += 1;
            return Ok(());
        }
    };

    let new_terms: Vec<String> = suggestions
        .new_keywords
        .iter()
        .map(|k| k.keyword.clone())
        .collect();
    let retire: Vec<String> = suggestions
        .retire_candidates
        .iter()
        .map(|k| k.keyword.clone())
        .collect();

    let outcome = keyword_store.update(|file| {
        let outcome = file.merge_suggestions(&new_terms, &retire);
        let changed = !outcome.is_empty();
        (outcome, changed)
    })?;

    for term in &outcome.added {
        store
            .ensure_keyword(term, KeywordKind::Discovery, KeywordOrigin::LlmSuggested)
            .await?;
    }
    for term in &outcome.retired {
        store.retire_keyword(term).await?;
    }

    info!(
        added = outcome.added.len(),
        retired = outcome.retired.len(),
        "Keyword vocabulary evolved"
    );
    stats.keywords_added = outcome.added;
    stats.keywords_retired = outcome.retired;
    Ok(())
}

/// Full feedback pass. The advisor is optional; crediting always runs.
pub async fn run_feedback(
    store: &SignalStore,
    keyword_store: &KeywordStore,
    advisor: Option<&dyn KeywordAdvisor>,
) -> Result<FeedbackStats> {
    let mut stats = FeedbackStats {
        queries_credited: credit_verified_queries(store).await?,
        ..Default::default()
    };
    match advisor {
        Some(advisor) => evolve_keywords(store, keyword_store, advisor, &mut stats).await?,
        None => info!("No keyword advisor configured, skipping keyword evolution"),
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perf(usage_count: i64, hit_rate: f64) -> KeywordPerformance {
        KeywordPerformance { usage_count, hit_rate }
    }

    #[test]
    fn labels_follow_thresholds() {
        assert_eq!(performance_label(&perf(5, 0.0)), Some(PerformanceLabel::Underperforming));
        assert_eq!(performance_label(&perf(4, 0.0)), None);
        assert_eq!(performance_label(&perf(10, 0.25)), Some(PerformanceLabel::HighPerformer));
        assert_eq!(performance_label(&perf(10, 0.1)), None);
    }

    #[test]
    fn suggestion_quotes_are_shortened() {
        let row = VerifiedSignalRow {
            candidate_id: 1,
            original_quote: Some("x".repeat(500)),
            expressed_problem: Some("Fakturor".into()),
            expressed_need: None,
            company_name: Some("Acme AB".into()),
            url: "https://acme.se".into(),
        };
        let summary = SignalSummary::from(&row);
        assert_eq!(summary.quote.unwrap().chars().count(), SUGGESTION_QUOTE_CHARS);
    }

    #[test]
    fn suggestions_tolerate_missing_sections() {
        let parsed: KeywordSuggestions =
            parse_json_object(r#"{"new_keywords": [{"keyword": "kvittohantering"}]}"#).unwrap();
        assert_eq!(parsed.new_keywords[0].keyword, "kvittohantering");
        assert!(parsed.retire_candidates.is_empty());
    }
}
