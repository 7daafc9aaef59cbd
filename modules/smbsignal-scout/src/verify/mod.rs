//! Verifier: confirms a candidate against its capture and the live web.
//!
//! Four checks run for every candidate, even when an earlier one already
//! implies rejection, so every field of the result is populated:
//! quote match, URL liveness, optional registry lookup, duplicate search.

pub mod probe;
pub mod registry;
pub mod similarity;

use anyhow::Result;
use chrono::{Duration, Utc};
use serde::Serialize;
use smbsignal_archive::{CandidateWithSource, SignalStore};
use smbsignal_common::{FinalStatus, QuoteCheck, VerificationResult};
use tracing::{info, warn};

use crate::pacing::{pause, Pacing};
pub use probe::{classify_status, HttpUrlProber, UrlProber};
pub use registry::{AllabolagRegistry, CompanyRegistry, NoopRegistry, RegistryHit};
pub use similarity::{match_quote, normalize, ratio, QuoteMatch};

/// Quote similarity above which two records about the same person or
/// company count as duplicates.
pub const DUPLICATE_THRESHOLD: f64 = 0.7;
pub const DUPLICATE_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VerifyStats {
    pub checked: u32,
    pub verified: u32,
    pub weak: u32,
    pub rejected: u32,
    pub duplicates: u32,
    pub companies_found: u32,
    pub errors: u32,
}

pub struct Verifier<'a> {
    store: &'a SignalStore,
    prober: &'a dyn UrlProber,
    registry: &'a dyn CompanyRegistry,
    pacing: Pacing,
}

impl<'a> Verifier<'a> {
    pub fn new(
        store: &'a SignalStore,
        prober: &'a dyn UrlProber,
        registry: &'a dyn CompanyRegistry,
        pacing: Pacing,
    ) -> Self {
        Self {
            store,
            prober,
            registry,
            pacing,
        }
    }

    /// Run all four checks for one candidate and decide its final status.
    /// Registry failures degrade to "not found"; only store errors propagate.
    pub async fn verify(&self, item: &CandidateWithSource) -> Result<VerificationResult> {
        let signal = &item.candidate.signal;

        let quote = signal.content.original_quote.as_deref().unwrap_or_default();
        let quote_match = match_quote(quote, &item.raw_text);

        let url_check = self.prober.probe(&item.url).await;
        pause(self.pacing.probe_delay).await;

        let (company_verified, company_data) = match signal.company_name() {
            Some(name) => {
                let outcome = match self.registry.lookup(name).await {
                    Ok(Some(hit)) => (true, hit.payload()),
                    Ok(None) => (false, serde_json::json!({})),
                    Err(e) => {
                        warn!(company = name, error = %e, "Registry lookup failed");
                        (false, serde_json::json!({}))
                    }
                };
                pause(self.pacing.registry_delay).await;
                outcome
            }
            None => (false, serde_json::json!({})),
        };

        let duplicate_of = self.find_duplicate(item, quote).await?;

        Ok(VerificationResult {
            candidate_id: item.candidate.id,
            quote_check: quote_match.band,
            quote_similarity: quote_match.score,
            url_check,
            company_verified,
            company_data,
            is_duplicate: duplicate_of.is_some(),
            duplicate_of,
            final_status: FinalStatus::decide(quote_match.band, url_check),
        })
    }

    /// Most recent prior verified record about the same person or company
    /// whose quote is near-identical.
    async fn find_duplicate(&self, item: &CandidateWithSource, quote: &str) -> Result<Option<i64>> {
        let quote = normalize(quote);
        if quote.is_empty() {
            return Ok(None);
        }
        let signal = &item.candidate.signal;
        let since = Utc::now() - Duration::days(DUPLICATE_WINDOW_DAYS);
        let prior = self
            .store
            .prior_verified_quotes(
                signal.person.name.as_deref(),
                signal.company_name(),
                since,
                item.candidate.id,
            )
            .await?;

        Ok(prior
            .into_iter()
            .find(|(_, other)| ratio(&quote, &normalize(other)) > DUPLICATE_THRESHOLD)
            .map(|(id, _)| id))
    }

    /// Verify every candidate that has a credibility verdict but no result
    /// yet, rejected ones included. Each result is committed on its own; a
    /// candidate is never verified twice.
    pub async fn run(&self, limit: i64) -> Result<VerifyStats> {
        let pending = self.store.candidates_pending_verification(limit).await?;
        info!(count = pending.len(), "Verifying candidates");

        let mut stats = VerifyStats::default();
        for item in &pending {
            let result = match self.verify(item).await {
                Ok(r) => r,
                Err(e) => {
                    warn!(candidate = item.candidate.id, error = %e, "Verification failed");
                    stats.errors += 1;
                    continue;
                }
            };

            match self.store.insert_verification(&result).await {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    warn!(candidate = item.candidate.id, error = %e, "Failed to store verification");
                    stats.errors += 1;
                    continue;
                }
            }

            stats.checked += 1;
            match result.final_status {
                FinalStatus::Verified => stats.verified += 1,
                FinalStatus::Weak => stats.weak += 1,
                FinalStatus::Rejected => stats.rejected += 1,
            }
            if result.is_duplicate {
                stats.duplicates += 1;
            }
            if result.company_verified {
                stats.companies_found += 1;
            }
            if result.quote_check == QuoteCheck::Failed {
                info!(candidate = item.candidate.id, url = item.url.as_str(), "Quote not found in source");
            }
        }

        info!(
            verified = stats.verified,
            weak = stats.weak,
            rejected = stats.rejected,
            duplicates = stats.duplicates,
            "Verification complete"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use smbsignal_archive::{NewCandidate, NewCapture};
    use smbsignal_common::{
        CompanyInfo, CredibilityAssessment, CredibilityVerdict, ExtractedSignal, KeywordKind,
        SignalContent, UrlCheck,
    };

    use super::*;
    use crate::testing::{MockProber, MockRegistry};

    const URL: &str = "https://www.foretagarforum.se/trad/42";
    const PAGE: &str = "Vi har problem med fakturering varje månad och det tar hela helgen. \
        Någon som har tips på ett bättre system för ett litet bolag?";

    async fn stored_candidate(store: &SignalStore, quote: &str, company: &str) -> CandidateWithSource {
        let identity = store
            .insert_capture(&NewCapture {
                url: URL.to_string(),
                domain: "www.foretagarforum.se".to_string(),
                content_date: None,
                title: None,
                raw_text: PAGE.to_string(),
                raw_markup: None,
                query: None,
                query_type: Some(KeywordKind::Core),
                query_log_id: None,
                http_status: Some(200),
            })
            .await
            .unwrap()
            .unwrap();
        let signal = ExtractedSignal {
            company: CompanyInfo {
                name: Some(company.to_string()),
                ..Default::default()
            },
            content: SignalContent {
                original_quote: Some(quote.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        store
            .record_extraction(
                &identity,
                &[NewCandidate {
                    capture_identity: identity.clone(),
                    signal,
                }],
            )
            .await
            .unwrap();
        store.candidates_for_capture(&identity).await.unwrap().remove(0)
    }

    #[tokio::test]
    async fn failed_quote_and_dead_url_still_run_every_check() {
        let store = SignalStore::in_memory().await.unwrap();
        let item = stored_candidate(&store, "helt orelaterad text om segelbåtar", "Acme AB").await;
        let prober = MockProber::new().on_url(URL, UrlCheck::Dead);
        let registry = MockRegistry::new().on_company("Acme AB", "556677-8899");
        let verifier = Verifier::new(&store, &prober, &registry, Pacing::none());

        let result = verifier.verify(&item).await.unwrap();
        assert_eq!(result.quote_check, QuoteCheck::Failed);
        assert!(result.quote_similarity < 0.5);
        assert_eq!(result.url_check, UrlCheck::Dead);
        assert_eq!(result.final_status, FinalStatus::Rejected);
        // The registry is still consulted after the earlier checks failed.
        assert_eq!(registry.lookups(), vec!["Acme AB"]);
        assert!(result.company_verified);
        assert_eq!(result.company_data["org_number"], "556677-8899");
        assert!(!result.is_duplicate);
        assert_eq!(result.duplicate_of, None);

        assert!(store.insert_verification(&result).await.unwrap());
        let stored = store.verification(item.candidate.id).await.unwrap().unwrap();
        assert_eq!(stored, result);
    }

    #[tokio::test]
    async fn run_verifies_credibility_rejected_candidates() {
        let store = SignalStore::in_memory().await.unwrap();
        let item = stored_candidate(
            &store,
            "Vi har problem med fakturering varje månad",
            "Acme AB",
        )
        .await;
        store
            .insert_credibility(
                item.candidate.id,
                &CredibilityAssessment {
                    verdict: CredibilityVerdict::Reject,
                    flags: vec!["sponsored_marker:annons".to_string()],
                    is_regional: true,
                    reasoning: "sponsored".to_string(),
                },
            )
            .await
            .unwrap();

        let prober = MockProber::new();
        let registry = MockRegistry::new();
        let verifier = Verifier::new(&store, &prober, &registry, Pacing::none());
        let stats = verifier.run(10).await.unwrap();
        assert_eq!(stats.checked, 1);
        assert_eq!(stats.verified, 1);

        let stored = store.verification(item.candidate.id).await.unwrap().unwrap();
        assert_eq!(stored.quote_check, QuoteCheck::Passed);
        assert_eq!(stored.url_check, UrlCheck::Live);
        assert!(!stored.company_verified);

        // Exactly one result: a second run has nothing left.
        assert_eq!(verifier.run(10).await.unwrap().checked, 0);
    }
}
