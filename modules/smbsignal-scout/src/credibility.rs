//! Credibility filter: deterministic accept / review / reject over a
//! candidate's source page. Pure pattern matching, no network.
//!
//! All patterns live in [`CredibilityRules`] so another locale can supply
//! its own markers and regional allow-lists.

use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use serde::Serialize;
use smbsignal_archive::SignalStore;
use smbsignal_common::{CredibilityAssessment, CredibilityVerdict};
use tracing::{info, warn};
use url::Url;

/// A text pattern and the flag recorded when it matches.
#[derive(Debug, Clone)]
pub struct MarkerRule {
    pub pattern: Regex,
    pub flag: String,
}

/// A multi-region platform whose hostname says nothing about the audience.
/// For these hosts only the locale subdomain, query parameter or path
/// decides regionality.
#[derive(Debug, Clone, Default)]
pub struct PlatformRule {
    pub host: String,
    pub locale_subdomains: Vec<String>,
    pub query_params: Vec<(String, String)>,
    pub path_markers: Vec<String>,
}

impl PlatformRule {
    fn applies_to(&self, host: &str) -> bool {
        host == self.host || host.ends_with(&format!(".{}", self.host))
    }

    fn is_regional(&self, url: &Url, host: &str) -> bool {
        let subdomain_hit = self
            .locale_subdomains
            .iter()
            .any(|s| host.starts_with(&format!("{s}.")));
        let param_hit = url
            .query_pairs()
            .any(|(k, v)| self.query_params.iter().any(|(pk, pv)| k == pk.as_str() && v == pv.as_str()));
        let path = url.path().to_lowercase();
        let path_hit = self.path_markers.iter().any(|m| path.contains(m.as_str()));
        subdomain_hit || param_hit || path_hit
    }
}

#[derive(Debug, Clone)]
pub struct CredibilityRules {
    /// Sponsorship and native-advertising markers, matched on raw markup.
    pub sponsor_markers: Vec<MarkerRule>,
    /// Sponsored-section path fragments, matched on the lowercased URL.
    pub url_markers: Vec<(String, String)>,
    /// Top-level domains, with leading dot, that confirm the region.
    pub regional_tlds: Vec<String>,
    /// Hostname tokens that confirm the region.
    pub regional_name_tokens: Vec<String>,
    pub platforms: Vec<PlatformRule>,
    /// Flag recorded when the source is not confirmed regional.
    pub non_regional_flag: String,
}

/// Nordic sponsorship markers as (case-insensitive pattern, flag) pairs.
const NORDIC_SPONSOR_PATTERNS: &[(&str, &str)] = &[
    (r"brand\s*studio", "brand_studio"),
    (r"i\s+samarbete\s+med", "i_samarbete_med"),
    (r"annons(?:ering)?", "annons"),
    (r"sponsored", "sponsored"),
    (r"paid\s+partnership", "paid_partnership"),
    (r"in\s+cooperation\s+with", "in_cooperation_with"),
    (r"producerad\s+av.*i\s+samarbete", "producerad_i_samarbete"),
    (r"partnership\s+content", "partnership_content"),
    (r"native\s+advertising", "native_advertising"),
    (r"betalt\s+innehåll", "betalt_innehall"),
    (r"reklam", "reklam"),
];

static NORDIC_SPONSOR_MARKERS: LazyLock<Vec<MarkerRule>> = LazyLock::new(|| {
    NORDIC_SPONSOR_PATTERNS
        .iter()
        .map(|(pattern, flag)| MarkerRule {
            pattern: Regex::new(&format!("(?i){pattern}")).expect("valid regex"),
            flag: format!("sponsored_marker:{flag}"),
        })
        .collect()
});

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl CredibilityRules {
    /// Swedish and English sponsorship markers with a Nordic allow-list.
    pub fn nordic() -> Self {
        Self {
            sponsor_markers: NORDIC_SPONSOR_MARKERS.clone(),
            url_markers: [
                "/brandstudio/",
                "/annons/",
                "/sponsored/",
                "/partners/",
                "/native-ads/",
                "/reklam/",
            ]
            .iter()
            .map(|m| (m.to_string(), format!("url_contains:{m}")))
            .collect(),
            regional_tlds: strings(&[".se", ".dk", ".no", ".fi", ".is"]),
            regional_name_tokens: strings(&[
                "sweden", "sverige", "denmark", "danmark", "norway", "norge", "finland", "suomi",
                "iceland", "ísland",
            ]),
            platforms: vec![
                PlatformRule {
                    host: "linkedin.com".into(),
                    locale_subdomains: strings(&["se", "dk", "no", "fi", "is"]),
                    query_params: vec![("tl".into(), "sv".into())],
                    path_markers: Vec::new(),
                },
                PlatformRule {
                    host: "reddit.com".into(),
                    locale_subdomains: Vec::new(),
                    query_params: Vec::new(),
                    path_markers: strings(&[
                        "/sweden",
                        "/norge",
                        "/denmark",
                        "/suomi",
                        "/iceland",
                        "/foretagande",
                    ]),
                },
            ],
            non_regional_flag: "non_nordic_geography".into(),
        }
    }

    /// Whether the URL's host (or, for known platforms, its locale) places
    /// the source in the target region.
    pub fn is_regional(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        let Some(host) = parsed.host_str().map(|h| h.to_lowercase()) else {
            return false;
        };

        if let Some(platform) = self.platforms.iter().find(|p| p.applies_to(&host)) {
            return platform.is_regional(&parsed, &host);
        }

        self.regional_tlds.iter().any(|tld| host.ends_with(tld.as_str()))
            || self
                .regional_name_tokens
                .iter()
                .any(|token| host.contains(token.as_str()))
    }

    /// Classify one source. Every sponsorship and URL marker that matches is
    /// flagged; any of them rejects, regardless of geography.
    pub fn assess(&self, url: &str, markup: &str) -> CredibilityAssessment {
        let mut flags: Vec<String> = self
            .sponsor_markers
            .iter()
            .filter(|m| m.pattern.is_match(markup))
            .map(|m| m.flag.clone())
            .collect();

        let lower_url = url.to_lowercase();
        flags.extend(
            self.url_markers
                .iter()
                .filter(|(fragment, _)| lower_url.contains(fragment.as_str()))
                .map(|(_, flag)| flag.clone()),
        );

        let rejected = !flags.is_empty();
        let is_regional = self.is_regional(url);
        if !is_regional {
            flags.push(self.non_regional_flag.clone());
        }

        let (verdict, reasoning) = if rejected {
            let reasons: Vec<&str> = flags
                .iter()
                .filter(|f| **f != self.non_regional_flag)
                .map(String::as_str)
                .collect();
            (
                CredibilityVerdict::Reject,
                format!("Auto-rejected: {}", reasons.join(", ")),
            )
        } else if !is_regional {
            (
                CredibilityVerdict::Review,
                "Source not confirmed regional, needs review".to_string(),
            )
        } else {
            (
                CredibilityVerdict::Accept,
                "Deterministic checks passed".to_string(),
            )
        };

        CredibilityAssessment {
            verdict,
            flags,
            is_regional,
            reasoning,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CredibilityStats {
    pub checked: u32,
    pub accepted: u32,
    pub review: u32,
    pub rejected: u32,
    pub errors: u32,
}

/// Assess every candidate without a verdict. Verdicts are permanent: a
/// candidate that already has one is never reassessed.
pub async fn run_credibility(
    store: &SignalStore,
    rules: &CredibilityRules,
    limit: i64,
) -> Result<CredibilityStats> {
    let pending = store.candidates_pending_credibility(limit).await?;
    info!(count = pending.len(), "Checking credibility");

    let mut stats = CredibilityStats::default();
    for item in pending {
        let markup = item.raw_markup.as_deref().unwrap_or(&item.raw_text);
        let assessment = rules.assess(&item.url, markup);

        match store.insert_credibility(item.candidate.id, &assessment).await {
            Ok(true) => {
                stats.checked += 1;
                match assessment.verdict {
                    CredibilityVerdict::Accept => stats.accepted += 1,
                    CredibilityVerdict::Review => stats.review += 1,
                    CredibilityVerdict::Reject => stats.rejected += 1,
                }
            }
            Ok(false) => {}
            Err(e) => {
                warn!(candidate = item.candidate.id, error = %e, "Failed to store credibility verdict");
                stats.errors += 1;
            }
        }
    }

    info!(
        accepted = stats.accepted,
        review = stats.review,
        rejected = stats.rejected,
        "Credibility check complete"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLEAN: &str = "<p>Vi lägger för mycket tid på fakturor.</p>";

    #[test]
    fn regional_domain_is_accepted() {
        let a = CredibilityRules::nordic().assess("https://www.breakit.se/artikel/1", CLEAN);
        assert_eq!(a.verdict, CredibilityVerdict::Accept);
        assert!(a.is_regional);
        assert!(a.flags.is_empty());
    }

    #[test]
    fn sponsor_marker_rejects_even_on_regional_domain() {
        let html = "<div>Brand Studio</div><p>I samarbete med Fortnox</p>";
        let a = CredibilityRules::nordic().assess("https://www.di.se/artikel", html);
        assert_eq!(a.verdict, CredibilityVerdict::Reject);
        assert!(a.flags.contains(&"sponsored_marker:brand_studio".to_string()));
        assert!(a.flags.contains(&"sponsored_marker:i_samarbete_med".to_string()));
        assert!(a.is_regional);
    }

    #[test]
    fn sponsor_marker_rejects_off_region_too() {
        let a = CredibilityRules::nordic().assess("https://example.com/post", "Sponsored post");
        assert_eq!(a.verdict, CredibilityVerdict::Reject);
        assert!(a.flags.contains(&"non_nordic_geography".to_string()));
        assert!(!a.reasoning.contains("non_nordic_geography"));
    }

    #[test]
    fn built_rule_sets_share_the_compiled_markers() {
        let a = CredibilityRules::nordic();
        let b = CredibilityRules::nordic();
        assert_eq!(a.sponsor_markers.len(), NORDIC_SPONSOR_PATTERNS.len());
        for (x, y) in a.sponsor_markers.iter().zip(&b.sponsor_markers) {
            assert_eq!(x.pattern.as_str(), y.pattern.as_str());
            assert_eq!(x.flag, y.flag);
        }
        let hit = b.assess("https://www.di.se/artikel", "BETALT INNEHÅLL från Visma");
        assert_eq!(hit.flags, vec!["sponsored_marker:betalt_innehall".to_string()]);
    }

    #[test]
    fn sponsored_url_path_rejects() {
        let a = CredibilityRules::nordic().assess("https://www.di.se/brandstudio/foo", CLEAN);
        assert_eq!(a.verdict, CredibilityVerdict::Reject);
        assert_eq!(a.flags, vec!["url_contains:/brandstudio/".to_string()]);
    }

    #[test]
    fn off_region_is_review_not_reject() {
        let a = CredibilityRules::nordic().assess("https://medium.com/@someone/post", CLEAN);
        assert_eq!(a.verdict, CredibilityVerdict::Review);
        assert_eq!(a.flags, vec!["non_nordic_geography".to_string()]);
        assert!(!a.is_regional);
    }

    #[test]
    fn platform_locale_decides_regionality() {
        let rules = CredibilityRules::nordic();
        assert!(rules.is_regional("https://se.linkedin.com/posts/abc"));
        assert!(rules.is_regional("https://www.linkedin.com/posts/abc?tl=sv"));
        assert!(!rules.is_regional("https://www.linkedin.com/posts/abc"));
        assert!(rules.is_regional("https://www.reddit.com/r/sweden/comments/1"));
        assert!(rules.is_regional("https://www.reddit.com/r/Foretagande/comments/1"));
        assert!(!rules.is_regional("https://www.reddit.com/r/smallbusiness/comments/1"));
    }

    #[test]
    fn name_tokens_confirm_region() {
        let rules = CredibilityRules::nordic();
        assert!(rules.is_regional("https://startupsweden.com/news"));
        assert!(rules.is_regional("https://foretag.dk/x"));
        assert!(!rules.is_regional("not a url"));
    }
}
