// Company registry lookup (optional enrichment).

use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use serde::Serialize;
use tracing::debug;

static ORG_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{6}-\d{4})\b").expect("valid regex"));

/// The first search hit on a registry result page.
static RESULT_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("a.search-result-item, div.company-info").expect("valid selector")
});

const MAX_SNIPPET_CHARS: usize = 300;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistryHit {
    pub org_number: Option<String>,
    pub snippet: String,
    pub search_url: String,
}

impl RegistryHit {
    /// Enrichment payload as persisted with the verification result.
    pub fn payload(&self) -> serde_json::Value {
        serde_json::json!({
            "found": true,
            "org_number": self.org_number,
            "snippet": self.snippet,
            "search_url": self.search_url,
        })
    }
}

#[async_trait]
pub trait CompanyRegistry: Send + Sync {
    /// `Ok(None)` when the company is not found.
    async fn lookup(&self, company_name: &str) -> Result<Option<RegistryHit>>;
}

/// Registry lookups disabled.
pub struct NoopRegistry;

#[async_trait]
impl CompanyRegistry for NoopRegistry {
    async fn lookup(&self, _company_name: &str) -> Result<Option<RegistryHit>> {
        Ok(None)
    }
}

/// Read the first search hit from a registry result page. Text outside the
/// result block (headers, ads, footers) is never considered, so a page with
/// no hit is not found even when it shows some organisation number.
pub fn parse_registry_page(html: &str, search_url: &str) -> Option<RegistryHit> {
    let document = Html::parse_document(html);
    let result = document.select(&RESULT_SELECTOR).next()?;
    let text = result.text().collect::<Vec<_>>().join(" ");
    let snippet: String = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(MAX_SNIPPET_CHARS)
        .collect();
    let org_number = ORG_NUMBER_RE.find(&snippet).map(|m| m.as_str().to_string());
    Some(RegistryHit {
        org_number,
        snippet,
        search_url: search_url.to_string(),
    })
}

/// Swedish company registry search page scraper.
pub struct AllabolagRegistry {
    client: reqwest::Client,
    base_url: String,
}

impl AllabolagRegistry {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36")
            .build()
            .context("Failed to build registry client")?;
        Ok(Self {
            client,
            base_url: "https://www.allabolag.se/what".to_string(),
        })
    }
}

#[async_trait]
impl CompanyRegistry for AllabolagRegistry {
    async fn lookup(&self, company_name: &str) -> Result<Option<RegistryHit>> {
        let mut url = url::Url::parse(&self.base_url).context("Invalid registry base URL")?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Registry base URL cannot take a path"))?
            .push(company_name.trim());

        let resp = self
            .client
            .get(url.as_str())
            .send()
            .await
            .context("Registry request failed")?;
        if !resp.status().is_success() {
            debug!(company = company_name, status = resp.status().as_u16(), "Registry lookup miss");
            return Ok(None);
        }
        let html = resp.text().await.context("Failed to read registry page")?;
        Ok(parse_registry_page(&html, url.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_org_number() {
        let html = "<div class=\"company-info\">Byggfirman Norr AB\n Org.nr 556677-8899 Umeå</div>";
        let hit = parse_registry_page(html, "https://www.allabolag.se/what/Byggfirman").unwrap();
        assert_eq!(hit.org_number.as_deref(), Some("556677-8899"));
        assert!(hit.snippet.contains("Byggfirman Norr AB Org.nr"));
        assert_eq!(hit.payload()["found"], true);
    }

    #[test]
    fn no_result_block_means_not_found() {
        assert!(parse_registry_page("<p>Inga träffar</p>", "u").is_none());
    }

    #[test]
    fn org_number_outside_result_block_is_ignored() {
        let html = "<html><body><p>Inga träffar</p>\
            <footer>Allabolag AB, org.nr 556000-1111</footer></body></html>";
        assert!(parse_registry_page(html, "u").is_none());

        let html = "<html><body><header>Annons: Reklambolaget 559999-0000</header>\
            <a class=\"search-result-item\" href=\"/5566778899\">Åkeri Öst AB 556677-8899</a>\
            <footer>Allabolag AB, org.nr 556000-1111</footer></body></html>";
        let hit = parse_registry_page(html, "u").unwrap();
        assert_eq!(hit.org_number.as_deref(), Some("556677-8899"));
        assert_eq!(hit.snippet, "Åkeri Öst AB 556677-8899");
    }

    #[test]
    fn result_without_org_number_is_still_found() {
        let html = "<div class=\"company-info\">Byggfirman Norr AB, Umeå</div>";
        let hit = parse_registry_page(html, "u").unwrap();
        assert!(hit.org_number.is_none());
        assert_eq!(hit.payload()["found"], true);
    }

    #[test]
    fn snippet_is_capped_on_char_boundaries() {
        let html = format!("<div class=\"company-info\">556677-8899 {}</div>", "å".repeat(400));
        let hit = parse_registry_page(&html, "u").unwrap();
        assert_eq!(hit.org_number.as_deref(), Some("556677-8899"));
        assert_eq!(hit.snippet.chars().count(), MAX_SNIPPET_CHARS);
    }
}
