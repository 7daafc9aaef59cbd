//! Shared setup for scout integration tests: an in-memory store, a keyword
//! file in a temp directory, and mock collaborators.

#![allow(dead_code)]

use std::path::PathBuf;

use smbsignal_archive::{NewCapture, NewQueryLog, PageFetcher, SignalStore, WebSearcher};
use smbsignal_common::{domain_of, KeywordKind};
use smbsignal_scout::credibility::CredibilityRules;
use smbsignal_scout::extraction::SignalExtractor;
use smbsignal_scout::feedback::KeywordAdvisor;
use smbsignal_scout::keywords::{seed_keywords, KeywordStore};
use smbsignal_scout::pacing::Pacing;
use smbsignal_scout::testing::{
    keyword_file_json, MockPageFetcher, MockProber, MockRegistry, MockSearcher,
};
use smbsignal_scout::verify::{CompanyRegistry, UrlProber};
use smbsignal_scout::workflows::{ScoutDeps, DEFAULT_BATCH_LIMIT};
use tempfile::TempDir;

pub struct TestContext {
    pub dir: TempDir,
    pub store: SignalStore,
}

impl TestContext {
    /// Fresh store plus a keyword file with the given rotation settings.
    pub async fn new(queries_per_run: usize, core_ratio: f64) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("keywords.json"),
            keyword_file_json(queries_per_run, core_ratio),
        )
        .expect("write keyword file");
        let store = SignalStore::in_memory().await.expect("in-memory store");
        Self { dir, store }
    }

    pub fn keywords_path(&self) -> PathBuf {
        self.dir.path().join("keywords.json")
    }

    pub fn keyword_store(&self) -> KeywordStore {
        KeywordStore::new(self.keywords_path())
    }

    pub async fn seed_keywords(&self) {
        let file = self.keyword_store().load().expect("load keywords");
        seed_keywords(&self.store, &file).await.expect("seed keywords");
    }

    /// Deps with every collaborator mocked and no pacing. Override fields
    /// with struct update syntax.
    pub fn deps(&self) -> ScoutDeps {
        ScoutDeps {
            store: self.store.clone(),
            keywords: self.keyword_store(),
            data_dir: self.dir.path().join("data"),
            searcher: Some(Box::new(MockSearcher::new()) as Box<dyn WebSearcher>),
            fetcher: Box::new(MockPageFetcher::new()) as Box<dyn PageFetcher>,
            prober: Box::new(MockProber::new()) as Box<dyn UrlProber>,
            registry: Box::new(MockRegistry::new()) as Box<dyn CompanyRegistry>,
            extractor: None,
            advisor: None,
            credibility: CredibilityRules::nordic(),
            pacing: Pacing::none(),
            batch_limit: DEFAULT_BATCH_LIMIT,
        }
    }

    /// Log an executed query embedding `keywords`, counting one use of each.
    pub async fn log_query(&self, text: &str, keywords: &[&str]) -> i64 {
        let keywords: Vec<String> = keywords.iter().map(|k| k.to_string()).collect();
        let id = self
            .store
            .log_query(&NewQueryLog {
                query_text: text,
                kind: KeywordKind::Core,
                target: "open_web",
                include_domains: &[],
                keywords_used: &keywords,
                result_count: 1,
            })
            .await
            .expect("log query");
        for k in &keywords {
            self.store.record_keyword_use(k).await.expect("record use");
        }
        id
    }

    /// Store a capture as the acquirer would, returning its identity.
    pub async fn capture(&self, url: &str, text: &str, markup: &str, query_log_id: Option<i64>) -> String {
        self.store
            .insert_capture(&NewCapture {
                url: url.to_string(),
                domain: domain_of(url),
                content_date: None,
                title: None,
                raw_text: text.to_string(),
                raw_markup: Some(markup.to_string()),
                query: None,
                query_type: None,
                query_log_id,
                http_status: Some(200),
            })
            .await
            .expect("insert capture")
            .expect("new capture")
    }

    /// Id of the single candidate extracted from a capture.
    pub async fn candidate_id(&self, identity: &str) -> i64 {
        let candidates = self
            .store
            .candidates_for_capture(identity)
            .await
            .expect("candidates");
        assert_eq!(candidates.len(), 1, "expected one candidate for {identity}");
        candidates[0].candidate.id
    }
}

pub fn extractor(extractor: impl SignalExtractor + 'static) -> Option<Box<dyn SignalExtractor>> {
    Some(Box::new(extractor))
}

pub fn advisor(advisor: impl KeywordAdvisor + 'static) -> Option<Box<dyn KeywordAdvisor>> {
    Some(Box::new(advisor))
}

pub fn searcher(searcher: impl WebSearcher + 'static) -> Option<Box<dyn WebSearcher>> {
    Some(Box::new(searcher))
}

/// A forum-style post long enough to pass the extraction threshold.
pub fn forum_text(statement: &str) -> String {
    format!(
        "Tråd i forumet om vardagen som företagare. {statement}. \
         Flera andra svarade att de känner igen sig och delade sina egna \
         erfarenheter av hur lång tid administrationen tar varje vecka."
    )
}
