//! Run operations: acquire, process, feedback, and both halves in sequence.
//!
//! Stages run strictly in order and hand over only through the store. Each
//! operation writes a stats artifact to `{data_dir}/logs/`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use smbsignal_archive::{PageFetcher, SignalStore, WebSearcher};
use smbsignal_common::SmbSignalError;
use tracing::info;

use crate::acquire::{AcquireStats, Acquirer};
use crate::credibility::{run_credibility, CredibilityRules, CredibilityStats};
use crate::extraction::{run_extraction, ExtractStats, SignalExtractor};
use crate::feedback::{run_feedback, FeedbackStats, KeywordAdvisor};
use crate::keywords::{seed_keywords, KeywordStore};
use crate::pacing::Pacing;
use crate::query_gen::generate_run_queries;
use crate::verify::{CompanyRegistry, UrlProber, Verifier, VerifyStats};

/// Upper bound on items taken per stage in one run.
pub const DEFAULT_BATCH_LIMIT: i64 = 1_000;

/// Everything a run needs. Collaborators are injected so tests can swap in
/// mocks; optional ones disable their stage when absent.
pub struct ScoutDeps {
    pub store: SignalStore,
    pub keywords: KeywordStore,
    pub data_dir: PathBuf,
    /// Required by `acquire` only.
    pub searcher: Option<Box<dyn WebSearcher>>,
    pub fetcher: Box<dyn PageFetcher>,
    pub prober: Box<dyn UrlProber>,
    pub registry: Box<dyn CompanyRegistry>,
    pub extractor: Option<Box<dyn SignalExtractor>>,
    pub advisor: Option<Box<dyn KeywordAdvisor>>,
    pub credibility: CredibilityRules,
    pub pacing: Pacing,
    pub batch_limit: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessStats {
    /// `None` when no extractor is configured.
    pub extraction: Option<ExtractStats>,
    pub credibility: CredibilityStats,
    pub verification: VerifyStats,
    pub feedback: FeedbackStats,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FullRunStats {
    pub acquisition: AcquireStats,
    pub processing: ProcessStats,
}

/// Write `stats` to `{data_dir}/logs/{stage}_stats_{YYYYmmdd_HHMM}.json`.
pub fn write_stats<T: Serialize>(data_dir: &Path, stage: &str, stats: &T) -> Result<PathBuf> {
    let dir = data_dir.join("logs");
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let path = dir.join(format!(
        "{stage}_stats_{}.json",
        Utc::now().format("%Y%m%d_%H%M")
    ));
    std::fs::write(&path, serde_json::to_string_pretty(stats)?)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), "Stats written");
    Ok(path)
}

impl ScoutDeps {
    /// Plan queries and acquire captures. The keyword file is validated and
    /// the search backend checked before any network call.
    pub async fn acquire<R: Rng + Send + ?Sized>(&self, rng: &mut R) -> Result<AcquireStats> {
        let file = self.keywords.load()?;
        let searcher = self.searcher.as_deref().ok_or_else(|| {
            SmbSignalError::Config("acquisition needs a configured search backend".into())
        })?;

        seed_keywords(&self.store, &file).await?;
        let queries = generate_run_queries(&self.store, &file, rng).await?;

        let stats = Acquirer::new(&self.store, searcher, self.fetcher.as_ref(), self.pacing.clone())
            .run(&queries, rng)
            .await?;
        write_stats(&self.data_dir, "crawl", &stats)?;
        Ok(stats)
    }

    /// Extract, assess, verify and learn from everything already captured.
    pub async fn process(&self) -> Result<ProcessStats> {
        // Validate before touching any collaborator.
        self.keywords.load()?;

        let extraction = match self.extractor.as_deref() {
            Some(extractor) => Some(run_extraction(&self.store, extractor, self.batch_limit).await?),
            None => {
                info!("No extractor configured, skipping extraction");
                None
            }
        };

        let credibility = run_credibility(&self.store, &self.credibility, self.batch_limit).await?;

        let verification = Verifier::new(
            &self.store,
            self.prober.as_ref(),
            self.registry.as_ref(),
            self.pacing.clone(),
        )
        .run(self.batch_limit)
        .await?;

        let feedback = run_feedback(&self.store, &self.keywords, self.advisor.as_deref()).await?;

        let stats = ProcessStats {
            extraction,
            credibility,
            verification,
            feedback,
        };
        write_stats(&self.data_dir, "process", &stats)?;
        Ok(stats)
    }

    /// Feedback loop on its own.
    pub async fn feedback(&self) -> Result<FeedbackStats> {
        self.keywords.load()?;
        let stats = run_feedback(&self.store, &self.keywords, self.advisor.as_deref()).await?;
        write_stats(&self.data_dir, "feedback", &stats)?;
        Ok(stats)
    }

    /// Acquire, then process.
    pub async fn run_all<R: Rng + Send + ?Sized>(&self, rng: &mut R) -> Result<FullRunStats> {
        let acquisition = self.acquire(rng).await?;
        let processing = self.process().await?;
        Ok(FullRunStats {
            acquisition,
            processing,
        })
    }
}
