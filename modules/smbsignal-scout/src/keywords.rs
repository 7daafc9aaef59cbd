//! Keyword file: the search vocabulary and rotation settings.
//!
//! The JSON file is the editable source of truth for which terms exist; the
//! `keywords` table tracks their counters. Every mutation of the file goes
//! through [`KeywordStore::update`], which rotates a bounded set of backups
//! and replaces the file atomically.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use smbsignal_archive::SignalStore;
use smbsignal_common::{KeywordKind, KeywordOrigin, SmbSignalError};
use tracing::{info, warn};

/// Number of rotated backups kept beside the keyword file.
pub const BACKUP_GENERATIONS: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoreKeywords {
    #[serde(default)]
    pub pain_signals: Vec<String>,
    #[serde(default)]
    pub ai_awareness: Vec<String>,
    #[serde(default)]
    pub business_context: Vec<String>,
    #[serde(default)]
    pub specific_tasks: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryKeywords {
    /// Terms learned from verified signals.
    #[serde(default)]
    pub from_signals: Vec<String>,
    /// Hand-picked exploratory terms.
    #[serde(default)]
    pub adjacent_terms: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rotation {
    pub queries_per_run: usize,
    pub core_ratio: f64,
    #[serde(default = "default_cooldown_days")]
    pub cooldown_days_before_reuse: i64,
}

fn default_cooldown_days() -> i64 {
    3
}

/// Words glued onto keywords to make natural queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Templates {
    pub region: String,
    pub business_noun: String,
    pub domestic_business: String,
}

impl Default for Templates {
    fn default() -> Self {
        Self {
            region: "Sverige".to_string(),
            business_noun: "företag".to_string(),
            domestic_business: "svensk företag".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordFile {
    pub core_keywords: CoreKeywords,
    #[serde(default)]
    pub discovery_keywords: DiscoveryKeywords,
    pub rotation: Rotation,
    /// Named domain allow-lists. An empty list means the open web.
    #[serde(default)]
    pub site_targets: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub templates: Templates,
    /// Keys this program does not interpret, preserved across rewrites.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl KeywordFile {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Malformed keyword file")
    }

    /// Reject run settings that would make generation meaningless.
    pub fn validate(&self) -> std::result::Result<(), SmbSignalError> {
        let r = &self.rotation;
        if r.queries_per_run == 0 {
            return Err(SmbSignalError::Validation(
                "rotation.queries_per_run must be greater than zero".into(),
            ));
        }
        if !(0.0..=1.0).contains(&r.core_ratio) {
            return Err(SmbSignalError::Validation(format!(
                "rotation.core_ratio must be within 0..=1, got {}",
                r.core_ratio
            )));
        }
        if r.cooldown_days_before_reuse < 0 {
            return Err(SmbSignalError::Validation(
                "rotation.cooldown_days_before_reuse must not be negative".into(),
            ));
        }
        if !self
            .core_keywords
            .business_context
            .iter()
            .any(|t| !t.trim().is_empty())
        {
            return Err(SmbSignalError::Validation(
                "core_keywords.business_context needs at least one term".into(),
            ));
        }
        Ok(())
    }

    /// Discovery terms in file order, deduplicated.
    pub fn discovery_terms(&self) -> Vec<String> {
        let d = &self.discovery_keywords;
        dedup_terms(d.from_signals.iter().chain(&d.adjacent_terms))
    }

    /// Every term with the bucket it belongs to. A term listed in both
    /// buckets counts as core.
    pub fn all_terms(&self) -> Vec<(String, KeywordKind)> {
        let c = &self.core_keywords;
        let core = dedup_terms(
            c.pain_signals
                .iter()
                .chain(&c.ai_awareness)
                .chain(&c.business_context)
                .chain(&c.specific_tasks),
        );
        let mut terms: Vec<(String, KeywordKind)> =
            core.iter().map(|t| (t.clone(), KeywordKind::Core)).collect();
        for t in self.discovery_terms() {
            if !core.contains(&t) {
                terms.push((t, KeywordKind::Discovery));
            }
        }
        terms
    }

    pub fn contains_term(&self, term: &str) -> bool {
        let needle = term.trim().to_lowercase();
        self.all_terms()
            .iter()
            .any(|(t, _)| t.to_lowercase() == needle)
    }

    /// Fold suggestions into the discovery pool. Terms already present
    /// anywhere in the file are skipped; retired terms leave both discovery
    /// lists. Applying the same input twice changes nothing the second time.
    pub fn merge_suggestions(&mut self, new_terms: &[String], retire: &[String]) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        let retire_set: Vec<String> = retire.iter().map(|t| t.trim().to_lowercase()).collect();
        let is_retired = |t: &str| retire_set.contains(&t.trim().to_lowercase());

        for term in new_terms {
            let term = term.trim();
            if term.is_empty() || is_retired(term) || self.contains_term(term) {
                continue;
            }
            self.discovery_keywords.from_signals.push(term.to_string());
            outcome.added.push(term.to_string());
        }

        let d = &mut self.discovery_keywords;
        for list in [&mut d.from_signals, &mut d.adjacent_terms] {
            list.retain(|t| {
                if is_retired(t) {
                    outcome.retired.push(t.clone());
                    false
                } else {
                    true
                }
            });
        }
        outcome
    }
}

fn dedup_terms<'a>(terms: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for t in terms {
        let t = t.trim();
        if !t.is_empty() && !out.iter().any(|o| o == t) {
            out.push(t.to_string());
        }
    }
    out
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MergeOutcome {
    pub added: Vec<String>,
    pub retired: Vec<String>,
}

impl MergeOutcome {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.retired.is_empty()
    }
}

// ---------------------------------------------------------------------------
// KeywordStore: the file mirror
// ---------------------------------------------------------------------------

pub struct KeywordStore {
    path: PathBuf,
}

impl KeywordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and validate the keyword file.
    pub fn load(&self) -> Result<KeywordFile> {
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read keyword file {}", self.path.display()))?;
        let file = KeywordFile::from_json(&raw)?;
        file.validate()?;
        Ok(file)
    }

    /// Path of backup generation `n` (1 is newest): `keywords.json` becomes
    /// `keywords.backup.1.json`.
    pub fn backup_path(&self, n: usize) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("keywords");
        let ext = self
            .path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("json");
        self.path.with_file_name(format!("{stem}.backup.{n}.{ext}"))
    }

    /// Read-modify-write. The current file is backed up before `mutate`
    /// runs; the new content is written only if `mutate` reports a change.
    pub fn update<T>(&self, mutate: impl FnOnce(&mut KeywordFile) -> (T, bool)) -> Result<T> {
        let mut file = self.load()?;
        let (value, changed) = mutate(&mut file);
        if !changed {
            return Ok(value);
        }
        file.validate()?;

        self.rotate_backups()?;
        self.write_atomic(&file)?;
        info!(path = %self.path.display(), "Keyword file updated");
        Ok(value)
    }

    fn rotate_backups(&self) -> Result<()> {
        let oldest = self.backup_path(BACKUP_GENERATIONS);
        if oldest.exists() {
            fs::remove_file(&oldest)
                .with_context(|| format!("Failed to drop backup {}", oldest.display()))?;
        }
        for n in (1..BACKUP_GENERATIONS).rev() {
            let from = self.backup_path(n);
            if from.exists() {
                fs::rename(&from, self.backup_path(n + 1))
                    .with_context(|| format!("Failed to rotate backup {}", from.display()))?;
            }
        }
        fs::copy(&self.path, self.backup_path(1))
            .with_context(|| format!("Failed to back up {}", self.path.display()))?;
        Ok(())
    }

    fn write_atomic(&self, file: &KeywordFile) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let json = serde_json::to_string_pretty(file).context("Failed to serialize keywords")?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .context("Failed to create temporary keyword file")?;
        tmp.write_all(json.as_bytes())?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

/// Make sure every term in the file has a counter row. Existing rows keep
/// their counters. Returns the number of rows created.
pub async fn seed_keywords(store: &SignalStore, file: &KeywordFile) -> Result<usize> {
    let mut created = 0;
    for (term, kind) in file.all_terms() {
        match store.ensure_keyword(&term, kind, KeywordOrigin::Initial).await {
            Ok(true) => created += 1,
            Ok(false) => {}
            Err(e) => warn!(term = term.as_str(), error = %e, "Failed to seed keyword"),
        }
    }
    if created > 0 {
        info!(created, "Seeded keyword counters");
    }
    Ok(created)
}
