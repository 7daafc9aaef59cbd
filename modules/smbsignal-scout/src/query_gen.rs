//! Builds one run's query list from the keyword file.
//!
//! Core queries combine the fixed keyword groups into natural phrases.
//! Discovery queries wrap each discovery term in a few templates and are
//! drawn by performance weight, so promising and untried terms surface more
//! often than terms that keep coming back empty.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use chrono::{Duration, Utc};
use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::seq::{IndexedRandom, SliceRandom};
use rand::Rng;
use smbsignal_archive::SignalStore;
use smbsignal_common::{KeywordKind, KeywordPerformance, PlannedQuery};
use tracing::info;

use crate::keywords::KeywordFile;

/// Site target groups the query patterns refer to.
pub const OPEN_WEB: &str = "open_web";
pub const FORUMS: &str = "forums";
pub const BUSINESS_PRESS: &str = "business_press";
pub const PROFESSIONAL_NETWORK: &str = "professional_network";

/// Candidate pools are generated at this multiple of the bucket target,
/// leaving headroom for cooldown filtering.
pub const POOL_MULTIPLIER: usize = 3;

const WEIGHT_UNUSED: f64 = 1.5;
const WEIGHT_UNSUCCESSFUL: f64 = 0.3;

/// Sampling weight of a discovery term.
pub fn discovery_weight(perf: Option<&KeywordPerformance>) -> f64 {
    match perf {
        None => WEIGHT_UNUSED,
        Some(p) if p.usage_count == 0 => WEIGHT_UNUSED,
        Some(p) if p.hit_rate > 0.0 => 1.0 + p.hit_rate,
        Some(_) => WEIGHT_UNSUCCESSFUL,
    }
}

/// Draw up to `k` items without replacement, each draw proportional to the
/// remaining weights. Items with zero weight are never drawn.
pub fn weighted_sample<T: Clone, R: Rng + ?Sized>(
    items: &[(T, f64)],
    k: usize,
    rng: &mut R,
) -> Vec<T> {
    let mut remaining: Vec<(T, f64)> = items
        .iter()
        .filter(|(_, w)| w.is_finite() && *w > 0.0)
        .cloned()
        .collect();
    let mut picked = Vec::with_capacity(k.min(remaining.len()));

    while picked.len() < k && !remaining.is_empty() {
        let Ok(dist) = WeightedIndex::new(remaining.iter().map(|(_, w)| *w)) else {
            break;
        };
        let (item, _) = remaining.swap_remove(dist.sample(rng));
        picked.push(item);
    }
    picked
}

/// Split `total` into (core, discovery) targets; core is rounded.
pub fn bucket_targets(total: usize, core_ratio: f64) -> (usize, usize) {
    let core = ((total as f64) * core_ratio.clamp(0.0, 1.0)).round() as usize;
    let core = core.min(total);
    (core, total - core)
}

pub struct QueryGenerator<'a> {
    file: &'a KeywordFile,
}

impl<'a> QueryGenerator<'a> {
    pub fn new(file: &'a KeywordFile) -> Self {
        Self { file }
    }

    fn query(&self, text: String, kind: KeywordKind, target: &str, keywords: &[&String]) -> PlannedQuery {
        PlannedQuery {
            text,
            kind,
            target: target.to_string(),
            include_domains: self.file.site_targets.get(target).cloned().unwrap_or_default(),
            keywords_used: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    /// Every core combination, in random order.
    pub fn core_candidates<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<PlannedQuery> {
        let c = &self.file.core_keywords;
        let t = &self.file.templates;
        let mut out = Vec::new();

        for p in &c.pain_signals {
            for b in &c.business_context {
                out.push(self.query(
                    format!("{p} {b} {}", t.region),
                    KeywordKind::Core,
                    OPEN_WEB,
                    &[p, b],
                ));
            }
        }

        for task in &c.specific_tasks {
            let pains: Vec<&String> = c.pain_signals.choose_multiple(rng, 4).collect();
            for p in pains {
                let target = [BUSINESS_PRESS, OPEN_WEB].choose(rng).copied().unwrap_or(OPEN_WEB);
                out.push(self.query(
                    format!("{task} {p} {}", t.business_noun),
                    KeywordKind::Core,
                    target,
                    &[task, p],
                ));
            }
        }

        for a in &c.ai_awareness {
            for b in &c.business_context {
                let target = [BUSINESS_PRESS, PROFESSIONAL_NETWORK, OPEN_WEB]
                    .choose(rng)
                    .copied()
                    .unwrap_or(OPEN_WEB);
                out.push(self.query(format!("{a} {b}"), KeywordKind::Core, target, &[a, b]));
            }
        }

        for p in &c.pain_signals {
            let tasks: Vec<&String> = c.specific_tasks.choose_multiple(rng, 3).collect();
            for task in tasks {
                out.push(self.query(format!("{p} {task}"), KeywordKind::Core, FORUMS, &[p, task]));
            }
        }

        out.shuffle(rng);
        out
    }

    /// Discovery templates for every discovery term, drawn by term weight.
    pub fn discovery_candidates<R: Rng + ?Sized>(
        &self,
        performance: &HashMap<String, KeywordPerformance>,
        limit: usize,
        rng: &mut R,
    ) -> Vec<PlannedQuery> {
        let t = &self.file.templates;
        let biz = &self.file.core_keywords.business_context;
        let mut weighted = Vec::new();

        for term in self.file.discovery_terms() {
            let weight = discovery_weight(performance.get(&term));
            let b = biz.choose(rng).cloned().unwrap_or_default();
            let templates = [
                self.query(
                    format!("{term} {b} {}", t.region),
                    KeywordKind::Discovery,
                    OPEN_WEB,
                    &[&term, &b],
                ),
                self.query(
                    format!("{term} {}", t.business_noun),
                    KeywordKind::Discovery,
                    FORUMS,
                    &[&term],
                ),
                self.query(
                    format!("{term} {}", t.domestic_business),
                    KeywordKind::Discovery,
                    BUSINESS_PRESS,
                    &[&term],
                ),
            ];
            weighted.extend(templates.into_iter().map(|q| (q, weight)));
        }

        weighted_sample(&weighted, limit, rng)
    }

    /// Assemble the run's list: at most `queries_per_run` queries, none
    /// repeating text within the run or from `cooldown`, split by the core
    /// ratio and backfilled from the other bucket when one runs short.
    pub fn plan<R: Rng + ?Sized>(
        &self,
        performance: &HashMap<String, KeywordPerformance>,
        cooldown: &HashSet<String>,
        rng: &mut R,
    ) -> Vec<PlannedQuery> {
        let rotation = &self.file.rotation;
        let total = rotation.queries_per_run;
        let (core_target, discovery_target) = bucket_targets(total, rotation.core_ratio);

        let mut core = self.core_candidates(rng);
        core.truncate(core_target * POOL_MULTIPLIER);
        let discovery =
            self.discovery_candidates(performance, discovery_target * POOL_MULTIPLIER, rng);

        let mut seen: HashSet<String> = HashSet::new();
        let mut fresh = |pool: Vec<PlannedQuery>| -> Vec<PlannedQuery> {
            pool.into_iter()
                .filter(|q| !cooldown.contains(&q.text) && seen.insert(q.text.clone()))
                .collect()
        };
        let mut core = fresh(core);
        let mut discovery = fresh(discovery);

        let core_rest = core.split_off(core_target.min(core.len()));
        let discovery_rest = discovery.split_off(discovery_target.min(discovery.len()));

        let mut plan = core;
        plan.extend(discovery);
        for q in core_rest.into_iter().chain(discovery_rest) {
            if plan.len() >= total {
                break;
            }
            plan.push(q);
        }
        plan.shuffle(rng);
        plan
    }
}

/// Plan a run against the stored cooldown log and keyword counters.
pub async fn generate_run_queries<R: Rng + ?Sized>(
    store: &SignalStore,
    file: &KeywordFile,
    rng: &mut R,
) -> Result<Vec<PlannedQuery>> {
    let since = Utc::now() - Duration::days(file.rotation.cooldown_days_before_reuse);
    let cooldown: HashSet<String> = store.recent_query_texts(since).await?.into_iter().collect();
    let performance = store.keyword_performance().await?;

    let plan = QueryGenerator::new(file).plan(&performance, &cooldown, rng);
    let core = plan.iter().filter(|q| q.kind == KeywordKind::Core).count();
    info!(
        total = plan.len(),
        core,
        discovery = plan.len() - core,
        cooling_down = cooldown.len(),
        "Generated run queries"
    );
    Ok(plan)
}
