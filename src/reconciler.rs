//! Bulk ingestion: fetch every configured source, normalize, diff against what the
//! store already holds and insert the rest.
//!
//! The known-set index is rebuilt per category at the start of each run so the
//! diff costs one query per category instead of one per candidate. It is only an
//! optimization: the store's uniqueness constraint stays authoritative, and a
//! `DuplicateKey` on insert is counted as "already known".

use crate::database::BlocklistStore;
use crate::errors::Result;
use crate::known_set::{Category, KnownSetIndex};
use crate::metrics;
use crate::models::{now_epoch, NewContract, NewDomain};
use crate::normalization::{normalize_address, normalize_domain};
use crate::sources::{fetch_candidates, BulkSource};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Per-source counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceSummary {
    pub source: String,
    pub category: String,
    /// Raw candidates returned by the source.
    pub processed: usize,
    /// Candidates that normalized to nothing or failed address validation.
    pub invalid: usize,
    pub added: usize,
    pub already_known: usize,
    /// Inserts that failed for a reason other than uniqueness.
    pub failed_writes: usize,
    /// Why the source produced nothing this run, if it failed.
    pub failure: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub started_at: i64,
    pub elapsed_ms: u128,
    pub sources: Vec<SourceSummary>,
}

impl RunSummary {
    pub fn total_added(&self) -> usize {
        self.sources.iter().map(|s| s.added).sum()
    }

    pub fn failed_sources(&self) -> impl Iterator<Item = &SourceSummary> {
        self.sources.iter().filter(|s| s.failure.is_some())
    }
}

pub struct Reconciler {
    store: Arc<dyn BlocklistStore>,
    sources: Vec<Arc<dyn BulkSource>>,
    fetch_timeout: Duration,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn BlocklistStore>,
        sources: Vec<Arc<dyn BulkSource>>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            store,
            sources,
            fetch_timeout,
        }
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// One reconciliation pass over every source. Source failures are recorded in
    /// the summary; only a failure to load the known set aborts the run.
    pub async fn run(&self) -> Result<RunSummary> {
        let started = Instant::now();
        let now = now_epoch();

        let mut by_category: BTreeMap<Category, Vec<&Arc<dyn BulkSource>>> = BTreeMap::new();
        for source in &self.sources {
            by_category.entry(source.category()).or_default().push(source);
        }

        info!(
            "🔄 [Reconciler] Starting run: {} sources across {} categories",
            self.sources.len(),
            by_category.len()
        );

        let mut index = KnownSetIndex::new();
        let mut summary = RunSummary {
            started_at: now,
            ..RunSummary::default()
        };

        for (category, sources) in by_category {
            let known = index.load(self.store.as_ref(), category).await?;
            debug!("[Reconciler] {} known keys in {}", known, category);

            for source in sources {
                let outcome = fetch_candidates(source.as_ref(), self.fetch_timeout).await;
                let mut source_summary = SourceSummary {
                    source: source.id().to_string(),
                    category: category.to_string(),
                    processed: outcome.candidates.len(),
                    failure: outcome.failure,
                    ..SourceSummary::default()
                };

                for raw in &outcome.candidates {
                    let Some(key) = normalize_candidate(category, raw) else {
                        source_summary.invalid += 1;
                        continue;
                    };
                    if index.contains(category, &key) {
                        source_summary.already_known += 1;
                        continue;
                    }
                    match self.persist(category, &key, source.id(), now).await {
                        Ok(()) => {
                            source_summary.added += 1;
                            index.add(category, key);
                        }
                        Err(e) if e.is_duplicate() => {
                            debug!("[Reconciler] {} already stored ({})", key, category);
                            source_summary.already_known += 1;
                            index.add(category, key);
                        }
                        Err(e) => {
                            warn!("⚠️ [Reconciler] Failed to store {} from {}: {}", key, source.id(), e);
                            source_summary.failed_writes += 1;
                        }
                    }
                }

                metrics::increment_added(source.id(), source_summary.added as u64);
                info!(
                    "[Reconciler] {} -> {}: processed={} invalid={} added={} known={} failed_writes={}{}",
                    source_summary.source,
                    source_summary.category,
                    source_summary.processed,
                    source_summary.invalid,
                    source_summary.added,
                    source_summary.already_known,
                    source_summary.failed_writes,
                    if source_summary.failure.is_some() { " (source failed)" } else { "" }
                );
                summary.sources.push(source_summary);
            }
        }

        let elapsed = started.elapsed();
        summary.elapsed_ms = elapsed.as_millis();
        metrics::record_run_duration(elapsed.as_secs_f64());
        info!(
            "✅ [Reconciler] Run finished in {:?}: {} added, {} sources failed",
            elapsed,
            summary.total_added(),
            summary.failed_sources().count()
        );
        Ok(summary)
    }

    async fn persist(&self, category: Category, key: &str, source: &str, now: i64) -> Result<()> {
        match category {
            Category::Domains => {
                self.store
                    .insert_domain(NewDomain::static_entry(key, source, now))
                    .await?;
            }
            Category::Contracts(network) => {
                self.store
                    .insert_contract(NewContract {
                        network,
                        address: key.to_string(),
                        source: source.to_string(),
                        updated: now,
                    })
                    .await?;
            }
        }
        Ok(())
    }
}

fn normalize_candidate(category: Category, raw: &str) -> Option<String> {
    match category {
        Category::Domains => Some(normalize_domain(raw)).filter(|d| !d.is_empty()),
        Category::Contracts(network) => normalize_address(raw, network).ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Network;

    #[test]
    fn test_normalize_candidate() {
        assert_eq!(
            normalize_candidate(Category::Domains, "HTTPS://Phish.Example/login"),
            Some("phish.example".to_string())
        );
        assert_eq!(normalize_candidate(Category::Domains, "https://"), None);
        assert_eq!(
            normalize_candidate(
                Category::Contracts(Network::Ethereum),
                "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed"
            ),
            Some("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed".to_string())
        );
        assert_eq!(
            normalize_candidate(Category::Contracts(Network::Ethereum), "0x1234"),
            None
        );
    }

    #[test]
    fn test_run_summary_totals() {
        let summary = RunSummary {
            started_at: 0,
            elapsed_ms: 0,
            sources: vec![
                SourceSummary {
                    source: "a".into(),
                    added: 2,
                    ..SourceSummary::default()
                },
                SourceSummary {
                    source: "b".into(),
                    added: 1,
                    failure: Some("timed out".into()),
                    ..SourceSummary::default()
                },
            ],
        };
        assert_eq!(summary.total_added(), 3);
        assert_eq!(summary.failed_sources().count(), 1);
    }
}
