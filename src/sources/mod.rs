//! Bulk candidate producers and the boundary that contains their failures.
//!
//! A [`BulkSource`] yields raw, un-normalized candidate strings for one
//! [`Category`]. Callers go through [`fetch_candidates`], which applies the
//! per-source timeout and turns any error into an empty result plus a logged
//! failure, so one unreachable list never aborts a reconciliation run.

pub mod config;
pub mod list;
pub mod parse;

pub use config::{SourceEntry, SourceGroup, SourcesConfig};
pub use list::ListSource;

use crate::errors::{BlocklistError, Result};
use crate::known_set::Category;
use crate::metrics;
use async_trait::async_trait;
use log::{info, warn};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[async_trait]
pub trait BulkSource: Send + Sync {
    /// Tag written to the `source` column of rows this source creates.
    fn id(&self) -> &str;
    fn category(&self) -> Category;
    async fn fetch(&self) -> Result<Vec<String>>;
}

/// What one source produced in one run.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub candidates: Vec<String>,
    /// Set when the source errored or timed out; `candidates` is then empty.
    pub failure: Option<String>,
}

impl FetchOutcome {
    pub fn failed(&self) -> bool {
        self.failure.is_some()
    }
}

pub async fn fetch_candidates(source: &dyn BulkSource, timeout: Duration) -> FetchOutcome {
    let started = Instant::now();
    let result = match tokio::time::timeout(timeout, source.fetch()).await {
        Ok(result) => result,
        Err(_) => Err(BlocklistError::source_unavailable(
            source.id(),
            format!("timed out after {:?}", timeout),
        )),
    };

    match result {
        Ok(candidates) => {
            info!(
                "✅ [Sources] {} ({}) produced {} candidates in {:?}",
                source.id(),
                source.category(),
                candidates.len(),
                started.elapsed()
            );
            metrics::increment_candidates(source.id(), candidates.len() as u64);
            FetchOutcome {
                candidates,
                failure: None,
            }
        }
        Err(e) => {
            let e = match e {
                BlocklistError::SourceUnavailable { .. } => e,
                other => BlocklistError::source_unavailable(source.id(), other),
            };
            warn!("⚠️ [Sources] {} skipped for this run: {}", source.id(), e);
            metrics::increment_source_failure(source.id());
            FetchOutcome {
                candidates: Vec::new(),
                failure: Some(e.to_string()),
            }
        }
    }
}

/// Shared outbound client for list downloads and third-party APIs.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("spam-blocklist/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// One [`ListSource`] per configured URL, `init` entries first.
pub fn build_list_sources(
    config: &SourcesConfig,
    lists_dir: &Path,
    client: &reqwest::Client,
) -> Result<Vec<Arc<dyn BulkSource>>> {
    let mut sources: Vec<Arc<dyn BulkSource>> = Vec::with_capacity(config.source_count());
    for (category, group) in &config.groups {
        for (entries, fetch_once) in [(&group.init, true), (&group.cron, false)] {
            for entry in entries {
                let source = ListSource::new(entry, *category, fetch_once, lists_dir, client.clone())?;
                sources.push(Arc::new(source));
            }
        }
    }
    Ok(sources)
}
