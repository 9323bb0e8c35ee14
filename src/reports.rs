//! User spam reports, kept in a JSON file next to the service rather than in the
//! relational store: `{ "<network>": { "<contract>": ["<wallet>", ...] } }`.
//!
//! All access goes through one async mutex, and writes land in a temporary file
//! that is renamed over the original, so readers never see a half-written file.

use crate::errors::{BlocklistError, Result};
use crate::network::Network;
use crate::normalization::normalize_address;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;

/// network -> contract -> reporter wallets, in report order. Network keys stay
/// plain strings so entries for chains this build does not know survive a rewrite.
pub type ReportBook = BTreeMap<String, BTreeMap<String, Vec<String>>>;

const LOAD_ATTEMPTS: u32 = 5;
const LOAD_RETRY_DELAY: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportOutcome {
    pub network: Network,
    pub contract: String,
    pub wallet: String,
    /// False when this wallet had already reported this contract.
    pub recorded: bool,
    pub reporters: usize,
}

#[derive(Debug)]
pub struct ReportStore {
    path: PathBuf,
    lock: Mutex<()>,
    retry_delay: Duration,
}

impl ReportStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
            retry_delay: LOAD_RETRY_DELAY,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records `wallet` as a reporter of `contract`. Both addresses are
    /// canonicalized for `network`; a repeated report is a no-op.
    pub async fn report(&self, network: Network, contract: &str, wallet: &str) -> Result<ReportOutcome> {
        let contract = normalize_address(contract, network)?;
        let wallet = normalize_address(wallet, network)?;

        let _guard = self.lock.lock().await;
        let mut book = self.load().await?;
        let reporters = book
            .entry(network.as_str().to_string())
            .or_default()
            .entry(contract.clone())
            .or_default();

        let recorded = !reporters.contains(&wallet);
        if recorded {
            reporters.push(wallet.clone());
        }
        let count = reporters.len();
        if recorded {
            self.save(&book).await?;
            info!(
                "[Reports] {} reported {} on {} ({} reporters)",
                wallet, contract, network, count
            );
        } else {
            debug!("[Reports] {} already reported {} on {}", wallet, contract, network);
        }

        Ok(ReportOutcome {
            network,
            contract,
            wallet,
            recorded,
            reporters: count,
        })
    }

    pub async fn reported_contracts(&self, network: Network) -> Result<BTreeMap<String, Vec<String>>> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.remove(network.as_str()).unwrap_or_default())
    }

    pub async fn contract_reporters(&self, network: Network, contract: &str) -> Result<Vec<String>> {
        let contract = normalize_address(contract, network)?;
        Ok(self
            .reported_contracts(network)
            .await?
            .remove(&contract)
            .unwrap_or_default())
    }

    pub async fn snapshot(&self) -> Result<ReportBook> {
        let _guard = self.lock.lock().await;
        self.load().await
    }

    /// A missing file is an empty book. A file that cannot be read or parsed is
    /// retried a few times (another process may be mid-write) and then reported
    /// as an error; it is never replaced by an empty book.
    async fn load(&self) -> Result<ReportBook> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err: BlocklistError = match tokio::fs::read(&self.path).await {
                Ok(bytes) => match serde_json::from_slice::<ReportBook>(&bytes) {
                    Ok(book) => return Ok(book),
                    Err(e) => e.into(),
                },
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ReportBook::new()),
                Err(e) => e.into(),
            };
            if attempt >= LOAD_ATTEMPTS {
                warn!(
                    "⚠️ [Reports] Giving up on {} after {} attempts: {}",
                    self.path.display(),
                    attempt,
                    err
                );
                return Err(err);
            }
            tokio::time::sleep(self.retry_delay).await;
        }
    }

    async fn save(&self, book: &ReportBook) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let body = serde_json::to_vec_pretty(book)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
