//! Request-facing facade over the store, the verification cache, the wallet
//! scanner and the report book. Every operation maps to one REST route; the
//! HTTP layer only has to decode parameters, pass the caller's `X-API-Key` and
//! map [`BlocklistError`] to a status code.

use crate::database::BlocklistStore;
use crate::errors::{BlocklistError, Result};
use crate::metrics;
use crate::models::{
    clamp_cache_ttl, now_epoch, BlockedContract, BlockedDomain, ContractPatch, DomainFilter, DomainPatch,
    DomainPredicate, NewContract, NewDomain, Origin, Page, DEFAULT_CACHE_TTL_SECONDS,
};
use crate::network::Network;
use crate::normalization::{normalize_address, normalize_domain, split_csv};
use crate::reports::{ReportOutcome, ReportStore};
use crate::settings;
use crate::verification_cache::{Lookup, VerificationCache};
use crate::verifiers::mnemonichq::{MnemonicHqWalletScan, WalletScan};
use futures::stream::{self, StreamExt};
use indexmap::IndexMap;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

const DEFAULT_SCAN_CONCURRENCY: usize = 8;

/// Allow-lists for the `X-API-Key` header.
///
/// Mutations need an edit key. Reads are open unless view keys are configured,
/// in which case they need a view or an edit key.
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    view: HashSet<String>,
    edit: HashSet<String>,
}

impl ApiKeys {
    pub fn new<I, J>(view: I, edit: J) -> Self
    where
        I: IntoIterator<Item = String>,
        J: IntoIterator<Item = String>,
    {
        Self {
            view: view.into_iter().collect(),
            edit: edit.into_iter().collect(),
        }
    }

    pub fn from_settings(api: &settings::Api) -> Self {
        Self::new(api.view_keys.iter().cloned(), api.edit_keys.iter().cloned())
    }

    pub fn require_edit(&self, key: Option<&str>) -> Result<()> {
        match key {
            Some(k) if self.edit.contains(k) => Ok(()),
            _ => Err(BlocklistError::Unauthorized),
        }
    }

    pub fn require_view(&self, key: Option<&str>) -> Result<()> {
        if self.view.is_empty() {
            return Ok(());
        }
        match key {
            Some(k) if self.view.contains(k) || self.edit.contains(k) => Ok(()),
            _ => Err(BlocklistError::Unauthorized),
        }
    }
}

/// Body of a manual domain create.
#[derive(Debug, Clone, Deserialize)]
pub struct DomainCreate {
    pub url: String,
    #[serde(default = "default_manual_source")]
    pub source: String,
    #[serde(default)]
    pub cache_ttl: Option<i64>,
}

/// Body of a manual contract create.
#[derive(Debug, Clone, Deserialize)]
pub struct ContractCreate {
    pub network: Network,
    pub address: String,
    #[serde(default = "default_manual_source")]
    pub source: String,
}

fn default_manual_source() -> String {
    "manual".to_string()
}

pub struct BlocklistService {
    store: Arc<dyn BlocklistStore>,
    cache: Arc<VerificationCache>,
    reports: Arc<ReportStore>,
    wallet_scanner: Option<Arc<MnemonicHqWalletScan>>,
    keys: ApiKeys,
    scan_concurrency: usize,
}

impl BlocklistService {
    pub fn new(
        store: Arc<dyn BlocklistStore>,
        cache: Arc<VerificationCache>,
        reports: Arc<ReportStore>,
        keys: ApiKeys,
    ) -> Self {
        Self {
            store,
            cache,
            reports,
            wallet_scanner: None,
            keys,
            scan_concurrency: DEFAULT_SCAN_CONCURRENCY,
        }
    }

    pub fn with_wallet_scanner(mut self, scanner: Arc<MnemonicHqWalletScan>) -> Self {
        self.wallet_scanner = Some(scanner);
        self
    }

    pub fn with_scan_concurrency(mut self, concurrency: usize) -> Self {
        self.scan_concurrency = concurrency.max(1);
        self
    }

    pub fn cache(&self) -> &VerificationCache {
        &self.cache
    }

    // ---- domains ----

    pub async fn list_domains(
        &self,
        api_key: Option<&str>,
        filter: &DomainFilter,
        page: Page,
    ) -> Result<Vec<BlockedDomain>> {
        self.keys.require_view(api_key)?;
        self.store.list_domains(filter, page).await
    }

    pub async fn get_domain(&self, api_key: Option<&str>, url: &str) -> Result<BlockedDomain> {
        self.keys.require_view(api_key)?;
        let key = domain_key(url)?;
        self.store
            .find_domain(&key)
            .await?
            .ok_or_else(|| BlocklistError::NotFound(format!("Domain '{}'", key)))
    }

    /// Manual entries are static rows and never expire unless a lifetime is given.
    pub async fn create_domain(&self, api_key: Option<&str>, create: DomainCreate) -> Result<BlockedDomain> {
        self.keys.require_edit(api_key)?;
        let key = domain_key(&create.url)?;
        let domain = NewDomain {
            cache_ttl: create.cache_ttl.map_or(DEFAULT_CACHE_TTL_SECONDS, clamp_cache_ttl),
            ..NewDomain::static_entry(key, create.source, now_epoch())
        };
        let row = self.store.insert_domain(domain).await?;
        info!("[Service] Domain {} added by hand ({})", row.url, row.source);
        Ok(row)
    }

    pub async fn update_domain(
        &self,
        api_key: Option<&str>,
        url: &str,
        patch: DomainPatch,
    ) -> Result<BlockedDomain> {
        self.keys.require_edit(api_key)?;
        let key = domain_key(url)?;
        let patch = DomainPatch {
            cache_ttl: patch.cache_ttl.map(clamp_cache_ttl),
            ..patch
        };
        self.store.update_domain(&key, patch, now_epoch()).await
    }

    pub async fn delete_domain(&self, api_key: Option<&str>, url: &str) -> Result<()> {
        self.keys.require_edit(api_key)?;
        let key = domain_key(url)?;
        let removed = self
            .store
            .delete_domains_where(DomainPredicate::Url(key.clone()))
            .await?;
        if removed == 0 {
            return Err(BlocklistError::NotFound(format!("Domain '{}'", key)));
        }
        info!("[Service] Domain {} deleted", key);
        Ok(())
    }

    /// Removes every row ingested from one source, e.g. after a list is dropped
    /// from `sources.json`.
    pub async fn delete_domains_from_source(&self, api_key: Option<&str>, source: &str) -> Result<u64> {
        self.keys.require_edit(api_key)?;
        self.store
            .delete_domains_where(DomainPredicate::Source(source.to_string()))
            .await
    }

    pub async fn check_domain(&self, api_key: Option<&str>, raw: &str) -> Result<Lookup> {
        self.keys.require_view(api_key)?;
        self.cache.lookup_domain(raw).await
    }

    /// `input -> flagged` for a comma separated list, in input order.
    ///
    /// Known domains are found with one bulk query; each miss goes through the
    /// verification cache, at most `scan_concurrency` at a time. Inputs that do
    /// not normalize to a hostname map to `false`.
    pub async fn scan_domains(&self, api_key: Option<&str>, csv: &str) -> Result<IndexMap<String, bool>> {
        self.keys.require_view(api_key)?;
        let inputs: Vec<(String, String)> = split_csv(csv)
            .into_iter()
            .map(|raw| (raw.to_string(), normalize_domain(raw)))
            .collect();

        let mut keys: Vec<String> = inputs
            .iter()
            .map(|(_, key)| key.clone())
            .filter(|key| !key.is_empty())
            .collect();
        keys.sort();
        keys.dedup();

        let known = self.store.matching_domains(&keys).await?;
        let misses: Vec<String> = keys.into_iter().filter(|k| !known.contains(k)).collect();
        metrics::increment_cache_hits("domain", known.len() as u64);

        let now = now_epoch();
        let lookups: Vec<Result<Lookup>> = stream::iter(misses)
            .map(|key| {
                metrics::increment_cache_miss("domain");
                self.cache.verify_miss(key, now)
            })
            .buffer_unordered(self.scan_concurrency)
            .collect()
            .await;

        let mut flagged: HashSet<String> = known;
        for lookup in lookups {
            let lookup = lookup?;
            if lookup.flagged {
                flagged.insert(lookup.key);
            }
        }
        debug!(
            "[Service] Domain scan: {} inputs, {} flagged",
            inputs.len(),
            flagged.len()
        );

        Ok(inputs
            .into_iter()
            .map(|(raw, key)| {
                let hit = flagged.contains(&key);
                (raw, hit)
            })
            .collect())
    }

    // ---- contracts ----

    pub async fn list_contracts(
        &self,
        api_key: Option<&str>,
        network: Network,
        page: Page,
    ) -> Result<Vec<BlockedContract>> {
        self.keys.require_view(api_key)?;
        self.store.list_contracts(network, page).await
    }

    pub async fn get_contract(
        &self,
        api_key: Option<&str>,
        network: Network,
        address: &str,
    ) -> Result<BlockedContract> {
        self.keys.require_view(api_key)?;
        let address = normalize_address(address, network)?;
        match self.store.find_contract(network, &address).await? {
            Some(row) if !row.deleted => Ok(row),
            _ => Err(not_found_contract(network, &address)),
        }
    }

    /// Inserts a contract, or restores it if it had been deleted.
    pub async fn create_contract(
        &self,
        api_key: Option<&str>,
        create: ContractCreate,
    ) -> Result<BlockedContract> {
        self.keys.require_edit(api_key)?;
        let network = create.network;
        let address = normalize_address(&create.address, network)?;
        let now = now_epoch();

        if let Some(existing) = self.store.find_contract(network, &address).await? {
            if !existing.deleted {
                return Err(BlocklistError::DuplicateKey(format!("{}:{}", network, address)));
            }
            let row = self
                .store
                .restore_contract(network, &address, &create.source, now)
                .await?;
            info!("[Service] Contract {} on {} restored", address, network);
            return Ok(row);
        }

        let row = self
            .store
            .insert_contract(NewContract {
                network,
                address,
                source: create.source,
                updated: now,
            })
            .await?;
        info!("[Service] Contract {} on {} added by hand", row.address, network);
        Ok(row)
    }

    pub async fn update_contract(
        &self,
        api_key: Option<&str>,
        network: Network,
        address: &str,
        patch: ContractPatch,
    ) -> Result<BlockedContract> {
        self.keys.require_edit(api_key)?;
        let address = normalize_address(address, network)?;
        if let Some(target) = patch.network {
            // The address has to be valid on the network it moves to.
            if normalize_address(&address, target)? != address {
                return Err(BlocklistError::InvalidInput(format!(
                    "{} is not a canonical {} address",
                    address, target
                )));
            }
        }
        self.store
            .update_contract(network, &address, patch, now_epoch())
            .await
    }

    /// Soft delete: the row stays so list refreshes do not bring it back.
    pub async fn delete_contract(&self, api_key: Option<&str>, network: Network, address: &str) -> Result<()> {
        self.keys.require_edit(api_key)?;
        let address = normalize_address(address, network)?;
        self.store.delete_contract(network, &address, now_epoch()).await?;
        info!("[Service] Contract {} on {} deleted", address, network);
        Ok(())
    }

    /// `input -> flagged` for a comma separated list of addresses, in input order.
    /// Malformed addresses map to `false`.
    pub async fn scan_contracts(
        &self,
        api_key: Option<&str>,
        network: Network,
        csv: &str,
    ) -> Result<IndexMap<String, bool>> {
        self.keys.require_view(api_key)?;
        let inputs: Vec<(String, Option<String>)> = split_csv(csv)
            .into_iter()
            .map(|raw| (raw.to_string(), normalize_address(raw, network).ok()))
            .collect();

        let mut keys: Vec<String> = inputs.iter().filter_map(|(_, key)| key.clone()).collect();
        keys.sort();
        keys.dedup();

        let known = self.store.matching_contracts(network, &keys).await?;
        debug!(
            "[Service] Contract scan on {}: {} inputs, {} known",
            network,
            inputs.len(),
            known.len()
        );

        Ok(inputs
            .into_iter()
            .map(|(raw, key)| {
                let hit = key.map_or(false, |k| known.contains(&k));
                (raw, hit)
            })
            .collect())
    }

    /// Scans a wallet for spam NFTs; discovered contracts are recorded as a side effect.
    pub async fn scan_wallet(&self, api_key: Option<&str>, network: Network, wallet: &str) -> Result<WalletScan> {
        self.keys.require_view(api_key)?;
        let scanner = self
            .wallet_scanner
            .as_ref()
            .ok_or_else(|| BlocklistError::source_unavailable("mnemonichq", "not configured"))?;
        scanner.scan(network, wallet).await
    }

    // ---- reports ----

    pub async fn report_contract(
        &self,
        api_key: Option<&str>,
        network: Network,
        contract: &str,
        wallet: &str,
    ) -> Result<ReportOutcome> {
        self.keys.require_view(api_key)?;
        self.reports.report(network, contract, wallet).await
    }

    pub async fn reported_contracts(
        &self,
        api_key: Option<&str>,
        network: Network,
    ) -> Result<BTreeMap<String, Vec<String>>> {
        self.keys.require_view(api_key)?;
        self.reports.reported_contracts(network).await
    }

    pub async fn contract_reporters(
        &self,
        api_key: Option<&str>,
        network: Network,
        contract: &str,
    ) -> Result<Vec<String>> {
        self.keys.require_view(api_key)?;
        self.reports.contract_reporters(network, contract).await
    }

    /// Domains filtered by provenance, for the admin views.
    pub async fn list_verified_domains(&self, api_key: Option<&str>, page: Page) -> Result<Vec<BlockedDomain>> {
        let filter = DomainFilter {
            origin: Some(Origin::Verified),
            source: None,
        };
        self.list_domains(api_key, &filter, page).await
    }
}

fn domain_key(raw: &str) -> Result<String> {
    let key = normalize_domain(raw);
    if key.is_empty() {
        return Err(BlocklistError::InvalidInput(format!(
            "`{}` is not a domain",
            raw.trim()
        )));
    }
    Ok(key)
}

fn not_found_contract(network: Network, address: &str) -> BlocklistError {
    BlocklistError::NotFound(format!("{} contract '{}'", network, address))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_keys() {
        let open = ApiKeys::new(Vec::new(), vec!["edit-1".to_string()]);
        assert!(open.require_view(None).is_ok());
        assert!(open.require_edit(Some("edit-1")).is_ok());
        assert!(matches!(open.require_edit(None), Err(BlocklistError::Unauthorized)));
        assert!(open.require_edit(Some("view-1")).is_err());

        let closed = ApiKeys::new(vec!["view-1".to_string()], vec!["edit-1".to_string()]);
        assert!(closed.require_view(None).is_err());
        assert!(closed.require_view(Some("view-1")).is_ok());
        assert!(closed.require_view(Some("edit-1")).is_ok());
        assert!(closed.require_edit(Some("view-1")).is_err());
    }

    #[test]
    fn test_domain_key() {
        assert_eq!(domain_key("http://Drop.Example/mint").unwrap(), "drop.example");
        assert!(matches!(domain_key(" "), Err(BlocklistError::InvalidInput(_))));
    }
}
