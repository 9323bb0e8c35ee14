//! In-process [`BlocklistStore`] backed by `DashMap`.
//!
//! Same contract as the PostgreSQL store, uniqueness included. Used by the test
//! suite and by `blocklist --memory` for dry runs without a database.

use crate::database::BlocklistStore;
use crate::errors::{BlocklistError, Result};
use crate::models::{
    BlockedContract, BlockedDomain, ContractPatch, DomainFilter, DomainPatch, DomainPredicate,
    NewContract, NewDomain, Page,
};
use crate::network::Network;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct MemoryStore {
    domains: DashMap<String, BlockedDomain>,
    contracts: DashMap<(Network, String), BlockedContract>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn domain_count(&self) -> usize {
        self.domains.len()
    }

    /// Active (not soft-deleted) contracts on `network`.
    pub fn contract_count(&self, network: Network) -> usize {
        self.contracts
            .iter()
            .filter(|e| e.key().0 == network && !e.value().deleted)
            .count()
    }
}

fn paginate<T>(mut rows: Vec<T>, page: Page) -> Vec<T> {
    let offset = usize::try_from(page.offset).unwrap_or(usize::MAX);
    let limit = usize::try_from(page.limit).unwrap_or(usize::MAX);
    if offset >= rows.len() {
        return Vec::new();
    }
    rows.drain(..offset);
    rows.truncate(limit);
    rows
}

#[async_trait]
impl BlocklistStore for MemoryStore {
    async fn insert_domain(&self, domain: NewDomain) -> Result<BlockedDomain> {
        match self.domains.entry(domain.url.clone()) {
            Entry::Occupied(_) => Err(BlocklistError::DuplicateKey(domain.url)),
            Entry::Vacant(slot) => {
                let row = BlockedDomain {
                    id: Uuid::new_v4(),
                    url: domain.url,
                    source: domain.source,
                    cache_ttl: domain.cache_ttl,
                    last_updated: domain.last_updated,
                    origin: domain.origin,
                    created_at: Utc::now(),
                };
                slot.insert(row.clone());
                Ok(row)
            }
        }
    }

    async fn find_domain(&self, url: &str) -> Result<Option<BlockedDomain>> {
        Ok(self.domains.get(url).map(|e| e.value().clone()))
    }

    async fn list_domains(&self, filter: &DomainFilter, page: Page) -> Result<Vec<BlockedDomain>> {
        let mut rows: Vec<BlockedDomain> = self
            .domains
            .iter()
            .filter(|e| filter.matches(e.value()))
            .map(|e| e.value().clone())
            .collect();
        rows.sort_by(|a, b| {
            b.last_updated
                .cmp(&a.last_updated)
                .then_with(|| a.url.cmp(&b.url))
        });
        Ok(paginate(rows, page))
    }

    async fn update_domain(&self, url: &str, patch: DomainPatch, now: i64) -> Result<BlockedDomain> {
        let mut entry = self
            .domains
            .get_mut(url)
            .ok_or_else(|| BlocklistError::NotFound(format!("Domain '{}'", url)))?;
        if let Some(source) = patch.source {
            entry.source = source;
        }
        if let Some(ttl) = patch.cache_ttl {
            entry.cache_ttl = ttl;
        }
        entry.last_updated = now;
        Ok(entry.clone())
    }

    async fn delete_domains_where(&self, predicate: DomainPredicate) -> Result<u64> {
        let mut removed = 0u64;
        self.domains.retain(|_, d| {
            let hit = predicate.matches(d);
            if hit {
                removed += 1;
            }
            !hit
        });
        Ok(removed)
    }

    async fn domain_keys(&self) -> Result<HashSet<String>> {
        Ok(self.domains.iter().map(|e| e.key().clone()).collect())
    }

    async fn matching_domains(&self, candidates: &[String]) -> Result<HashSet<String>> {
        Ok(candidates
            .iter()
            .filter(|c| self.domains.contains_key(c.as_str()))
            .cloned()
            .collect())
    }

    async fn insert_contract(&self, contract: NewContract) -> Result<BlockedContract> {
        let key = (contract.network, contract.address.clone());
        match self.contracts.entry(key) {
            Entry::Occupied(_) => Err(BlocklistError::DuplicateKey(format!(
                "{}:{}",
                contract.network, contract.address
            ))),
            Entry::Vacant(slot) => {
                let row = BlockedContract {
                    id: Uuid::new_v4(),
                    network: contract.network,
                    address: contract.address,
                    source: contract.source,
                    created_at: Utc::now(),
                    updated: contract.updated,
                    deleted: false,
                };
                slot.insert(row.clone());
                Ok(row)
            }
        }
    }

    async fn find_contract(&self, network: Network, address: &str) -> Result<Option<BlockedContract>> {
        Ok(self
            .contracts
            .get(&(network, address.to_string()))
            .map(|e| e.value().clone()))
    }

    async fn list_contracts(&self, network: Network, page: Page) -> Result<Vec<BlockedContract>> {
        let mut rows: Vec<BlockedContract> = self
            .contracts
            .iter()
            .filter(|e| e.key().0 == network && !e.value().deleted)
            .map(|e| e.value().clone())
            .collect();
        rows.sort_by(|a, b| b.updated.cmp(&a.updated).then_with(|| a.address.cmp(&b.address)));
        Ok(paginate(rows, page))
    }

    async fn update_contract(
        &self,
        network: Network,
        address: &str,
        patch: ContractPatch,
        now: i64,
    ) -> Result<BlockedContract> {
        let key = (network, address.to_string());
        let not_found = || BlocklistError::NotFound(format!("{} contract '{}'", network, address));

        let mut current = match self.contracts.get(&key) {
            Some(e) if !e.deleted => e.value().clone(),
            _ => return Err(not_found()),
        };
        if let Some(source) = patch.source {
            current.source = source;
        }
        current.updated = now;

        match patch.network.filter(|n| *n != network) {
            None => {
                self.contracts.insert(key, current.clone());
            }
            Some(target) => {
                let target_key = (target, address.to_string());
                match self.contracts.entry(target_key) {
                    Entry::Occupied(_) => {
                        return Err(BlocklistError::DuplicateKey(format!("{}:{}", target, address)))
                    }
                    Entry::Vacant(slot) => {
                        current.network = target;
                        slot.insert(current.clone());
                    }
                }
                self.contracts.remove(&key);
            }
        }
        Ok(current)
    }

    async fn delete_contract(&self, network: Network, address: &str, now: i64) -> Result<()> {
        match self.contracts.get_mut(&(network, address.to_string())) {
            Some(mut e) if !e.deleted => {
                e.deleted = true;
                e.updated = now;
                Ok(())
            }
            _ => Err(BlocklistError::NotFound(format!(
                "{} contract '{}'",
                network, address
            ))),
        }
    }

    async fn restore_contract(
        &self,
        network: Network,
        address: &str,
        source: &str,
        now: i64,
    ) -> Result<BlockedContract> {
        match self.contracts.get_mut(&(network, address.to_string())) {
            Some(mut e) if e.deleted => {
                e.deleted = false;
                e.source = source.to_string();
                e.updated = now;
                Ok(e.clone())
            }
            _ => Err(BlocklistError::NotFound(format!(
                "deleted {} contract '{}'",
                network, address
            ))),
        }
    }

    async fn contract_keys(&self, network: Network) -> Result<HashSet<String>> {
        Ok(self
            .contracts
            .iter()
            .filter(|e| e.key().0 == network)
            .map(|e| e.key().1.clone())
            .collect())
    }

    async fn matching_contracts(
        &self,
        network: Network,
        candidates: &[String],
    ) -> Result<HashSet<String>> {
        Ok(candidates
            .iter()
            .filter(|c| {
                self.contracts
                    .get(&(network, (*c).clone()))
                    .map_or(false, |e| !e.deleted)
            })
            .cloned()
            .collect())
    }
}
