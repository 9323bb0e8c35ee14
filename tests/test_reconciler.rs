//! Reconciliation runs against the in-memory store with scripted sources.

mod common;

use async_trait::async_trait;
use common::{HangingSource, StaticSource, KNOWN_CONTRACT, UNKNOWN_CONTRACT};
use spam_blocklist::database::BlocklistStore;
use spam_blocklist::known_set::Category;
use spam_blocklist::memory_store::MemoryStore;
use spam_blocklist::models::{
    now_epoch, BlockedContract, BlockedDomain, ContractPatch, DomainFilter, DomainPatch,
    DomainPredicate, NewContract, NewDomain, Page,
};
use spam_blocklist::reconciler::Reconciler;
use spam_blocklist::sources::BulkSource;
use spam_blocklist::{Network, Result};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn reconciler(store: &Arc<MemoryStore>, sources: Vec<Arc<dyn BulkSource>>, timeout: Duration) -> Reconciler {
    Reconciler::new(store.clone(), sources, timeout)
}

/// Two lists overlapping each other and the store end up as their union.
#[tokio::test]
async fn test_union_without_duplicates() {
    let store = Arc::new(MemoryStore::new());
    store
        .insert_domain(NewDomain::static_entry("a.example", "seed", now_epoch()))
        .await
        .unwrap();

    let sources: Vec<Arc<dyn BulkSource>> = vec![
        Arc::new(StaticSource::new(
            "list-one",
            Category::Domains,
            vec!["a.example", "https://B.example/x", "b.example", "https://"],
        )),
        Arc::new(StaticSource::new(
            "list-two",
            Category::Domains,
            vec!["b.example", "c.example"],
        )),
    ];
    let summary = reconciler(&store, sources, Duration::from_secs(5)).run().await.unwrap();

    let first = &summary.sources[0];
    assert_eq!(first.source, "list-one");
    assert_eq!(first.processed, 4);
    assert_eq!(first.invalid, 1);
    assert_eq!(first.added, 1);
    assert_eq!(first.already_known, 2);
    assert!(first.failure.is_none());

    let second = &summary.sources[1];
    assert_eq!(second.added, 1);
    assert_eq!(second.already_known, 1);

    assert_eq!(summary.total_added(), 2);
    assert_eq!(store.domain_count(), 3);
    let b = store.find_domain("b.example").await.unwrap().unwrap();
    assert_eq!(b.source, "list-one");
}

/// A source that never answers is reported as failed without holding up the rest.
#[tokio::test]
async fn test_hanging_source_does_not_block_run() {
    let store = Arc::new(MemoryStore::new());
    let sources: Vec<Arc<dyn BulkSource>> = vec![
        Arc::new(HangingSource {
            id: "stuck",
            category: Category::Domains,
        }),
        Arc::new(StaticSource::new("healthy", Category::Domains, vec!["ok.example"])),
    ];

    let started = Instant::now();
    let summary = reconciler(&store, sources, Duration::from_millis(50)).run().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));

    let stuck = summary.sources.iter().find(|s| s.source == "stuck").unwrap();
    assert!(stuck.failure.is_some());
    assert_eq!(stuck.processed, 0);
    assert_eq!(summary.failed_sources().count(), 1);

    assert!(store.find_domain("ok.example").await.unwrap().is_some());
    assert!(store.find_domain("late.example").await.unwrap().is_none());
}

/// Contract lists are checksummed per network; deleted rows stay deleted.
#[tokio::test]
async fn test_contracts_are_canonical_and_deletions_stick() {
    let store = Arc::new(MemoryStore::new());
    let now = now_epoch();
    store
        .insert_contract(NewContract {
            network: Network::Polygon,
            address: KNOWN_CONTRACT.to_string(),
            source: "manual".to_string(),
            updated: now,
        })
        .await
        .unwrap();
    store
        .delete_contract(Network::Polygon, KNOWN_CONTRACT, now)
        .await
        .unwrap();

    let sources: Vec<Arc<dyn BulkSource>> = vec![Arc::new(StaticSource::new(
        "polygon-list",
        Category::Contracts(Network::Polygon),
        vec![
            KNOWN_CONTRACT.to_lowercase(),
            UNKNOWN_CONTRACT.to_lowercase(),
            "0xBEEF".to_string(),
        ],
    ))];
    let summary = reconciler(&store, sources, Duration::from_secs(5)).run().await.unwrap();

    let s = &summary.sources[0];
    assert_eq!(s.processed, 3);
    assert_eq!(s.invalid, 1);
    assert_eq!(s.added, 1);
    assert_eq!(s.already_known, 1);

    let added = store
        .find_contract(Network::Polygon, UNKNOWN_CONTRACT)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(added.address, UNKNOWN_CONTRACT);
    assert_eq!(added.source, "polygon-list");

    let deleted = store
        .find_contract(Network::Polygon, KNOWN_CONTRACT)
        .await
        .unwrap()
        .unwrap();
    assert!(deleted.deleted);
    assert_eq!(store.contract_count(Network::Polygon), 1);
    assert_eq!(store.contract_count(Network::Ethereum), 0);
}

/// Running twice over the same lists adds nothing the second time.
#[tokio::test]
async fn test_second_run_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    let sources: Vec<Arc<dyn BulkSource>> = vec![
        Arc::new(StaticSource::new(
            "domains",
            Category::Domains,
            vec!["one.example", "two.example"],
        )),
        Arc::new(StaticSource::new(
            "eth",
            Category::Contracts(Network::Ethereum),
            vec![KNOWN_CONTRACT],
        )),
    ];
    let reconciler = reconciler(&store, sources, Duration::from_secs(5));

    let first = reconciler.run().await.unwrap();
    assert_eq!(first.total_added(), 3);

    let second = reconciler.run().await.unwrap();
    assert_eq!(second.total_added(), 0);
    assert!(second.sources.iter().all(|s| s.already_known == s.processed));
    assert_eq!(store.domain_count(), 2);
    assert_eq!(store.contract_count(Network::Ethereum), 1);
}

/// Store whose key listing comes back empty while its rows are still there,
/// as happens when another writer fills the table after the index loads.
struct StaleKeysStore(MemoryStore);

#[async_trait]
impl BlocklistStore for StaleKeysStore {
    async fn insert_domain(&self, domain: NewDomain) -> Result<BlockedDomain> {
        self.0.insert_domain(domain).await
    }

    async fn find_domain(&self, url: &str) -> Result<Option<BlockedDomain>> {
        self.0.find_domain(url).await
    }

    async fn list_domains(&self, filter: &DomainFilter, page: Page) -> Result<Vec<BlockedDomain>> {
        self.0.list_domains(filter, page).await
    }

    async fn update_domain(&self, url: &str, patch: DomainPatch, now: i64) -> Result<BlockedDomain> {
        self.0.update_domain(url, patch, now).await
    }

    async fn delete_domains_where(&self, predicate: DomainPredicate) -> Result<u64> {
        self.0.delete_domains_where(predicate).await
    }

    async fn domain_keys(&self) -> Result<HashSet<String>> {
        Ok(HashSet::new())
    }

    async fn matching_domains(&self, candidates: &[String]) -> Result<HashSet<String>> {
        self.0.matching_domains(candidates).await
    }

    async fn insert_contract(&self, contract: NewContract) -> Result<BlockedContract> {
        self.0.insert_contract(contract).await
    }

    async fn find_contract(&self, network: Network, address: &str) -> Result<Option<BlockedContract>> {
        self.0.find_contract(network, address).await
    }

    async fn list_contracts(&self, network: Network, page: Page) -> Result<Vec<BlockedContract>> {
        self.0.list_contracts(network, page).await
    }

    async fn update_contract(
        &self,
        network: Network,
        address: &str,
        patch: ContractPatch,
        now: i64,
    ) -> Result<BlockedContract> {
        self.0.update_contract(network, address, patch, now).await
    }

    async fn delete_contract(&self, network: Network, address: &str, now: i64) -> Result<()> {
        self.0.delete_contract(network, address, now).await
    }

    async fn restore_contract(
        &self,
        network: Network,
        address: &str,
        source: &str,
        now: i64,
    ) -> Result<BlockedContract> {
        self.0.restore_contract(network, address, source, now).await
    }

    async fn contract_keys(&self, _network: Network) -> Result<HashSet<String>> {
        Ok(HashSet::new())
    }

    async fn matching_contracts(
        &self,
        network: Network,
        candidates: &[String],
    ) -> Result<HashSet<String>> {
        self.0.matching_contracts(network, candidates).await
    }
}

/// Rows the index missed hit the unique key on insert and count as already known.
#[tokio::test]
async fn test_rows_missing_from_index_count_as_known() {
    let inner = MemoryStore::new();
    let now = now_epoch();
    inner
        .insert_domain(NewDomain::static_entry("seen.example", "seed", now))
        .await
        .unwrap();
    inner
        .insert_contract(NewContract {
            network: Network::Ethereum,
            address: KNOWN_CONTRACT.to_string(),
            source: "seed".to_string(),
            updated: now,
        })
        .await
        .unwrap();
    let store = Arc::new(StaleKeysStore(inner));

    let sources: Vec<Arc<dyn BulkSource>> = vec![
        Arc::new(StaticSource::new(
            "domains",
            Category::Domains,
            vec!["seen.example", "new.example"],
        )),
        Arc::new(StaticSource::new(
            "eth",
            Category::Contracts(Network::Ethereum),
            vec![KNOWN_CONTRACT],
        )),
    ];
    let summary = Reconciler::new(store.clone(), sources, Duration::from_secs(5))
        .run()
        .await
        .unwrap();

    let domains = summary.sources.iter().find(|s| s.source == "domains").unwrap();
    assert_eq!(domains.added, 1);
    assert_eq!(domains.already_known, 1);
    assert_eq!(domains.failed_writes, 0);

    let contracts = summary.sources.iter().find(|s| s.source == "eth").unwrap();
    assert_eq!(contracts.added, 0);
    assert_eq!(contracts.already_known, 1);
    assert_eq!(contracts.failed_writes, 0);

    assert_eq!(store.0.domain_count(), 2);
    assert_eq!(store.0.contract_count(Network::Ethereum), 1);
    let seen = store.0.find_domain("seen.example").await.unwrap().unwrap();
    assert_eq!(seen.source, "seed");
}
