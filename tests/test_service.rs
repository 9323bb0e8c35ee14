//! Request-level behavior of the service facade: scans, reports, auth and
//! the contract delete/restore cycle.

mod common;

use common::{CountingVerifier, KNOWN_CONTRACT, UNKNOWN_CONTRACT, WALLET_A, WALLET_B};
use spam_blocklist::database::BlocklistStore;
use spam_blocklist::memory_store::MemoryStore;
use spam_blocklist::models::{
    now_epoch, DomainFilter, DomainPatch, NewContract, NewDomain, Origin, Page,
    DEFAULT_CACHE_TTL_SECONDS,
};
use spam_blocklist::reports::ReportStore;
use spam_blocklist::service::{ApiKeys, ContractCreate, DomainCreate};
use spam_blocklist::verification_cache::VerificationCache;
use spam_blocklist::verifiers::VerifySource;
use spam_blocklist::{BlocklistError, BlocklistService, Network};
use std::sync::Arc;
use tempfile::TempDir;

const EDIT: &str = "edit-key";
const VIEW: &str = "view-key";

struct Harness {
    store: Arc<MemoryStore>,
    verifier: Arc<CountingVerifier>,
    service: BlocklistService,
    _dir: TempDir,
}

fn harness(verifier: CountingVerifier, keys: ApiKeys) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let verifier = Arc::new(verifier);
    let dyn_verifier: Arc<dyn VerifySource> = verifier.clone();
    let cache = Arc::new(VerificationCache::new(store.clone(), Some(dyn_verifier), 600));
    let reports = Arc::new(ReportStore::new(dir.path().join("spam_reports.json")));
    let service = BlocklistService::new(store.clone(), cache, reports, keys).with_scan_concurrency(4);
    Harness {
        store,
        verifier,
        service,
        _dir: dir,
    }
}

fn edit_only() -> ApiKeys {
    ApiKeys::new(Vec::new(), vec![EDIT.to_string()])
}

async fn seed_contract(store: &MemoryStore, network: Network, address: &str) {
    store
        .insert_contract(NewContract {
            network,
            address: address.to_string(),
            source: "seed".to_string(),
            updated: now_epoch(),
        })
        .await
        .unwrap();
}

/// Results keep input order and map malformed addresses to false.
#[tokio::test]
async fn test_scan_contracts() {
    let h = harness(CountingVerifier::new(), edit_only());
    seed_contract(&h.store, Network::Polygon, KNOWN_CONTRACT).await;

    let lower = KNOWN_CONTRACT.to_lowercase();
    let csv = format!("{}, {},0xBEEF,", lower, UNKNOWN_CONTRACT);
    let result = h
        .service
        .scan_contracts(None, Network::Polygon, &csv)
        .await
        .unwrap();

    let entries: Vec<(String, bool)> = result.into_iter().collect();
    assert_eq!(
        entries,
        vec![
            (lower, true),
            (UNKNOWN_CONTRACT.to_string(), false),
            ("0xBEEF".to_string(), false),
        ]
    );

    let other_chain = h
        .service
        .scan_contracts(None, Network::Ethereum, KNOWN_CONTRACT)
        .await
        .unwrap();
    assert_eq!(other_chain.get(KNOWN_CONTRACT), Some(&false));
}

/// Known domains come from the store; only misses reach the verifier.
#[tokio::test]
async fn test_scan_domains() {
    let verifier = CountingVerifier::new()
        .flag("phish.example", Some(120))
        .clear("fine.example");
    let h = harness(verifier, edit_only());
    h.store
        .insert_domain(NewDomain::static_entry("listed.example", "list", now_epoch()))
        .await
        .unwrap();

    let result = h
        .service
        .scan_domains(None, "https://Listed.example/a,phish.example,fine.example,https://")
        .await
        .unwrap();

    assert_eq!(result.len(), 4);
    assert_eq!(result.get_index(0), Some((&"https://Listed.example/a".to_string(), &true)));
    assert_eq!(result.get("phish.example"), Some(&true));
    assert_eq!(result.get("fine.example"), Some(&false));
    assert_eq!(result.get("https://"), Some(&false));
    assert_eq!(h.verifier.calls(), 2);

    let cached = h.store.find_domain("phish.example").await.unwrap().unwrap();
    assert_eq!(cached.origin, Origin::Verified);
    assert_eq!(cached.cache_ttl, 120);
    assert!(h.store.find_domain("fine.example").await.unwrap().is_none());

    let verified = h.service.list_verified_domains(None, Page::default()).await.unwrap();
    assert_eq!(verified.len(), 1);
}

/// A wallet counts once per contract; different wallets accumulate.
#[tokio::test]
async fn test_reports() {
    let h = harness(CountingVerifier::new(), edit_only());

    let first = h
        .service
        .report_contract(None, Network::Polygon, KNOWN_CONTRACT, WALLET_A)
        .await
        .unwrap();
    assert!(first.recorded);
    let again = h
        .service
        .report_contract(None, Network::Polygon, &KNOWN_CONTRACT.to_lowercase(), WALLET_A)
        .await
        .unwrap();
    assert!(!again.recorded);
    assert_eq!(again.reporters, 1);

    let second = h
        .service
        .report_contract(None, Network::Polygon, KNOWN_CONTRACT, WALLET_B)
        .await
        .unwrap();
    assert_eq!(second.reporters, 2);

    let reporters = h
        .service
        .contract_reporters(None, Network::Polygon, KNOWN_CONTRACT)
        .await
        .unwrap();
    assert_eq!(reporters, vec![WALLET_A.to_string(), WALLET_B.to_string()]);

    let reported = h.service.reported_contracts(None, Network::Polygon).await.unwrap();
    assert_eq!(reported.len(), 1);
    assert!(h
        .service
        .reported_contracts(None, Network::Ethereum)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_mutations_require_edit_key() {
    let h = harness(CountingVerifier::new(), edit_only());
    let create = DomainCreate {
        url: "manual.example".to_string(),
        source: "manual".to_string(),
        cache_ttl: None,
    };

    let denied = h.service.create_domain(None, create.clone()).await;
    assert!(matches!(denied, Err(BlocklistError::Unauthorized)));
    let denied = h.service.create_domain(Some("wrong"), create.clone()).await;
    assert!(matches!(denied, Err(BlocklistError::Unauthorized)));

    let row = h.service.create_domain(Some(EDIT), create.clone()).await.unwrap();
    assert_eq!(row.origin, Origin::Static);
    assert_eq!(row.source, "manual");

    let duplicate = h.service.create_domain(Some(EDIT), create).await;
    assert!(matches!(duplicate, Err(BlocklistError::DuplicateKey(_))));

    h.service.delete_domain(Some(EDIT), "manual.example").await.unwrap();
    let missing = h.service.delete_domain(Some(EDIT), "manual.example").await;
    assert!(matches!(missing, Err(BlocklistError::NotFound(_))));
}

/// Manual lifetimes are capped at the never-expires default, on create and on update.
#[tokio::test]
async fn test_manual_ttl_is_capped() {
    let h = harness(CountingVerifier::new(), edit_only());
    let create = DomainCreate {
        url: "long.example".to_string(),
        source: "manual".to_string(),
        cache_ttl: Some(i64::MAX),
    };
    let row = h.service.create_domain(Some(EDIT), create).await.unwrap();
    assert_eq!(row.cache_ttl, DEFAULT_CACHE_TTL_SECONDS);

    let patch = DomainPatch {
        source: None,
        cache_ttl: Some(-5),
    };
    let row = h
        .service
        .update_domain(Some(EDIT), "long.example", patch)
        .await
        .unwrap();
    assert_eq!(row.cache_ttl, 0);
}

#[tokio::test]
async fn test_view_keys_close_reads() {
    let keys = ApiKeys::new(vec![VIEW.to_string()], vec![EDIT.to_string()]);
    let h = harness(CountingVerifier::new(), keys);

    let denied = h.service.list_domains(None, &DomainFilter::default(), Page::default()).await;
    assert!(matches!(denied, Err(BlocklistError::Unauthorized)));
    assert!(h
        .service
        .list_domains(Some(VIEW), &DomainFilter::default(), Page::default())
        .await
        .is_ok());
    assert!(h
        .service
        .scan_contracts(Some(EDIT), Network::Ethereum, KNOWN_CONTRACT)
        .await
        .is_ok());

    let report = h
        .service
        .report_contract(None, Network::Ethereum, KNOWN_CONTRACT, WALLET_A)
        .await;
    assert!(matches!(report, Err(BlocklistError::Unauthorized)));
}

/// Deleted contracts disappear from reads and scans, and a create brings them back.
#[tokio::test]
async fn test_contract_delete_and_restore() {
    let h = harness(CountingVerifier::new(), edit_only());
    let create = ContractCreate {
        network: Network::Bsc,
        address: KNOWN_CONTRACT.to_lowercase(),
        source: "manual".to_string(),
    };
    let row = h.service.create_contract(Some(EDIT), create.clone()).await.unwrap();
    assert_eq!(row.address, KNOWN_CONTRACT);

    let duplicate = h.service.create_contract(Some(EDIT), create.clone()).await;
    assert!(matches!(duplicate, Err(BlocklistError::DuplicateKey(_))));

    h.service
        .delete_contract(Some(EDIT), Network::Bsc, KNOWN_CONTRACT)
        .await
        .unwrap();
    let gone = h.service.get_contract(None, Network::Bsc, KNOWN_CONTRACT).await;
    assert!(matches!(gone, Err(BlocklistError::NotFound(_))));
    let scan = h
        .service
        .scan_contracts(None, Network::Bsc, KNOWN_CONTRACT)
        .await
        .unwrap();
    assert_eq!(scan.get(KNOWN_CONTRACT), Some(&false));

    let restored = h.service.create_contract(Some(EDIT), create).await.unwrap();
    assert!(!restored.deleted);
    assert!(h
        .service
        .get_contract(None, Network::Bsc, KNOWN_CONTRACT)
        .await
        .is_ok());
    assert_eq!(h.store.contract_count(Network::Bsc), 1);
}

#[tokio::test]
async fn test_scan_wallet_without_scanner() {
    let h = harness(CountingVerifier::new(), edit_only());
    let result = h.service.scan_wallet(None, Network::Ethereum, WALLET_A).await;
    assert!(matches!(result, Err(BlocklistError::SourceUnavailable { .. })));
}
