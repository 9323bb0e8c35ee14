// MnemonicHQ wallet NFT scan. The API only answers per wallet, so every user scan
// doubles as a discovery pass: spam contracts it reports are written to the store.

use super::{Throttle, Verdict, VerifySource};
use crate::database::BlocklistStore;
use crate::errors::{BlocklistError, Result};
use crate::metrics;
use crate::models::{now_epoch, NewContract};
use crate::network::Network;
use crate::normalization::normalize_address;
use crate::settings::VerifierApi;
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

const ID: &str = "mnemonichq";

/// Result of scanning one wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletScan {
    pub network: Network,
    pub address: String,
    /// Contracts of spam NFTs held by the wallet, deduplicated, in response order.
    pub spam_contracts: Vec<String>,
    /// The subset that was not in the store before this scan.
    pub newly_recorded: Vec<String>,
}

impl WalletScan {
    pub fn summary(&self) -> String {
        format!("{} NFTs flagged as spam", self.spam_contracts.len())
    }
}

#[derive(Debug, Deserialize)]
struct NftsResponse {
    #[serde(default)]
    nfts: Vec<OwnedNft>,
}

#[derive(Debug, Deserialize)]
struct OwnedNft {
    #[serde(default)]
    spam: bool,
    #[serde(default)]
    nft: Option<NftRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NftRef {
    #[serde(default)]
    contract_address: Option<String>,
}

/// Spam contract addresses in a `wallets/v1beta2/{address}/nfts` response.
/// A body without `nfts` yields nothing; a body that is not an object is an error.
pub fn spam_contracts_from_response(body: &Value) -> Result<Vec<String>> {
    if !body.is_object() {
        return Err(BlocklistError::source_unavailable(
            ID,
            format!("unexpected response {}", body),
        ));
    }
    let parsed: NftsResponse = serde_json::from_value(body.clone())?;
    let mut out: Vec<String> = Vec::new();
    for owned in parsed.nfts.into_iter().filter(|n| n.spam) {
        if let Some(address) = owned.nft.and_then(|n| n.contract_address) {
            if !out.contains(&address) {
                out.push(address);
            }
        }
    }
    Ok(out)
}

pub struct MnemonicHqWalletScan {
    client: reqwest::Client,
    api_key: String,
    /// Overrides `https://{network}-rest.api.mnemonichq.com`.
    base_url: Option<String>,
    throttle: Throttle,
    store: Arc<dyn BlocklistStore>,
}

impl MnemonicHqWalletScan {
    pub fn new(
        client: reqwest::Client,
        api_key: impl Into<String>,
        store: Arc<dyn BlocklistStore>,
    ) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: None,
            throttle: Throttle::default(),
            store,
        }
    }

    pub fn from_settings(
        cfg: &VerifierApi,
        client: reqwest::Client,
        store: Arc<dyn BlocklistStore>,
    ) -> Option<Self> {
        let key = cfg.enabled_key()?;
        let mut scanner = Self::new(client, key, store);
        scanner.base_url = cfg.base_url.clone();
        scanner.throttle = Throttle::per_second(cfg.qps_limit);
        Some(scanner)
    }

    pub fn endpoint(&self, network: Network, wallet: &str) -> Result<String> {
        let slug = network.mnemonichq_slug().ok_or_else(|| {
            BlocklistError::InvalidInput(format!("wallet scans are not available on {}", network))
        })?;
        let base = match &self.base_url {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => format!("https://{}-rest.api.mnemonichq.com", slug),
        };
        Ok(format!(
            "{}/wallets/v1beta2/{}/nfts?spam=SPAM_FILTER_ONLY",
            base, wallet
        ))
    }

    /// Scans `wallet` and records every reported spam contract not already stored
    /// (soft-deleted rows count as stored).
    pub async fn scan(&self, network: Network, wallet: &str) -> Result<WalletScan> {
        let wallet = normalize_address(wallet, network)?;
        let url = self.endpoint(network, &wallet)?;

        self.throttle.acquire().await;
        let body = match self.request(&url).await {
            Ok(body) => body,
            Err(e) => {
                warn!("⚠️ [MnemonicHq] scan of {} on {} failed: {}", wallet, network, e);
                metrics::increment_verifier_call(ID, "error");
                return Err(e);
            }
        };

        let mut spam_contracts = Vec::new();
        for raw in spam_contracts_from_response(&body)? {
            match normalize_address(&raw, network) {
                Ok(address) if !spam_contracts.contains(&address) => spam_contracts.push(address),
                Ok(_) => {}
                Err(e) => debug!("[MnemonicHq] ignoring contract {}: {}", raw, e),
            }
        }

        let mut newly_recorded = Vec::new();
        for address in &spam_contracts {
            info!("[MnemonicHq] {} on {} is spam", address, network);
            if self.record(network, address).await? {
                newly_recorded.push(address.clone());
            }
        }

        metrics::increment_verifier_call(
            ID,
            if spam_contracts.is_empty() { "clean" } else { "flagged" },
        );
        if !newly_recorded.is_empty() {
            metrics::increment_added(ID, newly_recorded.len() as u64);
        }

        Ok(WalletScan {
            network,
            address: wallet,
            spam_contracts,
            newly_recorded,
        })
    }

    async fn request(&self, url: &str) -> Result<Value> {
        let response = self
            .client
            .get(url)
            .header("X-API-Key", &self.api_key)
            .header("accept", "application/json")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BlocklistError::source_unavailable(
                ID,
                format!("HTTP {}", status),
            ));
        }
        Ok(response.json().await?)
    }

    /// True when the contract was inserted by this call.
    async fn record(&self, network: Network, address: &str) -> Result<bool> {
        if self.store.find_contract(network, address).await?.is_some() {
            return Ok(false);
        }
        let insert = self
            .store
            .insert_contract(NewContract {
                network,
                address: address.to_string(),
                source: ID.to_string(),
                updated: now_epoch(),
            })
            .await;
        match insert {
            Ok(_) => Ok(true),
            Err(e) if e.is_duplicate() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Parses a verify target: `<network>:<wallet>`, or a bare wallet on ethereum.
fn parse_target(target: &str) -> Result<(Network, &str)> {
    match target.split_once(':') {
        Some((network, wallet)) => Ok((network.parse()?, wallet)),
        None => Ok((Network::Ethereum, target)),
    }
}

#[async_trait]
impl VerifySource for MnemonicHqWalletScan {
    fn id(&self) -> &str {
        ID
    }

    async fn verify(&self, target: &str) -> Result<Verdict> {
        let (network, wallet) = parse_target(target)?;
        let scan = self.scan(network, wallet).await?;
        if scan.spam_contracts.is_empty() {
            return Ok(Verdict::clean());
        }
        Ok(Verdict::flagged(None, serde_json::to_value(&scan)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;
    use serde_json::json;

    #[test]
    fn test_spam_contracts_from_response() {
        let body = json!({
            "nfts": [
                { "spam": true, "nft": { "contractAddress": "0xaaa" } },
                { "spam": false, "nft": { "contractAddress": "0xbbb" } },
                { "spam": true, "nft": { "contractAddress": "0xaaa" } },
                { "spam": true },
                { "nft": { "contractAddress": "0xccc" } }
            ]
        });
        assert_eq!(spam_contracts_from_response(&body).unwrap(), vec!["0xaaa"]);
        assert!(spam_contracts_from_response(&json!({})).unwrap().is_empty());
        assert!(spam_contracts_from_response(&json!([1, 2])).is_err());
    }

    #[test]
    fn test_endpoint_and_targets() {
        let scanner = MnemonicHqWalletScan::new(
            reqwest::Client::new(),
            "KEY",
            Arc::new(MemoryStore::new()),
        );
        assert_eq!(
            scanner.endpoint(Network::Polygon, "0xW").unwrap(),
            "https://polygon-rest.api.mnemonichq.com/wallets/v1beta2/0xW/nfts?spam=SPAM_FILTER_ONLY"
        );
        assert!(scanner.endpoint(Network::Solana, "x").is_err());

        assert_eq!(parse_target("matic:0xW").unwrap(), (Network::Polygon, "0xW"));
        assert_eq!(parse_target("0xW").unwrap(), (Network::Ethereum, "0xW"));
        assert!(parse_target("dogecoin:0xW").is_err());
    }

    #[tokio::test]
    async fn test_record_skips_known_and_deleted() {
        let store = Arc::new(MemoryStore::new());
        let scanner = MnemonicHqWalletScan::new(reqwest::Client::new(), "KEY", store.clone());
        let address = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

        assert!(scanner.record(Network::Ethereum, address).await.unwrap());
        assert!(!scanner.record(Network::Ethereum, address).await.unwrap());
        let row = store.find_contract(Network::Ethereum, address).await.unwrap().unwrap();
        assert_eq!(row.source, "mnemonichq");

        store.delete_contract(Network::Ethereum, address, now_epoch()).await.unwrap();
        assert!(!scanner.record(Network::Ethereum, address).await.unwrap());
        assert_eq!(store.contract_count(Network::Ethereum), 0);
    }
}
