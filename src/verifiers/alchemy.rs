// Alchemy NFT API `getSpamContracts`: the provider's whole spam-contract list for
// one network, consumed by the reconciler as a bulk source.

use super::Throttle;
use crate::errors::{BlocklistError, Result};
use crate::known_set::Category;
use crate::metrics;
use crate::network::Network;
use crate::settings::VerifierApi;
use crate::sources::BulkSource;
use async_trait::async_trait;
use log::info;
use serde_json::Value;

const ID: &str = "alchemy";

#[derive(Debug, Clone)]
pub struct AlchemySpamContracts {
    client: reqwest::Client,
    api_key: String,
    network: Network,
    /// Overrides `https://{slug}-mainnet.g.alchemy.com`.
    base_url: Option<String>,
    throttle: Throttle,
}

impl AlchemySpamContracts {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>, network: Network) -> Result<Self> {
        if network.alchemy_slug().is_none() {
            return Err(BlocklistError::InvalidInput(format!(
                "Alchemy spam contracts are not available on {}",
                network
            )));
        }
        Ok(Self {
            client,
            api_key: api_key.into(),
            network,
            base_url: None,
            throttle: Throttle::default(),
        })
    }

    /// One source per supported network listed in the config. Empty without a key.
    pub fn from_settings(cfg: &VerifierApi, client: &reqwest::Client) -> Vec<Self> {
        let Some(key) = cfg.enabled_key() else {
            return Vec::new();
        };
        let networks = if cfg.networks.is_empty() {
            vec![Network::Ethereum, Network::Polygon]
        } else {
            cfg.networks.clone()
        };
        let throttle = Throttle::per_second(cfg.qps_limit);
        networks
            .into_iter()
            .filter_map(|network| {
                let mut source = Self::new(client.clone(), key, network).ok()?;
                source.base_url = cfg.base_url.clone();
                source.throttle = throttle.clone();
                Some(source)
            })
            .collect()
    }

    pub fn endpoint(&self) -> String {
        let base = match &self.base_url {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => format!(
                "https://{}-mainnet.g.alchemy.com",
                self.network.alchemy_slug().unwrap_or_default()
            ),
        };
        format!("{}/nft/v2/{}/getSpamContracts", base, self.api_key)
    }
}

/// Accepts a bare array of addresses or `{"contractAddresses": [...]}`.
pub fn addresses_from_response(body: &Value) -> Result<Vec<String>> {
    let list = match body {
        Value::Array(items) => items,
        Value::Object(map) => map
            .get("contractAddresses")
            .and_then(Value::as_array)
            .ok_or_else(|| BlocklistError::source_unavailable(ID, format!("unexpected response {}", body)))?,
        other => {
            return Err(BlocklistError::source_unavailable(
                ID,
                format!("unexpected response {}", other),
            ))
        }
    };
    Ok(list
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect())
}

#[async_trait]
impl BulkSource for AlchemySpamContracts {
    fn id(&self) -> &str {
        ID
    }

    fn category(&self) -> Category {
        Category::Contracts(self.network)
    }

    async fn fetch(&self) -> Result<Vec<String>> {
        self.throttle.acquire().await;
        let response = self
            .client
            .get(self.endpoint())
            .header("accept", "application/json")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            metrics::increment_verifier_call(ID, "error");
            return Err(BlocklistError::source_unavailable(
                ID,
                format!("HTTP {} for {}", status, self.network),
            ));
        }
        let body: Value = response.json().await?;
        let addresses = addresses_from_response(&body)?;
        metrics::increment_verifier_call(ID, "ok");
        info!(
            "[Alchemy] {} spam contracts listed on {}",
            addresses.len(),
            self.network
        );
        Ok(addresses)
    }
}
