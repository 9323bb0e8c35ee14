use crate::errors::BlocklistError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Chains a blocked contract can live on.
///
/// Names are matched case-insensitively at the input boundary: the raw string is
/// lower-cased and then mapped, so `Polygon`, `POLYGON` and `polygon` are the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Avalanche,
    Bsc,
    Ethereum,
    Fantom,
    Polygon,
    Solana,
}

impl Network {
    pub const ALL: [Network; 6] = [
        Network::Avalanche,
        Network::Bsc,
        Network::Ethereum,
        Network::Fantom,
        Network::Polygon,
        Network::Solana,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Avalanche => "avalanche",
            Network::Bsc => "bsc",
            Network::Ethereum => "ethereum",
            Network::Fantom => "fantom",
            Network::Polygon => "polygon",
            Network::Solana => "solana",
        }
    }

    /// EVM chains use 20-byte hex addresses with EIP-55 checksum casing.
    pub fn is_evm(&self) -> bool {
        !matches!(self, Network::Solana)
    }

    /// Subdomain prefix used by Alchemy's NFT API (`eth-mainnet`, `polygon-mainnet`).
    pub fn alchemy_slug(&self) -> Option<&'static str> {
        match self {
            Network::Ethereum => Some("eth"),
            Network::Polygon => Some("polygon"),
            _ => None,
        }
    }

    /// Subdomain prefix used by MnemonicHQ's REST API.
    pub fn mnemonichq_slug(&self) -> Option<&'static str> {
        match self {
            Network::Ethereum => Some("ethereum"),
            Network::Polygon => Some("polygon"),
            _ => None,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = BlocklistError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "avalanche" => Ok(Network::Avalanche),
            "bsc" | "binance" => Ok(Network::Bsc),
            "ethereum" | "eth" => Ok(Network::Ethereum),
            "fantom" => Ok(Network::Fantom),
            "polygon" | "matic" => Ok(Network::Polygon),
            "solana" => Ok(Network::Solana),
            other => Err(BlocklistError::InvalidInput(format!(
                "network `{}` is invalid, use one of {}",
                other,
                Network::ALL
                    .iter()
                    .map(|n| n.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }
}
