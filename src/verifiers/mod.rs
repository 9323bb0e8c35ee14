//! Third-party APIs: on-demand verifiers and API-backed bulk feeds.
//!
//! - [`google::GoogleSafeBrowsing`]: domain verifier.
//! - [`mnemonichq::MnemonicHqWalletScan`]: wallet verifier that also records the
//!   spam contracts it discovers.
//! - [`alchemy::AlchemySpamContracts`]: bulk contract feed, fed to the reconciler
//!   like any list.

pub mod alchemy;
pub mod google;
pub mod mnemonichq;
pub mod throttle;

pub use alchemy::AlchemySpamContracts;
pub use google::GoogleSafeBrowsing;
pub use mnemonichq::MnemonicHqWalletScan;
pub use throttle::Throttle;

use crate::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of asking a verifier about one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub flagged: bool,
    /// How long a positive verdict may be cached; `None` means the configured default.
    #[serde(default)]
    pub ttl_seconds: Option<i64>,
    /// Provider payload, kept opaque.
    #[serde(default)]
    pub detail: Value,
}

impl Verdict {
    pub fn clean() -> Self {
        Self {
            flagged: false,
            ttl_seconds: None,
            detail: Value::Null,
        }
    }

    pub fn flagged(ttl_seconds: Option<i64>, detail: Value) -> Self {
        Self {
            flagged: true,
            ttl_seconds,
            detail,
        }
    }
}

#[async_trait]
pub trait VerifySource: Send + Sync {
    fn id(&self) -> &str;
    /// An `Err` means "no verdict"; it must never be read as clean.
    async fn verify(&self, target: &str) -> Result<Verdict>;
}
