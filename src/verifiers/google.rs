// Google Safe Browsing v4 `threatMatches:find` as a domain verifier.

use super::{Throttle, Verdict, VerifySource};
use crate::errors::{BlocklistError, Result};
use crate::metrics;
use crate::settings::VerifierApi;
use async_trait::async_trait;
use log::{debug, warn};
use serde_json::{json, Value};

pub const DEFAULT_BASE_URL: &str = "https://safebrowsing.googleapis.com/v4/threatMatches:find";
const CLIENT_ID: &str = "no_phish_nft";
const CLIENT_VERSION: &str = "0.0.1";
const ID: &str = "google";

#[derive(Debug, Clone)]
pub struct GoogleSafeBrowsing {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    throttle: Throttle,
}

impl GoogleSafeBrowsing {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            throttle: Throttle::default(),
        }
    }

    /// `None` when no API key is configured.
    pub fn from_settings(cfg: &VerifierApi, client: reqwest::Client) -> Option<Self> {
        let key = cfg.enabled_key()?;
        let mut verifier = Self::new(client, key);
        if let Some(base) = &cfg.base_url {
            verifier.base_url = base.clone();
        }
        verifier.throttle = Throttle::per_second(cfg.qps_limit);
        Some(verifier)
    }

    fn request_body(target: &str) -> Value {
        json!({
            "client": { "clientId": CLIENT_ID, "clientVersion": CLIENT_VERSION },
            "threatInfo": {
                "threatTypes": [
                    "MALWARE",
                    "SOCIAL_ENGINEERING",
                    "THREAT_TYPE_UNSPECIFIED",
                    "UNWANTED_SOFTWARE",
                    "POTENTIALLY_HARMFUL_APPLICATION"
                ],
                "platformTypes": ["ANY_PLATFORM"],
                "threatEntryTypes": ["URL", "THREAT_ENTRY_TYPE_UNSPECIFIED", "EXECUTABLE"],
                "threatEntries": [{ "url": target }]
            }
        })
    }
}

/// Reads a `threatMatches:find` response. An `error` object is a failed call, not
/// a clean answer.
pub fn verdict_from_response(body: &Value) -> Result<Verdict> {
    if let Some(error) = body.get("error") {
        return Err(BlocklistError::source_unavailable(ID, error));
    }
    let matches = match body.get("matches").and_then(Value::as_array) {
        Some(matches) if !matches.is_empty() => matches,
        _ => return Ok(Verdict::clean()),
    };
    let ttl = matches
        .iter()
        .filter_map(|m| m.get("cacheDuration").and_then(Value::as_str))
        .filter_map(parse_cache_duration)
        .min();
    Ok(Verdict::flagged(ttl, Value::Array(matches.clone())))
}

/// `"300s"` / `"300.5s"` -> 300.
pub fn parse_cache_duration(raw: &str) -> Option<i64> {
    let seconds: f64 = raw.trim().strip_suffix('s')?.parse().ok()?;
    (seconds.is_finite() && seconds >= 0.0).then(|| seconds.trunc() as i64)
}

#[async_trait]
impl VerifySource for GoogleSafeBrowsing {
    fn id(&self) -> &str {
        ID
    }

    async fn verify(&self, target: &str) -> Result<Verdict> {
        self.throttle.acquire().await;
        let result: Result<Verdict> = async {
            let response = self
                .client
                .post(&self.base_url)
                .query(&[("key", self.api_key.as_str())])
                .json(&Self::request_body(target))
                .send()
                .await?;
            let status = response.status();
            let body: Value = response.json().await.unwrap_or(Value::Null);
            if !status.is_success() {
                return Err(BlocklistError::source_unavailable(
                    ID,
                    format!("HTTP {}: {}", status, body),
                ));
            }
            verdict_from_response(&body)
        }
        .await;

        match &result {
            Ok(v) if v.flagged => {
                debug!("[Google] {} flagged ({} matches)", target, v.detail.as_array().map_or(0, Vec::len));
                metrics::increment_verifier_call(ID, "flagged");
            }
            Ok(_) => metrics::increment_verifier_call(ID, "clean"),
            Err(e) => {
                warn!("⚠️ [Google] lookup for {} failed: {}", target, e);
                metrics::increment_verifier_call(ID, "error");
            }
        }
        result
    }
}
