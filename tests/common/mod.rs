//! Fakes shared by the integration tests. No network access.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use spam_blocklist::known_set::Category;
use spam_blocklist::sources::BulkSource;
use spam_blocklist::verifiers::{Verdict, VerifySource};
use spam_blocklist::{BlocklistError, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub const KNOWN_CONTRACT: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";
pub const UNKNOWN_CONTRACT: &str = "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359";
pub const WALLET_A: &str = "0xdbF03B407c01E7cD3CBea99509d93f8DDDC8C6FB";
pub const WALLET_B: &str = "0xD1220A0cf47c7B9Be7A2E6BA89F429762e7b9aDb";

/// Returns a fixed candidate list.
pub struct StaticSource {
    pub id: &'static str,
    pub category: Category,
    pub candidates: Vec<String>,
}

impl StaticSource {
    pub fn new<I, S>(id: &'static str, category: Category, candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id,
            category,
            candidates: candidates.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl BulkSource for StaticSource {
    fn id(&self) -> &str {
        self.id
    }

    fn category(&self) -> Category {
        self.category
    }

    async fn fetch(&self) -> Result<Vec<String>> {
        Ok(self.candidates.clone())
    }
}

/// Never answers within any reasonable timeout.
pub struct HangingSource {
    pub id: &'static str,
    pub category: Category,
}

#[async_trait]
impl BulkSource for HangingSource {
    fn id(&self) -> &str {
        self.id
    }

    fn category(&self) -> Category {
        self.category
    }

    async fn fetch(&self) -> Result<Vec<String>> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(vec!["late.example".to_string()])
    }
}

/// Scripted verifier that counts its calls. Targets without a script fail.
#[derive(Default)]
pub struct CountingVerifier {
    verdicts: HashMap<String, Verdict>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl CountingVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flag(mut self, target: &str, ttl_seconds: Option<i64>) -> Self {
        self.verdicts.insert(
            target.to_string(),
            Verdict::flagged(ttl_seconds, json!([{ "threatType": "SOCIAL_ENGINEERING" }])),
        );
        self
    }

    pub fn clear(mut self, target: &str) -> Self {
        self.verdicts.insert(target.to_string(), Verdict::clean());
        self
    }

    /// Holds every answer back, so concurrent lookups of one key overlap.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VerifySource for CountingVerifier {
    fn id(&self) -> &str {
        "counting"
    }

    async fn verify(&self, target: &str) -> Result<Verdict> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.verdicts
            .get(target)
            .cloned()
            .ok_or_else(|| BlocklistError::source_unavailable("counting", "HTTP 503"))
    }
}
