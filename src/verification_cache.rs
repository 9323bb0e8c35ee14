//! Read-through cache in front of the domain verifier.
//!
//! A lookup answers from the store when it can. On a miss it asks the verifier
//! and persists positive verdicts as `origin = verified` rows with the lifetime
//! the verifier gave (or the configured default). Negative verdicts and failed
//! calls are never persisted. Expiry is enforced only by [`VerificationCache::purge_expired`].

use crate::database::BlocklistStore;
use crate::errors::{BlocklistError, Result};
use crate::metrics;
use crate::models::{clamp_cache_ttl, now_epoch, DomainPredicate, NewDomain, Origin};
use crate::normalization::normalize_domain;
use crate::verifiers::VerifySource;
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupState {
    /// Already in the store (static list entry or an earlier verified row).
    KnownBad,
    /// Flagged by the verifier just now and written to the store.
    Verified,
    /// The verifier answered and did not flag it.
    Clean,
    /// No verdict: no verifier configured, or the call failed.
    Unverified,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Lookup {
    pub key: String,
    pub flagged: bool,
    pub state: LookupState,
}

impl Lookup {
    fn new(key: String, state: LookupState) -> Self {
        let flagged = matches!(state, LookupState::KnownBad | LookupState::Verified);
        Self { key, flagged, state }
    }
}

pub struct VerificationCache {
    store: Arc<dyn BlocklistStore>,
    verifier: Option<Arc<dyn VerifySource>>,
    default_ttl: i64,
}

impl VerificationCache {
    pub fn new(
        store: Arc<dyn BlocklistStore>,
        verifier: Option<Arc<dyn VerifySource>>,
        default_ttl: i64,
    ) -> Self {
        if verifier.is_none() {
            warn!("⚠️ [VerifyCache] No domain verifier configured; misses stay unverified");
        }
        Self {
            store,
            verifier,
            default_ttl: clamp_cache_ttl(default_ttl),
        }
    }

    pub fn has_verifier(&self) -> bool {
        self.verifier.is_some()
    }

    pub async fn lookup_domain(&self, raw: &str) -> Result<Lookup> {
        self.lookup_domain_at(raw, now_epoch()).await
    }

    pub async fn lookup_domain_at(&self, raw: &str, now: i64) -> Result<Lookup> {
        let key = normalize_domain(raw);
        if key.is_empty() {
            return Err(BlocklistError::InvalidInput(format!(
                "`{}` is not a domain",
                raw.trim()
            )));
        }

        if self.store.find_domain(&key).await?.is_some() {
            metrics::increment_cache_hit("domain");
            return Ok(Lookup::new(key, LookupState::KnownBad));
        }
        metrics::increment_cache_miss("domain");
        self.verify_miss(key, now).await
    }

    /// Asks the verifier about a key known to be absent from the store.
    pub(crate) async fn verify_miss(&self, key: String, now: i64) -> Result<Lookup> {
        let Some(verifier) = &self.verifier else {
            return Ok(Lookup::new(key, LookupState::Unverified));
        };

        let verdict = match verifier.verify(&key).await {
            Ok(verdict) => verdict,
            Err(e) => {
                debug!("[VerifyCache] {} unverified: {}", key, e);
                return Ok(Lookup::new(key, LookupState::Unverified));
            }
        };
        if !verdict.flagged {
            return Ok(Lookup::new(key, LookupState::Clean));
        }

        let cache_ttl = verdict.ttl_seconds.map_or(self.default_ttl, clamp_cache_ttl);
        let row = NewDomain {
            url: key.clone(),
            source: verifier.id().to_string(),
            cache_ttl,
            last_updated: now,
            origin: Origin::Verified,
        };
        match self.store.insert_domain(row).await {
            Ok(_) => info!(
                "[VerifyCache] {} flagged by {}, cached for {}s",
                key,
                verifier.id(),
                cache_ttl
            ),
            Err(e) if e.is_duplicate() => {
                debug!("[VerifyCache] {} recorded concurrently", key)
            }
            Err(e) => warn!("⚠️ [VerifyCache] Could not cache verdict for {}: {}", key, e),
        }
        Ok(Lookup::new(key, LookupState::Verified))
    }

    pub async fn purge_expired(&self) -> Result<u64> {
        self.purge_expired_at(now_epoch()).await
    }

    /// Deletes verified rows whose `last_updated + cache_ttl` is before `now`.
    /// Static rows are never touched.
    pub async fn purge_expired_at(&self, now: i64) -> Result<u64> {
        let purged = self
            .store
            .delete_domains_where(DomainPredicate::ExpiredVerified { now })
            .await?;
        metrics::increment_purged(purged);
        if purged > 0 {
            info!("🧹 [VerifyCache] Purged {} expired verified domains", purged);
        } else {
            debug!("[VerifyCache] Nothing to purge");
        }
        Ok(purged)
    }
}
