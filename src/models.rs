//! Records held by the blocklist store and the inputs used to create or patch them.

use crate::network::Network;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Cache lifetime given to rows that should never expire (static list entries,
/// verified rows whose source gave no lifetime).
pub const DEFAULT_CACHE_TTL_SECONDS: i64 = 2_000_000_000;

/// Bounds a cache lifetime to `0..=DEFAULT_CACHE_TTL_SECONDS` so that
/// `last_updated + cache_ttl` stays inside a BIGINT.
pub fn clamp_cache_ttl(ttl: i64) -> i64 {
    ttl.clamp(0, DEFAULT_CACHE_TTL_SECONDS)
}

pub const DEFAULT_PAGE_LIMIT: i64 = 10;
pub const MAX_PAGE_LIMIT: i64 = 100;

/// Provenance of a domain row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Bulk-ingested from a list, or added by hand. Never expires.
    Static,
    /// Written by the read-through cache after a positive verdict. Purged on expiry.
    Verified,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Static => "static",
            Origin::Verified => "verified",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Origin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "static" => Ok(Origin::Static),
            "verified" => Ok(Origin::Verified),
            other => Err(format!("unknown origin `{}`", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedDomain {
    pub id: Uuid,
    /// Normalized hostname, unique.
    pub url: String,
    pub source: String,
    pub cache_ttl: i64,
    /// Epoch seconds.
    pub last_updated: i64,
    pub origin: Origin,
    pub created_at: DateTime<Utc>,
}

impl BlockedDomain {
    /// Epoch second after which a verified row becomes eligible for purge.
    pub fn expires_at(&self) -> i64 {
        self.last_updated.saturating_add(self.cache_ttl)
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.origin == Origin::Verified && self.expires_at() < now
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDomain {
    pub url: String,
    pub source: String,
    pub cache_ttl: i64,
    pub last_updated: i64,
    pub origin: Origin,
}

impl NewDomain {
    /// A never-expiring row coming from a list or a manual create.
    pub fn static_entry(url: impl Into<String>, source: impl Into<String>, now: i64) -> Self {
        Self {
            url: url.into(),
            source: source.into(),
            cache_ttl: DEFAULT_CACHE_TTL_SECONDS,
            last_updated: now,
            origin: Origin::Static,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainPatch {
    pub source: Option<String>,
    pub cache_ttl: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedContract {
    pub id: Uuid,
    pub network: Network,
    /// Canonical address for `network`, unique per network.
    pub address: String,
    pub source: String,
    pub created_at: DateTime<Utc>,
    /// Epoch seconds.
    pub updated: i64,
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContract {
    pub network: Network,
    pub address: String,
    pub source: String,
    pub updated: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractPatch {
    pub source: Option<String>,
    pub network: Option<Network>,
}

/// Offset pagination, most recently updated first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    /// Clamps `limit` to `1..=100` and `offset` to non-negative values.
    pub fn new(limit: i64, offset: i64) -> Self {
        Self {
            limit: limit.clamp(1, MAX_PAGE_LIMIT),
            offset: offset.max(0),
        }
    }

    /// Effectively unbounded, for exports.
    pub fn all() -> Self {
        Self {
            limit: i64::MAX,
            offset: 0,
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_LIMIT, 0)
    }
}

/// Filter for listing domains.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainFilter {
    pub origin: Option<Origin>,
    pub source: Option<String>,
}

impl DomainFilter {
    pub fn matches(&self, domain: &BlockedDomain) -> bool {
        self.origin.map_or(true, |o| o == domain.origin)
            && self.source.as_ref().map_or(true, |s| s == &domain.source)
    }
}

/// Predicate for bulk domain deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainPredicate {
    Url(String),
    Source(String),
    /// `origin = verified AND last_updated + cache_ttl < now`
    ExpiredVerified { now: i64 },
}

impl DomainPredicate {
    pub fn matches(&self, domain: &BlockedDomain) -> bool {
        match self {
            DomainPredicate::Url(url) => &domain.url == url,
            DomainPredicate::Source(source) => &domain.source == source,
            DomainPredicate::ExpiredVerified { now } => domain.is_expired(*now),
        }
    }
}

/// Seconds since the Unix epoch.
pub fn now_epoch() -> i64 {
    Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domain(origin: Origin, last_updated: i64, cache_ttl: i64) -> BlockedDomain {
        BlockedDomain {
            id: Uuid::new_v4(),
            url: "evil.example".into(),
            source: "google".into(),
            cache_ttl,
            last_updated,
            origin,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_expiry_only_applies_to_verified_rows() {
        let verified = domain(Origin::Verified, 1_000, 300);
        assert!(!verified.is_expired(1_299));
        assert!(!verified.is_expired(1_300));
        assert!(verified.is_expired(1_301));

        let stat = domain(Origin::Static, 0, 1);
        assert!(!stat.is_expired(i64::MAX));
    }

    #[test]
    fn test_expires_at_saturates() {
        let d = domain(Origin::Verified, i64::MAX - 5, DEFAULT_CACHE_TTL_SECONDS);
        assert_eq!(d.expires_at(), i64::MAX);
    }

    #[test]
    fn test_page_clamping() {
        assert_eq!(Page::new(500, -3), Page { limit: 100, offset: 0 });
        assert_eq!(Page::new(0, 7), Page { limit: 1, offset: 7 });
        assert_eq!(Page::default().limit, DEFAULT_PAGE_LIMIT);
    }

    #[test]
    fn test_predicates() {
        let d = domain(Origin::Verified, 10, 5);
        assert!(DomainPredicate::Url("evil.example".into()).matches(&d));
        assert!(DomainPredicate::Source("google".into()).matches(&d));
        assert!(!DomainPredicate::ExpiredVerified { now: 15 }.matches(&d));
        assert!(DomainPredicate::ExpiredVerified { now: 16 }.matches(&d));

        let filter = DomainFilter {
            origin: Some(Origin::Static),
            source: None,
        };
        assert!(!filter.matches(&d));
        assert!(DomainFilter::default().matches(&d));
    }
}
