//! Persistence gateway: the [`BlocklistStore`] contract and its PostgreSQL implementation.
//!
//! The store enforces the two uniqueness rules the rest of the crate relies on:
//! one row per normalized hostname in `domains`, one row per `(network, address)`
//! in `contracts`. Inserts that would break them fail with
//! [`BlocklistError::DuplicateKey`]; callers treat that as "already known".

use crate::errors::{classify_db_error, BlocklistError, Result};
use crate::models::{
    BlockedContract, BlockedDomain, ContractPatch, DomainFilter, DomainPatch, DomainPredicate,
    NewContract, NewDomain, Origin, Page,
};
use crate::network::Network;
use crate::settings;
use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Connection, Pool, Postgres, Row};
use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// PostgreSQL connection pool type alias.
pub type DbPool = Pool<Postgres>;

/// Database schema name
pub const SCHEMA: &str = "blocklist";

/// Keyed record store backing the blocklist.
///
/// List operations return rows most recently updated first. Soft-deleted contracts
/// are hidden from `list_contracts` and `matching_contracts`, but still returned by
/// `find_contract` and `contract_keys` so that bulk ingestion never resurrects a
/// contract removed by hand.
#[async_trait]
pub trait BlocklistStore: Send + Sync {
    async fn insert_domain(&self, domain: NewDomain) -> Result<BlockedDomain>;
    async fn find_domain(&self, url: &str) -> Result<Option<BlockedDomain>>;
    async fn list_domains(&self, filter: &DomainFilter, page: Page) -> Result<Vec<BlockedDomain>>;
    async fn update_domain(&self, url: &str, patch: DomainPatch, now: i64) -> Result<BlockedDomain>;
    async fn delete_domains_where(&self, predicate: DomainPredicate) -> Result<u64>;
    /// Every stored hostname, for the known-set index.
    async fn domain_keys(&self) -> Result<HashSet<String>>;
    /// The subset of `candidates` already stored, in one round trip.
    async fn matching_domains(&self, candidates: &[String]) -> Result<HashSet<String>>;

    async fn insert_contract(&self, contract: NewContract) -> Result<BlockedContract>;
    async fn find_contract(&self, network: Network, address: &str) -> Result<Option<BlockedContract>>;
    async fn list_contracts(&self, network: Network, page: Page) -> Result<Vec<BlockedContract>>;
    async fn update_contract(
        &self,
        network: Network,
        address: &str,
        patch: ContractPatch,
        now: i64,
    ) -> Result<BlockedContract>;
    /// Soft delete. `NotFound` when no active row matches.
    async fn delete_contract(&self, network: Network, address: &str, now: i64) -> Result<()>;
    /// Clears the deleted flag of a soft-deleted row.
    async fn restore_contract(
        &self,
        network: Network,
        address: &str,
        source: &str,
        now: i64,
    ) -> Result<BlockedContract>;
    async fn contract_keys(&self, network: Network) -> Result<HashSet<String>>;
    async fn matching_contracts(
        &self,
        network: Network,
        candidates: &[String],
    ) -> Result<HashSet<String>>;
}

/// Opens the pool and makes sure the schema exists.
///
/// Retries with exponential backoff so the job survives a database that is still
/// starting (compose, k8s).
pub async fn connect(cfg: &settings::Database) -> anyhow::Result<DbPool> {
    if cfg.url.trim().is_empty() {
        anyhow::bail!("database url is not configured (set DATABASE_URL)");
    }

    let mut last_err: Option<anyhow::Error> = None;
    let max_attempts = cfg.connect_attempts.max(1);
    for attempt in 1..=max_attempts {
        match PgPoolOptions::new()
            .max_connections(cfg.max_connections)
            .acquire_timeout(Duration::from_secs(cfg.acquire_timeout_seconds))
            .connect(&cfg.url)
            .await
        {
            Ok(pool) => {
                log::info!(
                    "✅ Connected to database (attempt {}/{}).",
                    attempt,
                    max_attempts
                );
                match initialize_database(&pool).await {
                    Ok(()) => return Ok(pool),
                    Err(e) => last_err = Some(e),
                }
            }
            Err(e) => {
                last_err = Some(e.into());
            }
        }
        if attempt == max_attempts {
            break;
        }
        let delay_ms = (1u64 << attempt.min(6)) * 200;
        log::warn!(
            "DB connect/init attempt {}/{} failed. Retrying in {} ms...",
            attempt,
            max_attempts,
            delay_ms
        );
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }
    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Unknown DB connection error")))
}

/// Idempotent schema creation, serialized across instances by an advisory lock.
pub async fn initialize_database(pool: &DbPool) -> anyhow::Result<()> {
    const MIGRATION_LOCK_ID: i64 = 0x424C4F434B4C5354; // "BLOCKLST"

    let mut conn = pool.acquire().await?;
    let mut tx = conn.begin().await?;

    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(MIGRATION_LOCK_ID)
        .execute(tx.as_mut())
        .await?;
    log::debug!("Database migration lock acquired.");

    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", SCHEMA))
        .execute(tx.as_mut())
        .await?;

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {}.domains (
            id UUID PRIMARY KEY,
            url TEXT NOT NULL,
            source TEXT NOT NULL,
            cache BIGINT NOT NULL DEFAULT 2000000000,
            updated BIGINT NOT NULL,
            origin VARCHAR(16) NOT NULL DEFAULT 'static',
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            CONSTRAINT domains_url_key UNIQUE (url)
        )",
        SCHEMA
    ))
    .execute(tx.as_mut())
    .await?;

    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS idx_domains_updated ON {}.domains (updated DESC)",
        SCHEMA
    ))
    .execute(tx.as_mut())
    .await?;

    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS idx_domains_verified_expiry ON {}.domains ((updated + cache)) WHERE origin = 'verified'",
        SCHEMA
    ))
    .execute(tx.as_mut())
    .await?;

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {}.contracts (
            id UUID PRIMARY KEY,
            network VARCHAR(16) NOT NULL,
            address VARCHAR(64) NOT NULL,
            source TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated BIGINT NOT NULL,
            deleted BOOLEAN NOT NULL DEFAULT FALSE,
            CONSTRAINT contracts_network_address_key UNIQUE (network, address)
        )",
        SCHEMA
    ))
    .execute(tx.as_mut())
    .await?;

    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS idx_contracts_network_updated ON {}.contracts (network, updated DESC)",
        SCHEMA
    ))
    .execute(tx.as_mut())
    .await?;

    tx.commit().await?;
    log::info!("Database schema ready.");
    Ok(())
}

const DOMAIN_COLUMNS: &str = "id, url, source, cache, updated, origin, created_at";
const CONTRACT_COLUMNS: &str = "id, network, address, source, created_at, updated, deleted";

fn domain_from_row(row: &PgRow) -> Result<BlockedDomain> {
    let origin: String = row.try_get("origin")?;
    Ok(BlockedDomain {
        id: row.try_get("id")?,
        url: row.try_get("url")?,
        source: row.try_get("source")?,
        cache_ttl: row.try_get("cache")?,
        last_updated: row.try_get("updated")?,
        origin: Origin::from_str(&origin).map_err(BlocklistError::Decode)?,
        created_at: row.try_get("created_at")?,
    })
}

fn contract_from_row(row: &PgRow) -> Result<BlockedContract> {
    let network: String = row.try_get("network")?;
    Ok(BlockedContract {
        id: row.try_get("id")?,
        network: Network::from_str(&network)?,
        address: row.try_get("address")?,
        source: row.try_get("source")?,
        created_at: row.try_get("created_at")?,
        updated: row.try_get("updated")?,
        deleted: row.try_get("deleted")?,
    })
}

/// [`BlocklistStore`] over PostgreSQL.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl BlocklistStore for PgStore {
    async fn insert_domain(&self, domain: NewDomain) -> Result<BlockedDomain> {
        let row = sqlx::query(&format!(
            "INSERT INTO {}.domains (id, url, source, cache, updated, origin)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {}",
            SCHEMA, DOMAIN_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&domain.url)
        .bind(&domain.source)
        .bind(domain.cache_ttl)
        .bind(domain.last_updated)
        .bind(domain.origin.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify_db_error(e, &domain.url))?;
        domain_from_row(&row)
    }

    async fn find_domain(&self, url: &str) -> Result<Option<BlockedDomain>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM {}.domains WHERE url = $1",
            DOMAIN_COLUMNS, SCHEMA
        ))
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(domain_from_row).transpose()
    }

    async fn list_domains(&self, filter: &DomainFilter, page: Page) -> Result<Vec<BlockedDomain>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM {}.domains
             WHERE ($1::TEXT IS NULL OR origin = $1)
               AND ($2::TEXT IS NULL OR source = $2)
             ORDER BY updated DESC, url
             LIMIT $3 OFFSET $4",
            DOMAIN_COLUMNS, SCHEMA
        ))
        .bind(filter.origin.map(|o| o.as_str()))
        .bind(filter.source.as_deref())
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(domain_from_row).collect()
    }

    async fn update_domain(&self, url: &str, patch: DomainPatch, now: i64) -> Result<BlockedDomain> {
        let row = sqlx::query(&format!(
            "UPDATE {}.domains
             SET source = COALESCE($2, source), cache = COALESCE($3, cache), updated = $4
             WHERE url = $1
             RETURNING {}",
            SCHEMA, DOMAIN_COLUMNS
        ))
        .bind(url)
        .bind(patch.source.as_deref())
        .bind(patch.cache_ttl)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => domain_from_row(&row),
            None => Err(BlocklistError::NotFound(format!("Domain '{}'", url))),
        }
    }

    async fn delete_domains_where(&self, predicate: DomainPredicate) -> Result<u64> {
        let result = match predicate {
            DomainPredicate::Url(url) => {
                sqlx::query(&format!("DELETE FROM {}.domains WHERE url = $1", SCHEMA))
                    .bind(url)
                    .execute(&self.pool)
                    .await?
            }
            DomainPredicate::Source(source) => {
                sqlx::query(&format!("DELETE FROM {}.domains WHERE source = $1", SCHEMA))
                    .bind(source)
                    .execute(&self.pool)
                    .await?
            }
            DomainPredicate::ExpiredVerified { now } => {
                sqlx::query(&format!(
                    "DELETE FROM {}.domains WHERE origin = 'verified' AND updated + cache < $1",
                    SCHEMA
                ))
                .bind(now)
                .execute(&self.pool)
                .await?
            }
        };
        Ok(result.rows_affected())
    }

    async fn domain_keys(&self) -> Result<HashSet<String>> {
        let rows = sqlx::query(&format!("SELECT url FROM {}.domains", SCHEMA))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.try_get::<String, _>("url").ok())
            .collect())
    }

    async fn matching_domains(&self, candidates: &[String]) -> Result<HashSet<String>> {
        if candidates.is_empty() {
            return Ok(HashSet::new());
        }
        let rows = sqlx::query(&format!(
            "SELECT url FROM {}.domains WHERE url = ANY($1)",
            SCHEMA
        ))
        .bind(candidates)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.try_get::<String, _>("url").ok())
            .collect())
    }

    async fn insert_contract(&self, contract: NewContract) -> Result<BlockedContract> {
        let row = sqlx::query(&format!(
            "INSERT INTO {}.contracts (id, network, address, source, updated)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {}",
            SCHEMA, CONTRACT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(contract.network.as_str())
        .bind(&contract.address)
        .bind(&contract.source)
        .bind(contract.updated)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify_db_error(e, &format!("{}:{}", contract.network, contract.address)))?;
        contract_from_row(&row)
    }

    async fn find_contract(&self, network: Network, address: &str) -> Result<Option<BlockedContract>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM {}.contracts WHERE network = $1 AND address = $2",
            CONTRACT_COLUMNS, SCHEMA
        ))
        .bind(network.as_str())
        .bind(address)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(contract_from_row).transpose()
    }

    async fn list_contracts(&self, network: Network, page: Page) -> Result<Vec<BlockedContract>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM {}.contracts
             WHERE network = $1 AND deleted = FALSE
             ORDER BY updated DESC, address
             LIMIT $2 OFFSET $3",
            CONTRACT_COLUMNS, SCHEMA
        ))
        .bind(network.as_str())
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(contract_from_row).collect()
    }

    async fn update_contract(
        &self,
        network: Network,
        address: &str,
        patch: ContractPatch,
        now: i64,
    ) -> Result<BlockedContract> {
        let target_network = patch.network.unwrap_or(network);
        let row = sqlx::query(&format!(
            "UPDATE {}.contracts
             SET source = COALESCE($3, source), network = $4, updated = $5
             WHERE network = $1 AND address = $2 AND deleted = FALSE
             RETURNING {}",
            SCHEMA, CONTRACT_COLUMNS
        ))
        .bind(network.as_str())
        .bind(address)
        .bind(patch.source.as_deref())
        .bind(target_network.as_str())
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| classify_db_error(e, &format!("{}:{}", target_network, address)))?;
        match row {
            Some(row) => contract_from_row(&row),
            None => Err(BlocklistError::NotFound(format!(
                "{} contract '{}'",
                network, address
            ))),
        }
    }

    async fn delete_contract(&self, network: Network, address: &str, now: i64) -> Result<()> {
        let result = sqlx::query(&format!(
            "UPDATE {}.contracts SET deleted = TRUE, updated = $3
             WHERE network = $1 AND address = $2 AND deleted = FALSE",
            SCHEMA
        ))
        .bind(network.as_str())
        .bind(address)
        .bind(now)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(BlocklistError::NotFound(format!(
                "{} contract '{}'",
                network, address
            )));
        }
        Ok(())
    }

    async fn restore_contract(
        &self,
        network: Network,
        address: &str,
        source: &str,
        now: i64,
    ) -> Result<BlockedContract> {
        let row = sqlx::query(&format!(
            "UPDATE {}.contracts SET deleted = FALSE, source = $3, updated = $4
             WHERE network = $1 AND address = $2 AND deleted = TRUE
             RETURNING {}",
            SCHEMA, CONTRACT_COLUMNS
        ))
        .bind(network.as_str())
        .bind(address)
        .bind(source)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => contract_from_row(&row),
            None => Err(BlocklistError::NotFound(format!(
                "deleted {} contract '{}'",
                network, address
            ))),
        }
    }

    async fn contract_keys(&self, network: Network) -> Result<HashSet<String>> {
        let rows = sqlx::query(&format!(
            "SELECT address FROM {}.contracts WHERE network = $1",
            SCHEMA
        ))
        .bind(network.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.try_get::<String, _>("address").ok())
            .collect())
    }

    async fn matching_contracts(
        &self,
        network: Network,
        candidates: &[String],
    ) -> Result<HashSet<String>> {
        if candidates.is_empty() {
            return Ok(HashSet::new());
        }
        let rows = sqlx::query(&format!(
            "SELECT address FROM {}.contracts
             WHERE network = $1 AND deleted = FALSE AND address = ANY($2)",
            SCHEMA
        ))
        .bind(network.as_str())
        .bind(candidates)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.try_get::<String, _>("address").ok())
            .collect())
    }
}
