//! # Spam Blocklist
//!
//! Aggregates spam and phishing indicators (domains and NFT contract addresses)
//! from public lists and third-party APIs into a local blocklist store, and
//! answers lookups against it.
//!
//! ## Overview
//!
//! - **Ingestion**: a periodic reconciliation run fetches every configured list,
//!   normalizes the candidates and inserts the ones the store does not know yet.
//! - **Lookups**: domain checks hit the store first and fall back to a
//!   verification API; positive verdicts are cached with the lifetime the API
//!   gave and purged once expired.
//! - **Reports**: users can report contracts; reports live in a JSON file.
//!
//! ## Architecture
//!
//! ### Input layer
//! [`normalization`] and [`network`] turn raw strings into canonical keys.
//!
//! ### Source layer
//! [`sources`] (static lists) and [`verifiers`] (Google Safe Browsing, Alchemy,
//! MnemonicHQ) produce candidates and verdicts. Their failures never escape the
//! adapter boundary.
//!
//! ### Core
//! [`reconciler`] diffs candidates against the [`known_set`] and persists new
//! keys; [`verification_cache`] implements the read-through lookup and purge.
//!
//! ### Persistence
//! [`database`] defines the [`database::BlocklistStore`] contract and its
//! PostgreSQL implementation; [`memory_store`] is the in-process one.
//!
//! ### Facade
//! [`service::BlocklistService`] exposes every REST operation, API-key checks
//! included.

// Input
/// Canonical domain and address keys
pub mod normalization;
/// Supported chains
pub mod network;
/// Store records
pub mod models;
/// Error taxonomy
pub mod errors;

// Sources
/// Static list sources and the fetch boundary
pub mod sources;
/// Third-party verification and spam APIs
pub mod verifiers;

// Core
/// Per-run index of stored keys
pub mod known_set;
/// Bulk list ingestion
pub mod reconciler;
/// Read-through domain verification cache
pub mod verification_cache;

// Persistence
/// Store contract and PostgreSQL implementation
pub mod database;
/// In-memory store
pub mod memory_store;
/// File-backed contract reports
pub mod reports;

// Facade
/// REST-facing operations
pub mod service;

// Infrastructure
/// Configuration management
pub mod settings;
/// Metrics facade (no-op without the `observability` feature)
pub mod metrics;

pub use errors::{BlocklistError, Result};
pub use network::Network;
pub use service::BlocklistService;
