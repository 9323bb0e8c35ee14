// src/normalization.rs
//
// Canonical keys for blocklist candidates: hostnames for domains, checksummed
// (or base58) addresses for contracts.

use crate::errors::{BlocklistError, Result};
use crate::network::Network;
use ethers::types::Address;
use ethers::utils::to_checksum;
use std::str::FromStr;

const SOLANA_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Turns a raw URL or hostname into the key stored in `domains.url`.
///
/// Strips one leading `http://` and one leading `https://`, keeps only what comes
/// before the first `/` (host plus optional port) and lower-cases the result.
/// An empty return value means the candidate must be rejected.
///
/// ```
/// use spam_blocklist::normalization::normalize_domain;
/// assert_eq!(normalize_domain("https://Evil.example/claim?id=1"), "evil.example");
/// ```
pub fn normalize_domain(raw: &str) -> String {
    let mut s = raw.trim();
    if let Some(rest) = s.strip_prefix("http://") {
        s = rest;
    }
    if let Some(rest) = s.strip_prefix("https://") {
        s = rest;
    }
    let host = s.split('/').next().unwrap_or_default();
    host.trim().to_lowercase()
}

/// Canonicalizes a contract or wallet address for `network`.
///
/// EVM chains accept 40 hex digits with or without `0x` and return the EIP-55
/// checksum form. Solana addresses are validated as base58 and kept as given.
pub fn normalize_address(raw: &str, network: Network) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(BlocklistError::InvalidInput("empty address".to_string()));
    }

    if network.is_evm() {
        let address = Address::from_str(trimmed).map_err(|e| {
            BlocklistError::InvalidInput(format!("{} address `{}`: {}", network, trimmed, e))
        })?;
        Ok(to_checksum(&address, None))
    } else {
        let valid_len = (32..=44).contains(&trimmed.len());
        if valid_len && trimmed.chars().all(|c| SOLANA_ALPHABET.contains(c)) {
            Ok(trimmed.to_string())
        } else {
            Err(BlocklistError::InvalidInput(format!(
                "{} address `{}` is not base58",
                network, trimmed
            )))
        }
    }
}

/// Extracts the candidate from one line of a plain-text list.
///
/// Blank lines and `#` comments yield `None`. Hosts-file lines (`0.0.0.0 evil.example`)
/// yield their last token; trailing inline comments are dropped.
pub fn candidate_from_line(line: &str) -> Option<&str> {
    let line = line.split('#').next().unwrap_or_default().trim();
    if line.is_empty() {
        return None;
    }
    line.split_whitespace().last()
}

/// Splits the comma separated payload of a scan request, dropping empty items.
pub fn split_csv(raw: &str) -> Vec<&str> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}
