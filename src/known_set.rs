// Known-set index: keys already present in the store, per category.
// Rebuilt at the start of each reconciliation run and thrown away at the end.

use crate::database::BlocklistStore;
use crate::errors::{BlocklistError, Result};
use crate::metrics;
use crate::network::Network;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// What a list feeds: domains, or contracts of one network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    Domains,
    Contracts(Network),
}

impl Category {
    /// Folder name used for locally cached list files.
    pub fn dir_name(&self) -> String {
        match self {
            Category::Domains => "domains".to_string(),
            Category::Contracts(network) => format!("contracts/{}", network),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Domains => f.write_str("domains"),
            Category::Contracts(network) => write!(f, "contracts:{}", network),
        }
    }
}

impl FromStr for Category {
    type Err = BlocklistError;

    /// Accepts `domains`, `contracts` (ethereum), `contracts:<network>` and `contracts.<network>`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_lowercase();
        if s == "domains" {
            return Ok(Category::Domains);
        }
        if s == "contracts" {
            return Ok(Category::Contracts(Network::Ethereum));
        }
        match s.strip_prefix("contracts") {
            Some(rest) if rest.starts_with(':') || rest.starts_with('.') => {
                Ok(Category::Contracts(rest[1..].parse()?))
            }
            _ => Err(BlocklistError::InvalidInput(format!(
                "unknown list category `{}`",
                s
            ))),
        }
    }
}

#[derive(Debug, Default)]
pub struct KnownSetIndex {
    sets: HashMap<Category, HashSet<String>>,
}

impl KnownSetIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the keys of one category with a single store query, replacing any
    /// previously loaded set for it. Returns the number of keys.
    pub async fn load(&mut self, store: &dyn BlocklistStore, category: Category) -> Result<usize> {
        let keys = match category {
            Category::Domains => store.domain_keys().await?,
            Category::Contracts(network) => store.contract_keys(network).await?,
        };
        let len = keys.len();
        metrics::set_known_set_size(&category.to_string(), len as f64);
        self.sets.insert(category, keys);
        Ok(len)
    }

    pub fn is_loaded(&self, category: Category) -> bool {
        self.sets.contains_key(&category)
    }

    pub fn contains(&self, category: Category, key: &str) -> bool {
        self.sets
            .get(&category)
            .map_or(false, |set| set.contains(key))
    }

    /// Records a key as known. Returns false if it already was.
    pub fn add(&mut self, category: Category, key: impl Into<String>) -> bool {
        self.sets.entry(category).or_default().insert(key.into())
    }

    pub fn len(&self, category: Category) -> usize {
        self.sets.get(&category).map_or(0, HashSet::len)
    }

    pub fn is_empty(&self) -> bool {
        self.sets.values().all(HashSet::is_empty)
    }
}
