//! `sources.json`: which lists feed which category.
//!
//! ```json
//! {
//!   "domains": { "init": ["https://.../all.tar.gz"], "cron": ["https://.../hosts.txt"] },
//!   "contracts:polygon": { "init": [], "cron": [{ "url": "https://.../spam.json", "pointer": "/contracts" }] }
//! }
//! ```

use crate::errors::{BlocklistError, Result};
use crate::known_set::Category;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SourceEntry {
    Url(String),
    Detailed {
        url: String,
        #[serde(default)]
        pointer: Option<String>,
    },
}

impl SourceEntry {
    pub fn url(&self) -> &str {
        match self {
            SourceEntry::Url(url) => url,
            SourceEntry::Detailed { url, .. } => url,
        }
    }

    pub fn pointer(&self) -> Option<&str> {
        match self {
            SourceEntry::Url(_) => None,
            SourceEntry::Detailed { pointer, .. } => pointer.as_deref(),
        }
    }
}

/// `init` lists are fetched once and then read from the local copy; `cron` lists
/// are downloaded on every run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SourceGroup {
    #[serde(default)]
    pub init: Vec<SourceEntry>,
    #[serde(default)]
    pub cron: Vec<SourceEntry>,
}

#[derive(Debug, Clone, Default)]
pub struct SourcesConfig {
    pub groups: BTreeMap<Category, SourceGroup>,
}

impl SourcesConfig {
    pub fn from_json(raw: &str) -> Result<Self> {
        let parsed: BTreeMap<String, SourceGroup> = serde_json::from_str(raw)?;
        let mut groups = BTreeMap::new();
        for (key, group) in parsed {
            let category: Category = key.parse()?;
            if groups.insert(category, group).is_some() {
                return Err(BlocklistError::InvalidInput(format!(
                    "category `{}` is configured twice",
                    category
                )));
            }
        }
        Ok(Self { groups })
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        Self::from_json(&raw)
    }

    pub fn source_count(&self) -> usize {
        self.groups
            .values()
            .map(|g| g.init.len() + g.cron.len())
            .sum()
    }
}
