use super::parse::{self, ListFormat};
use super::{BulkSource, SourceEntry};
use crate::errors::{BlocklistError, Result};
use crate::known_set::Category;
use async_trait::async_trait;
use log::{debug, info};
use std::path::{Path, PathBuf};

/// A static list published at a URL, mirrored under `<lists_dir>/<category>/<file>`.
#[derive(Debug, Clone)]
pub struct ListSource {
    id: String,
    url: String,
    pointer: Option<String>,
    category: Category,
    fetch_once: bool,
    cache_path: PathBuf,
    client: reqwest::Client,
}

impl ListSource {
    pub fn new(
        entry: &SourceEntry,
        category: Category,
        fetch_once: bool,
        lists_dir: &Path,
        client: reqwest::Client,
    ) -> Result<Self> {
        let url = entry.url().trim().to_string();
        let file_name = file_name_of(&url)?;
        let cache_path = lists_dir.join(category.dir_name()).join(&file_name);
        Ok(Self {
            id: file_name,
            url,
            pointer: entry.pointer().map(str::to_string),
            category,
            fetch_once,
            cache_path,
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    pub fn is_fetch_once(&self) -> bool {
        self.fetch_once
    }

    async fn download(&self) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| BlocklistError::source_unavailable(&self.id, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(BlocklistError::source_unavailable(
                &self.id,
                format!("HTTP {} from {}", status, self.url),
            ));
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| BlocklistError::source_unavailable(&self.id, e))?;

        if let Some(dir) = self.cache_path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(&self.cache_path, &body).await?;
        info!(
            "⬇️ [ListSource] Updated {} ({} bytes) from {}",
            self.cache_path.display(),
            body.len(),
            self.url
        );
        Ok(body.to_vec())
    }

    async fn body(&self) -> Result<Vec<u8>> {
        if self.fetch_once && tokio::fs::try_exists(&self.cache_path).await? {
            debug!(
                "[ListSource] {} already cached at {}",
                self.id,
                self.cache_path.display()
            );
            return Ok(tokio::fs::read(&self.cache_path).await?);
        }
        self.download().await
    }
}

#[async_trait]
impl BulkSource for ListSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn category(&self) -> Category {
        self.category
    }

    async fn fetch(&self) -> Result<Vec<String>> {
        let body = self.body().await?;
        let format = ListFormat::from_file_name(&self.id);
        let pointer = self.pointer.clone();
        match format {
            ListFormat::TarGz => tokio::task::spawn_blocking(move || {
                parse::decode_tar_gz(&body, pointer.as_deref())
            })
            .await
            .map_err(|e| BlocklistError::source_unavailable(&self.id, e))?,
            _ => parse::decode(format, &body, pointer.as_deref()),
        }
    }
}

/// Last path segment of a list URL, which names both the cached file and the source.
fn file_name_of(url: &str) -> Result<String> {
    let parsed = url::Url::parse(url)
        .map_err(|e| BlocklistError::InvalidInput(format!("list url `{}`: {}", url, e)))?;
    parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            BlocklistError::InvalidInput(format!("list url `{}` has no file name", url))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Network;

    #[test]
    fn test_file_name_and_cache_path() {
        let dir = tempfile::tempdir().unwrap();
        let entry = SourceEntry::Url("https://lists.example/feeds/hosts.txt?ref=1".into());
        let source = ListSource::new(
            &entry,
            Category::Contracts(Network::Polygon),
            false,
            dir.path(),
            reqwest::Client::new(),
        )
        .unwrap();
        assert_eq!(source.id(), "hosts.txt");
        assert_eq!(
            source.cache_path(),
            dir.path().join("contracts/polygon").join("hosts.txt")
        );
        assert!(file_name_of("https://lists.example/").is_err());
        assert!(file_name_of("not a url").is_err());
    }

    #[tokio::test]
    async fn test_fetch_once_reads_local_copy() {
        let dir = tempfile::tempdir().unwrap();
        let domains_dir = dir.path().join("domains");
        std::fs::create_dir_all(&domains_dir).unwrap();
        std::fs::write(
            domains_dir.join("seed.json"),
            r#"{"blacklist": ["cached.example"], "whitelist": ["ok.example"]}"#,
        )
        .unwrap();

        // Unroutable URL: a download attempt would fail the test.
        let entry = SourceEntry::Detailed {
            url: "http://127.0.0.1:9/seed.json".into(),
            pointer: Some("/blacklist".into()),
        };
        let source = ListSource::new(
            &entry,
            Category::Domains,
            true,
            dir.path(),
            reqwest::Client::new(),
        )
        .unwrap();
        assert!(source.is_fetch_once());
        assert_eq!(source.fetch().await.unwrap(), vec!["cached.example"]);
    }
}
