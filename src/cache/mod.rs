//! Remote cache of job reports.
//!
//! GitHub deletes workflow artifacts after a retention period, so every
//! parsed report is stored under the id of its bench run in a separate
//! results repository. Entries are the JSON form of [`JobReport`].
//!
//! [`JobReport`]: crate::models::JobReport

mod git;
mod sync;

use crate::error::{BenchError, BenchResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

pub use sync::SyncRemoteCache;

/// Raw content URL of the results repository.
pub const DEFAULT_REMOTE_URL: &str =
    "https://raw.githubusercontent.com/enso-org/engine-benchmark-results/main";

/// Git URL of the results repository.
pub const DEFAULT_SYNC_REPO_URL: &str = "https://github.com/enso-org/engine-benchmark-results";

/// Directory inside the results repository holding the entries.
pub(crate) const CACHE_DIR: &str = "cache";

/// Key-value store fronting artifact downloads.
#[async_trait]
pub trait RemoteCache: Send + Sync {
    /// Look up an entry. `Ok(None)` is a miss.
    async fn fetch(&self, key: &str) -> BenchResult<Option<String>>;

    /// Store an entry.
    async fn put(&self, key: &str, content: &str) -> BenchResult<()>;

    /// Publish stored entries, if the cache supports it.
    async fn sync(&self) -> BenchResult<()>;
}

/// Relative path of an entry inside the results repository.
pub(crate) fn entry_path(key: &str) -> String {
    format!("{}/{}.json", CACHE_DIR, key)
}

/// Process-local cache. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl RemoteCache for MemoryCache {
    async fn fetch(&self, key: &str) -> BenchResult<Option<String>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn put(&self, key: &str, content: &str) -> BenchResult<()> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), content.to_string());
        Ok(())
    }

    async fn sync(&self) -> BenchResult<()> {
        Ok(())
    }
}

/// Reads entries over HTTP from the results repository.
///
/// Stored entries are only kept in memory for the rest of the process.
#[derive(Debug)]
pub struct ReadonlyRemoteCache {
    http: reqwest::Client,
    base_url: String,
    local: MemoryCache,
}

impl ReadonlyRemoteCache {
    pub fn new(base_url: &str, timeout: Duration) -> BenchResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BenchError::Config {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            local: MemoryCache::new(),
        })
    }

    fn entry_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, entry_path(key))
    }
}

#[async_trait]
impl RemoteCache for ReadonlyRemoteCache {
    async fn fetch(&self, key: &str) -> BenchResult<Option<String>> {
        if let Some(content) = self.local.fetch(key).await? {
            return Ok(Some(content));
        }

        let url = self.entry_url(key);
        let response = self.http.get(&url).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            debug!(key, "remote cache miss");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(BenchError::Cache {
                message: format!("GET {} returned {}", url, status),
            });
        }

        let content = response.text().await.map_err(|e| BenchError::Cache {
            message: format!("failed to read {}: {}", url, e),
        })?;
        debug!(key, "remote cache hit");
        Ok(Some(content))
    }

    async fn put(&self, key: &str, content: &str) -> BenchResult<()> {
        self.local.put(key, content).await
    }

    async fn sync(&self) -> BenchResult<()> {
        debug!("readonly cache: nothing to sync");
        Ok(())
    }
}
