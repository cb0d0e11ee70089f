//! Remote cache backed by a local clone of the results repository.

use super::{entry_path, git, RemoteCache, CACHE_DIR};
use crate::error::{BenchError, BenchResult};
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Reads and writes entries in a working copy; `sync` commits and pushes them.
#[derive(Debug, Clone)]
pub struct SyncRemoteCache {
    repo_dir: PathBuf,
    token: Option<String>,
}

impl SyncRemoteCache {
    /// Clone `repo_url` into `repo_dir`, or update an existing clone from its origin.
    pub async fn initialize(
        repo_url: &str,
        repo_dir: &Path,
        token: Option<String>,
        show_progress: bool,
    ) -> BenchResult<Self> {
        let url = repo_url.to_string();
        let dir = repo_dir.to_path_buf();
        let clone_token = token.clone();

        tokio::task::spawn_blocking(move || {
            git::clone_or_open(&url, &dir, clone_token.as_deref(), show_progress).map(|_| ())
        })
        .await
        .map_err(|e| BenchError::Git {
            message: format!("clone task failed: {}", e),
        })??;

        tokio::fs::create_dir_all(repo_dir.join(CACHE_DIR)).await?;

        Ok(Self {
            repo_dir: repo_dir.to_path_buf(),
            token,
        })
    }

    fn entry_file(&self, key: &str) -> PathBuf {
        self.repo_dir.join(entry_path(key))
    }
}

#[async_trait]
impl RemoteCache for SyncRemoteCache {
    async fn fetch(&self, key: &str) -> BenchResult<Option<String>> {
        match tokio::fs::read_to_string(self.entry_file(key)).await {
            Ok(content) => {
                debug!(key, "sync cache hit");
                Ok(Some(content))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(key, "sync cache miss");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &str, content: &str) -> BenchResult<()> {
        let path = self.entry_file(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;
        debug!(key, "stored entry in sync cache");
        Ok(())
    }

    async fn sync(&self) -> BenchResult<()> {
        let dir = self.repo_dir.clone();
        let token = self.token.clone();
        let message = format!("Update benchmark cache ({})", Utc::now().format("%Y-%m-%d"));

        let pushed = tokio::task::spawn_blocking(move || -> BenchResult<bool> {
            let repo = git2::Repository::open(&dir)?;
            git::rebase_on_origin(&repo, token.as_deref())?;
            match git::commit_all(&repo, CACHE_DIR, &message)? {
                Some(_) => {
                    git::push_head(&repo, token.as_deref())?;
                    Ok(true)
                }
                None => Ok(false),
            }
        })
        .await
        .map_err(|e| BenchError::Git {
            message: format!("sync task failed: {}", e),
        })??;

        if pushed {
            info!("Synchronized cache with {}", self.repo_dir.display());
        } else {
            info!("Cache unchanged, nothing to push");
        }
        Ok(())
    }
}
