//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.bench-tool.toml` files.

use crate::cli::{Args, CacheModeArg, OutputFormat, SourceArg};
use anyhow::{Context, Result};
use bench_tool::cache::{DEFAULT_REMOTE_URL, DEFAULT_SYNC_REPO_URL};
use bench_tool::github::GITHUB_API_URL;
use bench_tool::models::{BenchSource, ENGINE_BENCH_WORKFLOW_ID, STDLIBS_BENCH_WORKFLOW_ID};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = ".bench-tool.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// GitHub settings.
    #[serde(default)]
    pub github: GithubConfig,

    /// Remote cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// GitHub API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    /// API base URL.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Repository running the benchmarks (`owner/name`).
    #[serde(default = "default_repository")]
    pub repository: String,

    /// Environment variable holding the access token.
    #[serde(default = "default_token_env")]
    pub token_env: String,

    #[serde(default = "default_engine_workflow_id")]
    pub engine_workflow_id: u64,

    #[serde(default = "default_stdlib_workflow_id")]
    pub stdlib_workflow_id: u64,

    /// Artifact name of engine benchmark reports.
    #[serde(default = "default_engine_artifact")]
    pub engine_artifact: String,

    /// Artifact name of standard library benchmark reports.
    #[serde(default = "default_stdlib_artifact")]
    pub stdlib_artifact: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            repository: default_repository(),
            token_env: default_token_env(),
            engine_workflow_id: default_engine_workflow_id(),
            stdlib_workflow_id: default_stdlib_workflow_id(),
            engine_artifact: default_engine_artifact(),
            stdlib_artifact: default_stdlib_artifact(),
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_api_url() -> String {
    GITHUB_API_URL.to_string()
}

fn default_repository() -> String {
    "enso-org/enso".to_string()
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

fn default_engine_workflow_id() -> u64 {
    ENGINE_BENCH_WORKFLOW_ID
}

fn default_stdlib_workflow_id() -> u64 {
    STDLIBS_BENCH_WORKFLOW_ID
}

fn default_engine_artifact() -> String {
    BenchSource::Engine.artifact_name().to_string()
}

fn default_stdlib_artifact() -> String {
    BenchSource::Stdlib.artifact_name().to_string()
}

fn default_timeout() -> u64 {
    120
}

/// How job reports are cached between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// Read entries over HTTP, never write back.
    #[default]
    Readonly,
    /// Work on a clone of the results repository and push new entries.
    Sync,
    /// In-memory only.
    None,
}

/// Remote cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub mode: CacheMode,

    /// Raw content URL of the results repository (readonly mode).
    #[serde(default = "default_remote_url")]
    pub remote_url: String,

    /// Git URL of the results repository (sync mode).
    #[serde(default = "default_sync_repo_url")]
    pub sync_repo_url: String,

    /// Where the results repository is cloned (sync mode).
    #[serde(default)]
    pub sync_dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            mode: CacheMode::default(),
            remote_url: default_remote_url(),
            sync_repo_url: default_sync_repo_url(),
            sync_dir: None,
        }
    }
}

fn default_remote_url() -> String {
    DEFAULT_REMOTE_URL.to_string()
}

fn default_sync_repo_url() -> String {
    DEFAULT_SYNC_REPO_URL.to_string()
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Output file path; `bench_report.<ext>` of the format when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    /// Output format: json, csv or markdown.
    #[serde(default)]
    pub format: OutputFormat,

    /// Number of bench reports fetched concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Branches to collect runs from.
    #[serde(default = "default_branches")]
    pub branches: Vec<String>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output: None,
            format: OutputFormat::default(),
            concurrency: default_concurrency(),
            branches: default_branches(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}

fn default_branches() -> Vec<String> {
    vec!["develop".to_string()]
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings when given.
    pub fn merge_with_args(&mut self, args: &Args) {
        if let Some(ref repository) = args.repository {
            self.github.repository = repository.clone();
        }
        if let Some(timeout) = args.timeout {
            self.github.timeout_seconds = timeout;
        }

        if let Some(mode) = args.cache_mode {
            self.cache.mode = match mode {
                CacheModeArg::Readonly => CacheMode::Readonly,
                CacheModeArg::Sync => CacheMode::Sync,
                CacheModeArg::None => CacheMode::None,
            };
        }
        if let Some(ref dir) = args.sync_dir {
            self.cache.sync_dir = Some(dir.clone());
        }

        if let Some(ref output) = args.output {
            self.report.output = Some(output.display().to_string());
        }
        if let Some(format) = args.format {
            self.report.format = format;
        }
        if let Some(concurrency) = args.concurrency {
            self.report.concurrency = concurrency;
        }
        if !args.branch.is_empty() {
            self.report.branches = args.branch.clone();
        }
    }

    /// Workflow id for a benchmark source, unless overridden.
    pub fn workflow_id(&self, source: BenchSource, overridden: Option<u64>) -> u64 {
        overridden.unwrap_or(match source {
            BenchSource::Engine => self.github.engine_workflow_id,
            BenchSource::Stdlib => self.github.stdlib_workflow_id,
        })
    }

    /// Artifact name for a benchmark source.
    pub fn artifact_name(&self, source: BenchSource) -> &str {
        match source {
            BenchSource::Engine => &self.github.engine_artifact,
            BenchSource::Stdlib => &self.github.stdlib_artifact,
        }
    }

    /// Report file path, named after the format unless configured.
    pub fn output_path(&self) -> PathBuf {
        match self.report.output {
            Some(ref output) => PathBuf::from(output),
            None => PathBuf::from(format!("bench_report.{}", self.report.format.extension())),
        }
    }

    /// Access token from `--token` or the configured environment variable.
    pub fn token(&self, explicit: Option<&str>) -> Option<String> {
        explicit
            .map(String::from)
            .or_else(|| std::env::var(&self.github.token_env).ok())
            .filter(|t| !t.is_empty())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

/// Convert the CLI source selector.
pub fn bench_source(source: SourceArg) -> BenchSource {
    match source {
        SourceArg::Engine => BenchSource::Engine,
        SourceArg::Stdlib => BenchSource::Stdlib,
    }
}
