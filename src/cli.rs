//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use chrono::{Duration, NaiveDate};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default length of the date range when `--since` is omitted.
pub const DEFAULT_RANGE_DAYS: i64 = 14;

/// bench-tool - benchmark results from GitHub Actions
///
/// Lists benchmark workflow runs in a date range, downloads their report
/// artifacts (or reads them from the remote cache) and merges the scores
/// into a single JSON, CSV or Markdown report.
///
/// Examples:
///   bench-tool --since 2023-10-01 --until 2023-10-05
///   bench-tool --source stdlib --branch develop --format csv -o stdlib.csv
///   bench-tool --cache-mode sync --sync-dir ./engine-benchmark-results
///   bench-tool --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// First day of the date range (YYYY-MM-DD)
    ///
    /// Defaults to 14 days before --until.
    #[arg(long, value_name = "DATE", value_parser = parse_date)]
    pub since: Option<NaiveDate>,

    /// Last day of the date range (YYYY-MM-DD), defaults to today
    #[arg(long, value_name = "DATE", value_parser = parse_date)]
    pub until: Option<NaiveDate>,

    /// Branch to collect bench runs from (repeatable)
    #[arg(short, long, value_name = "BRANCH")]
    pub branch: Vec<String>,

    /// Benchmark family to fetch
    #[arg(short, long, default_value = "engine", value_name = "SOURCE")]
    pub source: SourceArg,

    /// Override the workflow id of the selected source
    #[arg(long, value_name = "ID")]
    pub workflow_id: Option<u64>,

    /// Repository running the benchmarks (owner/name)
    #[arg(long, value_name = "REPO")]
    pub repository: Option<String>,

    /// Remote cache mode
    #[arg(long, value_name = "MODE")]
    pub cache_mode: Option<CacheModeArg>,

    /// Clone location of the results repository (sync cache mode)
    #[arg(long, value_name = "DIR")]
    pub sync_dir: Option<PathBuf>,

    /// Directory for downloaded artifacts
    ///
    /// If not specified, a temporary directory is used and removed afterwards.
    #[arg(long, value_name = "DIR")]
    pub tmp_dir: Option<PathBuf>,

    /// Only keep labels containing one of these substrings (comma-separated)
    #[arg(short, long, value_name = "LABELS", value_delimiter = ',')]
    pub labels: Option<Vec<String>>,

    /// Output file path for the report
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (json, csv, markdown)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Number of bench reports fetched concurrently
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// GitHub access token
    ///
    /// If not specified, read from the environment variable named in the
    /// config file (GITHUB_TOKEN by default).
    #[arg(long, value_name = "TOKEN")]
    pub token: Option<String>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .bench-tool.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Exit with code 2 when no bench report could be assembled
    #[arg(long)]
    pub fail_if_empty: bool,

    /// Generate a default .bench-tool.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON format (default)
    #[default]
    Json,
    /// One CSV row per label and bench run
    Csv,
    /// Markdown summary
    #[serde(alias = "md")]
    Markdown,
}

impl OutputFormat {
    /// File extension of reports written in this format.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Markdown => "md",
        }
    }
}

/// Benchmark family selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SourceArg {
    Engine,
    Stdlib,
}

/// Remote cache mode selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CacheModeArg {
    Readonly,
    Sync,
    None,
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| format!("invalid date '{}' (expected YYYY-MM-DD): {}", s, e))
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if let (Some(since), Some(until)) = (self.since, self.until) {
            if since > until {
                return Err(format!(
                    "--since ({}) must not be after --until ({})",
                    since, until
                ));
            }
        }

        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        if self.branch.iter().any(|b| b.trim().is_empty()) {
            return Err("Branch names must not be empty".to_string());
        }

        if let Some(ref repository) = self.repository {
            let parts: Vec<&str> = repository.split('/').collect();
            if parts.len() != 2 || parts.iter().any(|p| p.is_empty()) {
                return Err(format!(
                    "Repository must be in owner/name form: {}",
                    repository
                ));
            }
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref tmp_dir) = self.tmp_dir {
            if tmp_dir.exists() && !tmp_dir.is_dir() {
                return Err(format!(
                    "Temporary path is not a directory: {}",
                    tmp_dir.display()
                ));
            }
        }

        Ok(())
    }

    /// Resolve the date range, anchoring defaults at `today`.
    pub fn date_range(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let until = self.until.unwrap_or(today);
        let since = self
            .since
            .unwrap_or_else(|| until - Duration::days(DEFAULT_RANGE_DAYS));
        (since, until)
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
