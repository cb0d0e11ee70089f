//! bench-tool - benchmark results from GitHub Actions
//!
//! A CLI tool that lists benchmark workflow runs, fetches their report
//! artifacts through a remote cache and aggregates the scores per label.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (network, config, cache, etc.)
//!   2 - No bench report found and --fail-if-empty set

mod cli;
mod config;

use anyhow::{Context, Result};
use bench_tool::cache::{MemoryCache, ReadonlyRemoteCache, RemoteCache, SyncRemoteCache};
use bench_tool::models::{BenchmarksReport, JobRun, ReportMetadata};
use bench_tool::{bench, report, GithubClient};
use chrono::Utc;
use cli::{Args, OutputFormat};
use config::{CacheMode, Config, CONFIG_FILE_NAME};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("bench-tool v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .bench-tool.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to customize the repository, workflows and cache.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE_NAME);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {:#}", e);
            Ok(Config::default())
        }
    }
}

/// Remote cache plus any temporary directory it lives in.
struct CacheHandle {
    cache: Box<dyn RemoteCache>,
    _clone_dir: Option<TempDir>,
}

/// Create the remote cache selected by the configuration.
async fn create_cache(
    config: &Config,
    token: Option<String>,
    quiet: bool,
) -> Result<CacheHandle> {
    let timeout = Duration::from_secs(config.github.timeout_seconds);

    match config.cache.mode {
        CacheMode::Readonly => {
            info!("Using read-only remote cache at {}", config.cache.remote_url);
            let cache = ReadonlyRemoteCache::new(&config.cache.remote_url, timeout)?;
            Ok(CacheHandle {
                cache: Box::new(cache),
                _clone_dir: None,
            })
        }
        CacheMode::Sync => {
            let (dir, clone_dir) = match config.cache.sync_dir {
                Some(ref dir) => (dir.clone(), None),
                None => {
                    let temp = TempDir::new().context("Failed to create clone directory")?;
                    (temp.path().join("results"), Some(temp))
                }
            };
            info!("Using sync remote cache in {}", dir.display());
            let cache =
                SyncRemoteCache::initialize(&config.cache.sync_repo_url, &dir, token, !quiet)
                    .await
                    .context("Failed to initialize sync cache")?;
            Ok(CacheHandle {
                cache: Box::new(cache),
                _clone_dir: clone_dir,
            })
        }
        CacheMode::None => {
            info!("Remote cache disabled");
            Ok(CacheHandle {
                cache: Box::new(MemoryCache::new()),
                _clone_dir: None,
            })
        }
    }
}

/// Directory for artifact downloads; the `TempDir` must outlive its use.
fn artifact_dir(args: &Args) -> Result<(PathBuf, Option<TempDir>)> {
    match args.tmp_dir {
        Some(ref dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            Ok((dir.clone(), None))
        }
        None => {
            let temp = TempDir::new().context("Failed to create temporary directory")?;
            Ok((temp.path().to_path_buf(), Some(temp)))
        }
    }
}

fn progress_bar(len: usize, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} runs")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

/// Run the complete workflow. Returns exit code (0 or 2).
async fn run(args: Args) -> Result<i32> {
    let start_time = Instant::now();

    // Load configuration
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    let token = config.token(args.token.as_deref());
    let (since, until) = args.date_range(Utc::now().date_naive());
    let source = config::bench_source(args.source);
    let workflow_id = config.workflow_id(source, args.workflow_id);
    let artifact_name = config.artifact_name(source).to_string();

    let client = GithubClient::new(
        &config.github.api_url,
        &config.github.repository,
        token.clone(),
        Duration::from_secs(config.github.timeout_seconds),
    )?;

    // Step 1: List bench runs
    println!(
        "📥 Listing {} bench runs of {} from {} to {}",
        source, config.github.repository, since, until
    );
    let mut bench_runs: Vec<JobRun> = Vec::new();
    for branch in &config.report.branches {
        let runs = bench::get_bench_runs(&client, since, until, branch, workflow_id)
            .await
            .with_context(|| format!("Failed to list bench runs on branch {}", branch))?;
        info!("Branch {}: {} bench runs", branch, runs.len());
        bench_runs.extend(runs);
    }

    if bench_runs.is_empty() {
        warn!("No bench runs found in the selected period");
    }

    // Step 2: Fetch reports through the cache
    let cache = create_cache(&config, token, args.quiet).await?;
    let (tmp_dir, _tmp_guard) = artifact_dir(&args)?;

    println!("\n🔬 Fetching {} bench reports...", bench_runs.len());
    let progress = progress_bar(bench_runs.len(), args.quiet);
    let job_reports = bench::get_bench_reports(
        &client,
        &bench_runs,
        &tmp_dir,
        cache.cache.as_ref(),
        &artifact_name,
        config.report.concurrency,
        Some(&progress),
    )
    .await?;
    progress.finish_and_clear();

    if let Err(e) = cache.cache.sync().await {
        warn!("Failed to synchronize remote cache: {}", e);
    }

    // Step 3: Aggregate
    let label_filter = args.labels.clone().unwrap_or_default();
    let labels = report::merge_reports(&job_reports, &label_filter);

    let benchmarks = BenchmarksReport {
        metadata: ReportMetadata {
            repository: config.github.repository.clone(),
            source,
            workflow_id,
            branches: config.report.branches.clone(),
            since,
            until,
            generated_at: Utc::now(),
            runs: job_reports.len(),
        },
        labels,
    };

    // Step 4: Write the report
    let output = match config.report.format {
        OutputFormat::Json => report::generate_json_report(&benchmarks)?,
        OutputFormat::Csv => report::generate_csv_report(&benchmarks)?,
        OutputFormat::Markdown => report::generate_markdown_report(&benchmarks),
    };

    let output_path = config.output_path();
    std::fs::write(&output_path, &output)
        .with_context(|| format!("Failed to write report to {}", output_path.display()))?;

    let duration = start_time.elapsed().as_secs_f64();
    println!("\n📊 Summary:");
    println!("   Bench runs: {}", bench_runs.len());
    println!("   Reports: {}", job_reports.len());
    println!("   Labels: {}", benchmarks.labels.len());
    println!("   Duration: {:.1}s", duration);
    println!("\n✅ Report saved to: {}", output_path.display());

    if args.fail_if_empty && job_reports.is_empty() {
        eprintln!("\n⛔ No bench reports were found. Failing (exit code 2).");
        return Ok(2);
    }

    Ok(0)
}
