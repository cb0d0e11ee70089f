//! Benchmark result retrieval for GitHub Actions.
//!
//! Lists bench runs of a workflow, downloads their report artifacts (or
//! reads them from a remote cache, since GitHub expires artifacts) and
//! merges per-label scores into a single report.

pub mod bench;
pub mod cache;
pub mod error;
pub mod github;
pub mod models;
pub mod report;

pub use bench::{get_bench_report, get_bench_reports, get_bench_runs};
pub use cache::{MemoryCache, ReadonlyRemoteCache, RemoteCache, SyncRemoteCache};
pub use error::{BenchError, BenchResult};
pub use github::GithubClient;
pub use models::{parse_commit_timestamp, Author, Commit, JobReport, JobRun};
