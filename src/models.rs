//! Data models for bench runs and job reports.
//!
//! These records mirror the subset of the GitHub Actions API the tool
//! needs. `JobReport` is also the format of a cache entry, so its JSON
//! shape must stay stable.

use crate::error::{BenchError, BenchResult};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Workflow that runs the engine benchmarks.
pub const ENGINE_BENCH_WORKFLOW_ID: u64 = 29450898;

/// Workflow that runs the standard library benchmarks.
pub const STDLIBS_BENCH_WORKFLOW_ID: u64 = 66661001;

/// Name of the report file inside a benchmark artifact.
pub const BENCH_REPORT_FILE_NAME: &str = "bench-report.xml";

/// Author of a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
}

/// Head commit of a bench run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// Full commit hash.
    pub id: String,
    pub message: String,
    /// ISO-8601 timestamp as reported by the CI provider.
    pub timestamp: String,
    pub author: Author,
}

impl Commit {
    /// First line of the commit message.
    pub fn title(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }
}

/// One CI workflow execution that produced benchmark artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRun {
    pub id: String,
    pub display_title: String,
    pub html_url: String,
    pub run_attempt: u32,
    /// Event that triggered the run (`push`, `schedule`, ...).
    pub event: String,
    pub head_commit: Commit,
}

/// Scores of every benchmark label measured by a single bench run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReport {
    pub label_score_dict: BTreeMap<String, f64>,
    pub bench_run: JobRun,
}

impl JobReport {
    /// Serialize into the cache entry format.
    pub fn to_json(&self) -> BenchResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize a cache entry.
    pub fn from_json(content: &str) -> BenchResult<Self> {
        Ok(serde_json::from_str(content)?)
    }
}

/// Parse the timestamp of a commit.
pub fn parse_commit_timestamp(commit: &Commit) -> BenchResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&commit.timestamp)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| BenchError::Parse {
            message: format!(
                "invalid timestamp '{}' of commit {}: {}",
                commit.timestamp, commit.id, e
            ),
        })
}

/// Which family of benchmarks to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BenchSource {
    /// Runtime (engine) benchmarks
    Engine,
    /// Standard library benchmarks
    Stdlib,
}

impl fmt::Display for BenchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BenchSource::Engine => write!(f, "engine"),
            BenchSource::Stdlib => write!(f, "stdlib"),
        }
    }
}

impl BenchSource {
    /// Default workflow id of this source.
    pub fn workflow_id(&self) -> u64 {
        match self {
            BenchSource::Engine => ENGINE_BENCH_WORKFLOW_ID,
            BenchSource::Stdlib => STDLIBS_BENCH_WORKFLOW_ID,
        }
    }

    /// Default name of the artifact carrying the report.
    pub fn artifact_name(&self) -> &'static str {
        match self {
            BenchSource::Engine => "Runtime Benchmark Report",
            BenchSource::Stdlib => "Std-Lib Benchmark Report",
        }
    }
}

/// Score of one label in one bench run, relative to the previous run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub score: f64,
    /// Difference to the previous entry of the same label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_diff: Option<f64>,
    /// Relative difference to the previous entry, in percent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_diff_perc: Option<f64>,
    pub commit_timestamp: DateTime<Utc>,
    pub bench_run: JobRun,
}

/// Scores of a single label ordered by commit timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelSeries {
    pub label: String,
    pub entries: Vec<ScoreEntry>,
}

impl LabelSeries {
    /// Most recent entry.
    pub fn latest(&self) -> Option<&ScoreEntry> {
        self.entries.last()
    }

    pub fn min_score(&self) -> Option<f64> {
        self.entries.iter().map(|e| e.score).reduce(f64::min)
    }

    pub fn max_score(&self) -> Option<f64> {
        self.entries.iter().map(|e| e.score).reduce(f64::max)
    }
}

/// Metadata about a generated report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub repository: String,
    pub source: BenchSource,
    pub workflow_id: u64,
    pub branches: Vec<String>,
    pub since: NaiveDate,
    pub until: NaiveDate,
    pub generated_at: DateTime<Utc>,
    /// Number of bench runs that contributed scores.
    pub runs: usize,
}

/// Scores of every label across all fetched bench runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarksReport {
    pub metadata: ReportMetadata,
    pub labels: Vec<LabelSeries>,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_job_run(id: &str, timestamp: &str) -> JobRun {
        JobRun {
            id: id.to_string(),
            display_title: "Test".to_string(),
            html_url: format!("https://github.com/enso-org/enso/actions/runs/{}", id),
            run_attempt: 1,
            event: "push".to_string(),
            head_commit: Commit {
                id: "a67297aebf6a094d1ad0b0d88cf7438dbf8bd8fe".to_string(),
                message: "Test commit".to_string(),
                timestamp: timestamp.to_string(),
                author: Author {
                    name: "Pavel Marek".to_string(),
                },
            },
        }
    }

    pub(crate) fn sample_job_report() -> JobReport {
        JobReport {
            label_score_dict: [("test_label".to_string(), 1.0)].into_iter().collect(),
            bench_run: sample_job_run("123456789", "2021-06-01T12:00:00Z"),
        }
    }

    #[test]
    fn test_job_report_is_serializable() {
        let s = sample_job_report().to_json().unwrap();
        assert!(!s.is_empty());
        assert!(s.contains("\"label_score_dict\""));
        assert!(s.contains("\"bench_run\""));
    }

    #[test]
    fn test_job_report_is_deserializable() {
        let report = sample_job_report();
        let parsed = JobReport::from_json(&report.to_json().unwrap()).unwrap();
        assert_eq!(report, parsed);
    }

    #[test]
    fn test_job_report_from_cache_entry() {
        let entry = r#"{
            "label_score_dict": {"org.enso.Bench.foo": 12.5},
            "bench_run": {
                "id": "42",
                "display_title": "Bump",
                "html_url": "https://example.com/runs/42",
                "run_attempt": 2,
                "event": "schedule",
                "head_commit": {
                    "id": "abc",
                    "message": "Bump\n\nbody",
                    "timestamp": "2023-10-02T08:30:00Z",
                    "author": {"name": "Someone"}
                }
            }
        }"#;
        let report = JobReport::from_json(entry).unwrap();
        assert_eq!(report.bench_run.run_attempt, 2);
        assert_eq!(report.bench_run.head_commit.title(), "Bump");
        assert_eq!(report.label_score_dict["org.enso.Bench.foo"], 12.5);
    }

    #[test]
    fn test_parse_commit_timestamp() {
        let run = sample_job_run("1", "2023-10-02T10:00:00+02:00");
        let ts = parse_commit_timestamp(&run.head_commit).unwrap();
        assert_eq!(ts.to_rfc3339(), "2023-10-02T08:00:00+00:00");
    }

    #[test]
    fn test_parse_commit_timestamp_invalid() {
        let run = sample_job_run("1", "yesterday");
        assert!(matches!(
            parse_commit_timestamp(&run.head_commit),
            Err(BenchError::Parse { .. })
        ));
    }

    #[test]
    fn test_source_defaults() {
        assert_eq!(BenchSource::Engine.workflow_id(), ENGINE_BENCH_WORKFLOW_ID);
        assert_eq!(BenchSource::Stdlib.to_string(), "stdlib");
    }
}
