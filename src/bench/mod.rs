//! Bench run listing and job report assembly.
//!
//! A job report is looked up in the remote cache first; on a miss the
//! artifact is downloaded from the CI provider, parsed and stored back.

pub mod artifact;

use crate::cache::RemoteCache;
use crate::error::{BenchError, BenchResult};
use crate::github::GithubClient;
use crate::models::{JobReport, JobRun};
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use std::path::Path;
use tracing::{debug, info, warn};

/// List bench runs of `workflow_id` on `branch` created between `since` and `until`.
pub async fn get_bench_runs(
    client: &GithubClient,
    since: NaiveDate,
    until: NaiveDate,
    branch: &str,
    workflow_id: u64,
) -> BenchResult<Vec<JobRun>> {
    if since > until {
        return Err(BenchError::Config {
            message: format!("since ({}) is after until ({})", since, until),
        });
    }
    client
        .list_workflow_runs(workflow_id, branch, since, until)
        .await
}

/// Look up a cached report, treating unreadable entries as misses.
async fn cached_report(cache: &dyn RemoteCache, run_id: &str) -> Option<JobReport> {
    let content = match cache.fetch(run_id).await {
        Ok(Some(content)) => content,
        Ok(None) => return None,
        Err(e) => {
            warn!(run_id, error = %e, "cache lookup failed, falling back to download");
            return None;
        }
    };

    match JobReport::from_json(&content) {
        Ok(report) => Some(report),
        Err(e) => {
            warn!(run_id, error = %e, "ignoring malformed cache entry");
            None
        }
    }
}

/// Get the job report of a bench run.
///
/// Returns `Ok(None)` when the run has no (unexpired) artifact named
/// `artifact_name`.
pub async fn get_bench_report(
    client: &GithubClient,
    bench_run: &JobRun,
    temp_dir: &Path,
    cache: &dyn RemoteCache,
    artifact_name: &str,
) -> BenchResult<Option<JobReport>> {
    let run_id = bench_run.id.as_str();

    if let Some(mut report) = cached_report(cache, run_id).await {
        debug!(run_id, "using cached report");
        // Metadata from the API is fresher than the cached copy.
        report.bench_run = bench_run.clone();
        return Ok(Some(report));
    }

    let artifacts = client.list_artifacts(run_id).await?;
    let Some(artifact) = artifacts.into_iter().find(|a| a.name == artifact_name) else {
        warn!(run_id, artifact_name, "run has no benchmark artifact");
        return Ok(None);
    };
    if artifact.expired {
        warn!(run_id, artifact_name, "benchmark artifact has expired");
        return Ok(None);
    }

    let bytes = client.download_artifact(&artifact).await?;
    let zip_path = temp_dir.join(format!("{}.zip", run_id));
    tokio::fs::write(&zip_path, &bytes).await?;

    let label_score_dict = tokio::task::spawn_blocking(move || {
        let xml = artifact::extract_report_xml(&zip_path)?;
        artifact::parse_bench_report_xml(&xml)
    })
    .await
    .map_err(|e| BenchError::Artifact {
        message: format!("artifact task failed: {}", e),
    })??;

    info!(
        "Parsed {} scores from run {}",
        label_score_dict.len(),
        run_id
    );

    let report = JobReport {
        label_score_dict,
        bench_run: bench_run.clone(),
    };

    match report.to_json() {
        Ok(content) => {
            if let Err(e) = cache.put(run_id, &content).await {
                warn!(run_id, error = %e, "failed to store report in cache");
            }
        }
        Err(e) => warn!(run_id, error = %e, "failed to serialize report for cache"),
    }

    Ok(Some(report))
}

/// Get reports for many runs with at most `concurrency` requests in flight.
///
/// Runs without an artifact are dropped. Failures of individual runs are
/// logged and skipped, except authorization failures which abort.
pub async fn get_bench_reports(
    client: &GithubClient,
    bench_runs: &[JobRun],
    temp_dir: &Path,
    cache: &dyn RemoteCache,
    artifact_name: &str,
    concurrency: usize,
    progress: Option<&ProgressBar>,
) -> BenchResult<Vec<JobReport>> {
    let results: Vec<(String, BenchResult<Option<JobReport>>)> = stream::iter(bench_runs)
        .map(|run| async move {
            let result = get_bench_report(client, run, temp_dir, cache, artifact_name).await;
            if let Some(pb) = progress {
                pb.inc(1);
            }
            (run.id.clone(), result)
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut reports = Vec::new();
    for (run_id, result) in results {
        match result {
            Ok(Some(report)) => reports.push(report),
            Ok(None) => {}
            Err(e @ BenchError::Unauthorized { .. }) => return Err(e),
            Err(e) => warn!(run_id = %run_id, error = %e, "failed to get bench report"),
        }
    }

    info!(
        "Assembled {} reports out of {} runs",
        reports.len(),
        bench_runs.len()
    );
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::artifact::tests::{zip_bytes, SAMPLE_XML};
    use super::*;
    use crate::cache::{MemoryCache, ReadonlyRemoteCache};
    use crate::models::tests::{sample_job_report, sample_job_run};
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ARTIFACT: &str = "Runtime Benchmark Report";

    fn client(server: &MockServer) -> GithubClient {
        GithubClient::new(
            &server.uri(),
            "enso-org/enso",
            Some("t".to_string()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    async fn mount_artifact(server: &MockServer, run_id: &str, name: &str, expired: bool) {
        let download_url = format!("{}/download/{}", server.uri(), run_id);
        Mock::given(method("GET"))
            .and(path(format!(
                "/repos/enso-org/enso/actions/runs/{}/artifacts",
                run_id
            )))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total_count": 1,
                "artifacts": [{
                    "id": 1,
                    "name": name,
                    "size_in_bytes": 10,
                    "archive_download_url": download_url,
                    "expired": expired
                }]
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/download/{}", run_id)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(zip_bytes("bench-report.xml", SAMPLE_XML)),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_get_bench_report_downloads_and_caches() {
        let server = MockServer::start().await;
        mount_artifact(&server, "11", ARTIFACT, false).await;

        let temp = TempDir::new().unwrap();
        let cache = MemoryCache::new();
        let run = sample_job_run("11", "2023-10-02T12:00:00Z");

        let report = get_bench_report(&client(&server), &run, temp.path(), &cache, ARTIFACT)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.bench_run, run);
        assert_eq!(report.label_score_dict.len(), 2);

        let cached = cache.fetch("11").await.unwrap().unwrap();
        assert_eq!(JobReport::from_json(&cached).unwrap(), report);
    }

    #[tokio::test]
    async fn test_get_bench_report_uses_cache() {
        let server = MockServer::start().await;
        let cache = MemoryCache::new();
        let cached = sample_job_report();
        cache
            .put(&cached.bench_run.id, &cached.to_json().unwrap())
            .await
            .unwrap();

        let temp = TempDir::new().unwrap();
        let report = get_bench_report(
            &client(&server),
            &cached.bench_run,
            temp.path(),
            &cache,
            ARTIFACT,
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(report, cached);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_bench_report_malformed_cache_entry_falls_back() {
        let server = MockServer::start().await;
        mount_artifact(&server, "12", ARTIFACT, false).await;

        let cache = MemoryCache::new();
        cache.put("12", "not json").await.unwrap();

        let temp = TempDir::new().unwrap();
        let run = sample_job_run("12", "2023-10-02T12:00:00Z");
        let report = get_bench_report(&client(&server), &run, temp.path(), &cache, ARTIFACT)
            .await
            .unwrap();
        assert!(report.is_some());
    }

    #[tokio::test]
    async fn test_get_bench_report_from_remote_cache() {
        let github = MockServer::start().await;
        let results = MockServer::start().await;

        let run = sample_job_run("31", "2023-10-02T12:00:00Z");
        let mut stored = sample_job_report();
        stored.bench_run = sample_job_run("31", "2023-10-02T12:00:00Z");
        stored.bench_run.display_title = "title at cache time".to_string();

        Mock::given(method("GET"))
            .and(path("/cache/31.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(stored.to_json().unwrap()))
            .expect(1)
            .mount(&results)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/enso-org/enso/actions/runs/31/artifacts"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&github)
            .await;

        let cache = ReadonlyRemoteCache::new(&results.uri(), Duration::from_secs(5)).unwrap();
        let temp = TempDir::new().unwrap();
        let report = get_bench_report(&client(&github), &run, temp.path(), &cache, ARTIFACT)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.bench_run, run);
        assert_eq!(report.label_score_dict, stored.label_score_dict);
        assert!(github.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_bench_report_cache_error_falls_back() {
        let github = MockServer::start().await;
        let results = MockServer::start().await;
        mount_artifact(&github, "32", ARTIFACT, false).await;
        Mock::given(method("GET"))
            .and(path("/cache/32.json"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&results)
            .await;

        let cache = ReadonlyRemoteCache::new(&results.uri(), Duration::from_secs(5)).unwrap();
        let temp = TempDir::new().unwrap();
        let run = sample_job_run("32", "2023-10-02T12:00:00Z");
        let report = get_bench_report(&client(&github), &run, temp.path(), &cache, ARTIFACT)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.bench_run, run);
        assert_eq!(report.label_score_dict.len(), 2);
        assert_eq!(results.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_get_bench_report_missing_or_expired_artifact() {
        let server = MockServer::start().await;
        mount_artifact(&server, "13", "Something Else", false).await;
        mount_artifact(&server, "14", ARTIFACT, true).await;

        let temp = TempDir::new().unwrap();
        let cache = MemoryCache::new();
        let client = client(&server);

        for id in ["13", "14"] {
            let run = sample_job_run(id, "2023-10-02T12:00:00Z");
            let report = get_bench_report(&client, &run, temp.path(), &cache, ARTIFACT)
                .await
                .unwrap();
            assert!(report.is_none());
        }
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_get_bench_reports_skips_failures() {
        let server = MockServer::start().await;
        mount_artifact(&server, "21", ARTIFACT, false).await;
        mount_artifact(&server, "22", ARTIFACT, false).await;
        Mock::given(method("GET"))
            .and(path("/repos/enso-org/enso/actions/runs/23/artifacts"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let runs: Vec<_> = ["21", "22", "23"]
            .iter()
            .map(|id| sample_job_run(id, "2023-10-02T12:00:00Z"))
            .collect();
        let temp = TempDir::new().unwrap();
        let cache = MemoryCache::new();
        let progress = ProgressBar::hidden();

        let reports = get_bench_reports(
            &client(&server),
            &runs,
            temp.path(),
            &cache,
            ARTIFACT,
            2,
            Some(&progress),
        )
        .await
        .unwrap();

        assert_eq!(reports.len(), 2);
        assert_eq!(progress.position(), 3);
    }

    #[tokio::test]
    async fn test_get_bench_reports_aborts_on_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let runs = vec![sample_job_run("31", "2023-10-02T12:00:00Z")];
        let temp = TempDir::new().unwrap();
        let cache = MemoryCache::new();

        let result = get_bench_reports(
            &client(&server),
            &runs,
            temp.path(),
            &cache,
            ARTIFACT,
            4,
            None,
        )
        .await;
        assert!(matches!(result, Err(BenchError::Unauthorized { .. })));
    }

    #[tokio::test]
    async fn test_get_bench_runs_rejects_inverted_range() {
        let server = MockServer::start().await;
        let since = NaiveDate::from_ymd_opt(2023, 10, 5).unwrap();
        let until = NaiveDate::from_ymd_opt(2023, 10, 1).unwrap();

        let result = get_bench_runs(&client(&server), since, until, "develop", 1).await;
        assert!(matches!(result, Err(BenchError::Config { .. })));
    }
}
