//! HTTP client for the workflow runs and artifacts endpoints.
//!
//! All status code handling lives in [`GithubClient::get`]; the public
//! methods only deal with decoded payloads.

use crate::error::{BenchError, BenchResult};
use crate::models::{Commit, JobRun};
use chrono::NaiveDate;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Public GitHub API endpoint.
pub const GITHUB_API_URL: &str = "https://api.github.com";

/// Maximum page size accepted by the API.
const PER_PAGE: usize = 100;

const USER_AGENT: &str = concat!("bench-tool/", env!("CARGO_PKG_VERSION"));

/// Artifact attached to a workflow run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub size_in_bytes: u64,
    pub archive_download_url: String,
    /// Artifacts are deleted by GitHub after the retention period.
    #[serde(default)]
    pub expired: bool,
}

#[derive(Debug, Deserialize)]
struct WorkflowRunsPage {
    total_count: usize,
    workflow_runs: Vec<WorkflowRun>,
}

#[derive(Debug, Deserialize)]
struct WorkflowRun {
    id: u64,
    #[serde(default)]
    display_title: String,
    html_url: String,
    #[serde(default = "default_run_attempt")]
    run_attempt: u32,
    event: String,
    head_commit: Option<Commit>,
}

fn default_run_attempt() -> u32 {
    1
}

impl WorkflowRun {
    fn into_job_run(self) -> Option<JobRun> {
        let head_commit = self.head_commit?;
        Some(JobRun {
            id: self.id.to_string(),
            display_title: self.display_title,
            html_url: self.html_url,
            run_attempt: self.run_attempt,
            event: self.event,
            head_commit,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ArtifactsPage {
    artifacts: Vec<Artifact>,
}

/// Client for one repository on GitHub (or a compatible server).
#[derive(Debug, Clone)]
pub struct GithubClient {
    http: reqwest::Client,
    api_url: String,
    repository: String,
    token: Option<String>,
}

impl GithubClient {
    /// Create a client for `repository` (`owner/name`).
    pub fn new(
        api_url: &str,
        repository: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> BenchResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| BenchError::Config {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        if token.is_none() {
            warn!("No GitHub token configured; artifact downloads will fail");
        }

        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            repository: repository.to_string(),
            token,
        })
    }

    /// List completed runs of a workflow on `branch` created in `since..until`.
    ///
    /// Runs lacking head commit information are skipped.
    pub async fn list_workflow_runs(
        &self,
        workflow_id: u64,
        branch: &str,
        since: NaiveDate,
        until: NaiveDate,
    ) -> BenchResult<Vec<JobRun>> {
        let url = format!(
            "{}/repos/{}/actions/workflows/{}/runs",
            self.api_url, self.repository, workflow_id
        );
        let created = format!(
            "{}..{}",
            since.format("%Y-%m-%d"),
            until.format("%Y-%m-%d")
        );

        let mut runs = Vec::new();
        let mut seen = 0;
        let mut page = 1;

        loop {
            let query = [
                ("branch", branch.to_string()),
                ("status", "completed".to_string()),
                ("created", created.clone()),
                ("exclude_pull_requests", "true".to_string()),
                ("per_page", PER_PAGE.to_string()),
                ("page", page.to_string()),
            ];
            let response = self.get(&url, &query).await?;
            let body: WorkflowRunsPage = response.json().await.map_err(|e| BenchError::Parse {
                message: format!("invalid workflow runs response: {}", e),
            })?;

            let fetched = body.workflow_runs.len();
            seen += fetched;
            debug!(page, fetched, total = body.total_count, "fetched workflow runs page");

            for run in body.workflow_runs {
                let run_id = run.id;
                match run.into_job_run() {
                    Some(job_run) => runs.push(job_run),
                    None => warn!(run_id, "skipping run without head commit"),
                }
            }

            if fetched < PER_PAGE || seen >= body.total_count {
                break;
            }
            page += 1;
        }

        info!(
            "Found {} runs of workflow {} on branch {} ({})",
            runs.len(),
            workflow_id,
            branch,
            created
        );
        Ok(runs)
    }

    /// List artifacts attached to a run.
    pub async fn list_artifacts(&self, run_id: &str) -> BenchResult<Vec<Artifact>> {
        let url = format!(
            "{}/repos/{}/actions/runs/{}/artifacts",
            self.api_url, self.repository, run_id
        );
        let query = [("per_page", PER_PAGE.to_string())];
        let response = self.get(&url, &query).await?;
        let body: ArtifactsPage = response.json().await.map_err(|e| BenchError::Parse {
            message: format!("invalid artifacts response: {}", e),
        })?;
        debug!(run_id, count = body.artifacts.len(), "listed artifacts");
        Ok(body.artifacts)
    }

    /// Download the zip archive of an artifact.
    pub async fn download_artifact(&self, artifact: &Artifact) -> BenchResult<Vec<u8>> {
        debug!(
            artifact_id = artifact.id,
            size = artifact.size_in_bytes,
            "downloading artifact"
        );
        let response = self.get(&artifact.archive_download_url, &[]).await?;
        let bytes = response.bytes().await.map_err(|e| BenchError::Network {
            message: format!("failed to read artifact body: {}", e),
        })?;
        Ok(bytes.to_vec())
    }

    async fn get(&self, url: &str, query: &[(&str, String)]) -> BenchResult<reqwest::Response> {
        let mut request = self
            .http
            .get(url)
            .query(query)
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");

        if let Some(ref token) = self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(BenchError::Unauthorized {
                message: if message.is_empty() {
                    status.to_string()
                } else {
                    message
                },
            }),
            StatusCode::NOT_FOUND => Err(BenchError::NotFound {
                url: url.to_string(),
            }),
            _ => Err(BenchError::Api {
                status: status.as_u16(),
                message,
            }),
        }
    }
}
