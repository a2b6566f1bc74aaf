use crate::{
    workflow::{ArtifactList, JobList, WorkflowRunList},
    Artifact, CiProvider, Error, Repository, Result, WorkflowInfo, WorkflowJob, WorkflowRun,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use octocrab::Octocrab;
use reqwest::{header, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const DEFAULT_API_URL: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";

/// Runs created slightly before our clock says we dispatched still count.
const CLOCK_SKEW_SECS: i64 = 10;

#[derive(Clone)]
pub struct GitHubClient {
    client: Octocrab,
    http: reqwest::Client,
    api_url: String,
    token: String,
    discovery_attempts: u32,
    discovery_delay: Duration,
    /// Run ids already handed out for a dispatch.
    claimed: Arc<Mutex<HashSet<u64>>>,
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("api_url", &self.api_url)
            .field("token", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl GitHubClient {
    pub fn new(token: String) -> Result<Self> {
        Self::with_api_url(token, DEFAULT_API_URL)
    }

    pub fn with_api_url(token: String, api_url: &str) -> Result<Self> {
        if token.trim().is_empty() {
            return Err(Error::AuthError("GitHub token is empty".to_string()));
        }

        let api_url = api_url.trim_end_matches('/').to_string();
        let client = Octocrab::builder()
            .base_uri(api_url.as_str())?
            .personal_token(token.clone())
            .build()?;

        let http = reqwest::Client::builder()
            .user_agent(concat!("todd/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            http,
            api_url,
            token,
            discovery_attempts: 5,
            discovery_delay: Duration::from_secs(2),
            claimed: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    /// How hard to look for the run a dispatch created.
    pub fn with_run_discovery(mut self, attempts: u32, delay: Duration) -> Self {
        self.discovery_attempts = attempts.max(1);
        self.discovery_delay = delay;
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.api_url, path))
            .bearer_auth(&self.token)
            .header(header::ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        Err(Error::ApiError {
            status: status.as_u16(),
            message,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.request(reqwest::Method::GET, path).send().await?;
        let body = Self::check(response).await?.text().await?;
        serde_json::from_str(&body).map_err(|e| Error::Schema(format!("{}: {}", path, e)))
    }

    /// Find the run a dispatch created: the newest `workflow_dispatch` run on
    /// the branch created no earlier than the dispatch and not already
    /// claimed by an earlier dispatch.
    pub async fn discover_run(
        &self,
        repo: &Repository,
        workflow_file: &str,
        dispatched_at: DateTime<Utc>,
    ) -> Result<u64> {
        let path = format!(
            "/repos/{}/{}/actions/workflows/{}/runs?event=workflow_dispatch&branch={}&per_page=10",
            repo.owner, repo.name, workflow_file, repo.branch
        );
        let not_before = dispatched_at - ChronoDuration::seconds(CLOCK_SKEW_SECS);

        for attempt in 1..=self.discovery_attempts {
            tokio::time::sleep(self.discovery_delay).await;

            let runs: WorkflowRunList = self.get_json(&path).await?;
            let mut claimed = self.claimed.lock().await;
            let newest = runs
                .workflow_runs
                .into_iter()
                .filter(|r| r.created_at >= not_before && !claimed.contains(&r.id))
                .max_by_key(|r| r.created_at);

            if let Some(run) = newest {
                claimed.insert(run.id);
                tracing::info!(
                    "Discovered run {} for {} in {} (attempt {})",
                    run.id,
                    workflow_file,
                    repo,
                    attempt
                );
                return Ok(run.id);
            }

            tracing::debug!(
                "Run for {} not visible yet (attempt {}/{})",
                workflow_file,
                attempt,
                self.discovery_attempts
            );
        }

        Err(Error::RunNotDiscovered(format!("{} in {}", workflow_file, repo)))
    }
}

#[async_trait]
impl CiProvider for GitHubClient {
    async fn list_workflows(&self, repo: &Repository) -> Result<Vec<WorkflowInfo>> {
        let workflows = self
            .client
            .workflows(&repo.owner, &repo.name)
            .list()
            .per_page(100)
            .send()
            .await?;

        Ok(workflows
            .items
            .into_iter()
            .map(|w| WorkflowInfo {
                name: w.name,
                path: w.path,
                state: w.state,
            })
            .collect())
    }

    async fn trigger_workflow(
        &self,
        repo: &Repository,
        workflow_file: &str,
        inputs: &BTreeMap<String, String>,
    ) -> Result<u64> {
        tracing::info!(
            "Triggering workflow {} for {}/{} on {}",
            workflow_file,
            repo.owner,
            repo.name,
            repo.branch
        );

        let dispatched_at = Utc::now();

        self.client
            .actions()
            .create_workflow_dispatch(&repo.owner, &repo.name, workflow_file, &repo.branch)
            .inputs(json!(inputs))
            .send()
            .await?;

        self.discover_run(repo, workflow_file, dispatched_at).await
    }

    async fn get_run(&self, repo: &Repository, run_id: u64) -> Result<WorkflowRun> {
        self.get_json(&format!(
            "/repos/{}/{}/actions/runs/{}",
            repo.owner, repo.name, run_id
        ))
        .await
    }

    async fn list_jobs(&self, repo: &Repository, run_id: u64) -> Result<Vec<WorkflowJob>> {
        let jobs: JobList = self
            .get_json(&format!(
                "/repos/{}/{}/actions/runs/{}/jobs?per_page=100",
                repo.owner, repo.name, run_id
            ))
            .await?;
        Ok(jobs.jobs)
    }

    async fn job_logs(&self, repo: &Repository, job_id: u64) -> Result<String> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/repos/{}/{}/actions/jobs/{}/logs", repo.owner, repo.name, job_id),
            )
            .send()
            .await?;

        // Logs of a job that has not started are not published yet.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(String::new());
        }

        Ok(Self::check(response).await?.text().await?)
    }

    async fn list_artifacts(&self, repo: &Repository, run_id: u64) -> Result<Vec<Artifact>> {
        let artifacts: ArtifactList = self
            .get_json(&format!(
                "/repos/{}/{}/actions/runs/{}/artifacts",
                repo.owner, repo.name, run_id
            ))
            .await?;
        Ok(artifacts.artifacts)
    }

    async fn cancel_run(&self, repo: &Repository, run_id: u64) -> Result<()> {
        tracing::info!("Cancelling run {} in {}", run_id, repo);

        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/repos/{}/{}/actions/runs/{}/cancel", repo.owner, repo.name, run_id),
            )
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }
}
