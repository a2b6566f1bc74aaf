use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::{Artifact, Repository, Result, WorkflowInfo, WorkflowJob, WorkflowRun};

/// The CI operations the dashboard needs from a provider.
#[async_trait]
pub trait CiProvider: Send + Sync {
    /// List workflows defined in a repository
    async fn list_workflows(&self, repo: &Repository) -> Result<Vec<WorkflowInfo>>;

    /// Dispatch a workflow and return the id of the run it created
    async fn trigger_workflow(
        &self,
        repo: &Repository,
        workflow_file: &str,
        inputs: &BTreeMap<String, String>,
    ) -> Result<u64>;

    async fn get_run(&self, repo: &Repository, run_id: u64) -> Result<WorkflowRun>;

    async fn list_jobs(&self, repo: &Repository, run_id: u64) -> Result<Vec<WorkflowJob>>;

    /// Raw log text of one job; empty while the log is not yet available
    async fn job_logs(&self, repo: &Repository, job_id: u64) -> Result<String>;

    async fn list_artifacts(&self, repo: &Repository, run_id: u64) -> Result<Vec<Artifact>>;

    async fn cancel_run(&self, repo: &Repository, run_id: u64) -> Result<()>;
}
