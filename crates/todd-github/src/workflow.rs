//! GitHub Actions REST shapes and their validation into the run model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use todd_core::{Conclusion, JobLog, ReportArtifact, RunStatus};

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowInfo {
    pub name: String,
    pub path: String,
    pub state: String,
}

impl WorkflowInfo {
    /// `.github/workflows/e2e.yml` -> `e2e.yml`; dispatch accepts the file name.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    pub fn is_active(&self) -> bool {
        self.state == "active"
    }

    pub fn matches(&self, name_or_file: &str) -> bool {
        self.name.eq_ignore_ascii_case(name_or_file)
            || self.file_name().eq_ignore_ascii_case(name_or_file)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    pub status: String,
    pub conclusion: Option<String>,
    pub html_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WorkflowRunList {
    pub workflow_runs: Vec<WorkflowRun>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowJob {
    pub id: u64,
    pub name: String,
    pub status: String,
    pub conclusion: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JobList {
    pub jobs: Vec<WorkflowJob>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: u64,
    pub name: String,
    pub size_in_bytes: u64,
    pub archive_download_url: String,
    #[serde(default)]
    pub expired: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ArtifactList {
    pub artifacts: Vec<Artifact>,
}

fn validate_status(
    what: &str,
    id: u64,
    status: &str,
    conclusion: Option<&str>,
) -> Result<(RunStatus, Option<Conclusion>)> {
    let conclusion = match conclusion {
        Some(c) => Some(Conclusion::from_provider(c).ok_or_else(|| {
            Error::Schema(format!("{} {} has unknown conclusion '{}'", what, id, c))
        })?),
        None => None,
    };

    let status = RunStatus::from_provider(status, conclusion).ok_or_else(|| {
        Error::Schema(format!("{} {} has unknown status '{}'", what, id, status))
    })?;

    Ok((status, conclusion))
}

impl WorkflowRun {
    pub fn validated_status(&self) -> Result<(RunStatus, Option<Conclusion>)> {
        validate_status("run", self.id, &self.status, self.conclusion.as_deref())
    }
}

impl WorkflowJob {
    pub fn into_job_log(self, raw_log_text: String) -> Result<JobLog> {
        let (status, conclusion) =
            validate_status("job", self.id, &self.status, self.conclusion.as_deref())?;

        Ok(JobLog {
            job_id: self.id,
            job_name: self.name,
            status,
            conclusion,
            raw_log_text,
            started_at: self.started_at,
            completed_at: self.completed_at,
        })
    }
}

/// Pick the report artifact among a run's uploads.
pub fn select_report(artifacts: &[Artifact], max_viewable_bytes: u64) -> Option<ReportArtifact> {
    artifacts
        .iter()
        .filter(|a| !a.expired)
        .find(|a| a.name.to_lowercase().contains("report"))
        .map(|a| ReportArtifact {
            id: a.id,
            name: a.name.clone(),
            size_bytes: a.size_in_bytes,
            url: a.archive_download_url.clone(),
            is_viewable: a.size_in_bytes <= max_viewable_bytes,
        })
}
