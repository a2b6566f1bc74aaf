use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{summary, TestSummary, WorkflowTarget};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }

    /// Collapse a provider status/conclusion pair into one status.
    pub fn from_provider(status: &str, conclusion: Option<Conclusion>) -> Option<Self> {
        match status {
            "queued" | "requested" | "waiting" | "pending" => Some(RunStatus::Queued),
            "in_progress" => Some(RunStatus::InProgress),
            "completed" => Some(match conclusion {
                Some(Conclusion::Failure) => RunStatus::Failed,
                Some(Conclusion::Cancelled) => RunStatus::Cancelled,
                _ => RunStatus::Completed,
            }),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Queued => write!(f, "queued"),
            RunStatus::InProgress => write!(f, "in_progress"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
            RunStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conclusion {
    Success,
    Failure,
    Cancelled,
    Skipped,
}

impl Conclusion {
    /// GitHub reports several failure flavours; they all count as failure here.
    pub fn from_provider(conclusion: &str) -> Option<Self> {
        match conclusion {
            "success" | "neutral" => Some(Conclusion::Success),
            "failure" | "timed_out" | "action_required" | "startup_failure" => {
                Some(Conclusion::Failure)
            }
            "cancelled" => Some(Conclusion::Cancelled),
            "skipped" | "stale" => Some(Conclusion::Skipped),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobLog {
    pub job_id: u64,
    pub job_name: String,
    pub status: RunStatus,
    pub conclusion: Option<Conclusion>,
    pub raw_log_text: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportArtifact {
    pub id: u64,
    pub name: String,
    pub size_bytes: u64,
    pub url: String,
    pub is_viewable: bool,
}

/// Identifies one in-flight execution created by a successful trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunHandle {
    pub run_id: u64,
    pub repository_full_name: String,
    pub target: WorkflowTarget,
}

impl RunHandle {
    pub fn new(run_id: u64, target: WorkflowTarget) -> Self {
        Self {
            run_id,
            repository_full_name: target.repository_full_name.clone(),
            target,
        }
    }
}

/// Normalized result of one poll of a single run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunUpdate {
    pub status: RunStatus,
    pub conclusion: Option<Conclusion>,
    pub jobs: Vec<JobLog>,
    pub report_artifact: Option<ReportArtifact>,
    pub html_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunState {
    pub handle: RunHandle,
    pub status: RunStatus,
    pub conclusion: Option<Conclusion>,
    pub per_job_logs: Vec<JobLog>,
    pub report_artifact: Option<ReportArtifact>,
    pub ai_error_summary: Option<String>,
    pub html_url: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl RunState {
    pub fn new(handle: RunHandle) -> Self {
        Self {
            handle,
            status: RunStatus::Queued,
            conclusion: None,
            per_job_logs: Vec::new(),
            report_artifact: None,
            ai_error_summary: None,
            html_url: None,
            updated_at: Utc::now(),
        }
    }

    pub fn run_id(&self) -> u64 {
        self.handle.run_id
    }

    /// Terminal once the run and every one of its jobs have finished.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal() && self.per_job_logs.iter().all(|j| j.status.is_terminal())
    }

    /// Merge a fresh poll result. A terminal status is never reverted.
    pub fn apply(&mut self, update: RunUpdate) {
        if self.status.is_terminal() && !update.status.is_terminal() {
            tracing::debug!(
                "Ignoring stale status {} for run {} (already {})",
                update.status,
                self.run_id(),
                self.status
            );
        } else {
            self.status = update.status;
            if update.conclusion.is_some() {
                self.conclusion = update.conclusion;
            }
        }

        if !update.jobs.is_empty() || self.per_job_logs.is_empty() {
            self.per_job_logs = merge_jobs(&self.per_job_logs, update.jobs);
        }

        if update.report_artifact.is_some() {
            self.report_artifact = update.report_artifact;
        }
        if update.html_url.is_some() {
            self.html_url = update.html_url;
        }

        let error_summary = summary::extract_error_summary(&self.log_text());
        if error_summary.is_some() {
            self.ai_error_summary = error_summary;
        }

        self.updated_at = Utc::now();
    }

    pub fn log_text(&self) -> String {
        self.per_job_logs
            .iter()
            .map(|j| j.raw_log_text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Recomputed from the full log text on every call.
    pub fn test_summary(&self) -> TestSummary {
        summary::extract_summary(&self.log_text())
    }
}

/// Jobs that already finished keep their status, mirroring the run-level rule.
fn merge_jobs(previous: &[JobLog], incoming: Vec<JobLog>) -> Vec<JobLog> {
    incoming
        .into_iter()
        .map(|mut job| {
            if let Some(old) = previous.iter().find(|p| p.job_id == job.job_id) {
                if old.status.is_terminal() && !job.status.is_terminal() {
                    job.status = old.status;
                    job.conclusion = old.conclusion;
                }
                if job.raw_log_text.is_empty() {
                    job.raw_log_text = old.raw_log_text.clone();
                }
            }
            job
        })
        .collect()
}

/// All runs triggered by one user command, keyed by run id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackedRunSet {
    runs: BTreeMap<u64, RunState>,
}

impl TrackedRunSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the run id is already tracked.
    pub fn track(&mut self, handle: RunHandle) -> bool {
        if self.runs.contains_key(&handle.run_id) {
            return false;
        }
        self.runs.insert(handle.run_id, RunState::new(handle));
        true
    }

    /// Update the run if present, insert it if new.
    pub fn upsert(&mut self, handle: &RunHandle, update: RunUpdate) {
        self.runs
            .entry(handle.run_id)
            .or_insert_with(|| RunState::new(handle.clone()))
            .apply(update);
    }

    /// Update the run only if it is still tracked. Returns false otherwise.
    pub fn apply_if_tracked(&mut self, run_id: u64, update: RunUpdate) -> bool {
        match self.runs.get_mut(&run_id) {
            Some(state) => {
                state.apply(update);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, run_id: u64) -> Option<&RunState> {
        self.runs.get(&run_id)
    }

    pub fn handles(&self) -> Vec<RunHandle> {
        self.runs.values().map(|r| r.handle.clone()).collect()
    }

    pub fn runs(&self) -> impl Iterator<Item = &RunState> {
        self.runs.values()
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn clear(&mut self) {
        self.runs.clear();
    }

    pub fn is_fully_terminal(&self) -> bool {
        !self.runs.is_empty() && self.runs.values().all(RunState::is_terminal)
    }

    pub fn pending_handles(&self) -> Vec<RunHandle> {
        self.runs
            .values()
            .filter(|r| !r.is_terminal())
            .map(|r| r.handle.clone())
            .collect()
    }
}
