use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    run::RunUpdate, RunHandle, RunState, RunStatus, TrackedRunSet, WorkflowTarget,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub role: ChatRole,
    pub content: String,
    /// Targets the assistant resolved for this turn, if any.
    #[serde(default)]
    pub targets: Vec<WorkflowTarget>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content.into(), Vec::new())
    }

    pub fn assistant(content: impl Into<String>, targets: Vec<WorkflowTarget>) -> Self {
        Self::new(ChatRole::Assistant, content.into(), targets)
    }

    fn new(role: ChatRole, content: String, targets: Vec<WorkflowTarget>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            targets,
            created_at: Utc::now(),
        }
    }
}

/// Application state shared by the resolver, tracker and front ends.
///
/// Created once at startup and injected where needed; `reset` is the
/// "clear history" operation.
#[derive(Clone, Default)]
pub struct DashboardStore {
    runs: Arc<RwLock<TrackedRunSet>>,
    chat: Arc<RwLock<Vec<ChatMessage>>>,
}

impl DashboardStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store from a cached snapshot.
    pub async fn restore(&self, runs: TrackedRunSet, chat: Vec<ChatMessage>) {
        *self.runs.write().await = runs;
        *self.chat.write().await = chat;
        tracing::debug!("Restored dashboard state from cache");
    }

    pub async fn reset(&self) {
        self.runs.write().await.clear();
        self.chat.write().await.clear();
        tracing::info!("Cleared run and chat history");
    }

    pub async fn reset_runs(&self) {
        self.runs.write().await.clear();
    }

    /// Start tracking handles; returns how many were new.
    pub async fn track(&self, handles: &[RunHandle]) -> usize {
        let mut runs = self.runs.write().await;
        handles.iter().filter(|h| runs.track((*h).clone())).count()
    }

    pub async fn apply_update(&self, handle: &RunHandle, update: RunUpdate) {
        let mut runs = self.runs.write().await;
        runs.upsert(handle, update);
    }

    /// Merge an update for a run that is still tracked; a run dropped by
    /// a reset is left out.
    pub async fn apply_if_tracked(&self, handle: &RunHandle, update: RunUpdate) -> bool {
        self.runs.write().await.apply_if_tracked(handle.run_id, update)
    }

    pub async fn get_run(&self, run_id: u64) -> Option<RunState> {
        self.runs.read().await.get(run_id).cloned()
    }

    pub async fn snapshot(&self) -> TrackedRunSet {
        self.runs.read().await.clone()
    }

    pub async fn handles(&self) -> Vec<RunHandle> {
        self.runs.read().await.handles()
    }

    /// Handles of runs that still need polling.
    pub async fn pending_handles(&self) -> Vec<RunHandle> {
        self.runs.read().await.pending_handles()
    }

    pub async fn is_fully_terminal(&self) -> bool {
        self.runs.read().await.is_fully_terminal()
    }

    pub async fn push_chat(&self, message: ChatMessage) {
        self.chat.write().await.push(message);
    }

    pub async fn chat_history(&self) -> Vec<ChatMessage> {
        self.chat.read().await.clone()
    }

    pub async fn statistics(&self) -> DashboardStats {
        DashboardStats::from_runs(&*self.runs.read().await)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_runs: usize,
    pub queued_runs: usize,
    pub in_progress_runs: usize,
    pub completed_runs: usize,
    pub failed_runs: usize,
    pub cancelled_runs: usize,
    pub passed_tests: u64,
    pub failed_tests: u64,
    pub skipped_tests: u64,
    pub pass_rate: Option<f64>,
}

impl DashboardStats {
    pub fn from_runs(runs: &TrackedRunSet) -> Self {
        let mut stats = DashboardStats {
            total_runs: runs.len(),
            ..Default::default()
        };

        for run in runs.runs() {
            match run.status {
                RunStatus::Queued => stats.queued_runs += 1,
                RunStatus::InProgress => stats.in_progress_runs += 1,
                RunStatus::Completed => stats.completed_runs += 1,
                RunStatus::Failed => stats.failed_runs += 1,
                RunStatus::Cancelled => stats.cancelled_runs += 1,
            }

            let summary = run.test_summary();
            stats.passed_tests += u64::from(summary.passed_count);
            stats.failed_tests += u64::from(summary.failed_count);
            stats.skipped_tests += u64::from(summary.skipped_count);
        }

        let executed = stats.passed_tests + stats.failed_tests;
        if executed > 0 {
            stats.pass_rate = Some(stats.passed_tests as f64 / executed as f64 * 100.0);
        }

        stats
    }
}
