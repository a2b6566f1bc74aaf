use serde::Serialize;
use todd_core::{ChatMessage, RunHandle, WorkflowTarget};
use todd_resolver::{ResolutionError, ResolutionPreview};
use todd_tracker::dispatch_batch;

use crate::ApiState;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerFailure {
    pub target: WorkflowTarget,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutcome {
    pub targets: Vec<WorkflowTarget>,
    pub triggered: Vec<RunHandle>,
    pub failures: Vec<TriggerFailure>,
    pub message: String,
}

impl ApiState {
    pub async fn preview_command(&self, command: &str) -> Result<ResolutionPreview, ResolutionError> {
        let history = self.store.chat_history().await;
        self.resolver.preview(command, &history).await
    }

    /// Resolve, trigger and start tracking a command. The previous run set
    /// is replaced once at least one workflow was triggered.
    pub async fn run_command(&self, command: &str) -> Result<CommandOutcome, ResolutionError> {
        let history = self.store.chat_history().await;
        self.store.push_chat(ChatMessage::user(command)).await;

        let targets = match self.resolver.preview(command, &history).await {
            Ok(preview) => preview.targets,
            Err(e) => {
                self.store
                    .push_chat(ChatMessage::assistant(e.to_string(), Vec::new()))
                    .await;
                self.persist().await;
                return Err(e);
            }
        };

        let results = dispatch_batch(self.provider.as_ref(), &targets, &self.settings.branch).await;

        let mut triggered = Vec::new();
        let mut failures = Vec::new();
        for (target, result) in targets.iter().zip(results) {
            match result {
                Ok(handle) => triggered.push(handle),
                Err(e) => failures.push(TriggerFailure {
                    target: target.clone(),
                    error: e.to_string(),
                }),
            }
        }

        if !triggered.is_empty() {
            self.tracker.stop().await;
            self.store.reset_runs().await;
            self.tracker.start(triggered.clone()).await;
        }

        let mut message = format!("Triggered {} of {} workflow(s)", triggered.len(), targets.len());
        for handle in &triggered {
            message.push_str(&format!("\n✓ {} (run {})", handle.target.descriptive_label, handle.run_id));
        }
        for failure in &failures {
            message.push_str(&format!("\n✗ {}", failure.error));
        }

        self.store
            .push_chat(ChatMessage::assistant(message.clone(), targets.clone()))
            .await;
        self.persist().await;

        Ok(CommandOutcome {
            targets,
            triggered,
            failures,
            message,
        })
    }
}
