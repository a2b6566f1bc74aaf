use thiserror::Error;

/// A single workflow in a batch could not be started.
#[derive(Error, Debug)]
pub enum TriggerError {
    #[error("Workflow '{workflow}' not found in {repository}")]
    WorkflowNotFound { repository: String, workflow: String },

    #[error("Workflow '{workflow}' in {repository} is disabled")]
    WorkflowDisabled { repository: String, workflow: String },

    #[error("Failed to trigger '{workflow}' in {repository}: {source}")]
    Provider {
        repository: String,
        workflow: String,
        #[source]
        source: todd_github::Error,
    },
}

/// One run's fetch failed during a poll tick. Logged and retried next tick.
#[derive(Error, Debug)]
#[error("Failed to poll run {run_id}: {source}")]
pub struct PollError {
    pub run_id: u64,
    #[source]
    pub source: todd_github::Error,
}

#[derive(Error, Debug)]
pub enum CancelError {
    #[error("Run {0} has already finished and cannot be cancelled")]
    AlreadyFinished(u64),

    #[error("Run {0} is not being tracked")]
    NotTracked(u64),

    #[error("Failed to cancel run {run_id}: {source}")]
    Provider {
        run_id: u64,
        #[source]
        source: todd_github::Error,
    },
}
