use thiserror::Error;

/// Why a command could not be turned into workflow targets.
#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("Could not interpret command: {0}")]
    NoMatch(String),

    #[error("Could not interpret command: the assistant reply was not JSON ({0})")]
    Parse(String),

    #[error("Could not interpret command: {0}")]
    Schema(String),

    #[error("Command matches {0} workflows; use preview to run several at once")]
    MultipleTargets(usize),

    #[error("Workflow '{workflow}' does not exist in {repository}")]
    UnknownWorkflow { repository: String, workflow: String },

    #[error("Could not interpret command: assistant unavailable ({0})")]
    Llm(#[from] todd_ai::Error),
}

pub type Result<T> = std::result::Result<T, ResolutionError>;
