pub mod client;
pub mod error;
pub mod provider;
pub mod repository;
pub mod workflow;

// Re-exports
pub use client::GitHubClient;
pub use error::{Error, Result};
pub use provider::CiProvider;
pub use repository::Repository;
pub use workflow::{Artifact, WorkflowInfo, WorkflowJob, WorkflowRun};
