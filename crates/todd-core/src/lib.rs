pub mod error;
pub mod settings;
pub mod run;
pub mod store;
pub mod summary;
pub mod target;

// Re-exports
pub use settings::Settings;
pub use error::{Error, Result};
pub use run::{
    Conclusion, JobLog, ReportArtifact, RunHandle, RunState, RunStatus, RunUpdate, TrackedRunSet,
};
pub use store::{ChatMessage, ChatRole, DashboardStats, DashboardStore};
pub use summary::{extract_error_summary, extract_summary, TestSummary};
pub use target::{Technology, WorkflowTarget};
