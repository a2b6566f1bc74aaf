pub mod cache;
pub mod error;

// Re-exports
pub use cache::{Cache, CHAT_HISTORY_KEY, TRACKED_RUNS_KEY};
pub use error::{Error, Result};
