pub mod cancel;
pub mod dispatch;
pub mod error;
pub mod tracker;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports
pub use dispatch::{dispatch_batch, dispatch_target};
pub use error::{CancelError, PollError, TriggerError};
pub use tracker::{fetch_update, RunTracker, TrackerConfig, TrackerPhase};
