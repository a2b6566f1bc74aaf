use todd_github::Repository;

use crate::{CancelError, RunTracker};

impl RunTracker {
    /// Ask the provider to cancel a tracked run, then re-fetch it shortly
    /// after since the provider cancels asynchronously.
    pub async fn cancel_run(&self, run_id: u64) -> Result<(), CancelError> {
        let state = self
            .store()
            .get_run(run_id)
            .await
            .ok_or(CancelError::NotTracked(run_id))?;

        if state.status.is_terminal() {
            return Err(CancelError::AlreadyFinished(run_id));
        }

        let repo = Repository::parse(&state.handle.repository_full_name)
            .map_err(|source| CancelError::Provider { run_id, source })?;

        match self.provider().cancel_run(&repo, run_id).await {
            Ok(()) => {
                tracing::info!("Requested cancellation of run {}", run_id);
                self.refresh_after(state.handle).await;
                Ok(())
            }
            Err(e) if e.is_conflict() => {
                tracing::info!("Run {} already finished; nothing to cancel", run_id);
                self.refresh_after(state.handle).await;
                Err(CancelError::AlreadyFinished(run_id))
            }
            Err(source) => Err(CancelError::Provider { run_id, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{handle, FakeProvider};
    use crate::TrackerConfig;
    use std::sync::Arc;
    use std::time::Duration;
    use todd_core::{DashboardStore, RunStatus};

    fn tracker(provider: &Arc<FakeProvider>) -> RunTracker {
        RunTracker::new(provider.clone(), DashboardStore::new(), TrackerConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_nudges_a_refresh() {
        let provider = Arc::new(FakeProvider::default());
        provider.set_run(1, "in_progress", None);
        let tracker = tracker(&provider);
        tracker.store().track(&[handle(1)]).await;

        tokio_test::assert_ok!(tracker.cancel_run(1).await);
        assert_eq!(provider.calls("cancel:1"), 1);
        assert_eq!(tracker.store().get_run(1).await.unwrap().status, RunStatus::Queued);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(tracker.store().get_run(1).await.unwrap().status, RunStatus::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_drops_pending_nudge() {
        let provider = Arc::new(FakeProvider::default());
        provider.set_run(1, "in_progress", None);
        let tracker = tracker(&provider);
        tracker.store().track(&[handle(1)]).await;

        tracker.cancel_run(1).await.unwrap();
        tracker.stop().await;
        tracker.store().reset().await;

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(tracker.store().snapshot().await.is_empty());
        assert_eq!(provider.calls("get_run:1"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nudge_skips_runs_from_a_previous_command() {
        let provider = Arc::new(FakeProvider::default());
        provider.set_run(1, "in_progress", None);
        provider.set_run(2, "in_progress", None);
        let tracker = tracker(&provider);
        tracker.store().track(&[handle(1)]).await;

        tracker.cancel_run(1).await.unwrap();
        // A new command replaces the run set without stopping first.
        tracker.store().reset_runs().await;
        tracker.store().track(&[handle(2)]).await;

        tokio::time::sleep(Duration::from_secs(3)).await;
        let runs = tracker.store().snapshot().await;
        assert_eq!(runs.len(), 1);
        assert!(runs.get(1).is_none());
    }

    #[tokio::test]
    async fn test_cancel_finished_run() {
        let provider = Arc::new(FakeProvider::default());
        provider.set_run(1, "completed", Some("success"));
        let tracker = tracker(&provider);
        tracker.store().track(&[handle(1)]).await;

        // Local state still says queued; the provider answers 409.
        let result = tracker.cancel_run(1).await;
        assert!(matches!(result, Err(CancelError::AlreadyFinished(1))));

        tracker.refresh(&handle(1)).await;
        let result = tracker.cancel_run(1).await;
        assert!(matches!(result, Err(CancelError::AlreadyFinished(1))));
        assert_eq!(provider.calls("cancel:1"), 1);
    }

    #[tokio::test]
    async fn test_cancel_errors() {
        let provider = Arc::new(FakeProvider::default());
        let tracker = tracker(&provider);

        assert!(matches!(tracker.cancel_run(5).await, Err(CancelError::NotTracked(5))));

        // Tracked locally but unknown to the provider.
        tracker.store().track(&[handle(6)]).await;
        assert!(matches!(
            tracker.cancel_run(6).await,
            Err(CancelError::Provider { run_id: 6, .. })
        ));
    }
}
