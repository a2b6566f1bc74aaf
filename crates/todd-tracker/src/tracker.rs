use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use todd_core::{DashboardStore, RunHandle, RunStatus, RunUpdate, Settings};
use todd_db::Cache;
use todd_github::{workflow::select_report, CiProvider, Repository};
use tokio::sync::Mutex;
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::PollError;

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub poll_interval: Duration,
    pub final_check_delay: Duration,
    pub cancel_refresh_delay: Duration,
    pub safety_timeout: Duration,
    pub max_viewable_report_bytes: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            final_check_delay: Duration::from_secs(3),
            cancel_refresh_delay: Duration::from_secs(2),
            safety_timeout: Duration::from_secs(30 * 60),
            max_viewable_report_bytes: 50 * 1024 * 1024,
        }
    }
}

impl TrackerConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            poll_interval: settings.poll_interval(),
            final_check_delay: settings.final_check_delay(),
            cancel_refresh_delay: settings.cancel_refresh_delay(),
            safety_timeout: settings.safety_timeout(),
            max_viewable_report_bytes: settings.max_viewable_report_bytes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerPhase {
    Idle,
    Polling,
    Completed,
    Failed,
    Cancelled,
}

impl std::fmt::Display for TrackerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackerPhase::Idle => write!(f, "idle"),
            TrackerPhase::Polling => write!(f, "polling"),
            TrackerPhase::Completed => write!(f, "completed"),
            TrackerPhase::Failed => write!(f, "failed"),
            TrackerPhase::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Default)]
struct Control {
    /// Present while a poll loop is running.
    token: Option<CancellationToken>,
    /// Bumped on every start so stale tasks cannot stop a newer session.
    generation: u64,
    final_check_scheduled: bool,
    /// Cancelled by `stop()` so pending cancel nudges are dropped.
    nudges: CancellationToken,
}

struct Inner {
    provider: Arc<dyn CiProvider>,
    store: DashboardStore,
    cache: Option<Cache>,
    config: TrackerConfig,
    control: Mutex<Control>,
}

/// Polls tracked runs until every one of them is terminal.
///
/// One poll loop runs at a time. Ticks are strictly sequential; the runs
/// inside a tick are fetched concurrently and merged per run id.
#[derive(Clone)]
pub struct RunTracker {
    inner: Arc<Inner>,
}

impl RunTracker {
    pub fn new(provider: Arc<dyn CiProvider>, store: DashboardStore, config: TrackerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                provider,
                store,
                cache: None,
                config,
                control: Mutex::new(Control::default()),
            }),
        }
    }

    /// Persist the run set after every tick.
    pub fn with_cache(provider: Arc<dyn CiProvider>, store: DashboardStore, config: TrackerConfig, cache: Cache) -> Self {
        Self {
            inner: Arc::new(Inner {
                provider,
                store,
                cache: Some(cache),
                config,
                control: Mutex::new(Control::default()),
            }),
        }
    }

    pub fn store(&self) -> &DashboardStore {
        &self.inner.store
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.inner.config
    }

    pub(crate) fn provider(&self) -> &Arc<dyn CiProvider> {
        &self.inner.provider
    }

    /// Track `handles` and begin polling. Returns false when a loop was
    /// already running; the handles are still added to the tracked set.
    pub async fn start(&self, handles: Vec<RunHandle>) -> bool {
        let added = self.inner.store.track(&handles).await;

        let mut control = self.inner.control.lock().await;
        if control.token.is_some() {
            tracing::debug!("Tracker already polling; {} new run(s) joined", added);
            return false;
        }

        let token = CancellationToken::new();
        control.token = Some(token.clone());
        control.generation += 1;
        control.final_check_scheduled = false;
        let generation = control.generation;
        drop(control);

        tracing::info!("Started tracking {} run(s)", self.inner.store.handles().await.len());

        self.spawn_loop(token, generation, Instant::now());
        true
    }

    fn spawn_loop(&self, token: CancellationToken, generation: u64, started: Instant) {
        let tracker = self.clone();
        tokio::spawn(async move { tracker.poll_loop(token, generation, started).await });
    }

    /// Stop polling and drop pending refreshes. Safe to call in any state.
    pub async fn stop(&self) {
        let mut control = self.inner.control.lock().await;
        control.nudges.cancel();
        control.nudges = CancellationToken::new();
        if let Some(token) = control.token.take() {
            token.cancel();
            tracing::info!("Stopped polling");
        }
    }

    async fn stop_generation(&self, generation: u64) {
        let mut control = self.inner.control.lock().await;
        if control.generation == generation {
            if let Some(token) = control.token.take() {
                token.cancel();
                tracing::info!("Stopped polling");
            }
        }
    }

    pub async fn is_polling(&self) -> bool {
        self.inner.control.lock().await.token.is_some()
    }

    pub async fn phase(&self) -> TrackerPhase {
        if self.is_polling().await {
            return TrackerPhase::Polling;
        }

        let runs = self.inner.store.snapshot().await;
        if !runs.is_fully_terminal() {
            return TrackerPhase::Idle;
        }
        if runs.runs().any(|r| r.status == RunStatus::Failed) {
            TrackerPhase::Failed
        } else if runs.runs().all(|r| r.status == RunStatus::Cancelled) {
            TrackerPhase::Cancelled
        } else {
            TrackerPhase::Completed
        }
    }

    async fn poll_loop(self, token: CancellationToken, generation: u64, started: Instant) {
        let mut ticker = interval(self.inner.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if token.is_cancelled() {
                break;
            }

            if started.elapsed() >= self.inner.config.safety_timeout {
                tracing::warn!(
                    "Polling exceeded {:?}; giving up on unfinished runs",
                    self.inner.config.safety_timeout
                );
                self.stop_generation(generation).await;
                break;
            }

            let pending = self.inner.store.pending_handles().await;
            self.poll(&pending, &token).await;

            if self.inner.store.is_fully_terminal().await {
                self.schedule_final_check(&token, generation, started).await;
                break;
            }
        }
    }

    /// Reports can be attached shortly after the jobs finish, so one more
    /// fetch runs after a delay before polling ends. Runs that joined in the
    /// meantime send the tracker back to polling instead.
    async fn schedule_final_check(&self, token: &CancellationToken, generation: u64, started: Instant) {
        {
            let mut control = self.inner.control.lock().await;
            if control.generation != generation || control.final_check_scheduled {
                return;
            }
            control.final_check_scheduled = true;
        }

        tracing::debug!("All runs terminal; final check in {:?}", self.inner.config.final_check_delay);

        let tracker = self.clone();
        let token = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = sleep(tracker.inner.config.final_check_delay) => {}
            }
            let handles = tracker.inner.store.handles().await;
            tracker.poll(&handles, &token).await;

            // `start` tracks before it takes the control lock, so checking
            // under the lock never misses a run that joined.
            let mut control = tracker.inner.control.lock().await;
            if control.generation != generation {
                return;
            }
            if tracker.inner.store.is_fully_terminal().await {
                if let Some(token) = control.token.take() {
                    token.cancel();
                    tracing::info!("Stopped polling");
                }
            } else {
                control.final_check_scheduled = false;
                drop(control);
                tracing::debug!("New runs joined during the final check; polling resumes");
                tracker.spawn_loop(token, generation, started);
            }
        });
    }

    /// Re-fetch one run after the configured nudge delay, unless the
    /// tracker is stopped first.
    pub async fn refresh_after(&self, handle: RunHandle) {
        let nudges = self.inner.control.lock().await.nudges.clone();
        let tracker = self.clone();
        let delay = self.inner.config.cancel_refresh_delay;
        tokio::spawn(async move {
            tokio::select! {
                _ = nudges.cancelled() => {}
                _ = sleep(delay) => tracker.refresh(&handle).await,
            }
        });
    }

    /// Fetch one tracked run immediately and merge the result. Runs no
    /// longer in the set are ignored.
    pub async fn refresh(&self, handle: &RunHandle) {
        match fetch_update(
            self.inner.provider.as_ref(),
            handle,
            self.inner.config.max_viewable_report_bytes,
        )
        .await
        {
            Ok(update) => {
                if self.inner.store.apply_if_tracked(handle, update).await {
                    self.persist().await;
                } else {
                    tracing::debug!("Run {} is no longer tracked; dropping refresh", handle.run_id);
                }
            }
            Err(e) => tracing::warn!("{}", e),
        }
    }

    async fn poll(&self, handles: &[RunHandle], token: &CancellationToken) {
        if handles.is_empty() {
            return;
        }

        let provider = self.inner.provider.as_ref();
        let max_bytes = self.inner.config.max_viewable_report_bytes;
        let results = join_all(handles.iter().map(|h| fetch_update(provider, h, max_bytes))).await;

        if token.is_cancelled() {
            tracing::debug!("Tracker stopped mid-tick; discarding {} result(s)", results.len());
            return;
        }

        for (handle, result) in handles.iter().zip(results) {
            match result {
                Ok(update) => self.inner.store.apply_update(handle, update).await,
                Err(e) => tracing::warn!("{}", e),
            }
        }

        self.persist().await;
    }

    async fn persist(&self) {
        if let Some(cache) = &self.inner.cache {
            if let Err(e) = cache.save_runs(&self.inner.store.snapshot().await).await {
                tracing::warn!("Failed to cache tracked runs: {}", e);
            }
        }
    }
}

/// Fetch and validate the current state of one run.
pub async fn fetch_update(
    provider: &dyn CiProvider,
    handle: &RunHandle,
    max_viewable_report_bytes: u64,
) -> Result<RunUpdate, PollError> {
    let run_id = handle.run_id;
    let wrap = |source| PollError { run_id, source };

    let repo = Repository::parse(&handle.repository_full_name).map_err(wrap)?;
    let run = provider.get_run(&repo, run_id).await.map_err(wrap)?;
    let (status, conclusion) = run.validated_status().map_err(wrap)?;

    let jobs = provider.list_jobs(&repo, run_id).await.map_err(wrap)?;
    let jobs = join_all(jobs.into_iter().map(|job| {
        let repo = &repo;
        async move {
            // Logs are only published once a job finishes. Missing logs
            // never hold back the run's status.
            let text = if job.status == "completed" {
                match provider.job_logs(repo, job.id).await {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!("Logs for job {} of run {} unavailable: {}", job.id, run_id, e);
                        String::new()
                    }
                }
            } else {
                String::new()
            };
            job.into_job_log(text)
        }
    }))
    .await
    .into_iter()
    .collect::<todd_github::Result<Vec<_>>>()
    .map_err(wrap)?;

    let report_artifact = if status.is_terminal() {
        let artifacts = provider.list_artifacts(&repo, run_id).await.map_err(wrap)?;
        select_report(&artifacts, max_viewable_report_bytes)
    } else {
        None
    };

    Ok(RunUpdate {
        status,
        conclusion,
        jobs,
        report_artifact,
        html_url: Some(run.html_url),
    })
}
