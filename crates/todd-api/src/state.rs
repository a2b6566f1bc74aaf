use anyhow::anyhow;
use std::sync::Arc;
use std::time::Duration;
use todd_core::{DashboardStore, Settings, Technology};
use todd_db::Cache;
use todd_github::{CiProvider, GitHubClient, Repository};
use todd_resolver::{rules, IntentResolver, ResolverConfig, WorkflowCatalog};
use todd_tracker::{RunTracker, TrackerConfig};

const RUN_DISCOVERY_DELAY: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct ApiState {
    pub settings: Arc<Settings>,
    pub store: DashboardStore,
    pub cache: Option<Cache>,
    pub provider: Arc<dyn CiProvider>,
    pub resolver: Arc<IntentResolver>,
    pub tracker: RunTracker,
}

impl ApiState {
    pub fn new(
        settings: Settings,
        provider: Arc<dyn CiProvider>,
        resolver: IntentResolver,
        cache: Option<Cache>,
    ) -> Self {
        let store = DashboardStore::new();
        let config = TrackerConfig::from_settings(&settings);
        let tracker = match &cache {
            Some(cache) => {
                RunTracker::with_cache(provider.clone(), store.clone(), config, cache.clone())
            }
            None => RunTracker::new(provider.clone(), store.clone(), config),
        };

        Self {
            settings: Arc::new(settings),
            store,
            cache,
            provider,
            resolver: Arc::new(resolver),
            tracker,
        }
    }

    /// Wire up every component from settings, then resume cached runs.
    pub async fn from_settings(settings: Settings) -> anyhow::Result<Self> {
        let token = settings
            .github_token
            .clone()
            .ok_or_else(|| anyhow!("GITHUB_TOKEN must be set"))?;
        let client = GitHubClient::with_api_url(token, &settings.github_api_url)?
            .with_run_discovery(settings.run_discovery_attempts, RUN_DISCOVERY_DELAY);
        let provider: Arc<dyn CiProvider> = Arc::new(client);

        let llm = todd_ai::build_client(&settings)?;
        let mut resolver = IntentResolver::new(ResolverConfig::from_settings(&settings), llm);
        let catalog = load_catalog(provider.as_ref(), &settings).await;
        if !catalog.is_empty() {
            resolver = resolver.with_catalog(catalog);
        }

        let cache = match Cache::new(&settings.cache_url).await {
            Ok(cache) => Some(cache),
            Err(e) => {
                tracing::warn!("Running without cache: {}", e);
                None
            }
        };

        let state = Self::new(settings, provider, resolver, cache);
        state.resume().await?;
        Ok(state)
    }

    /// Restore cached runs and chat, and keep watching unfinished runs.
    pub async fn resume(&self) -> anyhow::Result<()> {
        if let Some(cache) = &self.cache {
            cache.restore_into(&self.store).await?;
        }

        let pending = self.store.pending_handles().await;
        if !pending.is_empty() {
            tracing::info!("Resuming {} unfinished run(s) from cache", pending.len());
            self.tracker.start(pending).await;
        }
        Ok(())
    }

    pub async fn persist(&self) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.save_store(&self.store).await {
                tracing::warn!("Failed to update cache: {}", e);
            }
        }
    }

    /// Clear run and chat history everywhere.
    pub async fn clear_history(&self) -> anyhow::Result<()> {
        self.tracker.stop().await;
        self.store.reset().await;
        if let Some(cache) = &self.cache {
            cache.clear().await?;
        }
        Ok(())
    }
}

/// Active workflows in each framework's repository. Best effort: a
/// repository that cannot be listed is left unconstrained.
async fn load_catalog(provider: &dyn CiProvider, settings: &Settings) -> WorkflowCatalog {
    let mut catalog = WorkflowCatalog::new();

    for technology in Technology::ALL {
        let full_name = settings.repository(rules::repository_name(technology));
        let repo = match Repository::parse(&full_name) {
            Ok(repo) => repo,
            Err(e) => {
                tracing::warn!("Skipping workflow catalog for {}: {}", full_name, e);
                continue;
            }
        };

        match provider.list_workflows(&repo).await {
            Ok(workflows) => {
                let names = workflows
                    .into_iter()
                    .filter(|w| w.is_active())
                    .map(|w| w.name)
                    .collect();
                catalog.insert(full_name, names);
            }
            Err(e) => tracing::warn!("Could not list workflows for {}: {}", full_name, e),
        }
    }

    catalog
}
