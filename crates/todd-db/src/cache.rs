use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use todd_core::{ChatMessage, DashboardStore, TrackedRunSet};

use crate::{Error, Result};

pub const TRACKED_RUNS_KEY: &str = "tracked_runs";
pub const CHAT_HISTORY_KEY: &str = "chat_history";

/// Key-value cache so a restarted front end can resume watching runs.
///
/// Not a source of truth: live provider state overwrites whatever is
/// restored from here on the next poll.
#[derive(Clone)]
pub struct Cache {
    pool: Pool<Sqlite>,
}

impl Cache {
    /// Connect and create the schema if needed.
    pub async fn new(cache_url: &str) -> Result<Self> {
        // An in-memory database only lives as long as its single connection.
        let max_connections = if cache_url.contains(":memory:") { 1 } else { 4 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(cache_url)
            .await
            .map_err(|e| Error::Connection(format!("{}: {}", cache_url, e)))?;

        let cache = Self { pool };
        cache.init_schema().await?;
        tracing::debug!("Opened cache at {}", cache_url);
        Ok(cache)
    }

    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_cache (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TIMESTAMP NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn put<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;

        sqlx::query(
            r#"
            INSERT INTO kv_cache (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(json)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM kv_cache WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        match value {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|source| Error::Corrupt {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    pub async fn save_runs(&self, runs: &TrackedRunSet) -> Result<()> {
        self.put(TRACKED_RUNS_KEY, runs).await
    }

    pub async fn load_runs(&self) -> Result<TrackedRunSet> {
        Ok(self.get(TRACKED_RUNS_KEY).await?.unwrap_or_default())
    }

    pub async fn save_chat(&self, chat: &[ChatMessage]) -> Result<()> {
        self.put(CHAT_HISTORY_KEY, chat).await
    }

    pub async fn load_chat(&self) -> Result<Vec<ChatMessage>> {
        Ok(self.get(CHAT_HISTORY_KEY).await?.unwrap_or_default())
    }

    pub async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM kv_cache")
            .execute(&self.pool)
            .await?;
        tracing::info!("Cleared cache");
        Ok(())
    }

    /// Persist the store's runs and chat history.
    pub async fn save_store(&self, store: &DashboardStore) -> Result<()> {
        self.save_runs(&store.snapshot().await).await?;
        self.save_chat(&store.chat_history().await).await
    }

    /// Seed `store` from the cache. A corrupt entry is dropped with a warning.
    pub async fn restore_into(&self, store: &DashboardStore) -> Result<()> {
        let runs = match self.load_runs().await {
            Ok(runs) => runs,
            Err(Error::Corrupt { key, source }) => {
                tracing::warn!("Discarding cached '{}': {}", key, source);
                TrackedRunSet::default()
            }
            Err(e) => return Err(e),
        };
        let chat = match self.load_chat().await {
            Ok(chat) => chat,
            Err(Error::Corrupt { key, source }) => {
                tracing::warn!("Discarding cached '{}': {}", key, source);
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        tracing::info!(
            "Restored {} run(s) and {} chat message(s) from cache",
            runs.len(),
            chat.len()
        );
        store.restore(runs, chat).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use todd_core::{RunHandle, Technology, WorkflowTarget};

    async fn cache() -> Cache {
        Cache::new("sqlite::memory:").await.unwrap()
    }

    fn handle(run_id: u64) -> RunHandle {
        RunHandle::new(
            run_id,
            WorkflowTarget::new("acme/web-e2e", "E2E Smoke", Technology::Playwright, Default::default()),
        )
    }

    #[tokio::test]
    async fn test_empty_cache_loads_defaults() {
        let cache = cache().await;
        assert!(cache.load_runs().await.unwrap().is_empty());
        assert!(cache.load_chat().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_round_trip_and_overwrite() {
        let cache = cache().await;
        let store = DashboardStore::new();
        store.track(&[handle(7)]).await;
        store.push_chat(ChatMessage::user("run smoke")).await;
        cache.save_store(&store).await.unwrap();

        store.track(&[handle(8)]).await;
        cache.save_store(&store).await.unwrap();

        let restored = DashboardStore::new();
        cache.restore_into(&restored).await.unwrap();
        assert_eq!(restored.handles().await.len(), 2);
        assert_eq!(restored.chat_history().await[0].content, "run smoke");
    }

    #[tokio::test]
    async fn test_corrupt_entry() {
        let cache = cache().await;
        cache.put(TRACKED_RUNS_KEY, "not a run set").await.unwrap();

        assert!(matches!(cache.load_runs().await, Err(Error::Corrupt { .. })));

        let store = DashboardStore::new();
        tokio_test::assert_ok!(cache.restore_into(&store).await);
        assert!(store.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = cache().await;
        cache.save_chat(&[ChatMessage::user("hello")]).await.unwrap();
        cache.clear().await.unwrap();
        assert!(cache.load_chat().await.unwrap().is_empty());
    }
}
