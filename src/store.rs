use crate::error::Result;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;
use tracing::info;

/// Process-wide keyed storage shared by the identifier resolver and the
/// chapter-link cache. No transactional multi-key guarantee: callers order
/// their writes so that a crash mid-sequence only costs a re-discovery.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        info!("Connecting to store: {}", database_url);

        // Extract directory path from database URL
        if let Some(path) = database_url.strip_prefix("sqlite:") {
            let path = std::path::Path::new(path);
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM kv_store WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// In-memory store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryStore {
    map: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.map.lock().expect("store mutex poisoned").get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.map
            .lock()
            .expect("store mutex poisoned")
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.map.lock().expect("store mutex poisoned").remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sqlite_store_round_trips_and_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}/kv.db", dir.path().display());

        {
            let store = SqliteStore::connect(&url).await.unwrap();
            store.set("mashle", "4452").await.unwrap();
            store.set("4452", "mashle").await.unwrap();
            assert_eq!(store.get("mashle").await.unwrap().as_deref(), Some("4452"));
        }

        let reopened = SqliteStore::connect(&url).await.unwrap();
        assert_eq!(reopened.get("4452").await.unwrap().as_deref(), Some("mashle"));
    }

    #[tokio::test]
    async fn sqlite_set_overwrites_and_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}/kv.db", dir.path().display());
        let store = SqliteStore::connect(&url).await.unwrap();

        store.set("slug", "1").await.unwrap();
        store.set("slug", "2").await.unwrap();
        assert_eq!(store.get("slug").await.unwrap().as_deref(), Some("2"));

        store.remove("slug").await.unwrap();
        assert_eq!(store.get("slug").await.unwrap(), None);
        // removing an absent key is not an error
        store.remove("slug").await.unwrap();
    }

    #[test]
    fn memory_store_round_trips() {
        tokio_test::block_on(async {
            let store = MemoryStore::new();
            assert_eq!(store.get("missing").await.unwrap(), None);
            store.set("a", "1").await.unwrap();
            assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));
            store.remove("a").await.unwrap();
            assert_eq!(store.get("a").await.unwrap(), None);
        });
    }
}
