use crate::state::decode;
use crate::traits::{Namespace, StateStore};
use crate::types::{AggregatorError, Result, SeenEntryRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// SQLite-backed aggregation state.
///
/// Writes are staged in memory and land in a single transaction on `flush`,
/// so a poll cycle that dies halfway leaves the database as it was.
pub struct SqliteStateStore {
    pool: SqlitePool,
    path: PathBuf,
    pending: BTreeMap<(Namespace, String), String>,
}

impl SqliteStateStore {
    /// Opens the store at `path`, creating an empty one if nothing is there.
    ///
    /// A file that exists but is not a usable state database is reported as
    /// `StateCorrupt` instead of being replaced.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| corrupt(&path, e))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| corrupt(&path, e))?;

        let check: String = sqlx::query_scalar("PRAGMA quick_check")
            .fetch_one(&pool)
            .await
            .map_err(|e| corrupt(&path, e))?;
        if check != "ok" {
            return Err(corrupt(&path, check));
        }

        info!(path = %path.display(), "Opened state store");
        Ok(Self {
            pool,
            path,
            pending: BTreeMap::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deletes seen-entry records first seen before `cutoff`.
    ///
    /// Only called on explicit request; polling never evicts anything.
    pub async fn prune_seen_before(&mut self, cutoff: DateTime<Utc>) -> Result<usize> {
        self.flush().await?;

        let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM kv WHERE namespace = ?1")
            .bind(Namespace::Entries.as_str())
            .fetch_all(&self.pool)
            .await?;

        let mut expired = Vec::new();
        for (key, value) in rows {
            let record: SeenEntryRecord = decode(Namespace::Entries, &key, &value)?;
            if record.first_seen < cutoff {
                expired.push(key);
            }
        }

        let mut tx = self.pool.begin().await?;
        for key in &expired {
            sqlx::query("DELETE FROM kv WHERE namespace = ?1 AND key = ?2")
                .bind(Namespace::Entries.as_str())
                .bind(key)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        info!(removed = expired.len(), cutoff = %cutoff, "Pruned seen entries");
        Ok(expired.len())
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn get(&self, namespace: Namespace, key: &str) -> Result<Option<String>> {
        if let Some(value) = self.pending.get(&(namespace, key.to_string())) {
            return Ok(Some(value.clone()));
        }

        let value = sqlx::query_scalar("SELECT value FROM kv WHERE namespace = ?1 AND key = ?2")
            .bind(namespace.as_str())
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn set(&mut self, namespace: Namespace, key: &str, value: String) -> Result<()> {
        self.pending.insert((namespace, key.to_string()), value);
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for ((namespace, key), value) in &self.pending {
            sqlx::query(
                r#"
                INSERT INTO kv (namespace, key, value)
                VALUES (?1, ?2, ?3)
                ON CONFLICT (namespace, key) DO UPDATE SET value = excluded.value
                "#,
            )
            .bind(namespace.as_str())
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!(records = self.pending.len(), path = %self.path.display(), "Flushed state store");
        self.pending.clear();
        Ok(())
    }

    fn discard(&mut self) {
        if !self.pending.is_empty() {
            info!(
                discarded = self.pending.len(),
                path = %self.path.display(),
                "Discarded staged state"
            );
            self.pending.clear();
        }
    }

    async fn close(mut self) -> Result<()>
    where
        Self: Sized,
    {
        self.flush().await?;
        self.pool.close().await;
        debug!(path = %self.path.display(), "Closed state store");
        Ok(())
    }
}

impl Drop for SqliteStateStore {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            warn!(
                discarded = self.pending.len(),
                path = %self.path.display(),
                "State store dropped with unflushed writes"
            );
        }
    }
}

fn corrupt(path: &Path, reason: impl Display) -> AggregatorError {
    AggregatorError::StateCorrupt {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}
