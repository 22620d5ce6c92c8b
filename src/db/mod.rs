//! Persistence layer for offline-sync
//!
//! Every component persists its state as JSON documents in a namespaced
//! key-value store. [`KvStore`] is the seam; two implementations ship:
//! - [`Database`] - SQLite through sqlx (WAL mode, versioned migrations)
//! - [`MemoryStore`] - in-process map for tests and ephemeral sessions
//!
//! ## Submodules
//!
//! - [`migrations`]: Database lifecycle, schema migrations
//! - [`kv`]: [`KvStore`] implementation for [`Database`]
//! - [`state`]: Runtime state (shutdown tracking)
//! - [`memory`]: [`MemoryStore`]
//! - [`records`]: Versioned envelope shared by every persisted record

use crate::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;

mod kv;
mod memory;
mod migrations;
pub(crate) mod records;
mod state;

pub use memory::MemoryStore;

/// Namespace holding [`ContentRecord`](crate::ContentRecord)s, keyed by content key
pub const NS_CONTENT_RECORDS: &str = "contentRecords";
/// Namespace holding [`DownloadTask`](crate::DownloadTask)s, keyed by zero-padded task id
pub const NS_DOWNLOAD_TASKS: &str = "downloadTasks";
/// Namespace holding [`SyncEntry`](crate::SyncEntry)s, keyed by zero-padded entry id
pub const NS_SYNC_QUEUE: &str = "syncQueue";
/// Namespace holding the persisted [`StorageBudget`](crate::config::StorageBudget)
pub const NS_STORAGE_SETTINGS: &str = "storageSettings";
/// Namespace used by the default runtime-state methods of [`KvStore`]
pub const NS_RUNTIME_STATE: &str = "runtimeState";

const CLEAN_SHUTDOWN_KEY: &str = "clean_shutdown";

/// Durable string key-value store, partitioned by namespace
///
/// Implementations must make each `put`/`delete` durable before returning.
/// `list` returns entries ordered by key.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read one value
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>>;

    /// Insert or replace one value
    async fn put(&self, namespace: &str, key: &str, value: &str) -> Result<()>;

    /// Delete one value; returns whether it existed
    async fn delete(&self, namespace: &str, key: &str) -> Result<bool>;

    /// All entries of a namespace, ordered by key
    async fn list(&self, namespace: &str) -> Result<Vec<(String, String)>>;

    /// Check if the last session ended without [`set_clean_shutdown`](Self::set_clean_shutdown)
    async fn was_unclean_shutdown(&self) -> Result<bool> {
        let value = self.get(NS_RUNTIME_STATE, CLEAN_SHUTDOWN_KEY).await?;
        Ok(value.is_none_or(|v| v != "true"))
    }

    /// Mark that a session has started
    async fn set_clean_start(&self) -> Result<()> {
        self.put(NS_RUNTIME_STATE, CLEAN_SHUTDOWN_KEY, "false").await
    }

    /// Mark that the session is ending gracefully
    async fn set_clean_shutdown(&self) -> Result<()> {
        self.put(NS_RUNTIME_STATE, CLEAN_SHUTDOWN_KEY, "true").await
    }
}

/// SQLite database handle for offline-sync
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
