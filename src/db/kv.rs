//! Key-value operations backed by the `kv_entries` table.

use crate::error::DatabaseError;
use crate::{Error, Result};
use async_trait::async_trait;

use super::{Database, KvStore};

#[async_trait]
impl KvStore for Database {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar(
            r#"
            SELECT value FROM kv_entries WHERE namespace = ? AND key = ?
            "#,
        )
        .bind(namespace)
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to read {}/{}: {}",
                namespace, key, e
            )))
        })?;

        Ok(value)
    }

    async fn put(&self, namespace: &str, key: &str, value: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO kv_entries (namespace, key, value, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(namespace, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(namespace)
        .bind(key)
        .bind(value)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to write {}/{}: {}",
                namespace, key, e
            )))
        })?;

        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM kv_entries WHERE namespace = ? AND key = ?")
            .bind(namespace)
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete {}/{}: {}",
                    namespace, key, e
                )))
            })?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, namespace: &str) -> Result<Vec<(String, String)>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT key, value FROM kv_entries WHERE namespace = ? ORDER BY key ASC
            "#,
        )
        .bind(namespace)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list {}: {}",
                namespace, e
            )))
        })?;

        Ok(rows)
    }

    async fn was_unclean_shutdown(&self) -> Result<bool> {
        self.read_unclean_shutdown().await
    }

    async fn set_clean_start(&self) -> Result<()> {
        self.write_clean_shutdown(false).await
    }

    async fn set_clean_shutdown(&self) -> Result<()> {
        self.write_clean_shutdown(true).await
    }
}
