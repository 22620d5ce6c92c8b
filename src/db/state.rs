//! Runtime state tracking: clean/unclean shutdown detection.

use crate::error::DatabaseError;
use crate::{Error, Result};

use super::Database;

impl Database {
    /// Check if the last shutdown was unclean
    ///
    /// Returns true if the previous session never marked a clean shutdown,
    /// indicating a crash or forced termination. Checked on startup to decide
    /// whether in-flight transfers need recovery.
    pub(super) async fn read_unclean_shutdown(&self) -> Result<bool> {
        let value: Option<String> = sqlx::query_scalar(
            r#"
            SELECT value FROM runtime_state WHERE key = 'clean_shutdown'
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to check shutdown state: {}",
                e
            )))
        })?;

        // Missing or "false" means the last session never finished shutdown
        Ok(value.is_none_or(|v| v != "true"))
    }

    /// Record whether the current session has shut down cleanly
    ///
    /// `false` is written when a session starts; `true` when it shuts down.
    pub(super) async fn write_clean_shutdown(&self, clean: bool) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let value = if clean { "true" } else { "false" };

        sqlx::query(
            r#"
            INSERT INTO runtime_state (key, value, updated_at)
            VALUES ('clean_shutdown', ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(value)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to set shutdown state: {}",
                e
            )))
        })?;

        Ok(())
    }
}
