use crate::db::*;
use tempfile::NamedTempFile;

#[tokio::test]
async fn test_database_creation() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    let mut conn = db.pool.acquire().await.unwrap();

    let tables: Vec<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .fetch_all(&mut *conn)
            .await
            .unwrap();

    assert!(tables.contains(&"kv_entries".to_string()));
    assert!(tables.contains(&"runtime_state".to_string()));
    assert!(tables.contains(&"schema_version".to_string()));

    drop(conn);
    db.close().await;
}

#[tokio::test]
async fn test_migrations_are_idempotent_across_reopen() {
    let temp_file = NamedTempFile::new().unwrap();

    {
        let db = Database::new(temp_file.path()).await.unwrap();
        db.put(NS_SYNC_QUEUE, "a", "1").await.unwrap();
        db.close().await;
    }

    let db = Database::new(temp_file.path()).await.unwrap();
    let versions: Vec<i64> = sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version")
        .fetch_all(db.pool())
        .await
        .unwrap();
    assert_eq!(versions, vec![1, 2], "each migration should be recorded exactly once");
    assert_eq!(
        db.get(NS_SYNC_QUEUE, "a").await.unwrap().as_deref(),
        Some("1"),
        "data must survive reopen"
    );

    db.close().await;
}
