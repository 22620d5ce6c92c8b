use super::*;
use crate::db::{KvStore, MemoryStore, NS_DOWNLOAD_TASKS};
use crate::types::{ContentRecord, DownloadTask};
use chrono::Utc;

#[tokio::test]
async fn test_enqueue_creates_pending_task() {
    let mut h = create_test_scheduler().await;

    let id = h
        .scheduler
        .enqueue(DownloadRequest::new(video("1")).with_title("Intro"))
        .await
        .unwrap();

    let task = h.scheduler.task(id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.title, "Intro");
    assert_eq!(task.transferred_bytes, 0);

    let persisted = h.store.list(NS_DOWNLOAD_TASKS).await.unwrap();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].0, id.key());

    match h.events.try_recv().unwrap() {
        Event::Queued {
            task_id,
            content_id,
        } => {
            assert_eq!(task_id, id);
            assert_eq!(content_id, video("1"));
        }
        other => panic!("expected Queued, got {other:?}"),
    }
}

#[tokio::test]
async fn test_enqueue_same_content_returns_existing_task() {
    let h = create_test_scheduler().await;

    let first = h
        .scheduler
        .enqueue(DownloadRequest::new(video("1")))
        .await
        .unwrap();
    let second = h
        .scheduler
        .enqueue(DownloadRequest::new(video("1")))
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(h.scheduler.tasks().await.len(), 1);
}

#[tokio::test]
async fn test_enqueue_same_id_different_kind_is_distinct() {
    let h = create_test_scheduler().await;

    let a = h
        .scheduler
        .enqueue(DownloadRequest::new(video("42")))
        .await
        .unwrap();
    let b = h
        .scheduler
        .enqueue(DownloadRequest::new(ContentId::new(
            ContentKind::Document,
            "42",
        )))
        .await
        .unwrap();

    assert_ne!(a, b);
}

#[tokio::test]
async fn test_enqueue_over_budget_fails_without_creating_task() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_download_config(dir.path());
    let budget = StorageBudget {
        max_storage_bytes: 100,
        eviction: EvictionPolicy::Never,
        ..Default::default()
    };
    let h = create_test_scheduler_with(
        dir,
        config,
        budget,
        Arc::new(MemoryStore::new()),
        Arc::new(MockCatalog::new()),
    )
    .await;

    let result = h
        .scheduler
        .enqueue(DownloadRequest::new(video("big")).with_expected_bytes(200))
        .await;

    assert!(
        matches!(
            result,
            Err(Error::Storage(StorageError::BudgetExceeded { .. }))
        ),
        "expected BudgetExceeded, got {result:?}"
    );
    assert!(h.scheduler.tasks().await.is_empty());
    assert!(h.store.list(NS_DOWNLOAD_TASKS).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_tasks_are_listed_in_enqueue_order() {
    let h = create_test_scheduler().await;

    let mut ids = Vec::new();
    for name in ["c", "a", "b"] {
        ids.push(
            h.scheduler
                .enqueue(DownloadRequest::new(video(name)))
                .await
                .unwrap(),
        );
    }

    let listed: Vec<TaskId> = h.scheduler.tasks().await.iter().map(|t| t.id).collect();
    assert_eq!(listed, ids);
}

fn persisted_task(id: u64, name: &str, status: TaskStatus) -> DownloadTask {
    DownloadTask {
        id: TaskId(id),
        target: video(name),
        title: name.to_string(),
        total_bytes: 100,
        transferred_bytes: 40,
        status,
        last_error: None,
        last_error_code: None,
        attempts: 0,
        retry_at: None,
        created_at: Utc::now() - chrono::Duration::hours(1),
    }
}

#[tokio::test]
async fn test_restore_returns_active_tasks_to_pending() {
    let store = Arc::new(MemoryStore::new());
    records::save(store.as_ref(), &persisted_task(7, "a", TaskStatus::Active))
        .await
        .unwrap();
    records::save(store.as_ref(), &persisted_task(9, "b", TaskStatus::Paused))
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let config = test_download_config(dir.path());
    let h = create_test_scheduler_with(
        dir,
        config,
        StorageBudget::default(),
        store.clone(),
        Arc::new(MockCatalog::new()),
    )
    .await;

    let restored = h.scheduler.task(TaskId(7)).await.unwrap();
    assert_eq!(restored.status, TaskStatus::Pending);
    assert_eq!(restored.transferred_bytes, 0);
    assert_eq!(
        h.scheduler.task(TaskId(9)).await.unwrap().status,
        TaskStatus::Paused
    );

    let persisted: Vec<DownloadTask> = records::load_all(store.as_ref()).await.unwrap();
    assert_eq!(persisted[0].status, TaskStatus::Pending);

    // New ids continue after the highest restored id
    let next = h
        .scheduler
        .enqueue(DownloadRequest::new(video("c")))
        .await
        .unwrap();
    assert_eq!(next, TaskId(10));
}

#[tokio::test]
async fn test_restore_completes_task_whose_content_was_already_recorded() {
    let store = Arc::new(MemoryStore::new());
    let dir = tempfile::tempdir().unwrap();

    let file = dir.path().join("video_a.mp4");
    tokio::fs::write(&file, b"0123456789").await.unwrap();
    let now = Utc::now();
    let record = ContentRecord {
        id: video("a"),
        title: "a".into(),
        byte_size: 10,
        storage_path: file,
        thumbnail_path: None,
        downloaded_at: now,
        last_accessed_at: now,
        is_complete: true,
        expires_at: None,
    };
    records::save(store.as_ref(), &record).await.unwrap();
    records::save(store.as_ref(), &persisted_task(1, "a", TaskStatus::Active))
        .await
        .unwrap();

    let config = test_download_config(dir.path());
    let h = create_test_scheduler_with(
        dir,
        config,
        StorageBudget::default(),
        store,
        Arc::new(MockCatalog::new()),
    )
    .await;

    let task = h.scheduler.task(TaskId(1)).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.transferred_bytes, 10);
    assert_eq!(task.total_bytes, 10);
}

#[tokio::test]
async fn test_restore_drops_corrupt_task_entries() {
    let store = Arc::new(MemoryStore::new());
    records::save(store.as_ref(), &persisted_task(1, "a", TaskStatus::Pending))
        .await
        .unwrap();
    store
        .put(NS_DOWNLOAD_TASKS, &TaskId(2).key(), "{not json")
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let config = test_download_config(dir.path());
    let h = create_test_scheduler_with(
        dir,
        config,
        StorageBudget::default(),
        store.clone(),
        Arc::new(MockCatalog::new()),
    )
    .await;

    assert_eq!(h.scheduler.tasks().await.len(), 1);
    assert_eq!(store.list(NS_DOWNLOAD_TASKS).await.unwrap().len(), 1);
}
