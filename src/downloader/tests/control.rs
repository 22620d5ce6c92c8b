use super::*;
use crate::error::DownloadError;

fn assert_invalid_state(result: Result<()>, operation: &str) {
    match result {
        Err(Error::Download(DownloadError::InvalidState {
            operation: op, ..
        })) => assert_eq!(op, operation),
        other => panic!("expected InvalidState for {operation}, got {other:?}"),
    }
}

#[tokio::test]
async fn test_pause_pending_download_is_invalid() {
    let h = create_test_scheduler().await;
    let id = h
        .scheduler
        .enqueue(DownloadRequest::new(video("1")))
        .await
        .unwrap();

    assert_invalid_state(h.scheduler.pause(id).await, "pause");
    assert_eq!(
        h.scheduler.task(id).await.unwrap().status,
        TaskStatus::Pending
    );
}

#[tokio::test]
async fn test_pause_active_download_and_resume() {
    let h = create_test_scheduler().await;
    h.catalog
        .add_item_with(&video("1"), b"0123456789", StreamBehavior::Hang);
    h.scheduler.start_queue_processor();

    let id = h
        .scheduler
        .enqueue(DownloadRequest::new(video("1")))
        .await
        .unwrap();
    wait_for_task(&h.scheduler, id, |t| {
        t.status == TaskStatus::Active && t.transferred_bytes > 0
    })
    .await;

    h.scheduler.pause(id).await.unwrap();
    let paused = h.scheduler.task(id).await.unwrap();
    assert_eq!(paused.status, TaskStatus::Paused);
    assert_eq!(paused.transferred_bytes, 0);

    let storage_dir = h.scheduler.config.storage_dir.clone();
    wait_until("partial file cleanup", || {
        let dir = storage_dir.clone();
        async move { part_files(&dir).is_empty() }
    })
    .await;

    // Only an active task can be paused
    assert_invalid_state(h.scheduler.pause(id).await, "pause");
    assert_eq!(h.scheduler.task(id).await.unwrap().status, TaskStatus::Paused);

    h.scheduler.resume(id).await.unwrap();
    wait_for_status(&h.scheduler, id, TaskStatus::Active).await;
    assert_eq!(h.catalog.opens(), 2, "resumed task restarts its transfer");
}

#[tokio::test]
async fn test_paused_download_frees_its_slot() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_download_config(dir.path());
    config.max_concurrent_downloads = 1;
    let h = create_test_scheduler_with(
        dir,
        config,
        StorageBudget::default(),
        Arc::new(crate::db::MemoryStore::new()),
        Arc::new(MockCatalog::new()),
    )
    .await;
    h.catalog
        .add_item_with(&video("slow"), b"0123456789", StreamBehavior::Hang);
    h.catalog.add_item(&video("next"), b"abc");
    h.scheduler.start_queue_processor();

    let slow = h
        .scheduler
        .enqueue(DownloadRequest::new(video("slow")))
        .await
        .unwrap();
    wait_for_status(&h.scheduler, slow, TaskStatus::Active).await;
    let next = h
        .scheduler
        .enqueue(DownloadRequest::new(video("next")))
        .await
        .unwrap();

    h.scheduler.pause(slow).await.unwrap();
    wait_for_status(&h.scheduler, next, TaskStatus::Completed).await;
}

#[tokio::test]
async fn test_resume_requires_paused() {
    let h = create_test_scheduler().await;
    let id = h
        .scheduler
        .enqueue(DownloadRequest::new(video("1")))
        .await
        .unwrap();

    assert_invalid_state(h.scheduler.resume(id).await, "resume");
}

#[tokio::test]
async fn test_cancel_pending_removes_task() {
    let mut h = create_test_scheduler().await;
    let id = h
        .scheduler
        .enqueue(DownloadRequest::new(video("1")))
        .await
        .unwrap();

    h.scheduler.cancel(id).await.unwrap();

    assert!(h.scheduler.task(id).await.is_none());
    assert!(
        h.store
            .list(crate::db::NS_DOWNLOAD_TASKS)
            .await
            .unwrap()
            .is_empty()
    );

    let mut removed = false;
    while let Ok(event) = h.events.try_recv() {
        if matches!(event, Event::Removed { task_id } if task_id == id) {
            removed = true;
        }
    }
    assert!(removed, "cancel should emit Removed");
}

#[tokio::test]
async fn test_cancel_active_download_cleans_partial_file() {
    let h = create_test_scheduler().await;
    h.catalog
        .add_item_with(&video("1"), b"0123456789", StreamBehavior::Hang);
    h.scheduler.start_queue_processor();

    let id = h
        .scheduler
        .enqueue(DownloadRequest::new(video("1")))
        .await
        .unwrap();
    wait_for_task(&h.scheduler, id, |t| t.transferred_bytes > 0).await;

    let storage_dir = h.scheduler.config.storage_dir.clone();
    assert_eq!(part_files(&storage_dir).len(), 1);

    h.scheduler.cancel(id).await.unwrap();
    assert!(h.scheduler.task(id).await.is_none());

    wait_until("partial file cleanup", || {
        let dir = storage_dir.clone();
        async move { part_files(&dir).is_empty() }
    })
    .await;
    assert!(h.ledger.get(&video("1")).await.is_none());
}

#[tokio::test]
async fn test_completed_task_is_dismissed_not_cancelled() {
    let h = create_test_scheduler().await;
    h.catalog.add_item(&video("1"), b"0123456789");
    h.scheduler.start_queue_processor();

    let id = h
        .scheduler
        .enqueue(DownloadRequest::new(video("1")))
        .await
        .unwrap();
    wait_for_status(&h.scheduler, id, TaskStatus::Completed).await;

    assert_invalid_state(h.scheduler.cancel(id).await, "cancel");
    h.scheduler.dismiss(id).await.unwrap();
    assert!(h.scheduler.task(id).await.is_none());
    assert!(
        h.ledger.get(&video("1")).await.is_some(),
        "dismissing a task keeps its content"
    );
}

#[tokio::test]
async fn test_dismiss_live_task_is_invalid() {
    let h = create_test_scheduler().await;
    let id = h
        .scheduler
        .enqueue(DownloadRequest::new(video("1")))
        .await
        .unwrap();

    assert_invalid_state(h.scheduler.dismiss(id).await, "dismiss");
}

#[tokio::test]
async fn test_retry_terminally_failed_task() {
    let h = create_test_scheduler().await;
    h.scheduler.start_queue_processor();

    // Unknown content fails with a non-retryable NotFound
    let id = h
        .scheduler
        .enqueue(DownloadRequest::new(video("late")))
        .await
        .unwrap();
    let failed = wait_for_task(&h.scheduler, id, |t| t.is_terminally_failed()).await;
    assert_eq!(failed.last_error_code.as_deref(), Some("catalog_not_found"));

    h.catalog.add_item(&video("late"), b"now available");
    h.scheduler.retry(id).await.unwrap();

    let done = wait_for_status(&h.scheduler, id, TaskStatus::Completed).await;
    assert_eq!(done.attempts, 0);
    assert_eq!(done.last_error, None);
}

#[tokio::test]
async fn test_retry_requires_terminal_failure() {
    let h = create_test_scheduler().await;
    let id = h
        .scheduler
        .enqueue(DownloadRequest::new(video("1")))
        .await
        .unwrap();

    assert_invalid_state(h.scheduler.retry(id).await, "retry");
}

#[tokio::test]
async fn test_control_of_unknown_task_is_not_found() {
    let h = create_test_scheduler().await;

    for result in [
        h.scheduler.pause(TaskId(99)).await,
        h.scheduler.resume(TaskId(99)).await,
        h.scheduler.cancel(TaskId(99)).await,
        h.scheduler.dismiss(TaskId(99)).await,
    ] {
        assert!(matches!(
            result,
            Err(Error::Download(DownloadError::NotFound { id: TaskId(99) }))
        ));
    }
}
