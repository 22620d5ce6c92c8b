//! Download finalization: record content in the ledger and set final status.

use crate::catalog::ContentDescriptor;
use crate::error::Result;
use crate::ledger::remove_file_if_present;
use crate::retry::with_retry;
use crate::types::{ContentRecord, Event, TaskStatus};
use chrono::Utc;
use std::path::Path;

use super::super::DownloadScheduler;
use super::context::DownloadTaskContext;

/// Directory (relative to the storage root) holding thumbnails
const THUMBNAIL_DIR: &str = "thumbnails";

/// Move the finished file into place, record it and mark the task completed
///
/// Runs under the tasks lock so a concurrent pause or cancel either happens
/// entirely before (and the run is discarded) or entirely after. Returns
/// `Ok(false)` when the run no longer owns its task; the caller then discards
/// the partial file.
pub(super) async fn finalize_download(
    ctx: &DownloadTaskContext,
    descriptor: &ContentDescriptor,
    part_path: &Path,
    bytes: u64,
) -> Result<bool> {
    let scheduler = &ctx.scheduler;
    let mut tasks = scheduler.queue_state.tasks.lock().await;
    if !ctx.owns_task().await {
        return Ok(false);
    }

    let final_path = part_path.with_file_name(format!(
        "{}.{}",
        ctx.target.file_stem(),
        descriptor.file_extension()
    ));
    tokio::fs::rename(part_path, &final_path).await?;

    let now = Utc::now();
    let record = ContentRecord {
        id: ctx.target.clone(),
        title: descriptor.title.clone(),
        byte_size: bytes,
        storage_path: final_path.clone(),
        thumbnail_path: None,
        downloaded_at: now,
        last_accessed_at: now,
        is_complete: true,
        expires_at: descriptor.expires_at,
    };

    if let Err(e) = scheduler.ledger.record(record).await {
        // The file may have replaced an earlier copy at the same path
        remove_file_if_present(&final_path).await;
        if scheduler
            .ledger
            .get(&ctx.target)
            .await
            .is_some_and(|r| r.storage_path == final_path)
        {
            scheduler.ledger.evict(&ctx.target).await?;
        }
        return Err(e);
    }

    let Some(task) = tasks.get_mut(&ctx.id) else {
        return Ok(false);
    };
    task.status = TaskStatus::Completed;
    task.total_bytes = bytes;
    task.transferred_bytes = bytes;
    task.last_error = None;
    task.last_error_code = None;
    task.retry_at = None;
    let snapshot = task.clone();

    scheduler.detach_active(ctx.id, &ctx.target).await;
    // The ledger is authoritative; a lost status write is reconciled on restore
    if let Err(e) = scheduler.persist_and_report(&snapshot).await {
        tracing::error!(task_id = ctx.id.0, error = %e, "Failed to persist completed task");
    }
    drop(tasks);

    tracing::info!(
        task_id = ctx.id.0,
        content_id = %ctx.target,
        bytes,
        "Download complete"
    );
    scheduler.emit_event(Event::Completed {
        task_id: ctx.id,
        content_id: ctx.target.clone(),
        bytes,
    });

    Ok(true)
}

/// Fetch a thumbnail in the background and attach it to the record
///
/// Best-effort: failures are logged and never affect the task.
pub(super) fn spawn_thumbnail_fetch(scheduler: DownloadScheduler, descriptor: ContentDescriptor) {
    tokio::spawn(async move {
        if let Err(e) = fetch_thumbnail(&scheduler, &descriptor).await {
            tracing::warn!(
                content_id = %descriptor.id,
                error = %e,
                "Failed to fetch thumbnail"
            );
        }
    });
}

async fn fetch_thumbnail(scheduler: &DownloadScheduler, descriptor: &ContentDescriptor) -> Result<()> {
    let retry = crate::config::RetryConfig {
        max_attempts: 1,
        ..scheduler.config.retry.clone()
    };
    let catalog = scheduler.catalog.clone();

    let Some(bytes) = with_retry(&retry, || catalog.fetch_thumbnail(descriptor)).await? else {
        return Ok(());
    };

    let dir = scheduler.config.storage_dir.join(THUMBNAIL_DIR);
    tokio::fs::create_dir_all(&dir).await?;
    let path = dir.join(format!("thumbnail_{}.jpg", descriptor.id.file_stem()));
    tokio::fs::write(&path, &bytes).await?;

    // The record may have been evicted while the thumbnail was in flight
    if !scheduler.ledger.set_thumbnail(&descriptor.id, &path).await? {
        remove_file_if_present(&path).await;
        return Ok(());
    }

    tracing::debug!(content_id = %descriptor.id, bytes = bytes.len(), "Thumbnail stored");
    Ok(())
}
