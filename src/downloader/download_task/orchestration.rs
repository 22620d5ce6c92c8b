//! Download task orchestration: top-level lifecycle of one transfer.

use crate::catalog::{ByteStream, ContentDescriptor};
use crate::config::RetryConfig;
use crate::error::{DownloadError, Error, Result};
use crate::ledger::remove_file_if_present;
use crate::retry::with_retry;
use crate::types::ContentKind;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use super::context::DownloadTaskContext;
use super::finalization::{finalize_download, spawn_thumbnail_fetch};

/// In-place retries for descriptor and stream-open calls before the task
/// itself is failed
const IN_PLACE_RETRIES: u32 = 2;

/// What a transfer run ended with
pub(super) enum TransferOutcome {
    /// All bytes are in the partial file
    Finished {
        descriptor: ContentDescriptor,
        part_path: PathBuf,
        bytes: u64,
    },
    /// Paused, cancelled or superseded; the partial file is already gone
    Cancelled,
}

/// Run one download task to completion, failure or cancellation.
pub(crate) async fn run_download_task(ctx: DownloadTaskContext) {
    let id = ctx.id;
    tracing::debug!(task_id = id.0, content_id = %ctx.target, "Transfer started");

    let outcome = match transfer(&ctx).await {
        Ok(outcome) => outcome,
        Err(e) => {
            ctx.mark_failed(&e).await;
            return;
        }
    };

    let TransferOutcome::Finished {
        descriptor,
        part_path,
        bytes,
    } = outcome
    else {
        tracing::info!(task_id = id.0, "Transfer stopped before completion");
        return;
    };

    match finalize_download(&ctx, &descriptor, &part_path, bytes).await {
        Ok(true) => {
            if wants_thumbnail(&ctx, &descriptor) {
                spawn_thumbnail_fetch(ctx.scheduler.clone(), descriptor);
            }
        }
        Ok(false) => {
            remove_file_if_present(&part_path).await;
        }
        Err(e) => {
            remove_file_if_present(&part_path).await;
            ctx.mark_failed(&e).await;
        }
    }
}

fn wants_thumbnail(ctx: &DownloadTaskContext, descriptor: &ContentDescriptor) -> bool {
    ctx.scheduler.config.fetch_thumbnails
        && descriptor.thumbnail_url.is_some()
        && matches!(ctx.target.kind, ContentKind::Video | ContentKind::Lesson)
}

/// Retry policy for calls retried in place, sharing the task's backoff delays
pub(super) fn in_place_retry(ctx: &DownloadTaskContext) -> RetryConfig {
    RetryConfig {
        max_attempts: IN_PLACE_RETRIES,
        ..ctx.scheduler.config.retry.clone()
    }
}

/// Fetch the descriptor, check the budget and stream the bytes into a partial file
async fn transfer(ctx: &DownloadTaskContext) -> Result<TransferOutcome> {
    let catalog = ctx.scheduler.catalog.clone();
    let retry = in_place_retry(ctx);

    let descriptor = tokio::select! {
        biased;
        _ = ctx.cancel_token.cancelled() => return Ok(TransferOutcome::Cancelled),
        result = with_retry(&retry, || catalog.fetch_content_descriptor(&ctx.target)) => result?,
    };
    ctx.apply_descriptor(&descriptor).await;

    // Fail before spending bandwidth on something that cannot be kept
    if descriptor.byte_size > 0 {
        ctx.scheduler
            .ledger
            .check_admission(&ctx.target, descriptor.byte_size)
            .await?;
    }

    let quality = ctx.scheduler.budget.borrow().preferred_quality;
    let stream = tokio::select! {
        biased;
        _ = ctx.cancel_token.cancelled() => return Ok(TransferOutcome::Cancelled),
        result = with_retry(&retry, || catalog.open_byte_stream(&descriptor, quality)) => result?,
    };

    let dir = ctx
        .scheduler
        .config
        .storage_dir
        .join(ctx.target.kind.directory());
    tokio::fs::create_dir_all(&dir).await?;
    let part_path = dir.join(format!("{}.{}.part", ctx.target.file_stem(), ctx.generation));

    match stream_to_file(ctx, stream, &part_path).await {
        Ok(Some(bytes)) => {
            let expected = descriptor.byte_size;
            if expected > 0 && bytes != expected {
                remove_file_if_present(&part_path).await;
                return Err(Error::Download(DownloadError::SizeMismatch {
                    id: ctx.id,
                    expected,
                    actual: bytes,
                }));
            }
            Ok(TransferOutcome::Finished {
                descriptor,
                part_path,
                bytes,
            })
        }
        Ok(None) => {
            remove_file_if_present(&part_path).await;
            Ok(TransferOutcome::Cancelled)
        }
        Err(e) => {
            remove_file_if_present(&part_path).await;
            Err(e)
        }
    }
}

/// Copy the stream into `path`, checking cancellation at every chunk
///
/// Returns the byte count, or `None` when the run was cancelled. A chunk
/// that does not arrive within the stall timeout fails the transfer.
async fn stream_to_file(
    ctx: &DownloadTaskContext,
    mut stream: ByteStream,
    path: &Path,
) -> Result<Option<u64>> {
    let stall_timeout = ctx.scheduler.config.stall_timeout;
    let mut file = tokio::fs::File::create(path).await?;
    let mut transferred: u64 = 0;

    loop {
        let next = tokio::select! {
            biased;
            _ = ctx.cancel_token.cancelled() => return Ok(None),
            next = tokio::time::timeout(stall_timeout, stream.next()) => next,
        };

        let chunk = match next {
            Err(_) => {
                return Err(Error::Download(DownloadError::Stalled {
                    id: ctx.id,
                    secs: stall_timeout.as_secs(),
                }));
            }
            Ok(None) => break,
            Ok(Some(chunk)) => chunk?,
        };

        file.write_all(&chunk).await?;
        transferred += chunk.len() as u64;

        if ctx.cancel_token.is_cancelled() || !ctx.report_progress(transferred).await {
            return Ok(None);
        }
    }

    file.flush().await?;
    file.sync_all().await?;
    Ok(Some(transferred))
}
