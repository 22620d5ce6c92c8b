//! Drain passes: sequential delivery with coalescing of concurrent requests.

use super::SyncQueue;
use crate::config::DeliveryOrdering;
use crate::db::records;
use crate::error::{Error, Result, SyncError};
use crate::types::{DrainReport, Event, SyncEntry};
use chrono::Utc;
use tokio::sync::watch;

impl SyncQueue {
    /// Attempt delivery of every pending entry in enqueue order
    ///
    /// Entries are delivered one at a time. A delivered entry is removed. A
    /// failed entry has its attempt count raised; once the count reaches the
    /// configured ceiling the entry is evicted and reported with
    /// [`Event::SyncEntryEvicted`]. Under [`DeliveryOrdering::Strict`] the pass
    /// stops at the first failure that leaves an entry queued; under
    /// [`DeliveryOrdering::BestEffort`] it carries on with the next entry.
    ///
    /// A call made while a pass is already running does not start a second
    /// one; it waits for the running pass and returns its report.
    pub async fn drain(&self) -> Result<DrainReport> {
        let tx = {
            let mut in_flight = self.in_flight.lock().await;
            // A dropped sender means that pass was abandoned mid-way
            let running = in_flight
                .as_ref()
                .filter(|rx| rx.has_changed().is_ok())
                .cloned();
            if let Some(rx) = running {
                drop(in_flight);
                return wait_for_report(rx).await;
            }

            let (tx, rx) = watch::channel(None);
            *in_flight = Some(rx);
            tx
        };

        let result = self.drain_pass().await;
        *self.in_flight.lock().await = None;

        let report = result?;
        tx.send(Some(report.clone())).ok();
        self.emit_event(Event::DrainFinished(report.clone()));
        Ok(report)
    }

    async fn drain_pass(&self) -> Result<DrainReport> {
        let pending = self.entries().await;
        let mut report = DrainReport::default();

        if !pending.is_empty() {
            tracing::info!(pending = pending.len(), "Draining sync queue");
        }

        for entry in pending {
            match self.catalog.submit_mutation(&entry.payload).await {
                Ok(ack) => {
                    records::remove::<SyncEntry>(self.store.as_ref(), &entry.id.key()).await?;
                    self.entries.lock().await.remove(&entry.id);
                    report.delivered += 1;

                    tracing::debug!(entry_id = entry.id.0, ack = ?ack.id, "Mutation delivered");
                    self.emit_event(Event::SyncDelivered { entry_id: entry.id });
                }
                Err(e) => {
                    let kept = self.record_failure(entry, e.to_string()).await?;
                    if kept {
                        if self.config.ordering == DeliveryOrdering::Strict {
                            break;
                        }
                    } else {
                        report.evicted += 1;
                    }
                }
            }
        }

        report.remaining = self.len().await;
        tracing::info!(
            delivered = report.delivered,
            remaining = report.remaining,
            evicted = report.evicted,
            "Sync drain finished"
        );
        Ok(report)
    }

    /// Count a failed attempt; returns whether the entry stays queued
    async fn record_failure(&self, mut entry: SyncEntry, error: String) -> Result<bool> {
        entry.attempt_count += 1;
        entry.last_attempt_at = Some(Utc::now());
        entry.last_error = Some(error.clone());

        if entry.attempt_count >= self.config.max_delivery_attempts {
            records::remove::<SyncEntry>(self.store.as_ref(), &entry.id.key()).await?;
            self.entries.lock().await.remove(&entry.id);

            let failure = SyncError::PermanentDeliveryFailure {
                entry_id: entry.id,
                attempts: entry.attempt_count,
                last_error: error.clone(),
            };
            tracing::error!(
                entry_id = entry.id.0,
                attempts = entry.attempt_count,
                error = %failure,
                "Evicting undeliverable mutation"
            );
            self.emit_event(Event::SyncEntryEvicted {
                entry_id: entry.id,
                attempts: entry.attempt_count,
                error,
            });
            return Ok(false);
        }

        tracing::warn!(
            entry_id = entry.id.0,
            attempt = entry.attempt_count,
            error = %error,
            "Mutation delivery failed"
        );
        records::save(self.store.as_ref(), &entry).await?;
        self.entries.lock().await.insert(entry.id, entry);
        Ok(true)
    }
}

async fn wait_for_report(mut rx: watch::Receiver<Option<DrainReport>>) -> Result<DrainReport> {
    tracing::debug!("Drain already running, waiting for its report");
    let report = rx
        .wait_for(Option::is_some)
        .await
        .map_err(|_| Error::Other("drain pass ended without a report".to_string()))?;
    Ok(report.clone().unwrap_or_default())
}
