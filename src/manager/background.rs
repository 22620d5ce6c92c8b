//! Background loop starters: connectivity debounce, download driver,
//! connectivity reaction and the sync worker.

use crate::retry::backoff_delay;

use super::OfflineManager;

/// Failed passes beyond this no longer lengthen the re-drain delay
const MAX_COUNTED_PASSES: u32 = 32;

impl OfflineManager {
    /// Spawn every background loop
    ///
    /// Calling `start` on a manager that is already running does nothing.
    pub async fn start(&self) {
        let mut handles = self.background.handles.lock().await;
        if !handles.is_empty() {
            tracing::debug!("Background loops already running");
            return;
        }

        handles.push(self.gate.start(self.background.shutdown.clone()));
        handles.push(self.scheduler.start_queue_processor());
        handles.push(self.start_connectivity_reaction());
        handles.push(self.start_sync_worker());

        tracing::info!("Offline manager started");
    }

    /// On every confirmed offline to online transition, resume the download
    /// driver and ask the sync worker for a drain
    fn start_connectivity_reaction(&self) -> tokio::task::JoinHandle<()> {
        let manager = self.clone();
        let mut transitions = self.gate.online_transitions();

        tokio::spawn(async move {
            let shutdown = manager.background.shutdown.clone();
            loop {
                let reachability = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    next = transitions.next() => match next {
                        Some(r) => r,
                        None => break,
                    },
                };

                tracing::info!(?reachability, "Back online, resuming downloads and sync");
                manager.scheduler.wake();
                manager.background.sync_trigger.notify_one();
            }
            tracing::debug!("Connectivity reaction loop stopped");
        })
    }

    /// Drain on request; after a pass that leaves entries behind, drain again
    /// on the sync backoff schedule until the queue empties or the network goes
    fn start_sync_worker(&self) -> tokio::task::JoinHandle<()> {
        let manager = self.clone();

        tokio::spawn(async move {
            let shutdown = manager.background.shutdown.clone();
            let trigger = manager.background.sync_trigger.clone();
            let retry = manager.config.sync.retry.clone();
            let mut failed_passes: u32 = 0;

            loop {
                let delay = (failed_passes > 0).then(|| backoff_delay(&retry, failed_passes));

                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = trigger.notified() => {}
                    _ = tokio::time::sleep(delay.unwrap_or_default()), if delay.is_some() => {}
                }

                if !manager.gate.is_online() {
                    failed_passes = 0;
                    continue;
                }

                match manager.sync.drain().await {
                    Ok(report) if report.remaining == 0 => failed_passes = 0,
                    Ok(report) => {
                        failed_passes = (failed_passes + 1).min(MAX_COUNTED_PASSES);
                        tracing::debug!(
                            remaining = report.remaining,
                            attempt = failed_passes,
                            "Mutations left after drain, scheduling another pass"
                        );
                    }
                    Err(e) => {
                        failed_passes = (failed_passes + 1).min(MAX_COUNTED_PASSES);
                        tracing::error!(error = %e, "Sync drain failed");
                    }
                }
            }
            tracing::debug!("Sync worker stopped");
        })
    }
}
