//! Connectivity gate
//!
//! The platform reports raw reachability with [`ConnectivityGate::report`]. A
//! debounce loop turns those reports into a confirmed reachability that the
//! rest of the crate reads: losing the network is applied at once, while a
//! network must stay up for the confirmation window before it is declared.
//! Components needing the confirmed value hold a `watch::Receiver` from
//! [`subscribe`](ConnectivityGate::subscribe).

use crate::config::ConnectivityConfig;
use crate::types::{Event, Reachability};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Debounced network reachability
#[derive(Clone)]
pub struct ConnectivityGate {
    config: ConnectivityConfig,
    /// Latest platform report
    raw_tx: Arc<watch::Sender<Reachability>>,
    /// Reachability after debouncing
    confirmed_tx: Arc<watch::Sender<Reachability>>,
    event_tx: broadcast::Sender<Event>,
}

impl ConnectivityGate {
    /// Create a gate whose confirmed state starts at `initial`
    pub fn new(
        config: ConnectivityConfig,
        initial: Reachability,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        let (raw_tx, _) = watch::channel(initial);
        let (confirmed_tx, _) = watch::channel(initial);
        Self {
            config,
            raw_tx: Arc::new(raw_tx),
            confirmed_tx: Arc::new(confirmed_tx),
            event_tx,
        }
    }

    /// Feed a reachability report from the platform
    ///
    /// Repeats of the current raw value are ignored and do not restart the
    /// confirmation window.
    pub fn report(&self, reachability: Reachability) {
        let changed = self.raw_tx.send_if_modified(|current| {
            if *current == reachability {
                return false;
            }
            *current = reachability;
            true
        });
        if changed {
            tracing::debug!(?reachability, "Reachability reported");
        }
    }

    /// Confirmed reachability
    pub fn current(&self) -> Reachability {
        *self.confirmed_tx.borrow()
    }

    /// Whether any network is confirmed
    pub fn is_online(&self) -> bool {
        self.current().is_online()
    }

    /// Receiver of confirmed reachability changes
    pub fn subscribe(&self) -> watch::Receiver<Reachability> {
        self.confirmed_tx.subscribe()
    }

    /// Stream of confirmed offline to online transitions
    pub fn online_transitions(&self) -> OnlineTransitions {
        let rx = self.subscribe();
        let was_online = rx.borrow().is_online();
        OnlineTransitions { rx, was_online }
    }

    /// Spawn the debounce loop; it runs until `shutdown` is cancelled
    pub fn start(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let gate = self.clone();
        tokio::spawn(async move {
            gate.debounce(shutdown).await;
            tracing::debug!("Connectivity gate stopped");
        })
    }

    async fn debounce(&self, shutdown: CancellationToken) {
        let mut raw = self.raw_tx.subscribe();
        let window = self.config.confirmation_window;

        loop {
            let candidate = *raw.borrow_and_update();

            if candidate.is_online() && candidate != self.current() {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    changed = raw.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        tracing::debug!(?candidate, "Reachability changed within confirmation window");
                        continue;
                    }
                    _ = tokio::time::sleep(window) => self.publish(candidate),
                }
            } else {
                self.publish(candidate);
            }

            tokio::select! {
                _ = shutdown.cancelled() => return,
                changed = raw.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }
    }

    fn publish(&self, reachability: Reachability) {
        let changed = self.confirmed_tx.send_if_modified(|current| {
            if *current == reachability {
                return false;
            }
            *current = reachability;
            true
        });

        if changed {
            tracing::info!(?reachability, "Connectivity changed");
            self.event_tx
                .send(Event::ConnectivityChanged { reachability })
                .ok();
        }
    }
}

/// Yields each confirmed transition from offline to online
///
/// Changes between two online states (cellular to Wi-Fi) and repeated
/// online reports are not transitions.
pub struct OnlineTransitions {
    rx: watch::Receiver<Reachability>,
    was_online: bool,
}

impl OnlineTransitions {
    /// Wait for the next transition; `None` once the gate is gone
    pub async fn next(&mut self) -> Option<Reachability> {
        loop {
            self.rx.changed().await.ok()?;
            let now = *self.rx.borrow_and_update();
            let was_online = std::mem::replace(&mut self.was_online, now.is_online());
            if !was_online && now.is_online() {
                return Some(now);
            }
        }
    }
}
