//! Periodic fetch of the device state into the snapshot store.
//!
//! A failed or rejected fetch never touches the store, so clients keep
//! getting the previous good snapshot until the next successful tick.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, timeout};

use crate::client::{REQUEST_TIMEOUT, TuyaClient};
use crate::store::Store;

/// Length of the body prefix included in rejection logs.
const LOG_HEAD_CHARS: usize = 40;
/// Shortest period `spawn` will schedule at.
pub const MIN_PERIOD: Duration = Duration::from_secs(1);

/// What a single collection run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectOutcome {
    /// Snapshot replaced with a payload of `bytes` bytes.
    Updated { bytes: usize },
    /// Another run was still in flight; nothing was fetched.
    Busy,
    /// The vendor could not be reached in time.
    TransportFailed,
    /// A response arrived but was not a 200 with a JSON-shaped body.
    Rejected { status: u16 },
    /// The payload was good but could not be persisted.
    StoreFailed,
}

pub struct Collector {
    client: Arc<TuyaClient>,
    store: Store,
    fetch_timeout: Duration,
    running: Mutex<()>,
}

impl Collector {
    pub fn new(client: Arc<TuyaClient>, store: Store) -> Self {
        Self {
            client,
            store,
            fetch_timeout: REQUEST_TIMEOUT,
            running: Mutex::new(()),
        }
    }

    /// Overrides the ceiling on a single upstream call.
    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    /// Fetch, validate and persist once.
    pub async fn run(&self) -> CollectOutcome {
        let Ok(_guard) = self.running.try_lock() else {
            tracing::warn!("Previous collection still running, skipping tick");
            return CollectOutcome::Busy;
        };

        let response = match timeout(self.fetch_timeout, self.client.get_device()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Device fetch failed");
                return CollectOutcome::TransportFailed;
            }
            Err(_) => {
                tracing::error!(timeout = ?self.fetch_timeout, "Device fetch timed out");
                return CollectOutcome::TransportFailed;
            }
        };

        let Some(payload) = accept(response.status, &response.body) else {
            let text = String::from_utf8_lossy(response.body.trim_ascii());
            let head: String = text.chars().take(LOG_HEAD_CHARS).collect();
            tracing::warn!(status = response.status, body_head = %head, "Ignoring upstream response");
            return CollectOutcome::Rejected {
                status: response.status,
            };
        };

        // Detached so a cancelled caller cannot abort persisting a good result.
        let bytes = payload.len();
        let store = self.store.clone();
        let write = tokio::spawn(async move { store.put(payload, Utc::now()).await });

        match write.await {
            Ok(Ok(())) => {
                tracing::info!(bytes, "Latest device snapshot updated");
                CollectOutcome::Updated { bytes }
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Failed to save snapshot");
                CollectOutcome::StoreFailed
            }
            Err(e) => {
                tracing::error!(error = %e, "Snapshot save task failed");
                CollectOutcome::StoreFailed
            }
        }
    }

    /// Runs immediately, then every `period`, until `shutdown` becomes true
    /// or its sender is dropped.
    ///
    /// Periods shorter than [`MIN_PERIOD`] are raised to it.
    pub fn spawn(self: Arc<Self>, period: Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let period = period.max(MIN_PERIOD);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

            tracing::info!(period_secs = period.as_secs(), "Collector started");

            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = tick.tick() => {
                        self.run().await;
                    }
                }
            }

            tracing::info!("Collector stopped");
        })
    }
}

/// Returns the trimmed body when the response is a 200 whose body looks like
/// JSON.
pub fn accept(status: u16, body: &[u8]) -> Option<Vec<u8>> {
    if status != 200 || !looks_like_json(body) {
        return None;
    }
    Some(body.trim_ascii().to_vec())
}

/// Cheap structural sniff: the trimmed body opens an object or an array.
/// Only the first byte is inspected.
pub fn looks_like_json(body: &[u8]) -> bool {
    matches!(body.trim_ascii().first(), Some(b'{') | Some(b'['))
}
