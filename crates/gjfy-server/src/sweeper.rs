//! Periodic removal of secrets whose validity window has closed.
//!
//! Reads and consumes already hide expired secrets on their own; the sweep
//! only reclaims the memory of records nobody asked for again.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::store::SecretStore;

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Handle to the background sweep task.
///
/// Dropping the handle stops the task right away without waiting for it;
/// [`Sweeper::shutdown`] stops it and waits for it to finish.
pub struct Sweeper {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Sweeper {
    /// Spawn a Tokio task that sweeps `store` every `interval`.
    /// The first sweep happens one full interval after spawning.
    pub fn spawn(store: SecretStore, interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run(store, interval, shutdown_rx));
        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Signal the task to stop and wait until it has.
    pub async fn shutdown(self) {
        // The receiver is gone only if the task already ended.
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "sweeper task ended abnormally");
        }
    }
}

async fn run(store: SecretStore, interval: Duration, mut shutdown_rx: watch::Receiver<bool>) {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await; // skip first immediate tick

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                sweep_once(&store);
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    debug!("sweeper stopped");
                    break;
                }
            }
        }
    }
}

/// Run one sweep. A panic inside the sweep is logged and swallowed so the
/// next tick still runs.
pub fn sweep_once(store: &SecretStore) -> usize {
    debug!("checking expiration");
    let now = store.now();
    match std::panic::catch_unwind(AssertUnwindSafe(|| store.sweep_expired(now))) {
        Ok(removed) => {
            for id in &removed {
                info!(id = %id, "secret expired");
            }
            if !removed.is_empty() {
                info!(removed = removed.len(), remaining = store.len(), "expiry sweep done");
            }
            removed.len()
        }
        Err(_) => {
            error!("expiry sweep panicked; retrying next interval");
            0
        }
    }
}
