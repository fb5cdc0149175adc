//! Delayed-Delete Scavenger
//!
//! Background task that finalises delayed deletes once their delay elapses.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::cache::Cache;

/// Spawns a task that sweeps due delayed deletes every `interval_secs`.
///
/// The returned handle is aborted during graceful shutdown. A failed sweep
/// is logged and the next tick tries again.
///
/// # Example
/// ```ignore
/// let cache = Arc::new(Cache::from_config(&config)?);
/// let scavenger = spawn_scavenger_task(cache.clone(), config.scavenger_interval);
/// // Later, during shutdown:
/// scavenger.abort();
/// ```
pub fn spawn_scavenger_task(cache: Arc<Cache>, interval_secs: u64) -> JoinHandle<()> {
    let period = Duration::from_secs(interval_secs.max(1));

    tokio::spawn(async move {
        info!(interval_secs, "starting delayed-delete scavenger");

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;

            match cache.process_delayed_deletes() {
                Ok(0) => debug!(pending = cache.pending_deletes(), "scavenger: nothing due"),
                Ok(removed) => info!(removed, "scavenger: delayed deletes finalised"),
                Err(err) => error!(error = %err, "scavenger sweep failed"),
            }
        }
    })
}
