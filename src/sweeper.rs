//! Background eviction of idle visitors.
//!
//! One sweeper per registry. The task wakes on a fixed interval, takes
//! the registry's write lock once, and drops every entry idle longer
//! than the configured expiry, bounding memory growth under
//! high-cardinality traffic.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::visitors::VisitorRegistry;

/// Handle to a running sweeper task.
///
/// The handle owns the task's lifecycle: dropping it stops the sweeper
/// too, but only [`SweeperHandle::shutdown`] waits for the task to exit.
pub struct SweeperHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signals the sweeper to stop and waits for the task to exit.
    ///
    /// After this returns, no further evictions happen and the registry's
    /// sweeper slot is free again.
    pub async fn shutdown(self) {
        let _ = self.stop.send(());
        let _ = self.task.await;
    }
}

/// Spawns the sweeper for `registry`.
///
/// Returns `None` if the registry already has a running sweeper: a
/// duplicate would only add lock contention, so repeated spawns are
/// refused rather than stacked.
pub fn spawn(
    registry: Arc<VisitorRegistry>,
    interval: Duration,
    expiry: Duration,
) -> Option<SweeperHandle> {
    if !registry.claim_sweeper() {
        warn!("sweeper already running for this registry, not starting another");
        return None;
    }

    let (stop, mut stopped) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        debug!(?interval, ?expiry, "sweeper started");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // An interval's first tick completes immediately; consume it so
        // the first sweep lands one full interval after startup.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let before = registry.len();
                    let removed = registry.remove_stale(expiry);
                    if removed > 0 {
                        info!(
                            before,
                            after = before - removed,
                            removed,
                            "evicted idle visitors"
                        );
                    }
                }
                _ = &mut stopped => break,
            }
        }

        registry.release_sweeper();
        debug!("sweeper stopped");
    });

    Some(SweeperHandle { stop, task })
}
