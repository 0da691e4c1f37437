//! Periodic slot check and ledger compaction.

use std::sync::Arc;

use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

use crate::agent::Shared;

/// Tick every `cleanupCheckIntervalMs` until the agent stops or its
/// accounting turns out to be corrupt.
pub(crate) async fn run(shared: Arc<Shared>) {
    let period = shared.settings.cleanup_check_interval();
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            () = shared.cancel.cancelled() => break,
        }
        if !shared.cleanup_tick() {
            break;
        }
    }
    debug!("cleanup scheduler stopped");
}
