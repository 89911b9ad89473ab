//! Update poller
//!
//! The single component that forces ranking rebuilds for the sake of
//! broadcasting. On every wake-up (a fixed cadence tick or a change
//! nudge from the registry) it checks cache validity, rebuilds when
//! stale, and hands non-empty rankings to the broadcast hub. Many
//! mutations between two wake-ups coalesce into one rebuild and one
//! broadcast.

use crate::api::hub::BroadcastHub;
use crate::storage::DocumentRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// Run the poller until shutdown is signaled or the registry's update
/// channel disconnects
pub async fn run(
    registry: Arc<DocumentRegistry>,
    hub: Arc<BroadcastHub>,
    update_rx: flume::Receiver<()>,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            nudge = update_rx.recv_async() => {
                if nudge.is_err() {
                    break;
                }
            }
            _ = shutdown.changed() => break,
        }

        if !registry.ranking_invalid() {
            continue;
        }
        let ranking = registry.ranking();
        if ranking.is_empty() {
            continue;
        }
        debug!(documents = ranking.len(), "ranking changed, broadcasting");
        hub.broadcast_ranking(&ranking);
    }
}
