//! Broadcast hub
//!
//! Delivers serialized ranking snapshots to every connected observer
//! without letting a slow or dead observer block the publisher. The
//! observer set is a concurrent map of per-connection bounded buffers;
//! payloads flow through a bounded distribution mailbox drained by a
//! single fan-out loop. A full mailbox drops the payload: snapshots are
//! idempotent, the next poll supersedes a lost one.

use crate::system::metrics::Metrics;
use crate::types::DocumentRecord;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Fan-out hub over the set of connected observers
pub struct BroadcastHub {
    observers: DashMap<Uuid, mpsc::Sender<String>>,
    outbox_tx: flume::Sender<String>,
    outbox_rx: flume::Receiver<String>,
    closed: AtomicBool,
}

impl BroadcastHub {
    /// Create a hub whose distribution mailbox holds at most `buffer`
    /// pending payloads
    pub fn new(buffer: usize) -> Self {
        let (outbox_tx, outbox_rx) = flume::bounded(buffer);
        Self {
            observers: DashMap::new(),
            outbox_tx,
            outbox_rx,
            closed: AtomicBool::new(false),
        }
    }

    /// Add an observer, returning its id, or `None` once shutdown has
    /// begun. `sender` is the observer's bounded outbound buffer.
    pub fn register(&self, sender: mpsc::Sender<String>) -> Option<Uuid> {
        if self.closed.load(Ordering::Acquire) {
            return None;
        }
        let id = Uuid::new_v4();
        self.observers.insert(id, sender);
        Metrics::global().observers_connected.inc();
        info!(observer = %id, total = self.observers.len(), "observer connected");
        Some(id)
    }

    /// Remove an observer and release its buffer. Removal is terminal;
    /// unknown ids are ignored.
    pub fn unregister(&self, id: &Uuid) {
        if self.observers.remove(id).is_some() {
            Metrics::global().observers_connected.dec();
            info!(observer = %id, total = self.observers.len(), "observer disconnected");
        }
    }

    /// Number of currently connected observers
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Serialize a ranking snapshot and queue it for fan-out
    pub fn broadcast_ranking(&self, ranking: &[DocumentRecord]) {
        match serde_json::to_string(ranking) {
            Ok(payload) => self.broadcast(payload),
            Err(e) => error!("failed to serialize ranking broadcast: {e}"),
        }
    }

    /// Queue a payload for delivery to every registered observer.
    /// Never blocks: a full distribution mailbox drops the payload.
    pub fn broadcast(&self, payload: String) {
        if self.outbox_tx.try_send(payload).is_err() {
            Metrics::global().broadcasts_dropped.inc();
            debug!("distribution mailbox full, dropping ranking payload");
        }
    }

    /// Refuse further registrations. Existing observers stay connected
    /// and keep receiving broadcasts; the first step of shutdown, taken
    /// before the final snapshot flush.
    pub fn close_registrations(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Refuse further registrations and release all observer buffers
    pub fn shutdown(&self) {
        self.close_registrations();
        self.observers.clear();
    }

    /// Fan-out loop. Drains the distribution mailbox and delivers each
    /// payload to every observer with a non-blocking send; observers
    /// whose buffer is full or closed are pruned after the pass.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            let payload = tokio::select! {
                payload = self.outbox_rx.recv_async() => match payload {
                    Ok(payload) => payload,
                    Err(_) => break,
                },
                _ = shutdown.changed() => break,
            };

            let mut stale = Vec::new();
            for entry in self.observers.iter() {
                if entry.value().try_send(payload.clone()).is_err() {
                    stale.push(*entry.key());
                }
            }
            Metrics::global()
                .broadcasts_sent
                .inc_by(self.observers.len().saturating_sub(stale.len()) as u64);

            for id in stale {
                debug!(observer = %id, "observer buffer unavailable, scheduling removal");
                self.unregister(&id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DocumentRecord;
    use std::path::PathBuf;
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    fn ranking() -> Vec<DocumentRecord> {
        vec![DocumentRecord::new(
            "doc_a".to_string(),
            "a",
            1,
            PathBuf::from("uploads/doc_a_a"),
        )]
    }

    fn spawn_hub(buffer: usize) -> (Arc<BroadcastHub>, watch::Sender<bool>) {
        let hub = Arc::new(BroadcastHub::new(buffer));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(hub.clone().run(shutdown_rx));
        (hub, shutdown_tx)
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_observers() {
        let (hub, _shutdown) = spawn_hub(16);

        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        hub.register(tx1).unwrap();
        hub.register(tx2).unwrap();

        hub.broadcast_ranking(&ranking());

        let p1 = timeout(WAIT, rx1.recv()).await.unwrap().unwrap();
        let p2 = timeout(WAIT, rx2.recv()).await.unwrap().unwrap();
        assert_eq!(p1, p2);
        let decoded: Vec<DocumentRecord> = serde_json::from_str(&p1).unwrap();
        assert_eq!(decoded[0].id, "doc_a");
    }

    #[tokio::test]
    async fn test_unregister_leaves_other_observers_intact() {
        let (hub, _shutdown) = spawn_hub(16);

        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        let id1 = hub.register(tx1).unwrap();
        hub.register(tx2).unwrap();

        hub.unregister(&id1);
        assert_eq!(hub.observer_count(), 1);

        hub.broadcast_ranking(&ranking());
        assert!(timeout(WAIT, rx2.recv()).await.unwrap().is_some());
        // The unregistered observer's buffer was dropped with it.
        assert!(timeout(WAIT, rx1.recv()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dead_observer_is_pruned_on_fanout() {
        let (hub, _shutdown) = spawn_hub(16);

        let (tx, rx) = mpsc::channel(8);
        hub.register(tx).unwrap();
        drop(rx);

        hub.broadcast("payload".to_string());

        let deadline = tokio::time::Instant::now() + WAIT;
        while hub.observer_count() > 0 {
            assert!(tokio::time::Instant::now() < deadline, "dead observer never pruned");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_full_mailbox_drops_instead_of_blocking() {
        // No fan-out loop running, so the mailbox fills up.
        let hub = BroadcastHub::new(1);
        hub.broadcast("first".to_string());
        hub.broadcast("second".to_string()); // dropped, returns immediately
        hub.broadcast("third".to_string()); // dropped, returns immediately
    }

    #[tokio::test]
    async fn test_close_registrations_keeps_existing_observers() {
        let (hub, _shutdown) = spawn_hub(16);
        let (tx, mut rx) = mpsc::channel(8);
        hub.register(tx).unwrap();

        hub.close_registrations();
        let (tx2, _rx2) = mpsc::channel(8);
        assert!(hub.register(tx2).is_none());
        assert_eq!(hub.observer_count(), 1);

        // The surviving observer still receives broadcasts until the
        // buffers are released.
        hub.broadcast_ranking(&ranking());
        assert!(timeout(WAIT, rx.recv()).await.unwrap().is_some());

        hub.shutdown();
        assert_eq!(hub.observer_count(), 0);
    }

    #[tokio::test]
    async fn test_register_refused_after_shutdown() {
        let hub = BroadcastHub::new(4);
        let (tx, _rx) = mpsc::channel(8);
        assert!(hub.register(tx).is_some());

        hub.shutdown();
        assert_eq!(hub.observer_count(), 0);

        let (tx, _rx) = mpsc::channel(8);
        assert!(hub.register(tx).is_none());
    }
}
