//! Recording lifecycle observer and ready handler.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use super::lock;
use crate::cluster::{
    ClusterIdentity, ClusterReadyHandler, LifecycleObserver, ReadyFuture, TransitionOutcome,
};

const WAIT_LIMIT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct ObserverCounts {
    stop_available: usize,
    settings_unlocked: usize,
}

/// Observer that counts notifications and queues finished transitions.
pub struct RecordingObserver {
    counts: Mutex<ObserverCounts>,
    finished_tx: mpsc::UnboundedSender<TransitionOutcome>,
    finished_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<TransitionOutcome>>,
}

impl RecordingObserver {
    /// Creates an observer ready to be registered.
    #[must_use]
    pub fn new() -> Arc<Self> {
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            counts: Mutex::default(),
            finished_tx,
            finished_rx: tokio::sync::Mutex::new(finished_rx),
        })
    }

    /// Number of stop-available notifications.
    #[must_use]
    pub fn stop_available(&self) -> usize {
        lock(&self.counts).stop_available
    }

    /// Number of settings-unlocked notifications.
    #[must_use]
    pub fn settings_unlocked(&self) -> usize {
        lock(&self.counts).settings_unlocked
    }

    /// Waits up to five seconds for the next finished transition.
    pub async fn next_finished(&self) -> Option<TransitionOutcome> {
        let mut rx = self.finished_rx.lock().await;
        tokio::time::timeout(WAIT_LIMIT, rx.recv())
            .await
            .ok()
            .flatten()
    }
}

impl LifecycleObserver for RecordingObserver {
    fn on_stop_available(&self) {
        lock(&self.counts).stop_available += 1;
    }

    fn on_settings_unlocked(&self) {
        lock(&self.counts).settings_unlocked += 1;
    }

    fn on_transition_finished(&self, outcome: &TransitionOutcome) {
        self.finished_tx.send(outcome.clone()).ok();
    }
}

/// Ready handler that records every hand-off.
pub struct RecordingReadyHandler {
    tx: mpsc::UnboundedSender<ClusterIdentity>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<ClusterIdentity>>,
}

impl RecordingReadyHandler {
    /// Creates a handler ready to be passed to the controller.
    #[must_use]
    pub fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            tx,
            rx: tokio::sync::Mutex::new(rx),
        })
    }

    /// Waits up to five seconds for the next hand-off.
    pub async fn next_ready(&self) -> Option<ClusterIdentity> {
        let mut rx = self.rx.lock().await;
        tokio::time::timeout(WAIT_LIMIT, rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Returns a hand-off if one is already queued.
    pub async fn try_ready(&self) -> Option<ClusterIdentity> {
        self.rx.lock().await.try_recv().ok()
    }
}

impl ClusterReadyHandler for RecordingReadyHandler {
    fn cluster_ready(&self, identity: ClusterIdentity) -> ReadyFuture<'_> {
        Box::pin(async move {
            self.tx.send(identity).ok();
        })
    }
}
