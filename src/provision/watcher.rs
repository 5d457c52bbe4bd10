//! Consumes provisioning output, updates the session, and releases the
//! lifecycle lock when a transition ends.
//!
//! A single watcher task serves every transition. Transitions arrive on a
//! one-slot channel together with the lock permit acquired by the
//! controller, so the lock is held exactly until the stream ends.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::events::{LifecycleEvent, classify_line};
use super::launcher::LineStream;
use crate::cluster::{
    ClusterIdentity, ClusterReadyHandler, ClusterSession, ObserverSet, TransitionKind,
    TransitionOutcome,
};

/// Target used for every relayed line of tool output.
pub const PROVISIONING_LOG_TARGET: &str = "gridop::provisioning";

/// A started transition awaiting observation.
pub(crate) struct Transition {
    pub(crate) kind: TransitionKind,
    pub(crate) lines: LineStream,
    pub(crate) permit: OwnedSemaphorePermit,
}

pub(crate) struct ProvisioningWatcher {
    session: Arc<watch::Sender<ClusterSession>>,
    observers: ObserverSet,
    ready: Option<Arc<dyn ClusterReadyHandler>>,
}

/// Tracks whether the master became ready and stayed valid.
#[derive(Default)]
struct ReadinessTracker {
    master_ready: bool,
}

impl ReadinessTracker {
    fn observe(&mut self, event: &LifecycleEvent) {
        if matches!(event, LifecycleEvent::MasterReady { .. }) {
            self.master_ready = true;
        } else if event.ends_cluster() {
            self.master_ready = false;
        }
    }
}

impl ProvisioningWatcher {
    pub(crate) fn new(
        session: Arc<watch::Sender<ClusterSession>>,
        observers: ObserverSet,
        ready: Option<Arc<dyn ClusterReadyHandler>>,
    ) -> Self {
        Self {
            session,
            observers,
            ready,
        }
    }

    /// Serves transitions until the channel closes or `shutdown` fires.
    pub(crate) async fn run(
        self,
        mut transitions: mpsc::Receiver<Transition>,
        shutdown: CancellationToken,
    ) {
        loop {
            let next = tokio::select! {
                () = shutdown.cancelled() => None,
                next = transitions.recv() => next,
            };
            let Some(transition) = next else {
                break;
            };
            self.watch(transition, &shutdown).await;
        }
        debug!("provisioning watcher stopped");
    }

    async fn watch(&self, transition: Transition, shutdown: &CancellationToken) {
        let Transition {
            kind,
            mut lines,
            permit,
        } = transition;
        let mut tracker = ReadinessTracker::default();

        loop {
            let item = tokio::select! {
                () = shutdown.cancelled() => break,
                item = lines.recv() => item,
            };
            match item {
                Some(Ok(line)) => {
                    info!(target: PROVISIONING_LOG_TARGET, "{line}");
                    if let Some(event) = classify_line(&line) {
                        tracker.observe(&event);
                        self.apply(event);
                    }
                }
                Some(Err(err)) => {
                    warn!(error = %err, "failed to read provisioning output");
                    break;
                }
                None => break,
            }
        }

        let identity = self.ready_identity(&tracker);
        drop(permit);
        let outcome = TransitionOutcome {
            kind,
            master_ready: identity.is_some(),
        };
        debug!(?outcome, "transition finished");
        self.observers.transition_finished(&outcome);

        if let Some(ready) = identity.filter(|_| !shutdown.is_cancelled()) {
            self.hand_off(ready);
        }
    }

    /// Identity of a cluster whose master is ready. A master line without
    /// a creation line leaves nothing to hand off.
    fn ready_identity(&self, tracker: &ReadinessTracker) -> Option<ClusterIdentity> {
        if !tracker.master_ready {
            return None;
        }
        let identity = self.session.borrow().identity();
        if identity.is_none() {
            warn!("master ready without a cluster identifier; treating provisioning as failed");
        }
        identity
    }

    fn apply(&self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::ClusterCreated { id } => {
                info!(cluster_id = %id, "cluster created");
                self.session
                    .send_modify(|session| session.cluster_id = Some(id));
            }
            LifecycleEvent::MasterReady { address } => {
                info!(master = %address, "cluster master ready");
                self.session
                    .send_modify(|session| session.master_address = Some(address));
                self.observers.stop_available();
            }
            LifecycleEvent::ProvisionAborted => {
                warn!("provisioning aborted");
                if self.session.borrow().cluster_id.is_none() {
                    self.observers.settings_unlocked();
                }
            }
            LifecycleEvent::ClusterTerminated | LifecycleEvent::ClusterNotFound => {
                info!("cluster released");
                self.session.send_modify(ClusterSession::clear);
                self.observers.settings_unlocked();
            }
        }
    }

    fn hand_off(&self, identity: ClusterIdentity) {
        let Some(handler) = self.ready.as_ref().map(Arc::clone) else {
            return;
        };
        tokio::spawn(async move {
            handler.cluster_ready(identity).await;
        });
    }
}
