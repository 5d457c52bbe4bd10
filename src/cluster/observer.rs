//! Notification hooks fired by the provisioning watcher.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};

use super::session::ClusterIdentity;

/// Kind of lifecycle transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionKind {
    /// Cluster creation.
    Provision,
    /// Cluster teardown.
    Teardown,
}

/// Summary of a finished transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionOutcome {
    /// Which transition finished.
    pub kind: TransitionKind,
    /// `true` when the master became ready, was not invalidated later in
    /// the same transition, and the cluster identifier is known.
    pub master_ready: bool,
}

/// Receives lifecycle notifications. Every method defaults to a no-op.
///
/// Callbacks run on the watcher task and must not block.
pub trait LifecycleObserver: Send + Sync {
    /// The master is reachable, so the cluster can now be stopped.
    fn on_stop_available(&self) {}

    /// No cluster is held any more, so settings may be edited again.
    fn on_settings_unlocked(&self) {}

    /// A transition finished and the lifecycle lock has been released.
    fn on_transition_finished(&self, _outcome: &TransitionOutcome) {}
}

/// Boxed future returned by [`ClusterReadyHandler`].
pub type ReadyFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Receives the cluster once provisioning reports a reachable master.
///
/// The handler runs on its own task after the lifecycle lock is released,
/// so it may call back into the controller (for example to stop the
/// cluster once work is done).
pub trait ClusterReadyHandler: Send + Sync + 'static {
    /// Called once per successful provisioning transition.
    fn cluster_ready(&self, identity: ClusterIdentity) -> ReadyFuture<'_>;
}

/// Registered observers.
#[derive(Clone, Default)]
pub(crate) struct ObserverSet {
    observers: Arc<RwLock<Vec<Arc<dyn LifecycleObserver>>>>,
}

impl ObserverSet {
    pub(crate) fn register(&self, observer: Arc<dyn LifecycleObserver>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    fn each(&self, notify: impl Fn(&dyn LifecycleObserver)) {
        let observers = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for observer in &observers {
            notify(observer.as_ref());
        }
    }

    pub(crate) fn stop_available(&self) {
        self.each(|observer| observer.on_stop_available());
    }

    pub(crate) fn settings_unlocked(&self) {
        self.each(|observer| observer.on_settings_unlocked());
    }

    pub(crate) fn transition_finished(&self, outcome: &TransitionOutcome) {
        self.each(|observer| observer.on_transition_finished(outcome));
    }
}
