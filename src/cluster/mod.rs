//! Cluster lifecycle controller.
//!
//! The controller owns the lifecycle lock and the cluster session. Each
//! start or stop acquires the lock, persists the settings for the
//! provisioning tool, launches it, and passes the output stream (with the
//! lock permit) to the watcher task. The watcher releases the lock when the
//! stream ends, so callers observe completion through
//! [`LifecycleObserver::on_transition_finished`] rather than by awaiting
//! the call.

mod observer;
mod session;

use std::ffi::OsString;
use std::sync::Arc;

use camino::Utf8PathBuf;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use observer::{
    ClusterReadyHandler, LifecycleObserver, ReadyFuture, TransitionKind, TransitionOutcome,
};
pub(crate) use observer::ObserverSet;
pub use session::{ClusterIdentity, ClusterSession, SessionSnapshot};

use crate::error::ErrorKind;
use crate::provision::watcher::{ProvisioningWatcher, Transition};
use crate::provision::{LaunchError, LineStream, ProcessLauncher};
use crate::settings::{OPERATOR_KEY, SettingsError, SettingsStore};

/// Errors raised when a lifecycle operation is refused or cannot start.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum LifecycleError {
    /// Another transition is in flight.
    #[error("a cluster lifecycle operation is already in progress")]
    Busy,
    /// A cluster is already held.
    #[error("cluster {cluster_id} is already running")]
    AlreadyRunning {
        /// Identifier of the held cluster.
        cluster_id: String,
    },
    /// Stop was requested without a held cluster.
    #[error("no cluster is running")]
    NoCluster,
    /// The operator identity setting is absent.
    #[error("operator identity is not set: add {key} to the settings")]
    MissingOperator {
        /// Settings key holding the identity.
        key: String,
    },
    /// Settings could not be handed to the provisioning tool.
    #[error("failed to persist settings: {0}")]
    PersistSettings(#[from] SettingsError),
    /// The provisioning tool could not be started.
    #[error(transparent)]
    Launch(#[from] LaunchError),
    /// The watcher task is gone, usually after shutdown.
    #[error("the provisioning watcher has stopped")]
    WatcherStopped,
}

impl LifecycleError {
    /// Broad category of the failure.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Busy | Self::AlreadyRunning { .. } | Self::NoCluster | Self::WatcherStopped => {
                ErrorKind::LifecycleConflict
            }
            Self::MissingOperator { .. } | Self::PersistSettings(_) => {
                ErrorKind::ConfigurationInvalid
            }
            Self::Launch(_) => ErrorKind::TransportFailure,
        }
    }
}

/// Fixed inputs for every provisioning tool invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerOptions {
    /// File the settings are written to before each transition.
    pub properties_path: Utf8PathBuf,
    /// Script executed on every node once the cluster boots.
    pub exec_script: String,
}

/// Starts and stops clusters through the provisioning tool.
pub struct ClusterController<L, S: ?Sized> {
    launcher: L,
    settings: Arc<S>,
    options: ControllerOptions,
    lock: Arc<Semaphore>,
    session: Arc<watch::Sender<ClusterSession>>,
    transitions: mpsc::Sender<Transition>,
    observers: ObserverSet,
    shutdown: CancellationToken,
}

impl<L, S> ClusterController<L, S>
where
    L: ProcessLauncher,
    S: SettingsStore + ?Sized,
{
    /// Creates the controller and spawns its watcher task. `ready` is
    /// invoked whenever a provisioning transition yields a reachable master.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn spawn(
        launcher: L,
        settings: Arc<S>,
        options: ControllerOptions,
        ready: Option<Arc<dyn ClusterReadyHandler>>,
    ) -> Self {
        let (session_tx, _) = watch::channel(ClusterSession::default());
        let session = Arc::new(session_tx);
        let observers = ObserverSet::default();
        let shutdown = CancellationToken::new();
        let (transitions, transition_rx) = mpsc::channel(1);

        let watcher = ProvisioningWatcher::new(Arc::clone(&session), observers.clone(), ready);
        tokio::spawn(watcher.run(transition_rx, shutdown.clone()));

        Self {
            launcher,
            settings,
            options,
            lock: Arc::new(Semaphore::new(1)),
            session,
            transitions,
            observers,
            shutdown,
        }
    }

    /// Registers an observer for lifecycle notifications.
    pub fn subscribe(&self, observer: Arc<dyn LifecycleObserver>) {
        self.observers.register(observer);
    }

    /// Returns a receiver that sees every session change.
    #[must_use]
    pub fn watch_session(&self) -> watch::Receiver<ClusterSession> {
        self.session.subscribe()
    }

    /// Whether a transition is in flight.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.lock.available_permits() == 0
    }

    /// Current session and lock state.
    #[must_use]
    pub fn session(&self) -> SessionSnapshot {
        let session = self.session.borrow();
        SessionSnapshot {
            cluster_id: session.cluster_id.clone(),
            master_address: session.master_address.clone(),
            locked: self.is_locked(),
        }
    }

    /// Launches cluster creation. Returns once the tool is running; progress
    /// arrives through observers.
    ///
    /// # Errors
    ///
    /// Fails with [`LifecycleError::Busy`] while another transition runs,
    /// [`LifecycleError::MissingOperator`] without an operator identity,
    /// [`LifecycleError::AlreadyRunning`] when a cluster is held, and with
    /// persistence or launch errors. A refused start leaves the lock free.
    pub fn start(&self) -> Result<(), LifecycleError> {
        let permit = self.try_lock()?;
        let operator = self.operator()?;
        if let Some(cluster_id) = self.session.borrow().cluster_id.clone() {
            return Err(LifecycleError::AlreadyRunning { cluster_id });
        }
        self.settings.persist(&self.options.properties_path)?;

        let args = self.tool_args(
            &operator,
            &[
                OsString::from("-ex"),
                OsString::from(&self.options.exec_script),
                OsString::from("-c"),
            ],
        );
        let lines = self.launcher.spawn_watched(&args)?;
        info!(%operator, "cluster provisioning started");
        self.dispatch(TransitionKind::Provision, lines, permit)
    }

    /// Launches cluster teardown. With `force`, the tool is started without
    /// observation and without taking the lock; this is the shutdown path.
    ///
    /// # Errors
    ///
    /// Without `force`, fails with [`LifecycleError::Busy`] while another
    /// transition runs and [`LifecycleError::NoCluster`] when nothing is
    /// held. Launch and persistence failures are returned in both modes.
    pub fn stop(&self, force: bool) -> Result<(), LifecycleError> {
        if force {
            return self.force_stop();
        }
        let permit = self.try_lock()?;
        let cluster_id = self
            .session
            .borrow()
            .cluster_id
            .clone()
            .ok_or(LifecycleError::NoCluster)?;
        let operator = self.operator()?;
        self.settings.persist(&self.options.properties_path)?;

        let args = self.tool_args(&operator, &terminate_flag(&cluster_id));
        let lines = self.launcher.spawn_watched(&args)?;
        info!(%cluster_id, "cluster teardown started");
        self.dispatch(TransitionKind::Teardown, lines, permit)
    }

    /// Records an existing cluster so it can be stopped. Only valid while
    /// idle and not holding a cluster.
    ///
    /// # Errors
    ///
    /// Fails with [`LifecycleError::Busy`] or
    /// [`LifecycleError::AlreadyRunning`].
    pub fn adopt(&self, cluster_id: &str) -> Result<(), LifecycleError> {
        let _permit = self.try_lock()?;
        if let Some(held) = self.session.borrow().cluster_id.clone() {
            return Err(LifecycleError::AlreadyRunning { cluster_id: held });
        }
        self.session
            .send_modify(|session| session.cluster_id = Some(cluster_id.to_owned()));
        Ok(())
    }

    /// Stops watching and force-stops any held cluster. Intended for process
    /// exit.
    ///
    /// # Errors
    ///
    /// Returns launch or persistence failures from the forced stop.
    pub fn shutdown(&self) -> Result<(), LifecycleError> {
        self.shutdown.cancel();
        self.stop(true)
    }

    fn force_stop(&self) -> Result<(), LifecycleError> {
        let Some(cluster_id) = self.session.borrow().cluster_id.clone() else {
            debug!("forced stop requested without a cluster; nothing to do");
            return Ok(());
        };
        let operator = self.settings.get(OPERATOR_KEY).unwrap_or_default();
        if let Err(err) = self.settings.persist(&self.options.properties_path) {
            warn!(error = %err, "failed to refresh settings before forced stop");
        }
        let args = self.tool_args(&operator, &terminate_flag(&cluster_id));
        self.launcher.spawn_detached(&args)?;
        info!(%cluster_id, "forced cluster teardown launched");
        Ok(())
    }

    fn try_lock(&self) -> Result<OwnedSemaphorePermit, LifecycleError> {
        Arc::clone(&self.lock)
            .try_acquire_owned()
            .map_err(|err| match err {
                TryAcquireError::Closed => LifecycleError::WatcherStopped,
                TryAcquireError::NoPermits => LifecycleError::Busy,
            })
    }

    fn operator(&self) -> Result<String, LifecycleError> {
        self.settings
            .get(OPERATOR_KEY)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| LifecycleError::MissingOperator {
                key: OPERATOR_KEY.to_owned(),
            })
    }

    fn tool_args(&self, operator: &str, action: &[OsString]) -> Vec<OsString> {
        let mut args = vec![
            OsString::from("-o"),
            OsString::from(self.options.properties_path.as_str()),
            OsString::from("-u"),
            OsString::from(operator),
        ];
        args.extend_from_slice(action);
        args
    }

    fn dispatch(
        &self,
        kind: TransitionKind,
        lines: LineStream,
        permit: OwnedSemaphorePermit,
    ) -> Result<(), LifecycleError> {
        self.transitions
            .try_send(Transition {
                kind,
                lines,
                permit,
            })
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => LifecycleError::Busy,
                mpsc::error::TrySendError::Closed(_) => LifecycleError::WatcherStopped,
            })
    }
}

fn terminate_flag(cluster_id: &str) -> [OsString; 2] {
    [OsString::from("-t"), OsString::from(cluster_id)]
}
