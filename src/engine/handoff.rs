//! Runs a batch when the cluster controller reports a ready master.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{BatchReport, EngineError, EngineOptions, JobRequest, TaskEngine};
use crate::cluster::{ClusterIdentity, ClusterReadyHandler, ReadyFuture};
use crate::error::ErrorKind;
use crate::scheduler::{SchedulerError, SingularityClient};
use crate::settings::SettingsStore;
use crate::staging::{StagingCredentials, StagingError, SwiftStore};
use crate::unit::{WorkUnitError, WorkUnitRegistry};

/// Failures before or during a handed-off batch.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum HandoffError {
    /// The work unit could not be built.
    #[error(transparent)]
    Unit(#[from] WorkUnitError),
    /// Staging credentials are incomplete.
    #[error("staging credentials are incomplete: {0}")]
    Credentials(#[from] crate::settings::SettingsError),
    /// The scheduler address is unusable.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    /// The staging client could not be created.
    #[error(transparent)]
    Staging(#[from] StagingError),
    /// The batch failed.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl HandoffError {
    /// Broad category of the failure.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Unit(_) | Self::Credentials(_) => ErrorKind::ConfigurationInvalid,
            Self::Scheduler(_) | Self::Staging(_) => ErrorKind::TransportFailure,
            Self::Engine(err) => err.kind(),
        }
    }
}

/// Result of one hand-off.
#[derive(Debug)]
pub struct HandoffReport {
    /// Cluster the batch ran on.
    pub identity: ClusterIdentity,
    /// Batch outcome.
    pub result: Result<BatchReport, HandoffError>,
}

/// Ready handler that runs one batch per ready cluster against Swift and
/// Singularity, and publishes the outcome on a channel.
pub struct EngineHandoff {
    registry: Arc<WorkUnitRegistry>,
    unit_name: String,
    job: JobRequest,
    settings: Arc<dyn SettingsStore>,
    options: EngineOptions,
    scheduler_port: u16,
    cancel: CancellationToken,
    reports: mpsc::UnboundedSender<HandoffReport>,
}

impl EngineHandoff {
    /// Creates the handler and the receiver for its reports.
    #[must_use]
    pub fn new(
        registry: Arc<WorkUnitRegistry>,
        unit_name: &str,
        job: JobRequest,
        settings: Arc<dyn SettingsStore>,
        options: EngineOptions,
        scheduler_port: u16,
    ) -> (Self, mpsc::UnboundedReceiver<HandoffReport>) {
        let (reports, receiver) = mpsc::unbounded_channel();
        let handoff = Self {
            registry,
            unit_name: unit_name.to_owned(),
            job,
            settings,
            options,
            scheduler_port,
            cancel: CancellationToken::new(),
            reports,
        };
        (handoff, receiver)
    }

    /// Token that aborts a running batch's completion wait.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    async fn run_batch(&self, identity: &ClusterIdentity) -> Result<BatchReport, HandoffError> {
        let mut unit = self.registry.create(&self.unit_name, self.settings.as_ref())?;
        let credentials = StagingCredentials::from_settings(self.settings.as_ref())?;
        let scheduler = SingularityClient::new(&identity.master_address, self.scheduler_port)?;
        info!(
            cluster_id = %identity.cluster_id,
            scheduler = scheduler.base_url(),
            unit = unit.identifier(),
            "starting batch"
        );
        let engine = TaskEngine::new(
            SwiftStore::new(credentials)?,
            scheduler,
            Arc::clone(&self.settings),
            self.options.clone(),
        )
        .with_cancellation(self.cancel.clone());
        Ok(engine.run(unit.as_mut(), &self.job).await?)
    }
}

impl ClusterReadyHandler for EngineHandoff {
    fn cluster_ready(&self, identity: ClusterIdentity) -> ReadyFuture<'_> {
        Box::pin(async move {
            let result = self.run_batch(&identity).await;
            self.reports.send(HandoffReport { identity, result }).ok();
        })
    }
}
