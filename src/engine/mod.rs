//! Task execution engine: stage, submit, wait, collect, and clean up one
//! batch on a provisioned cluster.
//!
//! Cleanup runs after every outcome once the inputs were uploaded, and never
//! when the upload itself failed.

mod handoff;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use thiserror::Error;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use handoff::{EngineHandoff, HandoffError, HandoffReport};

use crate::error::ErrorKind;
use crate::scheduler::{
    RemoteTaskDescriptor, SchedulerClient, SchedulerError, SchedulerFuture, SubmitOutcome,
    TaskResources,
};
use crate::settings::{OPERATOR_KEY, PARTITION_COUNT_KEY, SettingsStore};
use crate::staging::{StagingError, StagingFiles, StagingStore, container_name, ensure_container};
use crate::unit::{WorkUnit, WorkUnitError};

/// Suffix appended to the input path when no destination is given.
pub const DEFAULT_RESULT_SUFFIX: &str = ".results";

/// Errors that end a batch.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum EngineError {
    /// The partition count setting is absent, not a number, or zero.
    #[error("invalid partition count {value:?}: set slave-instance-count to a positive integer")]
    InvalidPartitionCount {
        /// Raw setting value.
        value: Option<String>,
    },
    /// The operator identity is absent, so no container can be named.
    #[error("operator identity is not set")]
    MissingOperator,
    /// Local staging files could not be created.
    #[error("failed to prepare local staging files: {0}")]
    LocalFiles(#[source] StagingError),
    /// The work unit could not split the input.
    #[error("failed to partition input: {0}")]
    Partition(#[source] WorkUnitError),
    /// Inputs could not be uploaded; nothing was cleaned up.
    #[error("failed to upload inputs: {0}")]
    Upload(#[source] StagingError),
    /// The work unit could not build its commands.
    #[error("failed to build commands: {0}")]
    Commands(#[source] WorkUnitError),
    /// The work unit built the wrong number of commands.
    #[error("expected {expected} commands, got {actual}")]
    CommandCount {
        /// Partition count.
        expected: usize,
        /// Commands returned.
        actual: usize,
    },
    /// A submission did not reach the scheduler.
    #[error("failed to submit {request_id}: {source}")]
    Submit {
        /// Request being submitted.
        request_id: String,
        /// Underlying failure.
        #[source]
        source: SchedulerError,
    },
    /// The scheduler state could not be polled.
    #[error("failed to poll scheduler: {0}")]
    Poll(#[source] SchedulerError),
    /// Tasks were still active when the wait limit passed.
    #[error("tasks still active after {waited_secs}s")]
    PollTimeout {
        /// Seconds waited.
        waited_secs: u64,
    },
    /// The batch was cancelled while waiting.
    #[error("batch cancelled")]
    Cancelled,
    /// A partition output could not be downloaded.
    #[error("failed to download {object}: {source}")]
    Download {
        /// Object name.
        object: String,
        /// Underlying failure.
        #[source]
        source: StagingError,
    },
    /// Outputs could not be merged.
    #[error("failed to combine outputs: {0}")]
    Combine(#[source] WorkUnitError),
}

impl EngineError {
    /// Broad category of the failure.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidPartitionCount { .. } | Self::MissingOperator | Self::Commands(_) => {
                ErrorKind::ConfigurationInvalid
            }
            Self::Upload(_)
            | Self::Submit { .. }
            | Self::Poll(_)
            | Self::PollTimeout { .. }
            | Self::Cancelled => ErrorKind::TransportFailure,
            Self::LocalFiles(_)
            | Self::Partition(_)
            | Self::CommandCount { .. }
            | Self::Download { .. }
            | Self::Combine(_) => ErrorKind::OutputUnavailable,
        }
    }
}

/// Tunables for a batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineOptions {
    /// Delay before each scheduler poll.
    pub poll_interval: Duration,
    /// Upper bound on the completion wait.
    pub poll_timeout: Option<Duration>,
    /// Prefix of the staging container name.
    pub staging_prefix: String,
    /// Resources requested for each task.
    pub resources: TaskResources,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            poll_timeout: None,
            staging_prefix: String::from("SINGULARITY-"),
            resources: TaskResources::default(),
        }
    }
}

/// Input and destination of a batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobRequest {
    /// Input file.
    pub input: PathBuf,
    /// Where the combined result goes; defaults to `<input>.results`.
    pub destination: Option<PathBuf>,
}

impl JobRequest {
    /// Resolved destination path.
    #[must_use]
    pub fn destination(&self) -> PathBuf {
        self.destination.clone().unwrap_or_else(|| {
            let mut path = self.input.clone().into_os_string();
            path.push(DEFAULT_RESULT_SUFFIX);
            PathBuf::from(path)
        })
    }
}

/// Scheduler answers for one partition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionSubmission {
    /// Request identifier.
    pub request_id: String,
    /// Answer to the run-once request.
    pub request: SubmitOutcome,
    /// Answer to the deploy.
    pub deploy: SubmitOutcome,
}

/// Summary of a finished batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchReport {
    /// Unit identifier used as the request prefix.
    pub job_id: String,
    /// Staging container used.
    pub container: String,
    /// Per-partition submission answers.
    pub submissions: Vec<PartitionSubmission>,
    /// Combined result file.
    pub destination: PathBuf,
    /// Wall-clock time of the batch.
    pub elapsed: Duration,
    /// Cleanup failures, logged and otherwise ignored.
    pub cleanup_failures: Vec<String>,
}

/// Runs batches against one staging store and scheduler.
pub struct TaskEngine<S, C> {
    store: S,
    scheduler: C,
    settings: Arc<dyn SettingsStore>,
    options: EngineOptions,
    cancel: CancellationToken,
    scratch_dir: PathBuf,
}

impl<S, C> TaskEngine<S, C>
where
    S: StagingStore,
    C: SchedulerClient,
{
    /// Creates an engine; staging files go to the system temporary
    /// directory.
    #[must_use]
    pub fn new(
        store: S,
        scheduler: C,
        settings: Arc<dyn SettingsStore>,
        options: EngineOptions,
    ) -> Self {
        Self {
            store,
            scheduler,
            settings,
            options,
            cancel: CancellationToken::new(),
            scratch_dir: std::env::temp_dir(),
        }
    }

    /// Places local staging files in `dir`.
    #[must_use]
    pub fn with_scratch_dir(mut self, dir: PathBuf) -> Self {
        self.scratch_dir = dir;
        self
    }

    /// Uses `token` to abort the completion wait.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that aborts the completion wait when cancelled.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs one batch of `unit` over `job`.
    ///
    /// # Errors
    ///
    /// Returns the first [`EngineError`]; configuration errors are raised
    /// before any remote call.
    pub async fn run(
        &self,
        unit: &mut dyn WorkUnit,
        job: &JobRequest,
    ) -> Result<BatchReport, EngineError> {
        let started = Instant::now();
        let result = self.execute(unit, job, started).await;
        match &result {
            Ok(report) => info!(
                elapsed = %format_elapsed(report.elapsed),
                destination = %report.destination.display(),
                "batch finished"
            ),
            Err(err) => error!(error = %err, elapsed = %format_elapsed(started.elapsed()), "batch failed"),
        }
        result
    }

    async fn execute(
        &self,
        unit: &mut dyn WorkUnit,
        job: &JobRequest,
        started: Instant,
    ) -> Result<BatchReport, EngineError> {
        let partitions = self.partition_count()?;
        let operator = self
            .settings
            .get(OPERATOR_KEY)
            .filter(|value| !value.trim().is_empty())
            .ok_or(EngineError::MissingOperator)?;

        let files =
            StagingFiles::allocate(partitions, &self.scratch_dir).map_err(EngineError::LocalFiles)?;
        unit.set_output_targets(&files.output_paths());
        unit.partition(&job.input, &files.input_paths())
            .map_err(EngineError::Partition)?;

        let container = container_name(
            &self.options.staging_prefix,
            operator.trim(),
            Local::now().date_naive(),
        );
        self.upload(&container, &files).await?;

        let outcome = self.after_upload(unit, job, &container, &files).await;
        let cleanup_failures = self.cleanup(&container, &files).await;
        let submissions = outcome?;

        Ok(BatchReport {
            job_id: unit.identifier().to_owned(),
            container,
            submissions,
            destination: job.destination(),
            elapsed: started.elapsed(),
            cleanup_failures,
        })
    }

    fn partition_count(&self) -> Result<usize, EngineError> {
        let raw = self.settings.get(PARTITION_COUNT_KEY);
        let parsed = raw
            .as_deref()
            .and_then(|value| value.trim().parse::<u32>().ok())
            .filter(|count| *count > 0)
            .and_then(|count| usize::try_from(count).ok());
        parsed.ok_or(EngineError::InvalidPartitionCount { value: raw })
    }

    async fn upload(&self, container: &str, files: &StagingFiles) -> Result<(), EngineError> {
        ensure_container(&self.store, container)
            .await
            .map_err(EngineError::Upload)?;
        for file in files.inputs() {
            self.store
                .put_object(container, file.object(), file.path())
                .await
                .map_err(EngineError::Upload)?;
            debug!(object = file.object(), "uploaded partition input");
        }
        info!(%container, partitions = files.len(), "inputs staged");
        Ok(())
    }

    async fn after_upload(
        &self,
        unit: &dyn WorkUnit,
        job: &JobRequest,
        container: &str,
        files: &StagingFiles,
    ) -> Result<Vec<PartitionSubmission>, EngineError> {
        let commands = unit.build_commands(container).map_err(EngineError::Commands)?;
        if commands.len() != files.len() {
            return Err(EngineError::CommandCount {
                expected: files.len(),
                actual: commands.len(),
            });
        }
        let submissions = self.submit_all(unit.identifier(), commands).await?;
        self.wait_for_completion().await?;
        self.download(container, files).await?;
        unit.combine(&job.destination(), &files.output_paths())
            .map_err(EngineError::Combine)?;
        Ok(submissions)
    }

    async fn submit_all(
        &self,
        job_id: &str,
        commands: Vec<String>,
    ) -> Result<Vec<PartitionSubmission>, EngineError> {
        let mut submissions = Vec::with_capacity(commands.len());
        for (index, command) in commands.into_iter().enumerate() {
            let task = RemoteTaskDescriptor::for_partition(
                job_id,
                index + 1,
                command,
                self.options.resources,
            );
            let request = self.submit_step(&task, self.scheduler.submit_request(&task)).await?;
            let deploy = self.submit_step(&task, self.scheduler.submit_deploy(&task)).await?;
            submissions.push(PartitionSubmission {
                request_id: task.request_id,
                request,
                deploy,
            });
        }
        info!(tasks = submissions.len(), "tasks submitted");
        Ok(submissions)
    }

    async fn submit_step(
        &self,
        task: &RemoteTaskDescriptor,
        call: SchedulerFuture<'_, SubmitOutcome>,
    ) -> Result<SubmitOutcome, EngineError> {
        let outcome = call.await.map_err(|source| EngineError::Submit {
            request_id: task.request_id.clone(),
            source,
        })?;
        if let SubmitOutcome::Rejected { status, body } = &outcome {
            warn!(request_id = %task.request_id, status, %body, "scheduler rejected submission");
        }
        Ok(outcome)
    }

    async fn wait_for_completion(&self) -> Result<(), EngineError> {
        let started = Instant::now();
        let deadline = self.options.poll_timeout.map(|limit| started + limit);
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => return Err(EngineError::Cancelled),
                () = sleep(self.options.poll_interval) => {}
            }
            let active = self.scheduler.active_tasks().await.map_err(EngineError::Poll)?;
            if active == 0 {
                info!(waited = %format_elapsed(started.elapsed()), "all tasks finished");
                return Ok(());
            }
            debug!(active, "tasks still running");
            if deadline.is_some_and(|limit| Instant::now() >= limit) {
                return Err(EngineError::PollTimeout {
                    waited_secs: started.elapsed().as_secs(),
                });
            }
        }
    }

    async fn download(&self, container: &str, files: &StagingFiles) -> Result<(), EngineError> {
        for file in files.outputs() {
            self.store
                .get_object(container, file.object(), file.path())
                .await
                .map_err(|source| EngineError::Download {
                    object: file.object().to_owned(),
                    source,
                })?;
        }
        Ok(())
    }

    async fn cleanup(&self, container: &str, files: &StagingFiles) -> Vec<String> {
        let mut failures = Vec::new();
        for file in files.inputs().iter().chain(files.outputs()) {
            if let Err(err) = self.store.delete_object(container, file.object()).await {
                warn!(object = file.object(), error = %err, "failed to delete staged object");
                failures.push(err.to_string());
            }
        }
        if let Err(err) = self.store.delete_container(container).await {
            warn!(%container, error = %err, "failed to delete staging container");
            failures.push(err.to_string());
        }
        failures
    }
}

/// Formats `elapsed` as `HH:MM:SS`.
#[must_use]
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let hours = total.div_euclid(3600);
    let minutes = total.rem_euclid(3600).div_euclid(60);
    let seconds = total.rem_euclid(60);
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}
