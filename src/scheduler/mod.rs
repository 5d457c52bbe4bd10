//! Remote task scheduler running on the cluster master.

mod singularity;

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

pub use singularity::SingularityClient;

/// Boxed future returned by [`SchedulerClient`] operations.
pub type SchedulerFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, SchedulerError>> + Send + 'a>>;

/// Errors raised while talking to the scheduler.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum SchedulerError {
    /// The master address does not form a valid URL.
    #[error("invalid scheduler address {address}: {message}")]
    InvalidAddress {
        /// Address as given.
        address: String,
        /// Parser error.
        message: String,
    },
    /// The request did not reach the scheduler.
    #[error("scheduler request failed: {message}")]
    Transport {
        /// Underlying client error.
        message: String,
    },
    /// The scheduler state could not be read.
    #[error("unreadable scheduler reply: {message}")]
    Decode {
        /// Parser error.
        message: String,
    },
}

/// Per-task resource request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaskResources {
    /// CPU cores.
    pub cpus: u32,
    /// Memory in megabytes.
    pub memory_mb: u32,
}

impl Default for TaskResources {
    fn default() -> Self {
        Self {
            cpus: 2,
            memory_mb: 24_000,
        }
    }
}

/// One run-once task to submit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteTaskDescriptor {
    /// Request identifier, `{job_id}{partition}`.
    pub request_id: String,
    /// Deploy identifier within the request.
    pub deploy_id: String,
    /// Resources requested for the task.
    pub resources: TaskResources,
    /// Shell command run by the task.
    pub command: String,
}

impl RemoteTaskDescriptor {
    /// Descriptor for partition `number` (one-based) of `job_id`.
    #[must_use]
    pub fn for_partition(
        job_id: &str,
        number: usize,
        command: String,
        resources: TaskResources,
    ) -> Self {
        Self {
            request_id: format!("{job_id}{number}"),
            deploy_id: String::from("1"),
            resources,
            command,
        }
    }
}

/// How the scheduler answered a submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The scheduler accepted the submission.
    Accepted,
    /// The scheduler answered with a non-success status.
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },
}

impl SubmitOutcome {
    /// Whether the submission was accepted.
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Submits run-once tasks and reports how many are still active.
pub trait SchedulerClient: Send + Sync {
    /// Registers the run-once request for `task`.
    fn submit_request<'a>(
        &'a self,
        task: &'a RemoteTaskDescriptor,
    ) -> SchedulerFuture<'a, SubmitOutcome>;

    /// Deploys the command of `task` under its request.
    fn submit_deploy<'a>(
        &'a self,
        task: &'a RemoteTaskDescriptor,
    ) -> SchedulerFuture<'a, SubmitOutcome>;

    /// Number of tasks currently running.
    fn active_tasks(&self) -> SchedulerFuture<'_, u32>;
}
