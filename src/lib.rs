//! Core library for the gridop disposable-cluster batch runner.
//!
//! A batch provisions a compute cluster through an external provisioning
//! tool, stages partitioned input in object storage, submits one run-once
//! task per partition to the cluster's scheduler, waits for completion, and
//! merges the results locally (provision → stage → submit → wait → collect →
//! clean up).

pub mod cluster;
pub mod config;
pub mod engine;
pub mod error;
pub mod provision;
pub mod scheduler;
pub mod settings;
pub mod staging;
pub mod test_support;
pub mod unit;

pub use cluster::{
    ClusterController, ClusterIdentity, ClusterReadyHandler, ClusterSession, ControllerOptions,
    LifecycleError, LifecycleObserver, SessionSnapshot, TransitionKind, TransitionOutcome,
};
pub use config::{ConfigError, OperatorConfig};
pub use engine::{
    BatchReport, EngineError, EngineHandoff, EngineOptions, HandoffError, HandoffReport, JobRequest,
    TaskEngine,
};
pub use error::ErrorKind;
pub use provision::{LifecycleEvent, ProcessLauncher, TokioLauncher, classify_line};
pub use scheduler::{SchedulerClient, SchedulerError, SingularityClient};
pub use settings::{PropertiesSettings, SettingsError, SettingsStore};
pub use staging::{StagingError, StagingStore, SwiftStore};
pub use unit::{BlastpUnit, WorkUnit, WorkUnitError, WorkUnitRegistry};
