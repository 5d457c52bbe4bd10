//! Binary entry point for the gridop CLI.

mod cli;

use std::io::{self, Write};
use std::process;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use tempfile::TempDir;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use gridop::engine::format_elapsed;
use gridop::scheduler::TaskResources;
use gridop::{
    ClusterController, ConfigError, ControllerOptions, EngineHandoff, EngineOptions, ErrorKind,
    HandoffReport, JobRequest, LifecycleError, LifecycleObserver, OperatorConfig,
    PropertiesSettings, SettingsError, SettingsStore, TokioLauncher, TransitionOutcome,
    WorkUnitError, WorkUnitRegistry,
};

use cli::{Cli, RunCommand, TerminateCommand};

const PROPERTIES_FILE: &str = "openstack.properties";
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),
    #[error("work unit error: {0}")]
    Unit(#[from] WorkUnitError),
    #[error("cluster error: {0}")]
    Lifecycle(#[from] LifecycleError),
    #[error("batch failed: {0}")]
    Batch(#[from] gridop::HandoffError),
    #[error("input file {0} does not exist")]
    MissingInput(String),
    #[error("failed to prepare scratch directory: {0}")]
    Scratch(String),
    #[error("provisioning ended without a reachable cluster master")]
    ProvisioningFailed,
    #[error("teardown finished but cluster {0} may still exist")]
    TeardownIncomplete(String),
    #[error("interrupted; forced cluster teardown launched")]
    Interrupted,
}

impl CliError {
    const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Settings(_) | Self::Unit(_) | Self::MissingInput(_) => {
                ErrorKind::ConfigurationInvalid.exit_code()
            }
            Self::Lifecycle(err) => err.kind().exit_code(),
            Self::Batch(err) => err.kind().exit_code(),
            Self::Scratch(_) => ErrorKind::OutputUnavailable.exit_code(),
            Self::ProvisioningFailed | Self::TeardownIncomplete(_) => {
                ErrorKind::TransportFailure.exit_code()
            }
            Self::Interrupted => INTERRUPTED_EXIT_CODE,
        }
    }
}

/// Forwards finished transitions to the command driving the controller.
struct TransitionFeed {
    tx: mpsc::UnboundedSender<TransitionOutcome>,
    rx: Mutex<mpsc::UnboundedReceiver<TransitionOutcome>>,
}

impl TransitionFeed {
    fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            tx,
            rx: Mutex::new(rx),
        })
    }

    async fn next(&self) -> Result<TransitionOutcome, CliError> {
        self.rx
            .lock()
            .await
            .recv()
            .await
            .ok_or(CliError::Lifecycle(LifecycleError::WatcherStopped))
    }
}

impl LifecycleObserver for TransitionFeed {
    fn on_stop_available(&self) {
        debug!("cluster can now be stopped");
    }

    fn on_settings_unlocked(&self) {
        debug!("settings unlocked");
    }

    fn on_transition_finished(&self, outcome: &TransitionOutcome) {
        self.tx.send(outcome.clone()).ok();
    }
}

type Controller = ClusterController<TokioLauncher, PropertiesSettings>;

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            err.exit_code()
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr).with_target(false))
        .with(filter)
        .init();
}

async fn dispatch(cli: Cli) -> Result<i32, CliError> {
    match cli {
        Cli::Run(command) => run_command(command).await,
        Cli::Terminate(command) => terminate_command(command).await,
    }
}

/// Configuration, settings, and a scratch directory for the properties file.
struct Environment {
    config: OperatorConfig,
    settings: Arc<PropertiesSettings>,
    scratch: TempDir,
}

impl Environment {
    fn load() -> Result<Self, CliError> {
        let config = OperatorConfig::load_without_cli_args()?;
        config.validate()?;
        let settings = match config.settings_file.as_deref() {
            Some(path) => PropertiesSettings::load(Utf8Path::new(path))?,
            None => PropertiesSettings::new(),
        };
        let scratch = tempfile::Builder::new()
            .prefix("gridop-")
            .tempdir()
            .map_err(|err| CliError::Scratch(err.to_string()))?;
        Ok(Self {
            config,
            settings: Arc::new(settings),
            scratch,
        })
    }

    fn controller(
        &self,
        ready: Option<Arc<dyn gridop::ClusterReadyHandler>>,
    ) -> Result<Controller, CliError> {
        let properties_path = Utf8PathBuf::from_path_buf(self.scratch.path().join(PROPERTIES_FILE))
            .map_err(|path| CliError::Scratch(format!("non UTF-8 path {}", path.display())))?;
        let launcher = TokioLauncher::for_jar(&self.config.tool_program, &self.config.tool_jar);
        Ok(ClusterController::spawn(
            launcher,
            Arc::clone(&self.settings),
            ControllerOptions {
                properties_path,
                exec_script: self.config.exec_script.clone(),
            },
            ready,
        ))
    }

    fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            poll_interval: self.config.poll_interval(),
            poll_timeout: self.config.poll_timeout(),
            staging_prefix: self.config.staging_prefix.clone(),
            resources: TaskResources::default(),
        }
    }
}

async fn run_command(args: RunCommand) -> Result<i32, CliError> {
    let env = Environment::load()?;
    if !args.input.is_file() {
        return Err(CliError::MissingInput(args.input.display().to_string()));
    }

    let registry = Arc::new(WorkUnitRegistry::with_builtin(
        &env.config.reference_container,
    ));
    registry.create(&args.unit, env.settings.as_ref())?;

    let job = JobRequest {
        input: args.input,
        destination: args.output,
    };
    let settings: Arc<dyn SettingsStore> = env.settings.clone();
    let (handoff, mut reports) = EngineHandoff::new(
        registry,
        &args.unit,
        job,
        settings,
        env.engine_options(),
        env.config.scheduler_port,
    );
    let batch_cancel = handoff.cancellation_token();
    let controller = env.controller(Some(Arc::new(handoff)))?;
    let feed = TransitionFeed::new();
    controller.subscribe(feed.clone());
    controller.start()?;

    tokio::select! {
        interrupted = tokio::signal::ctrl_c() => {
            if let Err(err) = interrupted {
                warn!(error = %err, "failed to listen for interrupt");
            }
            batch_cancel.cancel();
            controller.shutdown()?;
            Err(CliError::Interrupted)
        }
        result = drive_batch(&controller, &feed, &mut reports, args.keep_cluster) => result,
    }
}

async fn drive_batch(
    controller: &Controller,
    feed: &TransitionFeed,
    reports: &mut mpsc::UnboundedReceiver<HandoffReport>,
    keep_cluster: bool,
) -> Result<i32, CliError> {
    let provisioned = feed.next().await?;
    if !provisioned.master_ready {
        if controller.session().cluster_id.is_some() {
            controller.stop(false)?;
            feed.next().await?;
        }
        return Err(CliError::ProvisioningFailed);
    }

    let report = reports
        .recv()
        .await
        .ok_or(CliError::Lifecycle(LifecycleError::WatcherStopped))?;
    if keep_cluster {
        info!(
            cluster_id = %report.identity.cluster_id,
            master = %report.identity.master_address,
            "keeping cluster; stop it with `gridop terminate`"
        );
    } else {
        controller.stop(false)?;
        feed.next().await?;
    }

    let batch = report.result?;
    info!(
        destination = %batch.destination.display(),
        elapsed = %format_elapsed(batch.elapsed),
        "results written"
    );
    Ok(0)
}

async fn terminate_command(args: TerminateCommand) -> Result<i32, CliError> {
    let env = Environment::load()?;
    let controller = env.controller(None)?;
    let feed = TransitionFeed::new();
    controller.subscribe(feed.clone());
    controller.adopt(&args.cluster_id)?;
    controller.stop(false)?;
    feed.next().await?;
    if controller.session().cluster_id.is_some() {
        return Err(CliError::TeardownIncomplete(args.cluster_id));
    }
    Ok(0)
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_error_writes_cli_error() {
        let mut buf = Vec::new();
        write_error(&mut buf, &CliError::ProvisioningFailed);
        let rendered = String::from_utf8(buf).unwrap_or_else(|err| panic!("utf8: {err}"));
        assert!(
            rendered.contains("without a reachable cluster master"),
            "rendered: {rendered}"
        );
    }

    #[test]
    fn exit_codes_follow_error_kind() {
        assert_eq!(
            CliError::MissingInput(String::from("x")).exit_code(),
            ErrorKind::ConfigurationInvalid.exit_code()
        );
        assert_eq!(
            CliError::Lifecycle(LifecycleError::Busy).exit_code(),
            ErrorKind::LifecycleConflict.exit_code()
        );
        assert_eq!(CliError::Interrupted.exit_code(), INTERRUPTED_EXIT_CODE);
    }
}
