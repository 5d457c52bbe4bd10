//! Spawns the provisioning tool and exposes its output as a line stream.

use std::ffi::OsString;
use std::io;
use std::process::Stdio;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Output lines of a watched process, stdout and stderr interleaved. The
/// stream ends once both pipes close.
pub type LineStream = mpsc::Receiver<io::Result<String>>;

const LINE_BUFFER: usize = 64;

/// Errors raised while starting the provisioning tool.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum LaunchError {
    /// The process could not be started.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
}

/// Starts provisioning tool invocations.
pub trait ProcessLauncher: Send + Sync + 'static {
    /// Starts the tool with `args` and returns its combined output.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::Spawn`] when the process cannot be started.
    fn spawn_watched(&self, args: &[OsString]) -> Result<LineStream, LaunchError>;

    /// Starts the tool with `args` without watching its output.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::Spawn`] when the process cannot be started.
    fn spawn_detached(&self, args: &[OsString]) -> Result<(), LaunchError>;
}

/// Launches the real tool, typically `java -jar <tool.jar> ...`.
#[derive(Clone, Debug)]
pub struct TokioLauncher {
    program: String,
    leading_args: Vec<OsString>,
}

impl TokioLauncher {
    /// Creates a launcher for `program`, passing `leading_args` before the
    /// per-call arguments.
    #[must_use]
    pub const fn new(program: String, leading_args: Vec<OsString>) -> Self {
        Self {
            program,
            leading_args,
        }
    }

    /// Launcher for a jar run by the given Java launcher.
    #[must_use]
    pub fn for_jar(java: &str, jar: &str) -> Self {
        Self::new(
            java.to_owned(),
            vec![OsString::from("-jar"), OsString::from(jar)],
        )
    }

    fn command(&self, args: &[OsString]) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.leading_args).args(args).stdin(Stdio::null());
        command
    }

    fn spawn_error(&self, err: &io::Error) -> LaunchError {
        LaunchError::Spawn {
            program: self.program.clone(),
            message: err.to_string(),
        }
    }
}

impl ProcessLauncher for TokioLauncher {
    fn spawn_watched(&self, args: &[OsString]) -> Result<LineStream, LaunchError> {
        let mut child = self
            .command(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| self.spawn_error(&err))?;

        let (tx, rx) = mpsc::channel(LINE_BUFFER);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, tx));
        }

        let program = self.program.clone();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => debug!(%program, %status, "provisioning tool exited"),
                Err(err) => warn!(%program, error = %err, "failed to await provisioning tool"),
            }
        });
        Ok(rx)
    }

    fn spawn_detached(&self, args: &[OsString]) -> Result<(), LaunchError> {
        let mut child = self
            .command(args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| self.spawn_error(&err))?;
        tokio::spawn(async move {
            child.wait().await.ok();
        });
        Ok(())
    }
}

async fn forward_lines<R>(pipe: R, tx: mpsc::Sender<io::Result<String>>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(pipe).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if tx.send(Ok(line)).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(err) => {
                tx.send(Err(err)).await.ok();
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn watched_process_streams_both_pipes_then_ends() {
        let launcher = TokioLauncher::new(String::from("sh"), vec![OsString::from("-c")]);
        let mut stream = launcher
            .spawn_watched(&[OsString::from("echo out; echo err 1>&2")])
            .unwrap_or_else(|err| panic!("spawn sh: {err}"));

        let mut lines = Vec::new();
        while let Some(line) = stream.recv().await {
            lines.push(line.unwrap_or_else(|err| panic!("read line: {err}")));
        }
        lines.sort();

        assert_eq!(lines, vec![String::from("err"), String::from("out")]);
    }

    #[tokio::test]
    async fn missing_program_reports_spawn_error() {
        let launcher = TokioLauncher::new(String::from("gridop-no-such-tool"), Vec::new());

        let err = launcher
            .spawn_watched(&[])
            .expect_err("unknown program should fail");

        assert!(matches!(err, LaunchError::Spawn { .. }), "unexpected: {err}");
    }
}
