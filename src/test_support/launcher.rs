//! Scripted provisioning tool launcher.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::io;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use super::lock;
use crate::provision::{LaunchError, LineStream, ProcessLauncher};

enum Script {
    Lines(Vec<String>),
    Manual(LineStream),
    Fail(String),
}

#[derive(Default)]
struct LauncherState {
    scripts: VecDeque<Script>,
    watched: Vec<Vec<OsString>>,
    detached: Vec<Vec<OsString>>,
}

/// Launcher that replays queued output instead of spawning processes.
///
/// Each watched launch consumes the next script; with none queued, the
/// stream ends immediately.
#[derive(Clone, Default)]
pub struct ScriptedLauncher {
    state: Arc<Mutex<LauncherState>>,
}

/// Sender half of a manually driven output stream.
pub struct LineFeed {
    tx: mpsc::Sender<io::Result<String>>,
}

impl LineFeed {
    /// Emits one output line. Returns `false` once the watcher stopped
    /// listening.
    pub async fn send_line(&self, line: &str) -> bool {
        self.tx.send(Ok(line.to_owned())).await.is_ok()
    }

    /// Emits a read error, which ends the stream for the watcher.
    pub async fn send_error(&self, message: &str) -> bool {
        self.tx
            .send(Err(io::Error::other(message.to_owned())))
            .await
            .is_ok()
    }
}

impl ScriptedLauncher {
    /// Creates a launcher with no scripts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues output lines for the next watched launch.
    pub fn push_lines(&self, lines: &[&str]) {
        let owned = lines.iter().map(|line| (*line).to_owned()).collect();
        lock(&self.state).scripts.push_back(Script::Lines(owned));
    }

    /// Queues a stream the test drives line by line. The stream ends when
    /// the returned feed is dropped.
    #[must_use]
    pub fn push_manual(&self) -> LineFeed {
        let (tx, rx) = mpsc::channel(16);
        lock(&self.state).scripts.push_back(Script::Manual(rx));
        LineFeed { tx }
    }

    /// Queues a spawn failure for the next watched launch.
    pub fn push_failure(&self, message: &str) {
        lock(&self.state)
            .scripts
            .push_back(Script::Fail(message.to_owned()));
    }

    /// Arguments of every watched launch so far.
    #[must_use]
    pub fn watched(&self) -> Vec<Vec<OsString>> {
        lock(&self.state).watched.clone()
    }

    /// Arguments of every detached launch so far.
    #[must_use]
    pub fn detached(&self) -> Vec<Vec<OsString>> {
        lock(&self.state).detached.clone()
    }
}

impl ProcessLauncher for ScriptedLauncher {
    fn spawn_watched(&self, args: &[OsString]) -> Result<LineStream, LaunchError> {
        let mut state = lock(&self.state);
        state.watched.push(args.to_vec());
        match state.scripts.pop_front() {
            Some(Script::Manual(rx)) => Ok(rx),
            Some(Script::Fail(message)) => Err(LaunchError::Spawn {
                program: String::from("scripted"),
                message,
            }),
            Some(Script::Lines(lines)) => Ok(replay(lines)),
            None => Ok(replay(Vec::new())),
        }
    }

    fn spawn_detached(&self, args: &[OsString]) -> Result<(), LaunchError> {
        lock(&self.state).detached.push(args.to_vec());
        Ok(())
    }
}

fn replay(lines: Vec<String>) -> LineStream {
    let (tx, rx) = mpsc::channel(lines.len().max(1));
    for line in lines {
        if tx.try_send(Ok(line)).is_err() {
            break;
        }
    }
    rx
}
