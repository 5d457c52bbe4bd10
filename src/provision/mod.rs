//! Provisioning tool integration: output classification, process launching,
//! and the watcher that turns tool output into session updates.

pub mod events;
pub mod launcher;
pub(crate) mod watcher;

pub use events::{LifecycleEvent, classify_line};
pub use launcher::{LaunchError, LineStream, ProcessLauncher, TokioLauncher};
pub use watcher::PROVISIONING_LOG_TARGET;
