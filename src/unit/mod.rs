//! Pluggable work units: how a batch is split, run remotely, and merged.

mod blastp;
pub mod records;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub use blastp::BlastpUnit;

use crate::settings::{SettingsError, SettingsStore};

/// Errors raised by work units.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum WorkUnitError {
    /// A file could not be read or written.
    #[error("failed to access {path}: {message}")]
    Io {
        /// File path.
        path: String,
        /// Operating system error string.
        message: String,
    },
    /// The number of files or names does not match the partitions.
    #[error("partition mismatch: expected {expected}, found {actual}")]
    PartitionMismatch {
        /// Expected count.
        expected: usize,
        /// Count found.
        actual: usize,
    },
    /// No unit is registered under the requested name.
    #[error("unknown work unit {name}; available: {available}")]
    NotRegistered {
        /// Requested name.
        name: String,
        /// Comma-separated registered names.
        available: String,
    },
    /// A setting needed to build commands is absent.
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

impl WorkUnitError {
    pub(crate) fn io(path: &Path, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}

/// A batch computation that can be split, run remotely, and merged.
///
/// The engine calls [`WorkUnit::set_output_targets`] and
/// [`WorkUnit::partition`] before [`WorkUnit::build_commands`], and
/// [`WorkUnit::combine`] once every remote task has finished.
pub trait WorkUnit: Send + Sync {
    /// Short name, also the prefix of scheduler request identifiers.
    fn identifier(&self) -> &str;

    /// Splits `source` into one file per entry of `targets`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkUnitError::Io`] when a file cannot be accessed.
    fn partition(&mut self, source: &Path, targets: &[PathBuf]) -> Result<(), WorkUnitError>;

    /// Records where each partition's result will be downloaded.
    fn set_output_targets(&mut self, targets: &[PathBuf]);

    /// One shell command per partition, run remotely. Commands fetch their
    /// input from and upload their output to `container`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkUnitError::PartitionMismatch`] when called before
    /// partitioning, or a settings error when credentials are absent.
    fn build_commands(&self, container: &str) -> Result<Vec<String>, WorkUnitError>;

    /// Merges the downloaded partition outputs into `destination`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkUnitError::Io`] when a file cannot be accessed.
    fn combine(&self, destination: &Path, sources: &[PathBuf]) -> Result<(), WorkUnitError>;
}

/// Builds a unit from the current settings.
pub type UnitFactory =
    Box<dyn Fn(&dyn SettingsStore) -> Result<Box<dyn WorkUnit>, WorkUnitError> + Send + Sync>;

/// Named work unit factories. Names are matched case-insensitively.
#[derive(Default)]
pub struct WorkUnitRegistry {
    factories: BTreeMap<String, UnitFactory>,
}

impl WorkUnitRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in units; `reference_container` names the
    /// container holding the protein database used by `blastp`.
    #[must_use]
    pub fn with_builtin(reference_container: &str) -> Self {
        let mut registry = Self::new();
        let reference = reference_container.to_owned();
        registry.register(
            blastp::NAME,
            Box::new(move |settings| {
                Ok(Box::new(BlastpUnit::from_settings(settings, &reference)?) as Box<dyn WorkUnit>)
            }),
        );
        registry
    }

    /// Adds or replaces the factory for `name`.
    pub fn register(&mut self, name: &str, factory: UnitFactory) {
        self.factories.insert(name.to_ascii_lowercase(), factory);
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    /// Builds the unit registered as `name`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkUnitError::NotRegistered`] for unknown names, or the
    /// factory's own error.
    pub fn create(
        &self,
        name: &str,
        settings: &dyn SettingsStore,
    ) -> Result<Box<dyn WorkUnit>, WorkUnitError> {
        let factory = self
            .factories
            .get(&name.to_ascii_lowercase())
            .ok_or_else(|| WorkUnitError::NotRegistered {
                name: name.to_owned(),
                available: self.names().join(", "),
            })?;
        factory(settings)
    }
}

#[cfg(test)]
mod tests;
