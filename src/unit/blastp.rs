//! Protein similarity search against the shared reference database.
//!
//! Input is FASTA: each record starts with a `>` header. Every remote task
//! fetches the reference database and its partition from object storage,
//! runs `blastp` with tabular output, and uploads the result.

use std::path::{Path, PathBuf};

use shell_escape::unix::escape;
use tracing::debug;

use super::records::{concatenate_lines, split_records};
use super::{WorkUnit, WorkUnitError};
use crate::settings::SettingsStore;
use crate::staging::StagingCredentials;

/// Registry name of this unit.
pub(super) const NAME: &str = "blastp";

const IDENTIFIER: &str = "BLASTP";
const DATABASE: &str = "swissprot";
const DATABASE_FILES: [&str; 3] = ["swissprot.phr", "swissprot.pin", "swissprot.psq"];

/// FASTA-splitting `blastp` unit.
#[derive(Debug)]
pub struct BlastpUnit {
    credentials: StagingCredentials,
    reference_container: String,
    inputs: Vec<String>,
    outputs: Vec<String>,
}

impl BlastpUnit {
    /// Creates the unit with credentials read from `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkUnitError::Settings`] when a credential is absent.
    pub fn from_settings(
        settings: &dyn SettingsStore,
        reference_container: &str,
    ) -> Result<Self, WorkUnitError> {
        Ok(Self::new(
            StagingCredentials::from_settings(settings)?,
            reference_container,
        ))
    }

    /// Creates the unit with explicit credentials.
    #[must_use]
    pub fn new(credentials: StagingCredentials, reference_container: &str) -> Self {
        Self {
            credentials,
            reference_container: reference_container.to_owned(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    fn credential_exports(&self) -> String {
        let exports = [
            ("OS_AUTH_URL", &self.credentials.endpoint),
            ("OS_USERNAME", &self.credentials.username),
            ("OS_PASSWORD", &self.credentials.password),
            ("OS_TENANT_NAME", &self.credentials.tenant),
        ];
        let mut preamble = String::new();
        for (key, value) in exports {
            preamble.push_str("export ");
            preamble.push_str(key);
            preamble.push('=');
            preamble.push_str(&escape(value.as_str().into()));
            preamble.push_str(" ; ");
        }
        preamble
    }

    fn database_downloads(&self) -> String {
        let container = escape(self.reference_container.as_str().into());
        DATABASE_FILES
            .iter()
            .map(|file| format!("swift download {container} {file} -o {file} ; "))
            .collect()
    }

    fn command(&self, container: &str, input: &str, output: &str) -> String {
        let container_arg = escape(container.into());
        let input_arg = escape(input.into());
        let output_arg = escape(output.into());
        format!(
            "{exports}{downloads}swift download {container_arg} {input_arg} ; \
             blastp -outfmt 6 -db {DATABASE} -query {input_arg} -out {output_arg} ; \
             swift upload {container_arg} {output_arg} --object-name {output_arg}",
            exports = self.credential_exports(),
            downloads = self.database_downloads(),
        )
    }
}

fn object_names(paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .map(|path| {
            path.file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default()
        })
        .collect()
}

impl WorkUnit for BlastpUnit {
    fn identifier(&self) -> &str {
        IDENTIFIER
    }

    fn partition(&mut self, source: &Path, targets: &[PathBuf]) -> Result<(), WorkUnitError> {
        let counts = split_records(source, targets, |line| line.starts_with('>'))?;
        debug!(?counts, "split FASTA records");
        self.inputs = object_names(targets);
        Ok(())
    }

    fn set_output_targets(&mut self, targets: &[PathBuf]) {
        self.outputs = object_names(targets);
    }

    fn build_commands(&self, container: &str) -> Result<Vec<String>, WorkUnitError> {
        if self.inputs.is_empty() || self.inputs.len() != self.outputs.len() {
            return Err(WorkUnitError::PartitionMismatch {
                expected: self.inputs.len(),
                actual: self.outputs.len(),
            });
        }
        Ok(self
            .inputs
            .iter()
            .zip(&self.outputs)
            .map(|(input, output)| self.command(container, input, output))
            .collect())
    }

    fn combine(&self, destination: &Path, sources: &[PathBuf]) -> Result<(), WorkUnitError> {
        let lines = concatenate_lines(destination, sources)?;
        debug!(lines, destination = %destination.display(), "combined partition outputs");
        Ok(())
    }
}
