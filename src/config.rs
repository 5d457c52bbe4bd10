//! Operator configuration loaded via `ortho-config`.

use std::ffi::OsString;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

/// Default port of the scheduler REST API on the cluster master.
pub const DEFAULT_SCHEDULER_PORT: u16 = 7099;

/// Settings for the provisioning tool, scheduler polling, and staging,
/// merged from defaults, `gridop.toml`, and `GRIDOP_*` environment
/// variables.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "GRIDOP",
    discovery(
        app_name = "gridop",
        env_var = "GRIDOP_CONFIG_PATH",
        config_file_name = "gridop.toml",
        dotfile_name = ".gridop.toml",
        project_file_name = "gridop.toml"
    )
)]
pub struct OperatorConfig {
    /// Program used to run the provisioning tool. The tool ships as a jar,
    /// so this is normally a Java launcher.
    #[ortho_config(default = "java".to_owned())]
    pub tool_program: String,
    /// Path to the provisioning tool jar.
    #[ortho_config(default = String::new())]
    pub tool_jar: String,
    /// Script executed on every node once the cluster boots.
    #[ortho_config(default = String::new())]
    pub exec_script: String,
    /// Optional properties file with cloud credentials and cluster shape.
    pub settings_file: Option<String>,
    /// Port of the scheduler REST API on the master node.
    #[ortho_config(default = DEFAULT_SCHEDULER_PORT)]
    pub scheduler_port: u16,
    /// Seconds between two scheduler state polls.
    #[ortho_config(default = 10)]
    pub poll_interval_secs: u64,
    /// Upper bound on the completion wait. Unset waits until the scheduler
    /// reports no active tasks.
    pub poll_timeout_secs: Option<u64>,
    /// Prefix of the per-operator, per-day staging container.
    #[ortho_config(default = "SINGULARITY-".to_owned())]
    pub staging_prefix: String,
    /// Container holding the shared reference dataset.
    #[ortho_config(default = "BLAST-DB".to_owned())]
    pub reference_container: String,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

impl OperatorConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to gridop.toml",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("gridop")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on required fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required path is empty,
    /// or [`ConfigError::InvalidValue`] when the poll interval is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.tool_program,
            &FieldMetadata::new("tool launcher", "GRIDOP_TOOL_PROGRAM", "tool_program"),
        )?;
        Self::require_field(
            &self.tool_jar,
            &FieldMetadata::new("provisioning tool jar", "GRIDOP_TOOL_JAR", "tool_jar"),
        )?;
        Self::require_field(
            &self.exec_script,
            &FieldMetadata::new("node init script", "GRIDOP_EXEC_SCRIPT", "exec_script"),
        )?;
        Self::require_field(
            &self.staging_prefix,
            &FieldMetadata::new(
                "staging container prefix",
                "GRIDOP_STAGING_PREFIX",
                "staging_prefix",
            ),
        )?;
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: String::from("poll_interval_secs"),
                message: String::from("must be at least one second"),
            });
        }
        Ok(())
    }

    /// Interval between scheduler polls.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Optional bound on the completion wait.
    #[must_use]
    pub fn poll_timeout(&self) -> Option<Duration> {
        self.poll_timeout_secs.map(Duration::from_secs)
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a field holds an unusable value.
    #[error("invalid value for {field}: {message}")]
    InvalidValue {
        /// Field name as written in `gridop.toml`.
        field: String,
        /// Why the value was rejected.
        message: String,
    },
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
