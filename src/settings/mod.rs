//! Key/value settings handed to the provisioning tool.
//!
//! The provisioning tool reads a Java-style properties file (`key=value` per
//! line). Settings are loaded from an optional operator file, can be edited
//! at runtime through [`SettingsStore`], and are persisted to a temporary
//! file before every lifecycle transition so the tool sees the current
//! values.

use std::collections::BTreeMap;
use std::io;
use std::sync::{PoisonError, RwLock};

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;

/// Operator identity used to authenticate against the cloud.
pub const OPERATOR_KEY: &str = "openstack-username";
/// Secret paired with [`OPERATOR_KEY`].
pub const PASSWORD_KEY: &str = "openstack-password";
/// Identity service endpoint.
pub const ENDPOINT_KEY: &str = "openstack-endpoint";
/// Tenant (project) name.
pub const TENANT_KEY: &str = "openstack-tenantname";
/// Number of slave instances, which is also the partition count of a batch.
pub const PARTITION_COUNT_KEY: &str = "slave-instance-count";
/// Path to the SSH identity file; written with forward slashes only.
pub const IDENTITY_FILE_KEY: &str = "identity-file";

/// Errors raised while reading or writing settings files.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum SettingsError {
    /// Raised when the settings file cannot be read or written.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path that could not be accessed.
        path: Utf8PathBuf,
        /// Operating system error string.
        message: String,
    },
    /// Raised when the path does not name a file.
    #[error("settings path {path} is missing a file name")]
    MissingFileName {
        /// Offending path.
        path: Utf8PathBuf,
    },
    /// Raised when a required key is absent or blank.
    #[error("setting {key} is not set")]
    Missing {
        /// Key that was looked up.
        key: String,
    },
}

/// Read/write access to the key/value settings.
pub trait SettingsStore: Send + Sync {
    /// Returns the value stored for `key`, if any.
    fn get(&self, key: &str) -> Option<String>;

    /// Stores `value` under `key`; `None` removes the key.
    fn put(&self, key: &str, value: Option<String>);

    /// Writes every setting to `path` so an external tool can read it.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] when the file cannot be written.
    fn persist(&self, path: &Utf8Path) -> Result<(), SettingsError>;
}

/// Returns the trimmed value for `key`, failing when it is absent or blank.
///
/// # Errors
///
/// Returns [`SettingsError::Missing`] naming the key.
pub fn require(settings: &dyn SettingsStore, key: &str) -> Result<String, SettingsError> {
    settings
        .get(key)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| SettingsError::Missing {
            key: key.to_owned(),
        })
}

/// In-memory properties with load and persist helpers.
#[derive(Debug, Default)]
pub struct PropertiesSettings {
    entries: RwLock<BTreeMap<String, String>>,
}

impl PropertiesSettings {
    /// Creates an empty settings map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds settings from explicit pairs.
    #[must_use]
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let entries = pairs
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Loads settings from a properties file.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Io`] when the file cannot be read.
    pub fn load(path: &Utf8Path) -> Result<Self, SettingsError> {
        let contents = read_file(path)?;
        Ok(Self {
            entries: RwLock::new(parse_properties(&contents)),
        })
    }

    /// Returns a sorted copy of every stored pair.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Writes all settings to `path` in properties format, replacing any
    /// existing file.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] when the directory or file cannot be
    /// written.
    pub fn write_properties_file(&self, path: &Utf8Path) -> Result<(), SettingsError> {
        write_file(path, &render_properties(&self.snapshot()))
    }
}

impl SettingsStore for PropertiesSettings {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn put(&self, key: &str, value: Option<String>) {
        let mut guard = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match value {
            Some(text) => {
                guard.insert(key.to_owned(), text);
            }
            None => {
                guard.remove(key);
            }
        }
    }

    fn persist(&self, path: &Utf8Path) -> Result<(), SettingsError> {
        self.write_properties_file(path)
    }
}

/// Parses `key=value` (or `key: value`) lines, skipping blanks and `#`/`!`
/// comments. Later keys win.
#[must_use]
pub fn parse_properties(contents: &str) -> BTreeMap<String, String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .filter_map(|line| {
            line.split_once(['=', ':'])
                .map(|(key, value)| (key.trim().to_owned(), value.trim().to_owned()))
        })
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

/// Renders pairs one per line. The provisioning tool runs on the JVM and
/// expects forward slashes in the identity file path.
#[must_use]
pub fn render_properties(entries: &BTreeMap<String, String>) -> String {
    let mut rendered = String::new();
    for (key, value) in entries {
        rendered.push_str(key);
        rendered.push('=');
        if key == IDENTITY_FILE_KEY {
            rendered.push_str(&value.replace('\\', "/"));
        } else {
            rendered.push_str(value);
        }
        rendered.push('\n');
    }
    rendered
}

fn split_path(path: &Utf8Path) -> Result<(&Utf8Path, &str), SettingsError> {
    let parent = path
        .parent()
        .filter(|dir| !dir.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let file_name = path.file_name().ok_or_else(|| SettingsError::MissingFileName {
        path: path.to_path_buf(),
    })?;
    Ok((parent, file_name))
}

fn io_error(path: &Utf8Path, err: &io::Error) -> SettingsError {
    SettingsError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

fn read_file(path: &Utf8Path) -> Result<String, SettingsError> {
    let (parent, file_name) = split_path(path)?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority())
        .map_err(|err| io_error(parent, &err))?;
    dir.read_to_string(file_name)
        .map_err(|err| io_error(path, &err))
}

fn write_file(path: &Utf8Path, contents: &str) -> Result<(), SettingsError> {
    let (parent, file_name) = split_path(path)?;
    Dir::create_ambient_dir_all(parent, ambient_authority())
        .map_err(|err| io_error(parent, &err))?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority())
        .map_err(|err| io_error(parent, &err))?;
    dir.write(file_name, contents)
        .map_err(|err| io_error(path, &err))
}

#[cfg(test)]
mod tests;
