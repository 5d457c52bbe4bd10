//! Object-store staging for batch inputs and outputs.
//!
//! Every batch stages its partitions in a container named after the operator
//! and the current day. Partition files live in local temporary files whose
//! names double as object names.

mod files;
mod swift;

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::info;

pub use files::{StagedFile, StagingFiles};
pub use swift::{StagingCredentials, SwiftStore};

use crate::settings::SettingsError;

/// Boxed future returned by [`StagingStore`] operations.
pub type StagingFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StagingError>> + Send + 'a>>;

/// Errors raised by the staging store.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum StagingError {
    /// Credentials are incomplete.
    #[error("staging credentials are incomplete: {0}")]
    Credentials(#[from] SettingsError),
    /// The identity service refused the credentials or returned no store.
    #[error("object store authentication failed: {message}")]
    Auth {
        /// Reason reported by the identity service or the parser.
        message: String,
    },
    /// The request did not reach the service or the reply was unreadable.
    #[error("object store request failed: {message}")]
    Transport {
        /// Underlying client error.
        message: String,
    },
    /// The service answered with a non-success status.
    #[error("{action} returned HTTP {status}")]
    Status {
        /// Operation that failed, for example `put input-1`.
        action: String,
        /// HTTP status code.
        status: u16,
    },
    /// A local file could not be read or written.
    #[error("failed to access {path}: {message}")]
    Io {
        /// File path.
        path: String,
        /// Operating system error string.
        message: String,
    },
}

/// Container-scoped object storage.
pub trait StagingStore: Send + Sync {
    /// Lists container names starting with `prefix`.
    fn list_containers<'a>(&'a self, prefix: &'a str) -> StagingFuture<'a, Vec<String>>;

    /// Creates `container`; creating an existing container succeeds.
    fn create_container<'a>(&'a self, container: &'a str) -> StagingFuture<'a, ()>;

    /// Uploads the file at `source` as `object`.
    fn put_object<'a>(
        &'a self,
        container: &'a str,
        object: &'a str,
        source: &'a Path,
    ) -> StagingFuture<'a, ()>;

    /// Downloads `object` into the file at `target`.
    fn get_object<'a>(
        &'a self,
        container: &'a str,
        object: &'a str,
        target: &'a Path,
    ) -> StagingFuture<'a, ()>;

    /// Deletes `object`.
    fn delete_object<'a>(&'a self, container: &'a str, object: &'a str) -> StagingFuture<'a, ()>;

    /// Deletes the (empty) container.
    fn delete_container<'a>(&'a self, container: &'a str) -> StagingFuture<'a, ()>;
}

/// Staging container for `operator` on `date`: `{prefix}{operator}-{YYYY-MM-DD}`.
#[must_use]
pub fn container_name(prefix: &str, operator: &str, date: NaiveDate) -> String {
    format!("{prefix}{operator}-{}", date.format("%Y-%m-%d"))
}

/// Creates `container` unless a container with exactly that name exists.
///
/// # Errors
///
/// Returns the store's error when listing or creation fails.
pub async fn ensure_container<S>(store: &S, container: &str) -> Result<(), StagingError>
where
    S: StagingStore + ?Sized,
{
    let existing = store.list_containers(container).await?;
    if existing.iter().any(|name| name == container) {
        info!(%container, "reusing staging container");
        return Ok(());
    }
    store.create_container(container).await?;
    info!(%container, "created staging container");
    Ok(())
}

#[cfg(test)]
mod tests;
