//! In-memory staging store.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::lock;
use crate::staging::{StagingError, StagingFuture, StagingStore};

/// Staging operation kinds, used for failure injection and call logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum StoreOperation {
    /// Container listing.
    List,
    /// Container creation.
    CreateContainer,
    /// Object upload.
    Put,
    /// Object download.
    Get,
    /// Object deletion.
    DeleteObject,
    /// Container deletion.
    DeleteContainer,
}

/// One recorded call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreCall {
    /// Operation kind.
    pub operation: StoreOperation,
    /// Container name, or the prefix for listings.
    pub container: String,
    /// Object name, when the operation targets one.
    pub object: Option<String>,
}

#[derive(Default)]
struct StoreState {
    containers: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
    calls: Vec<StoreCall>,
    failing: BTreeSet<StoreOperation>,
    echo_tasks: bool,
}

impl StoreState {
    fn record(
        &mut self,
        operation: StoreOperation,
        container: &str,
        object: Option<&str>,
    ) -> Result<(), StagingError> {
        self.calls.push(StoreCall {
            operation,
            container: container.to_owned(),
            object: object.map(str::to_owned),
        });
        if self.failing.contains(&operation) {
            return Err(StagingError::Status {
                action: format!("{operation:?}"),
                status: 500,
            });
        }
        Ok(())
    }

    /// Content served for `object`. With echo enabled, a missing
    /// `output-{n}-…` object is first created from `input-{n}-…`, as if a
    /// no-op remote task had uploaded its input as its output.
    fn fetch(&mut self, container: &str, object: &str) -> Option<Vec<u8>> {
        let echo = self.echo_tasks;
        let objects = self.containers.get_mut(container)?;
        if let Some(content) = objects.get(object) {
            return Some(content.clone());
        }
        if !echo {
            return None;
        }
        let number = object.strip_prefix("output-")?.split_once('-')?.0;
        let input_prefix = format!("input-{number}-");
        let content = objects
            .iter()
            .find(|(name, _)| name.starts_with(&input_prefix))
            .map(|(_, content)| content.clone())?;
        objects.insert(object.to_owned(), content.clone());
        Some(content)
    }
}

/// Staging store backed by memory.
#[derive(Clone, Default)]
pub struct RecordingStore {
    state: Arc<Mutex<StoreState>>,
}

impl RecordingStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call of `operation` fail with HTTP 500.
    pub fn fail_on(&self, operation: StoreOperation) {
        lock(&self.state).failing.insert(operation);
    }

    /// Serves missing outputs from the matching inputs.
    pub fn echo_tasks(&self) {
        lock(&self.state).echo_tasks = true;
    }

    /// Adds a container and its objects.
    pub fn seed(&self, container: &str, objects: &[(&str, &[u8])]) {
        let mut state = lock(&self.state);
        let entry = state.containers.entry(container.to_owned()).or_default();
        for (name, content) in objects {
            entry.insert((*name).to_owned(), content.to_vec());
        }
    }

    /// Calls made so far.
    #[must_use]
    pub fn calls(&self) -> Vec<StoreCall> {
        lock(&self.state).calls.clone()
    }

    /// Calls of one kind made so far.
    #[must_use]
    pub fn calls_of(&self, operation: StoreOperation) -> Vec<StoreCall> {
        lock(&self.state)
            .calls
            .iter()
            .filter(|call| call.operation == operation)
            .cloned()
            .collect()
    }

    /// Names of existing containers.
    #[must_use]
    pub fn containers(&self) -> Vec<String> {
        lock(&self.state).containers.keys().cloned().collect()
    }

    /// Objects currently stored in `container`, with their content.
    #[must_use]
    pub fn objects(&self, container: &str) -> BTreeMap<String, Vec<u8>> {
        lock(&self.state)
            .containers
            .get(container)
            .cloned()
            .unwrap_or_default()
    }

    fn missing(container: &str, object: &str) -> StagingError {
        StagingError::Status {
            action: format!("get {container}/{object}"),
            status: 404,
        }
    }
}

impl StagingStore for RecordingStore {
    fn list_containers<'a>(&'a self, prefix: &'a str) -> StagingFuture<'a, Vec<String>> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.record(StoreOperation::List, prefix, None)?;
            Ok(state
                .containers
                .keys()
                .filter(|name| name.starts_with(prefix))
                .cloned()
                .collect())
        })
    }

    fn create_container<'a>(&'a self, container: &'a str) -> StagingFuture<'a, ()> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.record(StoreOperation::CreateContainer, container, None)?;
            state.containers.entry(container.to_owned()).or_default();
            Ok(())
        })
    }

    fn put_object<'a>(
        &'a self,
        container: &'a str,
        object: &'a str,
        source: &'a Path,
    ) -> StagingFuture<'a, ()> {
        Box::pin(async move {
            let content = std::fs::read(source).map_err(|err| StagingError::Io {
                path: source.display().to_string(),
                message: err.to_string(),
            })?;
            let mut state = lock(&self.state);
            state.record(StoreOperation::Put, container, Some(object))?;
            state
                .containers
                .entry(container.to_owned())
                .or_default()
                .insert(object.to_owned(), content);
            Ok(())
        })
    }

    fn get_object<'a>(
        &'a self,
        container: &'a str,
        object: &'a str,
        target: &'a Path,
    ) -> StagingFuture<'a, ()> {
        Box::pin(async move {
            let content = {
                let mut state = lock(&self.state);
                state.record(StoreOperation::Get, container, Some(object))?;
                state
                    .fetch(container, object)
                    .ok_or_else(|| Self::missing(container, object))?
            };
            std::fs::write(target, content).map_err(|err| StagingError::Io {
                path: target.display().to_string(),
                message: err.to_string(),
            })
        })
    }

    fn delete_object<'a>(&'a self, container: &'a str, object: &'a str) -> StagingFuture<'a, ()> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.record(StoreOperation::DeleteObject, container, Some(object))?;
            let removed = state
                .containers
                .get_mut(container)
                .and_then(|objects| objects.remove(object));
            removed.map(|_| ()).ok_or_else(|| StagingError::Status {
                action: format!("delete {container}/{object}"),
                status: 404,
            })
        })
    }

    fn delete_container<'a>(&'a self, container: &'a str) -> StagingFuture<'a, ()> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.record(StoreOperation::DeleteContainer, container, None)?;
            let status = match state.containers.get(container).map(BTreeMap::is_empty) {
                Some(true) => {
                    state.containers.remove(container);
                    return Ok(());
                }
                Some(false) => 409,
                None => 404,
            };
            Err(StagingError::Status {
                action: format!("delete container {container}"),
                status,
            })
        })
    }
}
