//! Scripted scheduler client.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use super::lock;
use crate::scheduler::{
    RemoteTaskDescriptor, SchedulerClient, SchedulerError, SchedulerFuture, SubmitOutcome,
};

#[derive(Default)]
struct SchedulerState {
    requests: Vec<RemoteTaskDescriptor>,
    deploys: Vec<RemoteTaskDescriptor>,
    active_counts: VecDeque<u32>,
    polls: usize,
    rejected_requests: BTreeMap<String, u16>,
    unreachable: bool,
}

/// Scheduler double that records submissions and replays active-task
/// counts. Polls past the queued counts report zero.
#[derive(Clone, Default)]
pub struct ScriptedScheduler {
    state: Arc<Mutex<SchedulerState>>,
}

impl ScriptedScheduler {
    /// Creates a scheduler that accepts everything and reports idle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues active-task counts returned by successive polls.
    pub fn push_active_counts(&self, counts: &[u32]) {
        lock(&self.state).active_counts.extend(counts.iter().copied());
    }

    /// Rejects the run-once request with `request_id` using `status`.
    pub fn reject_request(&self, request_id: &str, status: u16) {
        lock(&self.state)
            .rejected_requests
            .insert(request_id.to_owned(), status);
    }

    /// Makes every call fail with a transport error.
    pub fn set_unreachable(&self) {
        lock(&self.state).unreachable = true;
    }

    /// Requests submitted so far.
    #[must_use]
    pub fn requests(&self) -> Vec<RemoteTaskDescriptor> {
        lock(&self.state).requests.clone()
    }

    /// Deploys submitted so far.
    #[must_use]
    pub fn deploys(&self) -> Vec<RemoteTaskDescriptor> {
        lock(&self.state).deploys.clone()
    }

    /// Number of state polls so far.
    #[must_use]
    pub fn polls(&self) -> usize {
        lock(&self.state).polls
    }

    fn unreachable_error() -> SchedulerError {
        SchedulerError::Transport {
            message: String::from("scripted scheduler unreachable"),
        }
    }
}

impl SchedulerClient for ScriptedScheduler {
    fn submit_request<'a>(
        &'a self,
        task: &'a RemoteTaskDescriptor,
    ) -> SchedulerFuture<'a, SubmitOutcome> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            if state.unreachable {
                return Err(Self::unreachable_error());
            }
            state.requests.push(task.clone());
            Ok(state.rejected_requests.get(&task.request_id).map_or(
                SubmitOutcome::Accepted,
                |status| SubmitOutcome::Rejected {
                    status: *status,
                    body: String::from("rejected by script"),
                },
            ))
        })
    }

    fn submit_deploy<'a>(
        &'a self,
        task: &'a RemoteTaskDescriptor,
    ) -> SchedulerFuture<'a, SubmitOutcome> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            if state.unreachable {
                return Err(Self::unreachable_error());
            }
            state.deploys.push(task.clone());
            Ok(SubmitOutcome::Accepted)
        })
    }

    fn active_tasks(&self) -> SchedulerFuture<'_, u32> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            if state.unreachable {
                return Err(Self::unreachable_error());
            }
            state.polls += 1;
            Ok(state.active_counts.pop_front().unwrap_or(0))
        })
    }
}
