//! Singularity REST client.

use std::time::Duration;

use reqwest::{Client, Response, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{RemoteTaskDescriptor, SchedulerClient, SchedulerError, SchedulerFuture, SubmitOutcome};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const REQUEST_TYPE: &str = "RUN_ONCE";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestBody<'a> {
    id: &'a str,
    request_type: &'a str,
    instances: u32,
}

#[derive(Serialize)]
struct DeployEnvelope<'a> {
    deploy: DeployBody<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeployBody<'a> {
    request_id: &'a str,
    id: &'a str,
    resources: ResourcesBody,
    command: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResourcesBody {
    cpus: u32,
    memory_mb: u32,
    num_ports: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StateBody {
    active_tasks: u32,
}

/// Client for `http://<master>:<port>/singularity/api`.
#[derive(Clone, Debug)]
pub struct SingularityClient {
    http: Client,
    base: String,
}

impl SingularityClient {
    /// Creates a client for the scheduler on `master` at `port`.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidAddress`] when the address does not
    /// form a URL, or [`SchedulerError::Transport`] when the HTTP client
    /// cannot be initialised.
    pub fn new(master: &str, port: u16) -> Result<Self, SchedulerError> {
        let base = format!("http://{master}:{port}/singularity/api");
        Url::parse(&base).map_err(|err| SchedulerError::InvalidAddress {
            address: master.to_owned(),
            message: err.to_string(),
        })?;
        let http = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(transport)?;
        Ok(Self { http, base })
    }

    /// Base URL of the API.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base
    }

    async fn post<T: Serialize + Sync>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<SubmitOutcome, SchedulerError> {
        let response = self
            .http
            .post(format!("{}/{path}", self.base))
            .json(body)
            .send()
            .await
            .map_err(transport)?;
        submit_outcome(response).await
    }
}

fn transport(err: reqwest::Error) -> SchedulerError {
    SchedulerError::Transport {
        message: err.to_string(),
    }
}

async fn submit_outcome(response: Response) -> Result<SubmitOutcome, SchedulerError> {
    let status = response.status();
    if status.is_success() {
        return Ok(SubmitOutcome::Accepted);
    }
    let body = response.text().await.unwrap_or_default();
    debug!(status = status.as_u16(), %body, "scheduler rejected submission");
    Ok(SubmitOutcome::Rejected {
        status: status.as_u16(),
        body,
    })
}

impl SchedulerClient for SingularityClient {
    fn submit_request<'a>(
        &'a self,
        task: &'a RemoteTaskDescriptor,
    ) -> SchedulerFuture<'a, SubmitOutcome> {
        Box::pin(async move {
            let body = RequestBody {
                id: &task.request_id,
                request_type: REQUEST_TYPE,
                instances: 1,
            };
            self.post("requests", &body).await
        })
    }

    fn submit_deploy<'a>(
        &'a self,
        task: &'a RemoteTaskDescriptor,
    ) -> SchedulerFuture<'a, SubmitOutcome> {
        Box::pin(async move {
            let body = DeployEnvelope {
                deploy: DeployBody {
                    request_id: &task.request_id,
                    id: &task.deploy_id,
                    resources: ResourcesBody {
                        cpus: task.resources.cpus,
                        memory_mb: task.resources.memory_mb,
                        num_ports: 0,
                    },
                    command: &task.command,
                },
            };
            self.post("deploys", &body).await
        })
    }

    fn active_tasks(&self) -> SchedulerFuture<'_, u32> {
        Box::pin(async move {
            let response = self
                .http
                .get(format!("{}/state", self.base))
                .send()
                .await
                .map_err(transport)?;
            let status = response.status();
            if !status.is_success() {
                return Err(SchedulerError::Transport {
                    message: format!("state returned HTTP {}", status.as_u16()),
                });
            }
            let state: StateBody = response.json().await.map_err(|err| SchedulerError::Decode {
                message: err.to_string(),
            })?;
            Ok(state.active_tasks)
        })
    }
}
