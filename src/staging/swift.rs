//! OpenStack Swift staging store with Keystone v2 password authentication.

use std::path::Path;
use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use super::{StagingError, StagingFuture, StagingStore};
use crate::settings::{self, ENDPOINT_KEY, OPERATOR_KEY, PASSWORD_KEY, SettingsStore, TENANT_KEY};

const HTTP_TIMEOUT: Duration = Duration::from_secs(120);
const OBJECT_STORE_TYPE: &str = "object-store";

/// Cloud credentials read from the settings.
#[derive(Clone, PartialEq, Eq)]
pub struct StagingCredentials {
    /// Identity service endpoint, for example `https://keystone:5000/v2.0`.
    pub endpoint: String,
    /// Operator user name.
    pub username: String,
    /// Operator password.
    pub password: String,
    /// Tenant (project) name.
    pub tenant: String,
}

impl std::fmt::Debug for StagingCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagingCredentials")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("tenant", &self.tenant)
            .finish()
    }
}

impl StagingCredentials {
    /// Reads the four credential keys.
    ///
    /// # Errors
    ///
    /// Returns [`crate::settings::SettingsError::Missing`] for the first
    /// absent key.
    pub fn from_settings(store: &dyn SettingsStore) -> Result<Self, settings::SettingsError> {
        Ok(Self {
            endpoint: settings::require(store, ENDPOINT_KEY)?,
            username: settings::require(store, OPERATOR_KEY)?,
            password: settings::require(store, PASSWORD_KEY)?,
            tenant: settings::require(store, TENANT_KEY)?,
        })
    }
}

#[derive(Serialize)]
struct AuthRequest<'a> {
    auth: AuthBody<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthBody<'a> {
    tenant_name: &'a str,
    password_credentials: PasswordCredentials<'a>,
}

#[derive(Serialize)]
struct PasswordCredentials<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct AuthResponse {
    access: Access,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Access {
    token: Token,
    #[serde(default)]
    service_catalog: Vec<CatalogEntry>,
}

#[derive(Deserialize)]
struct Token {
    id: String,
}

#[derive(Deserialize)]
struct CatalogEntry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    endpoints: Vec<CatalogEndpoint>,
}

#[derive(Deserialize)]
struct CatalogEndpoint {
    #[serde(rename = "publicURL")]
    public_url: String,
}

#[derive(Deserialize)]
struct ContainerEntry {
    name: String,
}

#[derive(Clone)]
struct Session {
    token: String,
    storage_url: Url,
}

/// Swift client. Authenticates on first use and reuses the token for the
/// lifetime of the store.
pub struct SwiftStore {
    http: Client,
    credentials: StagingCredentials,
    session: Mutex<Option<Session>>,
}

impl SwiftStore {
    /// Creates a store; no request is made until the first operation.
    ///
    /// # Errors
    ///
    /// Returns [`StagingError::Transport`] when the HTTP client cannot be
    /// initialised.
    pub fn new(credentials: StagingCredentials) -> Result<Self, StagingError> {
        let http = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(transport)?;
        Ok(Self {
            http,
            credentials,
            session: Mutex::new(None),
        })
    }

    async fn session(&self) -> Result<Session, StagingError> {
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.as_ref() {
            return Ok(session.clone());
        }
        let session = self.authenticate().await?;
        *guard = Some(session.clone());
        Ok(session)
    }

    /// Drops the cached session if it still holds `rejected`.
    async fn invalidate(&self, rejected: &str) {
        let mut guard = self.session.lock().await;
        if guard.as_ref().is_some_and(|session| session.token == rejected) {
            *guard = None;
        }
    }

    async fn authenticate(&self) -> Result<Session, StagingError> {
        let url = format!("{}/tokens", self.credentials.endpoint.trim_end_matches('/'));
        let request = AuthRequest {
            auth: AuthBody {
                tenant_name: &self.credentials.tenant,
                password_credentials: PasswordCredentials {
                    username: &self.credentials.username,
                    password: &self.credentials.password,
                },
            },
        };
        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(transport)?;
        if !response.status().is_success() {
            return Err(StagingError::Auth {
                message: format!("identity service returned HTTP {}", response.status().as_u16()),
            });
        }
        let body: AuthResponse = response.json().await.map_err(|err| StagingError::Auth {
            message: format!("unreadable token response: {err}"),
        })?;
        let Access {
            token,
            service_catalog,
        } = body.access;
        let public_url = service_catalog
            .into_iter()
            .filter(|entry| entry.kind == OBJECT_STORE_TYPE)
            .find_map(|entry| entry.endpoints.into_iter().next())
            .map(|endpoint| endpoint.public_url)
            .ok_or_else(|| StagingError::Auth {
                message: String::from("service catalog has no object-store endpoint"),
            })?;
        let storage_url = Url::parse(&public_url).map_err(|err| StagingError::Auth {
            message: format!("invalid object-store URL {public_url}: {err}"),
        })?;
        debug!(%storage_url, "authenticated against identity service");
        Ok(Session {
            token: token.id,
            storage_url,
        })
    }

    /// Sends one storage request. A 401 means the token expired: the
    /// session is renewed and the request sent once more.
    async fn send<F>(
        &self,
        method: Method,
        segments: &[&str],
        prepare: F,
    ) -> Result<Response, StagingError>
    where
        F: Fn(RequestBuilder) -> RequestBuilder + Send + Sync,
    {
        let (response, token) = self.dispatch(&method, segments, &prepare).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }
        debug!("object-store token rejected; authenticating again");
        self.invalidate(&token).await;
        let (retried, _) = self.dispatch(&method, segments, &prepare).await?;
        Ok(retried)
    }

    async fn dispatch<F>(
        &self,
        method: &Method,
        segments: &[&str],
        prepare: &F,
    ) -> Result<(Response, String), StagingError>
    where
        F: Fn(RequestBuilder) -> RequestBuilder + Send + Sync,
    {
        let Session { token, storage_url } = self.session().await?;
        let mut url = storage_url;
        url.path_segments_mut()
            .map_err(|()| StagingError::Auth {
                message: String::from("object-store URL cannot carry a path"),
            })?
            .pop_if_empty()
            .extend(segments);
        let request = self
            .http
            .request(method.clone(), url)
            .header("X-Auth-Token", token.as_str());
        let response = prepare(request).send().await.map_err(transport)?;
        Ok((response, token))
    }
}

fn transport(err: reqwest::Error) -> StagingError {
    StagingError::Transport {
        message: err.to_string(),
    }
}

fn io_error(path: &Path, err: &std::io::Error) -> StagingError {
    StagingError::Io {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

fn expect_success(response: Response, action: String) -> Result<Response, StagingError> {
    if response.status().is_success() {
        return Ok(response);
    }
    Err(StagingError::Status {
        action,
        status: response.status().as_u16(),
    })
}

impl StagingStore for SwiftStore {
    fn list_containers<'a>(&'a self, prefix: &'a str) -> StagingFuture<'a, Vec<String>> {
        Box::pin(async move {
            let raw = self
                .send(Method::GET, &[], |request| {
                    request.query(&[("format", "json"), ("prefix", prefix)])
                })
                .await?;
            let response = expect_success(raw, format!("list containers {prefix}"))?;
            if response.status() == StatusCode::NO_CONTENT {
                return Ok(Vec::new());
            }
            let entries: Vec<ContainerEntry> = response.json().await.map_err(transport)?;
            Ok(entries.into_iter().map(|entry| entry.name).collect())
        })
    }

    fn create_container<'a>(&'a self, container: &'a str) -> StagingFuture<'a, ()> {
        Box::pin(async move {
            let response = self.send(Method::PUT, &[container], |request| request).await?;
            expect_success(response, format!("create container {container}"))?;
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
            let body = tokio::fs::read(source)
                .await
                .map_err(|err| io_error(source, &err))?;
            let response = self
                .send(Method::PUT, &[container, object], |request| {
                    request.body(body.clone())
                })
                .await?;
            expect_success(response, format!("put {container}/{object}"))?;
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
            let raw = self
                .send(Method::GET, &[container, object], |request| request)
                .await?;
            let response = expect_success(raw, format!("get {container}/{object}"))?;
            let bytes = response.bytes().await.map_err(transport)?;
            tokio::fs::write(target, &bytes)
                .await
                .map_err(|err| io_error(target, &err))
        })
    }

    fn delete_object<'a>(&'a self, container: &'a str, object: &'a str) -> StagingFuture<'a, ()> {
        Box::pin(async move {
            let response = self
                .send(Method::DELETE, &[container, object], |request| request)
                .await?;
            expect_success(response, format!("delete {container}/{object}"))?;
            Ok(())
        })
    }

    fn delete_container<'a>(&'a self, container: &'a str) -> StagingFuture<'a, ()> {
        Box::pin(async move {
            let response = self
                .send(Method::DELETE, &[container], |request| request)
                .await?;
            expect_success(response, format!("delete container {container}"))?;
            Ok(())
        })
    }
}
