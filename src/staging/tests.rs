//! Tests for staging helpers and the Swift client.

use std::path::PathBuf;

use chrono::NaiveDate;
use rstest::rstest;
use tempfile::TempDir;

use super::*;
use crate::test_support::{RecordingStore, StoreOperation, StubResponse, StubServer};

fn tempdir() -> TempDir {
    TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"))
}

fn credentials(endpoint: String) -> StagingCredentials {
    StagingCredentials {
        endpoint,
        username: String::from("alice"),
        password: String::from("s3cret"),
        tenant: String::from("proj"),
    }
}

fn swift(endpoint: String) -> SwiftStore {
    SwiftStore::new(credentials(endpoint)).unwrap_or_else(|err| panic!("swift client: {err}"))
}

fn token_body(storage_url: &str) -> String {
    token_body_with(storage_url, "tok-1")
}

fn token_body_with(storage_url: &str, token: &str) -> String {
    format!(
        r#"{{"access":{{"token":{{"id":"{token}"}},"serviceCatalog":[
            {{"type":"compute","endpoints":[{{"publicURL":"http://unused"}}]}},
            {{"type":"object-store","endpoints":[{{"publicURL":"{storage_url}"}}]}}]}}}}"#
    )
}

#[rstest]
#[case::plain("SINGULARITY-", "alice", "SINGULARITY-alice-2024-03-07")]
#[case::custom_prefix("batch_", "bob", "batch_bob-2024-03-07")]
fn container_name_joins_prefix_operator_and_day(
    #[case] prefix: &str,
    #[case] operator: &str,
    #[case] expected: &str,
) {
    let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap_or_else(|| panic!("valid date"));

    assert_eq!(container_name(prefix, operator, date), expected);
}

#[tokio::test]
async fn ensure_container_reuses_existing_container() {
    let store = RecordingStore::new();
    store.seed("SINGULARITY-alice-2024-03-07", &[]);

    ensure_container(&store, "SINGULARITY-alice-2024-03-07")
        .await
        .unwrap_or_else(|err| panic!("ensure: {err}"));

    assert!(store.calls_of(StoreOperation::CreateContainer).is_empty());
}

#[tokio::test]
async fn ensure_container_creates_when_only_longer_names_exist() {
    let store = RecordingStore::new();
    store.seed("SINGULARITY-alice-2024-03-07-old", &[]);

    ensure_container(&store, "SINGULARITY-alice-2024-03-07")
        .await
        .unwrap_or_else(|err| panic!("ensure: {err}"));

    assert_eq!(store.calls_of(StoreOperation::CreateContainer).len(), 1);
    assert!(
        store
            .containers()
            .contains(&String::from("SINGULARITY-alice-2024-03-07"))
    );
}

#[rstest]
fn staging_files_are_numbered_from_one() {
    let dir = tempdir();

    let files = StagingFiles::allocate(2, dir.path()).unwrap_or_else(|err| panic!("{err}"));

    let inputs: Vec<&str> = files.inputs().iter().map(StagedFile::object).collect();
    let outputs: Vec<&str> = files.outputs().iter().map(StagedFile::object).collect();
    assert_eq!(files.len(), 2);
    assert!(inputs.first().is_some_and(|name| name.starts_with("input-1-")));
    assert!(inputs.get(1).is_some_and(|name| name.starts_with("input-2-")));
    assert!(outputs.first().is_some_and(|name| name.starts_with("output-1-")));
    assert!(files.input_paths().iter().all(|path| path.exists()));
}

#[rstest]
fn staging_files_are_removed_on_drop() {
    let dir = tempdir();
    let files = StagingFiles::allocate(1, dir.path()).unwrap_or_else(|err| panic!("{err}"));
    let paths: Vec<PathBuf> = files
        .input_paths()
        .into_iter()
        .chain(files.output_paths())
        .collect();

    drop(files);

    assert!(paths.iter().all(|path| !path.exists()));
}

#[tokio::test]
async fn swift_authenticates_once_and_uploads_with_token() {
    let dir = tempdir();
    let source = dir.path().join("input-1-abc");
    std::fs::write(&source, ">p1\nMKV\n").unwrap_or_else(|err| panic!("write: {err}"));
    let storage = StubServer::start(vec![
        StubResponse::json(200, r#"[{"name":"SINGULARITY-alice-2024-03-07"}]"#),
        StubResponse::empty(201),
    ])
    .await
    .unwrap_or_else(|err| panic!("storage stub: {err}"));
    let storage_url = format!("{}/v1/AUTH_proj", storage.base_url());
    let identity = StubServer::start(vec![StubResponse::json(200, &token_body(&storage_url))])
        .await
        .unwrap_or_else(|err| panic!("identity stub: {err}"));
    let store = swift(format!("{}/v2.0/", identity.base_url()));

    let listed = store
        .list_containers("SINGULARITY-alice")
        .await
        .unwrap_or_else(|err| panic!("list: {err}"));
    store
        .put_object("SINGULARITY-alice-2024-03-07", "input-1-abc", &source)
        .await
        .unwrap_or_else(|err| panic!("put: {err}"));

    assert_eq!(listed, vec![String::from("SINGULARITY-alice-2024-03-07")]);
    let auth = identity.requests();
    let auth_request = auth.first().unwrap_or_else(|| panic!("auth request"));
    assert_eq!(auth.len(), 1);
    assert_eq!(auth_request.method, "POST");
    assert_eq!(auth_request.target, "/v2.0/tokens");
    let body = auth_request.json().unwrap_or_else(|| panic!("auth body is json"));
    assert_eq!(body["auth"]["tenantName"], "proj");
    assert_eq!(body["auth"]["passwordCredentials"]["username"], "alice");

    let requests = storage.requests();
    let list = requests.first().unwrap_or_else(|| panic!("list request"));
    assert_eq!(list.method, "GET");
    assert!(list.target.starts_with("/v1/AUTH_proj?"), "target: {}", list.target);
    assert!(list.target.contains("format=json"));
    assert_eq!(list.header("x-auth-token"), Some("tok-1"));
    let put = requests.get(1).unwrap_or_else(|| panic!("put request"));
    assert_eq!(put.method, "PUT");
    assert_eq!(
        put.target,
        "/v1/AUTH_proj/SINGULARITY-alice-2024-03-07/input-1-abc"
    );
    assert_eq!(put.body, ">p1\nMKV\n");
}

#[tokio::test]
async fn swift_download_writes_target_file() {
    let dir = tempdir();
    let target = dir.path().join("output-1-abc");
    let storage = StubServer::start(vec![StubResponse::json(200, "q1\ts1\t99.0\n")])
        .await
        .unwrap_or_else(|err| panic!("storage stub: {err}"));
    let storage_url = format!("{}/v1/AUTH_proj", storage.base_url());
    let identity = StubServer::start(vec![StubResponse::json(200, &token_body(&storage_url))])
        .await
        .unwrap_or_else(|err| panic!("identity stub: {err}"));
    let store = swift(identity.base_url());

    store
        .get_object("c", "output-1-abc", &target)
        .await
        .unwrap_or_else(|err| panic!("get: {err}"));

    let written = std::fs::read_to_string(&target).unwrap_or_else(|err| panic!("read: {err}"));
    assert_eq!(written, "q1\ts1\t99.0\n");
}

#[tokio::test]
async fn swift_reports_refused_credentials() {
    let identity = StubServer::start(vec![StubResponse::json(401, r#"{"error":"denied"}"#)])
        .await
        .unwrap_or_else(|err| panic!("identity stub: {err}"));
    let store = swift(identity.base_url());

    let err = store
        .create_container("c")
        .await
        .expect_err("auth should fail");

    assert!(matches!(err, StagingError::Auth { .. }), "unexpected: {err}");
}

#[tokio::test]
async fn swift_maps_error_status() {
    let storage = StubServer::start(vec![StubResponse::empty(404)])
        .await
        .unwrap_or_else(|err| panic!("storage stub: {err}"));
    let storage_url = format!("{}/v1/AUTH_proj", storage.base_url());
    let identity = StubServer::start(vec![StubResponse::json(200, &token_body(&storage_url))])
        .await
        .unwrap_or_else(|err| panic!("identity stub: {err}"));
    let store = swift(identity.base_url());

    let err = store
        .delete_object("c", "gone")
        .await
        .expect_err("missing object should fail");

    assert_eq!(
        err,
        StagingError::Status {
            action: String::from("delete c/gone"),
            status: 404,
        }
    );
}

#[tokio::test]
async fn swift_renews_expired_token_and_retries_once() {
    let dir = tempdir();
    let source = dir.path().join("input-1-abc");
    let target = dir.path().join("output-1-abc");
    std::fs::write(&source, ">p1\nMKV\n").unwrap_or_else(|err| panic!("write: {err}"));
    let storage = StubServer::start(vec![
        StubResponse::empty(201),
        StubResponse::empty(401),
        StubResponse::json(200, "q1\ts1\t99.0\n"),
    ])
    .await
    .unwrap_or_else(|err| panic!("storage stub: {err}"));
    let storage_url = format!("{}/v1/AUTH_proj", storage.base_url());
    let identity = StubServer::start(vec![
        StubResponse::json(200, &token_body_with(&storage_url, "tok-1")),
        StubResponse::json(200, &token_body_with(&storage_url, "tok-2")),
    ])
    .await
    .unwrap_or_else(|err| panic!("identity stub: {err}"));
    let store = swift(identity.base_url());

    store
        .put_object("c", "input-1-abc", &source)
        .await
        .unwrap_or_else(|err| panic!("put: {err}"));
    store
        .get_object("c", "output-1-abc", &target)
        .await
        .unwrap_or_else(|err| panic!("get after token expiry: {err}"));

    assert_eq!(identity.requests().len(), 2);
    let tokens: Vec<Option<String>> = storage
        .requests()
        .iter()
        .map(|request| request.header("x-auth-token").map(str::to_owned))
        .collect();
    assert_eq!(
        tokens,
        vec![
            Some(String::from("tok-1")),
            Some(String::from("tok-1")),
            Some(String::from("tok-2")),
        ]
    );
    let written = std::fs::read_to_string(&target).unwrap_or_else(|err| panic!("read: {err}"));
    assert_eq!(written, "q1\ts1\t99.0\n");
}

#[tokio::test]
async fn swift_reports_second_rejection_without_looping() {
    let storage = StubServer::start(vec![StubResponse::empty(401), StubResponse::empty(401)])
        .await
        .unwrap_or_else(|err| panic!("storage stub: {err}"));
    let storage_url = format!("{}/v1/AUTH_proj", storage.base_url());
    let identity = StubServer::start(vec![
        StubResponse::json(200, &token_body_with(&storage_url, "tok-1")),
        StubResponse::json(200, &token_body_with(&storage_url, "tok-2")),
    ])
    .await
    .unwrap_or_else(|err| panic!("identity stub: {err}"));
    let store = swift(identity.base_url());

    let err = store
        .delete_container("c")
        .await
        .expect_err("persistent rejection should fail");

    assert_eq!(
        err,
        StagingError::Status {
            action: String::from("delete container c"),
            status: 401,
        }
    );
    assert_eq!(storage.requests().len(), 2);
    assert_eq!(identity.requests().len(), 2);
}

#[rstest]
fn credentials_require_every_key() {
    let settings = crate::settings::PropertiesSettings::from_pairs([
        (crate::settings::ENDPOINT_KEY, "http://keystone"),
        (crate::settings::OPERATOR_KEY, "alice"),
        (crate::settings::PASSWORD_KEY, "pw"),
    ]);

    let err = StagingCredentials::from_settings(&settings).expect_err("tenant missing");

    assert_eq!(
        err,
        crate::settings::SettingsError::Missing {
            key: String::from(crate::settings::TENANT_KEY)
        }
    );
}

#[rstest]
fn credentials_debug_redacts_password() {
    let rendered = format!("{:?}", credentials(String::from("http://keystone")));

    assert!(!rendered.contains("s3cret"), "rendered: {rendered}");
}
