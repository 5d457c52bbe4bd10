//! Tests for properties parsing and persistence.

use super::*;
use rstest::{fixture, rstest};
use tempfile::TempDir;

struct SettingsFixture {
    _tmp: TempDir,
    path: Utf8PathBuf,
}

#[fixture]
fn settings_fixture() -> SettingsFixture {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let path = Utf8PathBuf::from_path_buf(tmp.path().join("nested").join("openstack.properties"))
        .unwrap_or_else(|err| panic!("temp path should be utf8: {}", err.display()));
    SettingsFixture { _tmp: tmp, path }
}

#[rstest]
fn parse_properties_skips_comments_and_blank_lines() {
    let parsed = parse_properties(
        "# comment\n\n! other comment\nopenstack-username = alice\nslave-instance-count:3\n",
    );

    assert_eq!(parsed.len(), 2);
    assert_eq!(parsed.get(OPERATOR_KEY).map(String::as_str), Some("alice"));
    assert_eq!(
        parsed.get(PARTITION_COUNT_KEY).map(String::as_str),
        Some("3")
    );
}

#[rstest]
fn parse_properties_keeps_separators_inside_values() {
    let parsed = parse_properties("openstack-endpoint=https://keystone:5000/v2.0\n");

    assert_eq!(
        parsed.get(ENDPOINT_KEY).map(String::as_str),
        Some("https://keystone:5000/v2.0")
    );
}

#[rstest]
fn put_none_removes_key() {
    let settings = PropertiesSettings::from_pairs([(OPERATOR_KEY, "alice")]);
    settings.put(OPERATOR_KEY, None);

    assert_eq!(settings.get(OPERATOR_KEY), None);
}

#[rstest]
fn render_normalises_identity_file_separators() {
    let settings = PropertiesSettings::from_pairs([
        (IDENTITY_FILE_KEY, "C:\\keys\\cluster.pem"),
        (OPERATOR_KEY, "alice"),
    ]);

    let rendered = render_properties(&settings.snapshot());

    assert_eq!(
        rendered,
        "identity-file=C:/keys/cluster.pem\nopenstack-username=alice\n"
    );
}

#[rstest]
fn write_then_load_restores_pairs(settings_fixture: SettingsFixture) {
    let SettingsFixture { path, .. } = settings_fixture;
    let settings =
        PropertiesSettings::from_pairs([(OPERATOR_KEY, "alice"), (PARTITION_COUNT_KEY, "4")]);

    settings
        .write_properties_file(&path)
        .unwrap_or_else(|err| panic!("write properties: {err}"));
    let loaded = PropertiesSettings::load(&path).unwrap_or_else(|err| panic!("load: {err}"));

    assert_eq!(loaded.snapshot(), settings.snapshot());
}

#[rstest]
fn load_reports_missing_file(settings_fixture: SettingsFixture) {
    let SettingsFixture { path, .. } = settings_fixture;

    let err = PropertiesSettings::load(&path).expect_err("missing file should fail");

    assert!(matches!(err, SettingsError::Io { .. }), "unexpected: {err}");
}

#[rstest]
#[case::absent(None)]
#[case::blank(Some("   "))]
fn require_rejects_absent_or_blank_values(#[case] value: Option<&str>) {
    let settings = PropertiesSettings::new();
    settings.put(TENANT_KEY, value.map(str::to_owned));

    let err = require(&settings, TENANT_KEY).expect_err("blank value should be rejected");

    assert_eq!(
        err,
        SettingsError::Missing {
            key: TENANT_KEY.to_owned()
        }
    );
}

#[rstest]
fn require_trims_present_values() {
    let settings = PropertiesSettings::from_pairs([(TENANT_KEY, " project ")]);

    assert_eq!(require(&settings, TENANT_KEY).ok().as_deref(), Some("project"));
}
