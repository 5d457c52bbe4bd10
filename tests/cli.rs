//! Behavioural tests for the `gridop` binary's failure paths.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::str::contains;
use rstest::{fixture, rstest};
use tempfile::TempDir;

struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    /// Command isolated from operator config files and `GRIDOP_*` variables.
    fn command(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("gridop");
        cmd.env_clear()
            .current_dir(self.dir.path())
            .env("HOME", self.dir.path())
            .env("XDG_CONFIG_HOME", self.dir.path())
            .env("RUST_LOG", "error");
        cmd
    }

    /// Command with the required tool paths configured.
    fn configured(&self) -> Command {
        let mut cmd = self.command();
        cmd.env("GRIDOP_TOOL_PROGRAM", self.dir.path().join("no-such-java"))
            .env("GRIDOP_TOOL_JAR", "/opt/cluster/provisioner.jar")
            .env("GRIDOP_EXEC_SCRIPT", "/opt/cluster/node-init.sh");
        cmd
    }

    fn write(&self, name: &str, contents: &str) -> String {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents).unwrap_or_else(|err| panic!("write {name}: {err}"));
        path.to_string_lossy().into_owned()
    }
}

#[fixture]
fn sandbox() -> Sandbox {
    Sandbox {
        dir: TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}")),
    }
}

#[rstest]
fn no_arguments_prints_usage(sandbox: Sandbox) {
    sandbox
        .command()
        .assert()
        .failure()
        .stderr(contains("Usage"));
}

#[rstest]
fn run_without_tool_jar_reports_missing_configuration(sandbox: Sandbox) {
    let input = sandbox.write("query.fasta", ">a\nMK\n");

    sandbox
        .command()
        .args(["run", "--input", input.as_str()])
        .assert()
        .code(2)
        .stderr(contains("GRIDOP_TOOL_JAR"));
}

#[rstest]
fn run_with_missing_input_is_a_configuration_error(sandbox: Sandbox) {
    sandbox
        .configured()
        .args(["run", "--input", "absent.fasta"])
        .assert()
        .code(2)
        .stderr(contains("absent.fasta"));
}

#[rstest]
fn run_with_unknown_unit_lists_available_units(sandbox: Sandbox) {
    let input = sandbox.write("query.fasta", ">a\nMK\n");
    let settings = sandbox.write(
        "cloud.properties",
        "openstack-username=alice\nopenstack-password=pw\nopenstack-endpoint=https://keystone/v2.0\nopenstack-tenantname=proj\n",
    );

    sandbox
        .configured()
        .env("GRIDOP_SETTINGS_FILE", settings)
        .args(["run", "--input", input.as_str(), "--unit", "tblastn"])
        .assert()
        .code(2)
        .stderr(contains("blastp"));
}

#[rstest]
fn terminate_reports_unlaunchable_tool_as_transport_failure(sandbox: Sandbox) {
    let settings = sandbox.write("cloud.properties", "openstack-username=alice\n");

    sandbox
        .configured()
        .env("GRIDOP_SETTINGS_FILE", settings)
        .args(["terminate", "c-42"])
        .assert()
        .code(4)
        .stderr(contains("no-such-java"));
}
