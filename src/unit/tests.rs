//! Tests for record splitting, the blastp unit, and the registry.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::records::{FLUSH_EVERY, concatenate_lines, split_records};
use super::*;
use crate::settings::{
    ENDPOINT_KEY, OPERATOR_KEY, PASSWORD_KEY, PropertiesSettings, TENANT_KEY,
};
use crate::staging::StagingCredentials;

#[fixture]
fn workdir() -> TempDir {
    TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"))
}

fn fasta(records: usize) -> String {
    let mut text = String::new();
    for index in 0..records {
        writeln!(text, ">sp|P{index:05}| protein {index}").ok();
        writeln!(text, "MKVLAAGIVGLLLA").ok();
        writeln!(text, "QQRS").ok();
    }
    text
}

fn targets(dir: &Path, prefix: &str, count: usize) -> Vec<PathBuf> {
    (1..=count)
        .map(|number| dir.join(format!("{prefix}-{number}-x")))
        .collect()
}

fn write(path: &Path, contents: &str) {
    std::fs::write(path, contents).unwrap_or_else(|err| panic!("write {}: {err}", path.display()));
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_else(|err| panic!("read {}: {err}", path.display()))
}

fn header_count(path: &Path) -> usize {
    read(path).lines().filter(|line| line.starts_with('>')).count()
}

fn blastp_settings() -> PropertiesSettings {
    PropertiesSettings::from_pairs([
        (ENDPOINT_KEY, "https://keystone:5000/v2.0"),
        (OPERATOR_KEY, "alice"),
        (PASSWORD_KEY, "pa ss"),
        (TENANT_KEY, "proj"),
    ])
}

#[rstest]
fn ten_records_in_three_partitions_split_four_four_two(workdir: TempDir) {
    let source = workdir.path().join("query.fasta");
    write(&source, &fasta(10));
    let parts = targets(workdir.path(), "input", 3);

    let counts = split_records(&source, &parts, |line| line.starts_with('>'))
        .unwrap_or_else(|err| panic!("split: {err}"));

    assert_eq!(counts, vec![4, 4, 2]);
    let on_disk: Vec<usize> = parts.iter().map(|path| header_count(path)).collect();
    assert_eq!(on_disk, vec![4, 4, 2]);
}

#[rstest]
fn preamble_travels_with_first_partition(workdir: TempDir) {
    let source = workdir.path().join("query.fasta");
    write(&source, &format!("; generated\n{}", fasta(2)));
    let parts = targets(workdir.path(), "input", 2);

    split_records(&source, &parts, |line| line.starts_with('>'))
        .unwrap_or_else(|err| panic!("split: {err}"));

    let first = parts.first().map(|path| read(path)).unwrap_or_default();
    assert!(first.starts_with("; generated\n>sp|P00000|"), "first: {first}");
}

#[rstest]
fn extra_partitions_are_left_empty(workdir: TempDir) {
    let source = workdir.path().join("query.fasta");
    write(&source, &fasta(2));
    let parts = targets(workdir.path(), "input", 4);

    let counts = split_records(&source, &parts, |line| line.starts_with('>'))
        .unwrap_or_else(|err| panic!("split: {err}"));

    assert_eq!(counts, vec![1, 1, 0, 0]);
    assert!(parts.iter().all(|path| path.exists()));
    assert_eq!(parts.get(3).map(|path| read(path)), Some(String::new()));
}

#[rstest]
#[case(1, 1)]
#[case(7, 3)]
#[case(10, 3)]
#[case(12, 4)]
#[case(3, 5)]
fn partition_then_combine_restores_input(
    workdir: TempDir,
    #[case] records: usize,
    #[case] partitions: usize,
) {
    let source = workdir.path().join("query.fasta");
    let original = fasta(records);
    write(&source, &original);
    let parts = targets(workdir.path(), "input", partitions);
    let merged = workdir.path().join("merged");

    split_records(&source, &parts, |line| line.starts_with('>'))
        .unwrap_or_else(|err| panic!("split: {err}"));
    concatenate_lines(&merged, &parts).unwrap_or_else(|err| panic!("combine: {err}"));

    assert_eq!(read(&merged), original);
}

#[rstest]
fn concatenate_handles_more_lines_than_flush_interval(workdir: TempDir) {
    let first = workdir.path().join("a");
    let second = workdir.path().join("b");
    let lines: String = (0..FLUSH_EVERY + 7).map(|index| format!("{index}\n")).collect();
    write(&first, &lines);
    write(&second, "tail\n");
    let merged = workdir.path().join("merged");

    let written = concatenate_lines(&merged, &[first, second])
        .unwrap_or_else(|err| panic!("combine: {err}"));

    assert_eq!(written, FLUSH_EVERY + 8);
    assert_eq!(read(&merged), format!("{lines}tail\n"));
}

#[rstest]
fn concatenate_reports_missing_source(workdir: TempDir) {
    let merged = workdir.path().join("merged");
    let missing = workdir.path().join("output-1-missing");

    let err = concatenate_lines(&merged, &[missing]).expect_err("missing source");

    assert!(matches!(err, WorkUnitError::Io { ref path, .. } if path.ends_with("output-1-missing")));
}

#[rstest]
fn split_rejects_zero_partitions(workdir: TempDir) {
    let source = workdir.path().join("query.fasta");
    write(&source, &fasta(1));

    let err = split_records(&source, &[], |line| line.starts_with('>')).expect_err("no targets");

    assert!(matches!(err, WorkUnitError::PartitionMismatch { .. }));
}

#[rstest]
fn blastp_commands_fetch_run_and_upload(workdir: TempDir) {
    let source = workdir.path().join("query.fasta");
    write(&source, &fasta(4));
    let inputs = targets(workdir.path(), "input", 2);
    let outputs = targets(workdir.path(), "output", 2);
    let mut unit = BlastpUnit::from_settings(&blastp_settings(), "BLAST-DB")
        .unwrap_or_else(|err| panic!("unit: {err}"));

    unit.set_output_targets(&outputs);
    unit.partition(&source, &inputs)
        .unwrap_or_else(|err| panic!("partition: {err}"));
    let commands = unit
        .build_commands("SINGULARITY-alice-2024-03-07")
        .unwrap_or_else(|err| panic!("commands: {err}"));

    assert_eq!(unit.identifier(), "BLASTP");
    assert_eq!(commands.len(), 2);
    let first = commands.first().map(String::as_str).unwrap_or_default();
    assert!(first.starts_with("export OS_AUTH_URL="), "command: {first}");
    assert!(
        first.contains(
            " ; export OS_USERNAME=alice ; export OS_PASSWORD='pa ss' ; export OS_TENANT_NAME=proj ; "
        ),
        "command: {first}"
    );
    for file in ["swissprot.phr", "swissprot.pin", "swissprot.psq"] {
        assert!(
            first.contains(&format!("swift download BLAST-DB {file} -o {file} ; ")),
            "command: {first}"
        );
    }
    assert!(first.contains("swift download SINGULARITY-alice-2024-03-07 input-1-x ; "));
    assert!(first.contains("blastp -outfmt 6 -db swissprot -query input-1-x -out output-1-x ; "));
    assert!(first.ends_with(
        "swift upload SINGULARITY-alice-2024-03-07 output-1-x --object-name output-1-x"
    ));
}

#[rstest]
fn blastp_commands_require_partitioning() {
    let unit = BlastpUnit::new(
        StagingCredentials::from_settings(&blastp_settings())
            .unwrap_or_else(|err| panic!("credentials: {err}")),
        "BLAST-DB",
    );

    let err = unit.build_commands("c").expect_err("not partitioned");

    assert!(matches!(err, WorkUnitError::PartitionMismatch { .. }));
}

#[rstest]
fn blastp_combine_concatenates_outputs(workdir: TempDir) {
    let outputs = targets(workdir.path(), "output", 2);
    for (path, text) in outputs.iter().zip(["q1\ts1\n", "q2\ts2\nq3\ts3\n"]) {
        write(path, text);
    }
    let destination = workdir.path().join("query.fasta.results");
    let unit = BlastpUnit::from_settings(&blastp_settings(), "BLAST-DB")
        .unwrap_or_else(|err| panic!("unit: {err}"));

    unit.combine(&destination, &outputs)
        .unwrap_or_else(|err| panic!("combine: {err}"));

    assert_eq!(read(&destination), "q1\ts1\nq2\ts2\nq3\ts3\n");
}

#[rstest]
fn registry_creates_units_case_insensitively() {
    let registry = WorkUnitRegistry::with_builtin("BLAST-DB");

    let unit = registry
        .create("BLASTP", &blastp_settings())
        .unwrap_or_else(|err| panic!("create: {err}"));

    assert_eq!(unit.identifier(), "BLASTP");
    assert_eq!(registry.names(), vec![String::from("blastp")]);
}

#[rstest]
fn registry_lists_available_units_for_unknown_name() {
    let registry = WorkUnitRegistry::with_builtin("BLAST-DB");

    let err = registry
        .create("hmmer", &blastp_settings())
        .err()
        .unwrap_or_else(|| panic!("unknown unit should fail"));

    assert_eq!(
        err,
        WorkUnitError::NotRegistered {
            name: String::from("hmmer"),
            available: String::from("blastp"),
        }
    );
}

#[rstest]
fn registry_propagates_missing_credentials() {
    let registry = WorkUnitRegistry::with_builtin("BLAST-DB");
    let settings = PropertiesSettings::from_pairs([(OPERATOR_KEY, "alice")]);

    let err = registry
        .create("blastp", &settings)
        .err()
        .unwrap_or_else(|| panic!("missing credentials should fail"));

    assert!(matches!(err, WorkUnitError::Settings(_)), "unexpected: {err}");
}
