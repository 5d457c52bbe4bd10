//! Command-line interface definitions for the `gridop` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use std::path::PathBuf;

use clap::Parser;

/// Top-level CLI for the `gridop` binary.
#[derive(Debug, Parser)]
#[command(
    name = "gridop",
    about = "Run a partitioned batch on a disposable compute cluster",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Provision a cluster, run one batch, and tear the cluster down.
    #[command(name = "run", about = "Provision a cluster and run one batch on it")]
    Run(RunCommand),
    /// Tear down a cluster left running by an earlier batch.
    #[command(name = "terminate", about = "Tear down an existing cluster")]
    Terminate(TerminateCommand),
}

/// Arguments for the `gridop run` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct RunCommand {
    /// Input file to partition.
    #[arg(long, value_name = "FILE")]
    pub(crate) input: PathBuf,
    /// Combined result file. Defaults to `<input>.results`.
    #[arg(long, value_name = "FILE")]
    pub(crate) output: Option<PathBuf>,
    /// Work unit used to split, run, and merge the batch.
    #[arg(long, value_name = "NAME", default_value = "blastp")]
    pub(crate) unit: String,
    /// Leave the cluster running after the batch.
    #[arg(long)]
    pub(crate) keep_cluster: bool,
}

/// Arguments for the `gridop terminate` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct TerminateCommand {
    /// Identifier reported when the cluster was created.
    #[arg(value_name = "CLUSTER_ID")]
    pub(crate) cluster_id: String,
}
