//! Command-line interface definitions for the `fleetcmd` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Parser, ValueEnum};

/// Top-level CLI for the `fleetcmd` binary.
#[derive(Debug, Parser)]
#[command(
    name = "fleetcmd",
    about = "Run a shell command on a managed instance and wait for it to finish",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Submit a command, poll it to completion and print its output.
    #[command(
        name = "run",
        about = "Submit a command, poll it to completion and print its output"
    )]
    Run(RunCommand),
}

/// Log verbosity accepted by `--log-level`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub(crate) enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Arguments for the `fleetcmd run` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct RunCommand {
    /// Managed instance that executes the command.
    #[arg(long, value_name = "ID")]
    pub(crate) instance_id: String,
    /// Probe the instance with a trivial command until it responds before
    /// submitting.
    #[arg(long)]
    pub(crate) wait_ready: bool,
    /// Bucket receiving the untruncated command output.
    #[arg(long, value_name = "BUCKET", requires = "output_key_prefix")]
    pub(crate) output_bucket: Option<String>,
    /// Key prefix under the output bucket.
    #[arg(long, value_name = "PREFIX", requires = "output_bucket")]
    pub(crate) output_key_prefix: Option<String>,
    /// Log verbosity; logs are written to stderr.
    #[arg(long, value_enum, env = "FLEETCMD_LOG", value_name = "LEVEL")]
    pub(crate) log_level: Option<LogLevel>,
    /// Command to execute on the instance (use -- to separate flags).
    #[arg(required = true, trailing_var_arg = true)]
    pub(crate) command: Vec<String>,
}
