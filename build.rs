//! Build script for the `fleetcmd` manual pages.
//!
//! Writes `fleetcmd.1` and one `fleetcmd-<subcommand>.1` page per subcommand
//! into `OUT_DIR`. The top-level page also lists the environment variables
//! read by the configuration loader.

use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::{Command, CommandFactory};
use clap_mangen::Man;

#[path = "src/cli/mod.rs"]
mod cli;

use cli::Cli;

const ENVIRONMENT: &str = "\
Environment:
  FLEETCMD_BACKEND                 sdk (default) or cli
  FLEETCMD_AWS_BIN                 aws executable used by the cli backend
  FLEETCMD_REGION                  AWS region
  FLEETCMD_PROFILE                 named AWS profile
  FLEETCMD_DOCUMENT_NAME           document to execute (AWS-RunShellScript)
  FLEETCMD_WORKING_DIR             remote working directory
  FLEETCMD_EXECUTION_TIMEOUT_SECS  remote execution timeout in seconds
  FLEETCMD_OUTPUT_BUCKET           bucket for untruncated output
  FLEETCMD_OUTPUT_KEY_PREFIX       key prefix under the output bucket
  FLEETCMD_LOG                     log level when --log-level is absent";

fn main() -> io::Result<()> {
    let mut stdout = io::stdout();
    writeln!(stdout, "cargo:rerun-if-changed=build.rs")?;
    writeln!(stdout, "cargo:rerun-if-changed=src/cli/mod.rs")?;

    let out_dir = env::var_os("OUT_DIR")
        .map(PathBuf::from)
        .ok_or_else(|| io::Error::other("OUT_DIR was not set"))?;

    let command = Cli::command().after_long_help(ENVIRONMENT);
    for subcommand in command.get_subcommands() {
        let page = format!("fleetcmd-{}", subcommand.get_name());
        render_page(&out_dir, &page, subcommand.clone())?;
    }
    render_page(&out_dir, "fleetcmd", command)
}

fn render_page(out_dir: &Path, page: &str, command: Command) -> io::Result<()> {
    let mut buffer = Vec::new();
    Man::new(command).title(page).render(&mut buffer)?;
    fs::write(out_dir.join(format!("{page}.1")), buffer)
}
