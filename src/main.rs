//! Binary entry point for the `fleetcmd` CLI.

mod cli;
mod logging;

use std::io::{self, Write};
use std::process;

use clap::Parser;
use shell_escape::unix::escape;
use thiserror::Error;
use tracing::info;

use fleetcmd::{
    AwsCliService, AwsSdkService, CommandOpt, CommandService, ConfigError, DispatchConfig,
    DispatchError, Dispatcher, InstanceId, OutputReporter, ServiceBackend, with_output_to_bucket,
};

use cli::{Cli, RunCommand};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("logging setup failed: {0}")]
    Logging(String),
    #[error("invalid command argument: {0}")]
    InvalidCommand(String),
    #[error("{0}")]
    Dispatch(#[from] DispatchError),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    match cli {
        Cli::Run(command) => run_command(command).await,
    }
}

async fn run_command(args: RunCommand) -> Result<(), CliError> {
    logging::init_logging(args.log_level).map_err(CliError::Logging)?;
    validate_command_args(&args.command)?;

    let config = DispatchConfig::load_without_cli_args()?;
    config.validate()?;

    match config.backend()? {
        ServiceBackend::Sdk => {
            let service = AwsSdkService::load(config.region.clone(), config.profile.clone()).await;
            execute(service, &config, args).await
        }
        ServiceBackend::Cli => {
            let service = AwsCliService::with_process_runner(config.as_cli_settings());
            execute(service, &config, args).await
        }
    }
}

async fn execute<S: CommandService>(
    service: S,
    config: &DispatchConfig,
    args: RunCommand,
) -> Result<(), CliError> {
    let dispatcher = Dispatcher::new(service, config.as_template(), OutputReporter::stdout());
    let opts = command_options(&args, config);
    let instance_id = InstanceId::new(args.instance_id);
    let remote_command = render_remote_command(&args.command);

    let outcome = if args.wait_ready {
        dispatcher
            .run_when_ready(&instance_id, &remote_command, &opts)
            .await?
    } else {
        dispatcher.run(&instance_id, &remote_command, &opts).await?
    };

    info!(
        command_id = %outcome.invocation.command_id,
        %instance_id,
        status = %outcome.status,
        "command succeeded"
    );
    Ok(())
}

/// Flags take precedence over the configured output location.
fn command_options(args: &RunCommand, config: &DispatchConfig) -> Vec<CommandOpt> {
    match (&args.output_bucket, &args.output_key_prefix) {
        (Some(bucket), Some(prefix)) => {
            vec![with_output_to_bucket(bucket.clone(), prefix.clone())]
        }
        _ => config.output_option().into_iter().collect(),
    }
}

fn render_remote_command(args: &[String]) -> String {
    let mut result = String::new();
    let mut first = true;

    for arg in args {
        if first {
            first = false;
        } else {
            result.push(' ');
        }

        let escaped = escape(arg.as_str().into());
        result.push_str(escaped.as_ref());
    }

    result
}

fn validate_command_args(args: &[String]) -> Result<(), CliError> {
    for arg in args {
        if arg
            .chars()
            .any(|ch| matches!(ch, '\u{0000}'..='\u{001F}' | '\u{007F}'))
        {
            return Err(CliError::InvalidCommand(String::from(concat!(
                "command arguments must not contain control characters (ASCII ",
                "0x00-0x1F or 0x7F, e.g. newline, carriage return, tab, NUL)"
            ))));
        }
    }
    Ok(())
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
