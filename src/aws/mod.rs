//! [`CommandService`] implementations for AWS Systems Manager.
//!
//! [`AwsSdkService`] calls the service through `aws-sdk-ssm` and classifies
//! failures from the typed error metadata. [`AwsCliService`] shells out to
//! `aws ssm` with JSON output instead; its child process runs on the blocking
//! pool so a slow CLI call never stalls other dispatches sharing the runtime,
//! and its failures are classified from the error code the CLI prints
//! (`An error occurred (Code) when calling ...`).

mod sdk;
mod types;

use std::ffi::OsString;

use tracing::debug;

use crate::runner::{CommandOutput, CommandRunner, ProcessCommandRunner};
use crate::service::{
    CommandRequest, CommandService, InvocationReport, ServiceError, ServiceFuture,
};
use crate::types::{CommandId, InstanceId};

pub use sdk::AwsSdkService;
use types::{CommandInvocation, SendCommandResponse};

/// Default AWS CLI binary name.
pub const DEFAULT_AWS_BIN: &str = "aws";

const THROTTLING_CODES: [&str; 4] = [
    "ThrottlingException",
    "Throttling",
    "TooManyRequestsException",
    "RequestLimitExceeded",
];
const NOT_FOUND_CODE: &str = "InvocationDoesNotExist";
const CONNECTION_MARKERS: [&str; 3] = [
    "Could not connect to the endpoint URL",
    "Connect timeout on endpoint URL",
    "Read timeout on endpoint URL",
];

/// How the AWS CLI is invoked.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AwsCliSettings {
    /// Path to the `aws` executable.
    pub aws_bin: String,
    /// Region passed with `--region`, when set.
    pub region: Option<String>,
    /// Named profile passed with `--profile`, when set.
    pub profile: Option<String>,
}

impl Default for AwsCliSettings {
    fn default() -> Self {
        Self {
            aws_bin: DEFAULT_AWS_BIN.to_owned(),
            region: None,
            profile: None,
        }
    }
}

/// Failure classes reported by either backend, before they are tied to a
/// call.
#[derive(Clone, Debug, Eq, PartialEq)]
enum Failure {
    Throttled(String),
    NotFound(String),
    Transport(String),
    Rejected(String),
}

impl Failure {
    /// Maps a service error code to a failure class.
    fn from_code(code: &str, message: String) -> Self {
        match code {
            _ if THROTTLING_CODES.contains(&code) => Self::Throttled(message),
            NOT_FOUND_CODE => Self::NotFound(message),
            _ => Self::Rejected(message),
        }
    }

    fn classify(output: &CommandOutput) -> Self {
        let message = output.stderr.trim().to_owned();
        match error_code(&output.stderr) {
            Some(code) => Self::from_code(code, message),
            None if message.contains("Rate exceeded") => Self::Throttled(message),
            None if CONNECTION_MARKERS
                .iter()
                .any(|marker| message.contains(marker)) =>
            {
                Self::Transport(message)
            }
            None => {
                let status = output
                    .code
                    .map_or_else(|| String::from("unknown"), |code| code.to_string());
                Self::Rejected(format!("aws exited with status {status}: {message}"))
            }
        }
    }

    fn into_service_error(self, lookup: Option<(&CommandId, &InstanceId)>) -> ServiceError {
        match (self, lookup) {
            (Self::Throttled(message), _) => ServiceError::Throttled { message },
            (Self::NotFound(_), Some((command_id, instance_id))) => {
                ServiceError::InvocationNotFound {
                    command_id: command_id.clone(),
                    instance_id: instance_id.clone(),
                }
            }
            (Self::Transport(message), _) => ServiceError::Transport { message },
            (Self::NotFound(message) | Self::Rejected(message), _) => {
                ServiceError::Rejected { message }
            }
        }
    }
}

/// Extracts `Code` from `An error occurred (Code) when calling ...`.
fn error_code(stderr: &str) -> Option<&str> {
    let (_, rest) = stderr.split_once("An error occurred (")?;
    let (code, _) = rest.split_once(')')?;
    Some(code)
}

/// Command service that drives `aws ssm` through a [`CommandRunner`].
#[derive(Clone, Debug)]
pub struct AwsCliService<R> {
    settings: AwsCliSettings,
    runner: R,
}

impl AwsCliService<ProcessCommandRunner> {
    /// Creates a service wired to the real process runner.
    #[must_use]
    pub const fn with_process_runner(settings: AwsCliSettings) -> Self {
        Self::new(settings, ProcessCommandRunner)
    }
}

impl<R> AwsCliService<R>
where
    R: CommandRunner + Clone + Send + Sync + 'static,
{
    /// Creates a service using the provided settings and runner.
    #[must_use]
    pub const fn new(settings: AwsCliSettings, runner: R) -> Self {
        Self { settings, runner }
    }

    fn send_command_args(&self, request: &CommandRequest) -> Result<Vec<OsString>, ServiceError> {
        let parameters =
            serde_json::to_string(&request.parameters).map_err(|err| ServiceError::Rejected {
                message: format!("cannot encode parameters: {err}"),
            })?;

        let mut args = vec![
            OsString::from("ssm"),
            OsString::from("send-command"),
            OsString::from("--instance-ids"),
            OsString::from(request.instance_id.as_str()),
            OsString::from("--document-name"),
            OsString::from(&request.document_name),
            OsString::from("--parameters"),
            OsString::from(parameters),
        ];
        if let Some(location) = &request.output_location {
            args.push(OsString::from("--output-s3-bucket-name"));
            args.push(OsString::from(&location.bucket));
            args.push(OsString::from("--output-s3-key-prefix"));
            args.push(OsString::from(&location.key_prefix));
        }
        self.push_common_args(&mut args);
        Ok(args)
    }

    fn get_invocation_args(&self, command_id: &CommandId, instance_id: &InstanceId) -> Vec<OsString> {
        let mut args = vec![
            OsString::from("ssm"),
            OsString::from("get-command-invocation"),
            OsString::from("--command-id"),
            OsString::from(command_id.as_str()),
            OsString::from("--instance-id"),
            OsString::from(instance_id.as_str()),
        ];
        self.push_common_args(&mut args);
        args
    }

    fn push_common_args(&self, args: &mut Vec<OsString>) {
        args.push(OsString::from("--output"));
        args.push(OsString::from("json"));
        if let Some(region) = &self.settings.region {
            args.push(OsString::from("--region"));
            args.push(OsString::from(region));
        }
        if let Some(profile) = &self.settings.profile {
            args.push(OsString::from("--profile"));
            args.push(OsString::from(profile));
        }
    }

    async fn call(&self, args: Vec<OsString>) -> Result<String, Failure> {
        let runner = self.runner.clone();
        let program = self.settings.aws_bin.clone();
        let output = tokio::task::spawn_blocking(move || runner.run(&program, &args))
            .await
            .map_err(|err| Failure::Transport(err.to_string()))?
            .map_err(|err| Failure::Transport(err.to_string()))?;

        if output.is_success() {
            Ok(output.stdout)
        } else {
            let failure = Failure::classify(&output);
            debug!(failure = ?failure, "aws call failed");
            Err(failure)
        }
    }
}

fn parse_json<T>(stdout: &str, operation: &str) -> Result<T, ServiceError>
where
    T: serde::de::DeserializeOwned,
{
    serde_json::from_str(stdout).map_err(|err| ServiceError::Transport {
        message: format!("unreadable {operation} output: {err}"),
    })
}

impl<R> CommandService for AwsCliService<R>
where
    R: CommandRunner + Clone + Send + Sync + 'static,
{
    fn send_command<'a>(&'a self, request: &'a CommandRequest) -> ServiceFuture<'a, CommandId> {
        Box::pin(async move {
            let args = self.send_command_args(request)?;
            let stdout = self
                .call(args)
                .await
                .map_err(|failure| failure.into_service_error(None))?;
            let response: SendCommandResponse = parse_json(&stdout, "send-command")?;
            Ok(CommandId::from(response.command.command_id))
        })
    }

    fn get_invocation<'a>(
        &'a self,
        command_id: &'a CommandId,
        instance_id: &'a InstanceId,
    ) -> ServiceFuture<'a, InvocationReport> {
        Box::pin(async move {
            let args = self.get_invocation_args(command_id, instance_id);
            let stdout = self
                .call(args)
                .await
                .map_err(|failure| failure.into_service_error(Some((command_id, instance_id))))?;
            let invocation: CommandInvocation = parse_json(&stdout, "get-command-invocation")?;
            Ok(InvocationReport {
                status: invocation.status,
                stdout: invocation.standard_output_content,
                stderr: invocation.standard_error_content,
            })
        })
    }
}

#[cfg(test)]
mod tests;
