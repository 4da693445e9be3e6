//! Abstraction over the remote command-execution service.
//!
//! The dispatch engine talks to the service through [`CommandService`] so the
//! retry and polling logic can be exercised against scripted doubles. The
//! production implementation lives in [`crate::aws`].

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;

use crate::retry::RateLimited;
use crate::types::{CommandId, InstanceId};

/// Parameter carrying the shell lines executed by the document.
pub const COMMANDS_PARAMETER: &str = "commands";

/// Parameter carrying the execution timeout in seconds.
pub const EXECUTION_TIMEOUT_PARAMETER: &str = "executionTimeout";

/// Object-storage destination that receives the full command output.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OutputLocation {
    /// Bucket name.
    pub bucket: String,
    /// Key prefix under which the service writes per-invocation folders.
    pub key_prefix: String,
}

impl OutputLocation {
    /// Builds the operator-facing link to the stderr object of an invocation.
    ///
    /// The layout mirrors what the service writes for `AWS-RunShellScript`;
    /// the location is only ever rendered, never parsed back.
    #[must_use]
    pub fn stderr_url(&self, command_id: &CommandId, instance_id: &InstanceId) -> String {
        format!(
            "s3://{}/{}/{command_id}/{instance_id}/awsrunShellScript/0.awsrunShellScript/stderr",
            self.bucket, self.key_prefix
        )
    }
}

/// Outgoing command request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandRequest {
    /// Instance that executes the command.
    pub instance_id: InstanceId,
    /// Document (action) name, for example `AWS-RunShellScript`.
    pub document_name: String,
    /// Document parameters; each name maps to an ordered list of values.
    pub parameters: BTreeMap<String, Vec<String>>,
    /// Optional destination for untruncated output.
    pub output_location: Option<OutputLocation>,
}

impl CommandRequest {
    /// Returns the shell lines passed through the `commands` parameter.
    #[must_use]
    pub fn commands(&self) -> &[String] {
        self.parameters
            .get(COMMANDS_PARAMETER)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Mutator applied to a [`CommandRequest`] before submission.
///
/// Options run in the order supplied, so later options override fields set
/// by earlier ones.
pub type CommandOpt = Box<dyn Fn(&mut CommandRequest) + Send + Sync>;

/// Redirects command output to an object-storage bucket.
#[must_use]
pub fn with_output_to_bucket(bucket: impl Into<String>, key_prefix: impl Into<String>) -> CommandOpt {
    let location = OutputLocation {
        bucket: bucket.into(),
        key_prefix: key_prefix.into(),
    };
    Box::new(move |request| request.output_location = Some(location.clone()))
}

/// Overrides the `executionTimeout` document parameter.
#[must_use]
pub fn with_execution_timeout(timeout: Duration) -> CommandOpt {
    Box::new(move |request| {
        request.parameters.insert(
            EXECUTION_TIMEOUT_PARAMETER.to_owned(),
            vec![timeout.as_secs().to_string()],
        );
    })
}

/// Overrides the document name.
#[must_use]
pub fn with_document(name: impl Into<String>) -> CommandOpt {
    let document = name.into();
    Box::new(move |request| request.document_name.clone_from(&document))
}

/// Snapshot of an invocation as reported by the service.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InvocationReport {
    /// Raw status string, classified by the completion poller.
    pub status: String,
    /// Captured standard output (possibly truncated by the service).
    pub stdout: String,
    /// Captured standard error (possibly truncated by the service).
    pub stderr: String,
}

/// Errors returned by a [`CommandService`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ServiceError {
    /// The service rejected the call because of rate limiting.
    #[error("request throttled: {message}")]
    Throttled {
        /// Message reported by the service.
        message: String,
    },
    /// The invocation is not (yet) visible to the service.
    #[error("invocation {command_id} not found for instance {instance_id}")]
    InvocationNotFound {
        /// Correlation identifier that was queried.
        command_id: CommandId,
        /// Instance that was queried.
        instance_id: InstanceId,
    },
    /// The service refused the request for a non-transient reason.
    #[error("request rejected: {message}")]
    Rejected {
        /// Message reported by the service.
        message: String,
    },
    /// The call did not complete (connection failure, unreadable response).
    #[error("transport failure: {message}")]
    Transport {
        /// Human-readable description of the failure.
        message: String,
    },
}

impl RateLimited for ServiceError {
    fn is_rate_limited(&self) -> bool {
        matches!(self, Self::Throttled { .. })
    }
}

/// Future returned by service operations.
pub type ServiceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ServiceError>> + Send + 'a>>;

/// Asynchronous command-execution API consumed by the dispatcher.
pub trait CommandService {
    /// Submits a command and returns the correlation identifier assigned to it.
    fn send_command<'a>(&'a self, request: &'a CommandRequest) -> ServiceFuture<'a, CommandId>;

    /// Fetches the current state of an invocation.
    fn get_invocation<'a>(
        &'a self,
        command_id: &'a CommandId,
        instance_id: &'a InstanceId,
    ) -> ServiceFuture<'a, InvocationReport>;
}

impl<S: CommandService + ?Sized> CommandService for &S {
    fn send_command<'a>(&'a self, request: &'a CommandRequest) -> ServiceFuture<'a, CommandId> {
        (**self).send_command(request)
    }

    fn get_invocation<'a>(
        &'a self,
        command_id: &'a CommandId,
        instance_id: &'a InstanceId,
    ) -> ServiceFuture<'a, InvocationReport> {
        (**self).get_invocation(command_id, instance_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn request() -> CommandRequest {
        CommandRequest {
            instance_id: InstanceId::from("i-1"),
            document_name: String::from("AWS-RunShellScript"),
            parameters: BTreeMap::from([(
                COMMANDS_PARAMETER.to_owned(),
                vec![String::from("cd /tmp"), String::from("ls")],
            )]),
            output_location: None,
        }
    }

    #[rstest]
    fn later_options_override_earlier_ones() {
        let mut req = request();
        let opts = [
            with_output_to_bucket("first", "a"),
            with_document("Custom-Doc"),
            with_output_to_bucket("second", "b"),
        ];
        for opt in &opts {
            opt(&mut req);
        }

        assert_eq!(req.document_name, "Custom-Doc");
        assert_eq!(
            req.output_location,
            Some(OutputLocation {
                bucket: String::from("second"),
                key_prefix: String::from("b"),
            })
        );
    }

    #[rstest]
    fn execution_timeout_option_updates_parameter() {
        let mut req = request();
        with_execution_timeout(Duration::from_secs(600))(&mut req);

        assert_eq!(
            req.parameters.get(EXECUTION_TIMEOUT_PARAMETER),
            Some(&vec![String::from("600")])
        );
    }

    #[rstest]
    fn stderr_url_follows_bucket_layout() {
        let location = OutputLocation {
            bucket: String::from("logs"),
            key_prefix: String::from("e2e/run-1"),
        };
        let url = location.stderr_url(&CommandId::from("cmd-9"), &InstanceId::from("i-1"));
        assert_eq!(
            url,
            "s3://logs/e2e/run-1/cmd-9/i-1/awsrunShellScript/0.awsrunShellScript/stderr"
        );
    }

    #[rstest]
    #[case(ServiceError::Throttled { message: String::from("Rate exceeded") }, true)]
    #[case(ServiceError::Rejected { message: String::from("bad document") }, false)]
    #[case(ServiceError::Transport { message: String::from("reset") }, false)]
    fn only_throttling_counts_as_rate_limited(#[case] err: ServiceError, #[case] expected: bool) {
        assert_eq!(err.is_rate_limited(), expected);
    }
}
