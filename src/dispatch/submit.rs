//! Command construction and throttle-aware submission.

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

use shell_escape::unix::escape;
use tracing::{debug, info};

use crate::retry::{RateLimited, Retrier};
use crate::service::{
    COMMANDS_PARAMETER, CommandOpt, CommandRequest, CommandService, EXECUTION_TIMEOUT_PARAMETER,
};
use crate::types::InstanceId;

use super::{DispatchError, Dispatcher, Invocation};

/// Document that runs shell lines on Linux instances.
pub const DEFAULT_DOCUMENT_NAME: &str = "AWS-RunShellScript";

/// Working directory prepared on the instance before each command.
pub const DEFAULT_WORKING_DIR: &str = "/home/e2e";

/// Remote execution timeout applied to each command.
pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(10_800);

/// Fixed shape of every outgoing command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandTemplate {
    /// Document (action) name.
    pub document_name: String,
    /// Directory created and entered before the caller's command runs.
    pub working_dir: String,
    /// Remote execution timeout.
    pub execution_timeout: Duration,
}

impl Default for CommandTemplate {
    fn default() -> Self {
        Self {
            document_name: DEFAULT_DOCUMENT_NAME.to_owned(),
            working_dir: DEFAULT_WORKING_DIR.to_owned(),
            execution_timeout: DEFAULT_EXECUTION_TIMEOUT,
        }
    }
}

impl CommandTemplate {
    /// Shell line that ensures the working directory (and its `bin`
    /// subdirectory) exists and enters it.
    #[must_use]
    pub fn preamble(&self) -> String {
        let bin_dir = format!("{}/bin", self.working_dir);
        let escaped_bin = escape(bin_dir.as_str().into());
        let escaped_dir = escape(self.working_dir.as_str().into());
        format!("mkdir -p {escaped_bin} && cd {escaped_dir}")
    }

    /// Builds the request for `command` on `instance_id`, with the preamble
    /// running first.
    #[must_use]
    pub fn build(&self, instance_id: &InstanceId, command: &str) -> CommandRequest {
        let parameters = BTreeMap::from([
            (
                COMMANDS_PARAMETER.to_owned(),
                vec![self.preamble(), command.to_owned()],
            ),
            (
                EXECUTION_TIMEOUT_PARAMETER.to_owned(),
                vec![self.execution_timeout.as_secs().to_string()],
            ),
        ]);
        CommandRequest {
            instance_id: instance_id.clone(),
            document_name: self.document_name.clone(),
            parameters,
            output_location: None,
        }
    }
}

impl<S: CommandService> Dispatcher<S> {
    /// Builds the request, applies `opts` in order and submits it, retrying
    /// only while the service reports throttling.
    pub(super) async fn submit(
        &self,
        instance_id: &InstanceId,
        command: &str,
        opts: &[CommandOpt],
    ) -> Result<Invocation, DispatchError> {
        let mut request = self.template.build(instance_id, command);
        for opt in opts {
            opt(&mut request);
        }

        let retrier = Retrier::new(self.settings.submission);
        let service = &self.service;
        let outgoing = &request;
        info!(%instance_id, command, "submitting command");
        let command_id = retrier
            .run(move || service.send_command(outgoing))
            .await
            .map_err(|exhausted| {
                if exhausted.last.is_rate_limited() {
                    DispatchError::SubmissionThrottled {
                        instance_id: instance_id.clone(),
                        attempts: exhausted.attempts,
                        source: exhausted.last,
                    }
                } else {
                    DispatchError::SubmissionRejected {
                        instance_id: instance_id.clone(),
                        source: exhausted.last,
                    }
                }
            })?;

        info!(%command_id, %instance_id, "command started");
        if let Some(location) = &request.output_location {
            debug!(
                url = %location.stderr_url(&command_id, instance_id),
                "command output redirected to bucket"
            );
        }

        Ok(Invocation {
            command_id,
            instance_id: instance_id.clone(),
            submitted_at: SystemTime::now(),
        })
    }
}
