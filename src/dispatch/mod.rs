//! Dispatch-and-poll pipeline for a single remote command.
//!
//! A dispatch submits one command to one instance and follows it to a
//! terminal status:
//!
//! 1. submit the command, retrying while the service throttles;
//! 2. wait until the invocation becomes queryable;
//! 3. poll its status until it reaches a terminal state;
//! 4. report the captured output, tagged with the instance identifier;
//! 5. classify the outcome, treating only an explicit success as success.
//!
//! A command is submitted at most once per dispatch. Only observation of the
//! remote execution is retried, never the execution itself. The calling task
//! stays suspended for the whole span, which may last hours; each stage
//! enforces its own budget and no external cancellation reaches into it.

mod error;
mod poll;
mod readiness;
mod registration;
mod submit;

use std::time::{Duration, SystemTime};

use tracing::warn;

use crate::report::{CapturedOutput, OutputReporter};
use crate::retry::{FixedInterval, ThrottleBackoff};
use crate::service::{CommandOpt, CommandService};
use crate::types::{CommandId, InstanceId};

pub use error::DispatchError;
pub use poll::InvocationStatus;
pub use submit::{
    CommandTemplate, DEFAULT_DOCUMENT_NAME, DEFAULT_EXECUTION_TIMEOUT, DEFAULT_WORKING_DIR,
};

const READINESS_ATTEMPTS: u32 = 10;
const READINESS_INTERVAL: Duration = Duration::from_secs(20);
const SUBMIT_THROTTLE_ATTEMPTS: u32 = 60;
const SUBMIT_THROTTLE_WAIT: Duration = Duration::from_secs(60);
const REGISTRATION_ATTEMPTS: u32 = 10;
const REGISTRATION_INTERVAL: Duration = Duration::from_secs(5);
const COMPLETION_ATTEMPTS: u32 = 2160;
const COMPLETION_INTERVAL: Duration = Duration::from_secs(60);
const LONG_RUNNING_CEILING: Duration = Duration::from_secs(180 * 60);
const PROBE_COMMAND: &str = "ls";

/// Retry budgets for each stage of a dispatch.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DispatchSettings {
    /// Probe attempts before an instance is declared unreachable.
    pub readiness: FixedInterval,
    /// Throttling budget for submission.
    pub submission: ThrottleBackoff,
    /// Lookups made while waiting for registration.
    pub registration: FixedInterval,
    /// Status queries made while waiting for completion.
    pub completion: FixedInterval,
    /// Side-effect-free command used by the readiness probe.
    pub probe_command: &'static str,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            readiness: FixedInterval::new(READINESS_ATTEMPTS, READINESS_INTERVAL),
            submission: ThrottleBackoff::new(SUBMIT_THROTTLE_ATTEMPTS, SUBMIT_THROTTLE_WAIT)
                .with_ceiling(LONG_RUNNING_CEILING),
            registration: FixedInterval::new(REGISTRATION_ATTEMPTS, REGISTRATION_INTERVAL),
            completion: FixedInterval::new(COMPLETION_ATTEMPTS, COMPLETION_INTERVAL)
                .with_ceiling(LONG_RUNNING_CEILING),
            probe_command: PROBE_COMMAND,
        }
    }
}

/// A command accepted by the service.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Invocation {
    /// Correlation identifier assigned by the service.
    pub command_id: CommandId,
    /// Instance executing the command.
    pub instance_id: InstanceId,
    /// Time the service acknowledged the submission.
    pub submitted_at: SystemTime,
}

/// Result of a command that finished successfully.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandOutcome {
    /// Invocation that produced the result.
    pub invocation: Invocation,
    /// Terminal status (always [`InvocationStatus::Success`]).
    pub status: InvocationStatus,
    /// Output captured by the service.
    pub output: CapturedOutput,
}

/// Runs commands on remote instances through a [`CommandService`].
///
/// The dispatcher holds no per-invocation state, so one instance can drive
/// many concurrent dispatches against different instances; only the
/// reporter's sink is shared.
#[derive(Debug)]
pub struct Dispatcher<S> {
    service: S,
    template: CommandTemplate,
    settings: DispatchSettings,
    reporter: OutputReporter,
}

impl<S: CommandService> Dispatcher<S> {
    /// Creates a dispatcher with the default retry budgets.
    #[must_use]
    pub fn new(service: S, template: CommandTemplate, reporter: OutputReporter) -> Self {
        Self {
            service,
            template,
            settings: DispatchSettings::default(),
            reporter,
        }
    }

    /// Overrides the retry budgets.
    #[must_use]
    pub fn with_settings(mut self, settings: DispatchSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Borrows the retry budgets in effect.
    #[must_use]
    pub const fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Borrows the underlying service.
    #[must_use]
    pub const fn service(&self) -> &S {
        &self.service
    }

    /// Submits `command` to `instance_id`, waits for it to finish and reports
    /// its output.
    ///
    /// `opts` are applied to the outgoing request in order, after the
    /// template has been filled in.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] naming the stage that failed; a command that
    /// ran but did not succeed yields [`DispatchError::ExecutionFailed`].
    pub async fn run(
        &self,
        instance_id: &InstanceId,
        command: &str,
        opts: &[CommandOpt],
    ) -> Result<CommandOutcome, DispatchError> {
        let invocation = self.submit(instance_id, command, opts).await?;
        self.wait_for_registration(&invocation).await?;
        let (status, report) = self.wait_for_completion(&invocation).await?;

        let output = CapturedOutput {
            instance_id: instance_id.clone(),
            stdout: report.stdout,
            stderr: report.stderr,
        };
        if let Err(err) = self.reporter.report(&output) {
            warn!(%instance_id, error = %err, "failed to write command output");
        }

        if !status.is_success() {
            return Err(DispatchError::ExecutionFailed {
                command_id: invocation.command_id,
                instance_id: invocation.instance_id,
                status,
            });
        }

        Ok(CommandOutcome {
            invocation,
            status,
            output,
        })
    }

    /// Waits for the instance to accept commands, then runs `command`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::ReadinessTimeout`] when the probe never
    /// succeeds, otherwise the errors of [`Self::run`].
    pub async fn run_when_ready(
        &self,
        instance_id: &InstanceId,
        command: &str,
        opts: &[CommandOpt],
    ) -> Result<CommandOutcome, DispatchError> {
        self.wait_until_ready(instance_id).await?;
        self.run(instance_id, command, opts).await
    }
}
