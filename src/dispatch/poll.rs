//! Completion polling.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use tracing::{debug, info};

use crate::retry::{Progress, Retrier, Stalled};
use crate::service::{CommandService, InvocationReport, ServiceError};

use super::{DispatchError, Dispatcher, Invocation};

/// Statuses from which the service may still transition. Everything else is
/// treated as terminal, including values this crate does not recognise.
const NON_FINAL_STATUSES: [&str; 3] = ["Pending", "InProgress", "Delayed"];

/// Status of an invocation as reported by the service.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum InvocationStatus {
    /// Accepted but not yet delivered to the instance.
    Pending,
    /// Running on the instance.
    InProgress,
    /// Delivery postponed by the service.
    Delayed,
    /// Completed successfully.
    Success,
    /// Cancelled before completion.
    Cancelled,
    /// Cancellation requested.
    Cancelling,
    /// Execution or delivery timed out.
    TimedOut,
    /// Completed with a failure.
    Failed,
    /// Any status string not listed above.
    Unrecognized(String),
}

impl InvocationStatus {
    /// Wire representation of the status.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "Pending",
            Self::InProgress => "InProgress",
            Self::Delayed => "Delayed",
            Self::Success => "Success",
            Self::Cancelled => "Cancelled",
            Self::Cancelling => "Cancelling",
            Self::TimedOut => "TimedOut",
            Self::Failed => "Failed",
            Self::Unrecognized(raw) => raw.as_str(),
        }
    }

    /// Returns `true` unless the status is one of the known non-final states.
    #[must_use]
    pub fn is_final(&self) -> bool {
        !NON_FINAL_STATUSES.contains(&self.as_str())
    }

    /// Returns `true` only for the explicit success status.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl From<&str> for InvocationStatus {
    fn from(value: &str) -> Self {
        match value {
            "Pending" => Self::Pending,
            "InProgress" => Self::InProgress,
            "Delayed" => Self::Delayed,
            "Success" => Self::Success,
            "Cancelled" => Self::Cancelled,
            "Cancelling" => Self::Cancelling,
            "TimedOut" => Self::TimedOut,
            "Failed" => Self::Failed,
            other => Self::Unrecognized(other.to_owned()),
        }
    }
}

impl fmt::Display for InvocationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<S: CommandService> Dispatcher<S> {
    /// Polls until the invocation reaches a terminal status.
    ///
    /// "Still running" and failed queries share one budget: the completion
    /// policy's attempt count and wall-clock ceiling. Once the command has
    /// been seen running, exhaustion is an execution timeout carrying the
    /// last running status, even if the final queries failed.
    pub(super) async fn wait_for_completion(
        &self,
        invocation: &Invocation,
    ) -> Result<(InvocationStatus, InvocationReport), DispatchError> {
        let retrier = Retrier::new(self.settings.completion);
        let service = &self.service;
        let command_id = &invocation.command_id;
        let instance_id = &invocation.instance_id;
        let last_running: Mutex<Option<String>> = Mutex::new(None);
        let seen = &last_running;

        debug!(%command_id, %instance_id, "waiting for command to finish");
        let polled = retrier
            .poll(move || {
                let query = service.get_invocation(command_id, instance_id);
                async move {
                    let report = query.await?;
                    let status = InvocationStatus::from(report.status.as_str());
                    if status.is_final() {
                        info!(%command_id, %instance_id, %status, "command finished");
                        Ok::<_, ServiceError>(Progress::Done((status, report)))
                    } else {
                        debug!(%command_id, %instance_id, %status, "command still running");
                        *seen.lock().unwrap_or_else(PoisonError::into_inner) =
                            Some(status.to_string());
                        Ok::<_, ServiceError>(Progress::Running(status.to_string()))
                    }
                }
            })
            .await;

        let last_running = last_running
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        polled.map_err(|exhausted| match (exhausted.last, last_running) {
            (Stalled::Running(last_status), _) | (Stalled::Failed(_), Some(last_status)) => {
                DispatchError::ExecutionTimeout {
                    command_id: command_id.clone(),
                    instance_id: instance_id.clone(),
                    last_status,
                    elapsed: exhausted.elapsed,
                }
            }
            (Stalled::Failed(source), None) => DispatchError::Transport {
                command_id: command_id.clone(),
                instance_id: instance_id.clone(),
                attempts: exhausted.attempts,
                source,
            },
        })
    }
}
