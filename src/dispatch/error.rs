//! Error taxonomy for the dispatch pipeline.

use std::time::Duration;

use thiserror::Error;

use crate::service::ServiceError;
use crate::types::{CommandId, InstanceId};

use super::InvocationStatus;

/// Errors surfaced by [`super::Dispatcher`].
///
/// Each stage fails with its own variant so callers can tell a readiness
/// problem from a registration problem from an execution problem. Throttling
/// and transport failures are retried internally and only surface once their
/// budget is spent.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum DispatchError {
    /// The instance never accepted the probe command.
    #[error("instance {instance_id} not ready after {attempts} attempts: {message}")]
    ReadinessTimeout {
        /// Instance that was probed.
        instance_id: InstanceId,
        /// Number of probe attempts made.
        attempts: u32,
        /// Description of the last probe failure.
        message: String,
    },
    /// Submission stayed rate limited until the retry budget ran out.
    #[error("command for {instance_id} still throttled after {attempts} attempts")]
    SubmissionThrottled {
        /// Target instance.
        instance_id: InstanceId,
        /// Number of submission attempts made.
        attempts: u32,
        /// Last throttling error.
        #[source]
        source: ServiceError,
    },
    /// The service refused the submission for a non-retryable reason.
    #[error("command for {instance_id} rejected: {source}")]
    SubmissionRejected {
        /// Target instance.
        instance_id: InstanceId,
        /// Error returned by the service.
        #[source]
        source: ServiceError,
    },
    /// The accepted command never became queryable; its outcome is unknown.
    #[error("command {command_id} on {instance_id} not registered after {attempts} attempts")]
    RegistrationTimeout {
        /// Correlation identifier returned at submission.
        command_id: CommandId,
        /// Target instance.
        instance_id: InstanceId,
        /// Number of lookups made.
        attempts: u32,
        /// Last lookup error.
        #[source]
        source: ServiceError,
    },
    /// The command was still running when the polling budget ran out.
    #[error("command {command_id} on {instance_id} still {last_status} after {elapsed:?}")]
    ExecutionTimeout {
        /// Correlation identifier returned at submission.
        command_id: CommandId,
        /// Target instance.
        instance_id: InstanceId,
        /// Last non-final status observed.
        last_status: String,
        /// Time spent polling.
        elapsed: Duration,
    },
    /// The command finished with a status other than success.
    #[error("command {command_id} on {instance_id} finished with status {status}")]
    ExecutionFailed {
        /// Correlation identifier returned at submission.
        command_id: CommandId,
        /// Target instance.
        instance_id: InstanceId,
        /// Terminal status reported by the service.
        status: InvocationStatus,
    },
    /// Status queries kept failing until the polling budget ran out.
    #[error("lost track of command {command_id} on {instance_id} after {attempts} queries")]
    Transport {
        /// Correlation identifier returned at submission.
        command_id: CommandId,
        /// Target instance.
        instance_id: InstanceId,
        /// Number of queries made.
        attempts: u32,
        /// Last query error.
        #[source]
        source: ServiceError,
    },
}
