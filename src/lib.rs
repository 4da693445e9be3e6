//! Core library for the `fleetcmd` remote command runner.
//!
//! The crate submits shell commands to managed instances through a remote
//! command-execution service, follows each invocation to a terminal status
//! under bounded retry budgets, and reports the captured output tagged with
//! the originating instance. The production services call AWS Systems Manager
//! through the SDK or the `aws ssm` CLI; tests use the scripted doubles in
//! [`test_support`].

pub mod aws;
pub mod config;
pub mod dispatch;
pub mod report;
pub mod retry;
pub mod runner;
pub mod service;
pub mod test_support;
pub mod types;

pub use aws::{AwsCliService, AwsCliSettings, AwsSdkService};
pub use config::{ConfigError, DispatchConfig, ServiceBackend};
pub use dispatch::{
    CommandOutcome, CommandTemplate, DispatchError, DispatchSettings, Dispatcher, Invocation,
    InvocationStatus,
};
pub use report::{CapturedOutput, OutputReporter};
pub use retry::{Exhausted, FixedInterval, Retrier, RetryPolicy, ThrottleBackoff};
pub use runner::{CommandOutput, CommandRunner, ProcessCommandRunner, RunnerError};
pub use service::{
    CommandOpt, CommandRequest, CommandService, InvocationReport, OutputLocation, ServiceError,
    with_document, with_execution_timeout, with_output_to_bucket,
};
pub use types::{CommandId, InstanceId};
