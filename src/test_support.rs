//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::env;
use std::ffi::OsString;
use std::io::{self, Write};
use std::sync::{Arc, PoisonError};

use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use uuid::Uuid;

use crate::runner::{CommandOutput, CommandRunner, RunnerError};
use crate::service::{
    CommandRequest, CommandService, InvocationReport, ServiceError, ServiceFuture,
};
use crate::types::{CommandId, InstanceId};

fn locked<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic `aws` outcomes without spawning processes.
/// Clones share the same queue and call log.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Arc<std::sync::Mutex<VecDeque<CommandOutput>>>,
    calls: Arc<std::sync::Mutex<Vec<RecordedCall>>>,
}

/// Records a single call made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RecordedCall {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl RecordedCall {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }

    /// Returns the argument following `flag`, if present.
    #[must_use]
    pub fn flag_value(&self, flag: &str) -> Option<String> {
        self.args
            .iter()
            .position(|arg| arg == flag)
            .and_then(|index| self.args.get(index + 1))
            .map(|value| value.to_string_lossy().into_owned())
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all calls recorded so far.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        locked(&self.calls).clone()
    }

    /// Pushes a successful exit with the given stdout.
    pub fn push_stdout(&self, stdout: impl Into<String>) {
        self.push_output(Some(0), stdout, "");
    }

    /// Pushes a failing exit with the given stderr.
    pub fn push_failure(&self, code: i32, stderr: impl Into<String>) {
        self.push_output(Some(code), "", stderr);
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        locked(&self.responses).push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, RunnerError> {
        locked(&self.calls).push(RecordedCall {
            program: program.to_owned(),
            args: args.to_vec(),
        });
        locked(&self.responses)
            .pop_front()
            .ok_or_else(|| RunnerError::Spawn {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            })
    }
}

#[derive(Debug, Default)]
struct ServiceState {
    send_results: VecDeque<Result<CommandId, ServiceError>>,
    invocation_results: HashMap<InstanceId, VecDeque<Result<InvocationReport, ServiceError>>>,
    requests: Vec<CommandRequest>,
    send_times: Vec<Instant>,
    queries: usize,
}

/// In-memory [`CommandService`] replaying queued results.
///
/// Submissions pop from a single queue and fall back to a fresh command
/// identifier once it is empty. Invocation lookups pop from a queue per
/// instance and fall back to a successful report with no output. Clones
/// share state, so a test can keep one handle while the dispatcher owns
/// another.
#[derive(Clone, Debug, Default)]
pub struct ScriptedService {
    state: Arc<std::sync::Mutex<ServiceState>>,
}

impl ScriptedService {
    /// Creates a service with empty queues.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the result of the next submission.
    pub fn push_send(&self, result: Result<CommandId, ServiceError>) {
        locked(&self.state).send_results.push_back(result);
    }

    /// Queues `count` throttling rejections for submission.
    pub fn push_throttles(&self, count: usize) {
        let mut state = locked(&self.state);
        for _ in 0..count {
            state.send_results.push_back(Err(ServiceError::Throttled {
                message: String::from("Rate exceeded"),
            }));
        }
    }

    /// Queues the result of the next lookup for `instance_id`.
    pub fn push_invocation(
        &self,
        instance_id: &InstanceId,
        result: Result<InvocationReport, ServiceError>,
    ) {
        locked(&self.state)
            .invocation_results
            .entry(instance_id.clone())
            .or_default()
            .push_back(result);
    }

    /// Queues a lookup reporting `status` with the given output.
    pub fn push_status(&self, instance_id: &InstanceId, status: &str, stdout: &str, stderr: &str) {
        self.push_invocation(
            instance_id,
            Ok(InvocationReport {
                status: status.to_owned(),
                stdout: stdout.to_owned(),
                stderr: stderr.to_owned(),
            }),
        );
    }

    /// Returns every request submitted so far.
    #[must_use]
    pub fn requests(&self) -> Vec<CommandRequest> {
        locked(&self.state).requests.clone()
    }

    /// Returns the number of submissions attempted.
    #[must_use]
    pub fn send_count(&self) -> usize {
        locked(&self.state).requests.len()
    }

    /// Returns the clock reading at each submission attempt.
    #[must_use]
    pub fn send_times(&self) -> Vec<Instant> {
        locked(&self.state).send_times.clone()
    }

    /// Returns the number of invocation lookups performed.
    #[must_use]
    pub fn query_count(&self) -> usize {
        locked(&self.state).queries
    }
}

impl CommandService for ScriptedService {
    fn send_command<'a>(&'a self, request: &'a CommandRequest) -> ServiceFuture<'a, CommandId> {
        let result = {
            let mut state = locked(&self.state);
            state.requests.push(request.clone());
            state.send_times.push(Instant::now());
            state
                .send_results
                .pop_front()
                .unwrap_or_else(|| Ok(CommandId::new(Uuid::new_v4().to_string())))
        };
        Box::pin(async move { result })
    }

    fn get_invocation<'a>(
        &'a self,
        _command_id: &'a CommandId,
        instance_id: &'a InstanceId,
    ) -> ServiceFuture<'a, InvocationReport> {
        let result = {
            let mut state = locked(&self.state);
            state.queries += 1;
            state
                .invocation_results
                .get_mut(instance_id)
                .and_then(VecDeque::pop_front)
                .unwrap_or_else(|| {
                    Ok(InvocationReport {
                        status: String::from("Success"),
                        ..InvocationReport::default()
                    })
                })
        };
        Box::pin(async move { result })
    }
}

/// Cloneable in-memory sink for capturing reporter output.
#[derive(Clone, Debug, Default)]
pub struct SharedBuffer {
    bytes: Arc<std::sync::Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    /// Returns everything written so far, decoded lossily.
    #[must_use]
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&locked(&self.bytes)).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        locked(&self.bytes).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Produces a minimal JSON payload matching `aws ssm send-command`.
#[must_use]
pub fn json_send_command(command_id: &str) -> String {
    serde_json::json!({
        "Command": {
            "CommandId": command_id,
            "DocumentName": "AWS-RunShellScript",
            "Status": "Pending",
        }
    })
    .to_string()
}

/// Produces a minimal JSON payload matching `aws ssm get-command-invocation`.
#[must_use]
pub fn json_invocation(status: &str, stdout: &str, stderr: &str) -> String {
    serde_json::json!({
        "Status": status,
        "StatusDetails": status,
        "StandardOutputContent": stdout,
        "StandardErrorContent": stderr,
    })
    .to_string()
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: Mutex<()> = Mutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets or removes environment variables while holding a global mutex.
    ///
    /// `None` removes the variable for the lifetime of the guard.
    pub async fn apply(entries: &[(&str, Option<&str>)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                entries.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::apply"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe {
                match value {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
