//! Behavioural tests for the `fleetcmd run` CLI against a fake `aws` binary.
#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::str::contains;
use tempfile::TempDir;

const FAKE_AWS: &str = r#"#!/bin/sh
echo "$@" >> "$FAKE_AWS_LOG"
case "$2" in
  send-command)
    if [ -n "$FAKE_SEND_ERROR" ]; then
      echo "An error occurred ($FAKE_SEND_ERROR) when calling the SendCommand operation: refused" >&2
      exit 254
    fi
    printf '%s' '{"Command":{"CommandId":"cmd-42"}}'
    ;;
  get-command-invocation)
    printf '{"Status":"%s","StandardOutputContent":"hello\\nworld\\n","StandardErrorContent":""}' "${FAKE_STATUS:-Success}"
    ;;
  *)
    echo "unexpected arguments: $*" >&2
    exit 2
    ;;
esac
"#;

const CONFIG_VARS: [&str; 8] = [
    "FLEETCMD_REGION",
    "FLEETCMD_PROFILE",
    "FLEETCMD_DOCUMENT_NAME",
    "FLEETCMD_WORKING_DIR",
    "FLEETCMD_EXECUTION_TIMEOUT_SECS",
    "FLEETCMD_OUTPUT_BUCKET",
    "FLEETCMD_OUTPUT_KEY_PREFIX",
    "FLEETCMD_LOG",
];

struct FakeAws {
    dir: TempDir,
    bin: PathBuf,
    log: PathBuf,
}

impl FakeAws {
    fn install() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let bin = dir.path().join("aws");
        fs::write(&bin, FAKE_AWS).expect("write fake aws");
        fs::set_permissions(&bin, fs::Permissions::from_mode(0o755)).expect("chmod fake aws");
        let log = dir.path().join("aws.log");
        Self { dir, bin, log }
    }

    fn command(&self) -> assert_cmd::Command {
        let mut cmd = cargo_bin_cmd!("fleetcmd");
        for var in CONFIG_VARS {
            cmd.env_remove(var);
        }
        cmd.current_dir(self.dir.path())
            .env("HOME", self.dir.path())
            .env("FLEETCMD_BACKEND", "cli")
            .env("FLEETCMD_AWS_BIN", &self.bin)
            .env("FAKE_AWS_LOG", &self.log);
        cmd
    }

    fn calls(&self) -> String {
        read_log(&self.log)
    }
}

fn read_log(path: &Path) -> String {
    fs::read_to_string(path).unwrap_or_default()
}

#[test]
fn successful_command_prints_tagged_output() {
    let aws = FakeAws::install();
    let mut cmd = aws.command();
    cmd.env("FLEETCMD_WORKING_DIR", "/tmp/work")
        .args(["run", "--instance-id", "i-0abc", "--", "echo", "hello world"]);

    cmd.assert()
        .success()
        .stdout(contains("i-0abc: hello"))
        .stdout(contains("i-0abc: world"));

    let calls = aws.calls();
    assert!(calls.contains("ssm send-command"), "calls: {calls}");
    assert!(calls.contains("--instance-ids i-0abc"), "calls: {calls}");
    assert!(calls.contains("mkdir -p /tmp/work/bin"), "calls: {calls}");
    assert!(calls.contains("echo 'hello world'"), "calls: {calls}");
    assert!(
        calls.contains("get-command-invocation --command-id cmd-42"),
        "calls: {calls}"
    );
}

#[test]
fn failed_status_exits_with_error() {
    let aws = FakeAws::install();
    let mut cmd = aws.command();
    cmd.env("FAKE_STATUS", "Failed")
        .args(["run", "--instance-id", "i-0abc", "--", "false"]);

    cmd.assert()
        .failure()
        .code(1)
        .stdout(contains("i-0abc: hello"))
        .stderr(contains("finished with status Failed"));
}

#[test]
fn rejected_submission_exits_with_error() {
    let aws = FakeAws::install();
    let mut cmd = aws.command();
    cmd.env("FAKE_SEND_ERROR", "InvalidInstanceId")
        .args(["run", "--instance-id", "i-missing", "--", "true"]);

    cmd.assert()
        .failure()
        .code(1)
        .stderr(contains("rejected"));

    let calls = aws.calls();
    assert_eq!(calls.lines().count(), 1, "calls: {calls}");
}

#[test]
fn wait_ready_probes_before_running() {
    let aws = FakeAws::install();
    let mut cmd = aws.command();
    cmd.args([
        "run",
        "--instance-id",
        "i-0abc",
        "--wait-ready",
        "--output-bucket",
        "ci-logs",
        "--output-key-prefix",
        "nightly",
        "--",
        "make",
    ]);

    cmd.assert().success();

    let calls = aws.calls();
    let sends: Vec<&str> = calls
        .lines()
        .filter(|line| line.contains("send-command"))
        .collect();
    assert_eq!(sends.len(), 2, "calls: {calls}");
    assert!(sends.first().is_some_and(|line| line.contains("\"ls\"")));
    assert!(
        sends
            .last()
            .is_some_and(|line| line.contains("--output-s3-bucket-name ci-logs"))
    );
}

#[test]
fn control_characters_are_rejected() {
    let aws = FakeAws::install();
    let mut cmd = aws.command();
    cmd.args(["run", "--instance-id", "i-0abc", "--", "echo\tbad"]);

    cmd.assert()
        .failure()
        .code(1)
        .stderr(contains("control characters"));
    assert!(aws.calls().is_empty());
}

#[test]
fn unknown_backend_fails_before_any_call() {
    let aws = FakeAws::install();
    let mut cmd = aws.command();
    cmd.env("FLEETCMD_BACKEND", "carrier-pigeon")
        .args(["run", "--instance-id", "i-0abc", "--", "true"]);

    cmd.assert()
        .failure()
        .stderr(contains("invalid configuration field backend"));

    assert!(aws.calls().is_empty(), "calls: {}", aws.calls());
}
