//! End-to-end dispatch tests through the public API.

use std::time::Duration;

use fleetcmd::test_support::{
    ScriptedRunner, ScriptedService, SharedBuffer, json_invocation, json_send_command,
};
use fleetcmd::{
    AwsCliService, AwsCliSettings, CommandTemplate, DispatchError, DispatchSettings, Dispatcher,
    InstanceId, InvocationStatus, OutputReporter, ThrottleBackoff,
};

#[tokio::test]
async fn aws_cli_service_drives_a_full_dispatch() {
    let runner = ScriptedRunner::new();
    runner.push_stdout(json_send_command("cmd-77"));
    runner.push_stdout(json_invocation("Pending", "", ""));
    runner.push_stdout(json_invocation("Success", "built\n", "note\n"));
    let buffer = SharedBuffer::default();
    let dispatcher = Dispatcher::new(
        AwsCliService::new(AwsCliSettings::default(), runner.clone()),
        CommandTemplate::default(),
        OutputReporter::new(buffer.clone()),
    );
    let instance = InstanceId::from("i-0feed");

    let outcome = dispatcher
        .run(&instance, "make build", &[])
        .await
        .expect("dispatch succeeds");

    assert_eq!(outcome.status, InvocationStatus::Success);
    assert_eq!(outcome.invocation.command_id.as_str(), "cmd-77");
    let operations: Vec<String> = runner
        .calls()
        .iter()
        .filter_map(|call| call.args.get(1))
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        operations,
        [
            "send-command",
            "get-command-invocation",
            "get-command-invocation"
        ]
    );
    assert_eq!(
        buffer.contents(),
        concat!(
            "Command stdout:\n",
            "i-0feed: built\n",
            "------\n",
            "Command stderr:\n",
            "i-0feed: note\n",
            "------\n",
        )
    );
}

#[tokio::test]
async fn aws_cli_failure_status_is_not_success() {
    let runner = ScriptedRunner::new();
    runner.push_stdout(json_send_command("cmd-1"));
    runner.push_stdout(json_invocation("InProgress", "", ""));
    runner.push_stdout(json_invocation("Cancelled", "", ""));
    let dispatcher = Dispatcher::new(
        AwsCliService::new(AwsCliSettings::default(), runner.clone()),
        CommandTemplate::default(),
        OutputReporter::new(SharedBuffer::default()),
    );

    let err = dispatcher
        .run(&InstanceId::from("i-1"), "true", &[])
        .await
        .expect_err("dispatch fails");

    assert!(
        matches!(
            err,
            DispatchError::ExecutionFailed {
                status: InvocationStatus::Cancelled,
                ..
            }
        ),
        "got {err:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn submission_ceiling_stops_throttle_retries() {
    let service = ScriptedService::new();
    service.push_throttles(30);
    let settings = DispatchSettings {
        submission: ThrottleBackoff::new(60, Duration::from_secs(60))
            .with_ceiling(Duration::from_secs(600)),
        ..DispatchSettings::default()
    };
    let dispatcher = Dispatcher::new(
        service.clone(),
        CommandTemplate::default(),
        OutputReporter::new(SharedBuffer::default()),
    )
    .with_settings(settings);

    let err = dispatcher
        .run(&InstanceId::from("i-1"), "true", &[])
        .await
        .expect_err("dispatch fails");

    assert!(
        matches!(err, DispatchError::SubmissionThrottled { attempts: 10, .. }),
        "got {err:?}"
    );
    assert_eq!(service.send_count(), 10);
}
