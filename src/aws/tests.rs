//! Unit tests for the AWS CLI command service.

use std::collections::BTreeMap;
use std::time::Duration;

use rstest::{fixture, rstest};

use super::*;
use crate::service::{
    COMMANDS_PARAMETER, EXECUTION_TIMEOUT_PARAMETER, OutputLocation, with_execution_timeout,
};
use crate::test_support::{ScriptedRunner, json_invocation, json_send_command};

#[fixture]
fn runner() -> ScriptedRunner {
    ScriptedRunner::new()
}

fn service(runner: &ScriptedRunner) -> AwsCliService<ScriptedRunner> {
    AwsCliService::new(AwsCliSettings::default(), runner.clone())
}

fn request() -> CommandRequest {
    CommandRequest {
        instance_id: InstanceId::from("i-0abc"),
        document_name: String::from("AWS-RunShellScript"),
        parameters: BTreeMap::from([(
            COMMANDS_PARAMETER.to_owned(),
            vec![String::from("cd /home/e2e"), String::from("make test")],
        )]),
        output_location: None,
    }
}

#[rstest]
#[tokio::test]
async fn send_command_renders_arguments_and_parses_id(runner: ScriptedRunner) {
    runner.push_stdout(json_send_command("cmd-123"));

    let command_id = service(&runner)
        .send_command(&request())
        .await
        .expect("send succeeds");

    assert_eq!(command_id, CommandId::from("cmd-123"));
    let calls = runner.calls();
    let call = calls.first().expect("one call");
    assert_eq!(call.program, "aws");
    assert!(call.command_string().starts_with("aws ssm send-command"));
    assert_eq!(call.flag_value("--instance-ids").as_deref(), Some("i-0abc"));
    assert_eq!(
        call.flag_value("--document-name").as_deref(),
        Some("AWS-RunShellScript")
    );
    assert_eq!(call.flag_value("--output").as_deref(), Some("json"));
    assert_eq!(call.flag_value("--output-s3-bucket-name"), None);

    let parameters: BTreeMap<String, Vec<String>> = serde_json::from_str(
        &call.flag_value("--parameters").expect("parameters flag"),
    )
    .expect("parameters are JSON");
    assert_eq!(
        parameters.get(COMMANDS_PARAMETER),
        Some(&vec![String::from("cd /home/e2e"), String::from("make test")])
    );
}

#[rstest]
#[tokio::test]
async fn execution_timeout_option_reaches_rendered_parameters(runner: ScriptedRunner) {
    runner.push_stdout(json_send_command("cmd-9"));
    let mut req = request();
    with_execution_timeout(Duration::from_secs(900))(&mut req);

    service(&runner)
        .send_command(&req)
        .await
        .expect("send succeeds");

    let calls = runner.calls();
    let call = calls.first().expect("one call");
    let parameters: BTreeMap<String, Vec<String>> = serde_json::from_str(
        &call.flag_value("--parameters").expect("parameters flag"),
    )
    .expect("parameters are JSON");
    assert_eq!(
        parameters.get(EXECUTION_TIMEOUT_PARAMETER),
        Some(&vec![String::from("900")])
    );
}

#[rstest]
#[tokio::test]
async fn send_command_passes_output_location(runner: ScriptedRunner) {
    runner.push_stdout(json_send_command("cmd-1"));
    let mut req = request();
    req.output_location = Some(OutputLocation {
        bucket: String::from("ci-logs"),
        key_prefix: String::from("nightly"),
    });

    service(&runner)
        .send_command(&req)
        .await
        .expect("send succeeds");

    let call = runner.calls().remove(0);
    assert_eq!(
        call.flag_value("--output-s3-bucket-name").as_deref(),
        Some("ci-logs")
    );
    assert_eq!(
        call.flag_value("--output-s3-key-prefix").as_deref(),
        Some("nightly")
    );
}

#[rstest]
#[tokio::test]
async fn region_and_profile_are_forwarded(runner: ScriptedRunner) {
    runner.push_stdout(json_invocation("InProgress", "", ""));
    let settings = AwsCliSettings {
        aws_bin: String::from("/opt/aws/bin/aws"),
        region: Some(String::from("eu-west-1")),
        profile: Some(String::from("ci")),
    };
    let svc = AwsCliService::new(settings, runner.clone());

    svc.get_invocation(&CommandId::from("cmd-1"), &InstanceId::from("i-1"))
        .await
        .expect("lookup succeeds");

    let call = runner.calls().remove(0);
    assert_eq!(call.program, "/opt/aws/bin/aws");
    assert_eq!(call.flag_value("--region").as_deref(), Some("eu-west-1"));
    assert_eq!(call.flag_value("--profile").as_deref(), Some("ci"));
}

#[rstest]
#[tokio::test]
async fn get_invocation_parses_status_and_output(runner: ScriptedRunner) {
    runner.push_stdout(json_invocation("Success", "ok\n", "warn\n"));

    let report = service(&runner)
        .get_invocation(&CommandId::from("cmd-7"), &InstanceId::from("i-9"))
        .await
        .expect("lookup succeeds");

    assert_eq!(
        report,
        InvocationReport {
            status: String::from("Success"),
            stdout: String::from("ok\n"),
            stderr: String::from("warn\n"),
        }
    );
    let call = runner.calls().remove(0);
    assert!(call.command_string().starts_with("aws ssm get-command-invocation"));
    assert_eq!(call.flag_value("--command-id").as_deref(), Some("cmd-7"));
    assert_eq!(call.flag_value("--instance-id").as_deref(), Some("i-9"));
}

#[rstest]
#[tokio::test]
async fn missing_output_fields_default_to_empty(runner: ScriptedRunner) {
    runner.push_stdout(r#"{"Status":"Pending"}"#);

    let report = service(&runner)
        .get_invocation(&CommandId::from("cmd-1"), &InstanceId::from("i-1"))
        .await
        .expect("lookup succeeds");

    assert_eq!(report.status, "Pending");
    assert!(report.stdout.is_empty());
    assert!(report.stderr.is_empty());
}

#[rstest]
#[case(
    "An error occurred (ThrottlingException) when calling the SendCommand operation: Rate exceeded",
    true
)]
#[case(
    "An error occurred (TooManyRequestsException) when calling the SendCommand operation: slow down",
    true
)]
#[case("Rate exceeded", true)]
#[case(
    "An error occurred (InvalidInstanceId) when calling the SendCommand operation: Instances not in a valid state",
    false
)]
#[tokio::test]
async fn send_failures_are_classified(
    runner: ScriptedRunner,
    #[case] stderr: &str,
    #[case] throttled: bool,
) {
    runner.push_failure(254, stderr);

    let err = service(&runner)
        .send_command(&request())
        .await
        .expect_err("send fails");

    if throttled {
        assert!(matches!(err, ServiceError::Throttled { .. }), "got {err:?}");
    } else {
        assert!(matches!(err, ServiceError::Rejected { .. }), "got {err:?}");
    }
}

#[rstest]
#[tokio::test]
async fn unknown_invocation_maps_to_not_found(runner: ScriptedRunner) {
    runner.push_failure(
        254,
        "An error occurred (InvocationDoesNotExist) when calling the GetCommandInvocation operation: ",
    );

    let err = service(&runner)
        .get_invocation(&CommandId::from("cmd-1"), &InstanceId::from("i-1"))
        .await
        .expect_err("lookup fails");

    assert_eq!(
        err,
        ServiceError::InvocationNotFound {
            command_id: CommandId::from("cmd-1"),
            instance_id: InstanceId::from("i-1"),
        }
    );
}

#[rstest]
#[tokio::test]
async fn connection_failures_are_transport_errors(runner: ScriptedRunner) {
    runner.push_failure(
        255,
        "Could not connect to the endpoint URL: \"https://ssm.eu-west-1.amazonaws.com/\"",
    );

    let err = service(&runner)
        .get_invocation(&CommandId::from("cmd-1"), &InstanceId::from("i-1"))
        .await
        .expect_err("lookup fails");

    assert!(matches!(err, ServiceError::Transport { .. }), "got {err:?}");
}

#[rstest]
#[tokio::test]
async fn unreadable_json_is_a_transport_error(runner: ScriptedRunner) {
    runner.push_stdout("not json");

    let err = service(&runner)
        .send_command(&request())
        .await
        .expect_err("send fails");

    let ServiceError::Transport { message } = err else {
        panic!("expected transport error, got {err:?}");
    };
    assert!(message.contains("send-command"), "message: {message}");
}

#[rstest]
#[tokio::test]
async fn spawn_failure_is_a_transport_error(runner: ScriptedRunner) {
    let err = service(&runner)
        .send_command(&request())
        .await
        .expect_err("send fails");

    assert!(matches!(err, ServiceError::Transport { .. }), "got {err:?}");
}

#[rstest]
#[case("An error occurred (Throttling) when calling X", Some("Throttling"))]
#[case("\nAn error occurred (AccessDeniedException) when calling X: no", Some("AccessDeniedException"))]
#[case("usage: aws [options]", None)]
fn error_code_is_extracted(#[case] stderr: &str, #[case] expected: Option<&str>) {
    assert_eq!(error_code(stderr), expected);
}
