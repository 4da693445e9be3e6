//! [`CommandService`] backed by `aws-sdk-ssm`.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;

use aws_config::BehaviorVersion;
use aws_config::retry::RetryConfig;
use aws_sdk_ssm::Client;
use aws_sdk_ssm::config::Region;
use aws_sdk_ssm::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use tracing::debug;

use crate::service::{
    CommandRequest, CommandService, InvocationReport, ServiceError, ServiceFuture,
};
use crate::types::{CommandId, InstanceId};

use super::Failure;

/// Command service that calls Systems Manager through the AWS SDK.
#[derive(Clone, Debug)]
pub struct AwsSdkService {
    client: Client,
}

impl AwsSdkService {
    /// Wraps an existing SDK client.
    #[must_use]
    pub const fn new(client: Client) -> Self {
        Self { client }
    }

    /// Resolves credentials and region through the standard provider chain.
    ///
    /// `region` and `profile` override the chain when set. SDK-level retries
    /// are disabled; the dispatcher's policies own every retry budget.
    #[must_use]
    pub async fn load(region: Option<String>, profile: Option<String>) -> Self {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).retry_config(RetryConfig::disabled());
        if let Some(name) = region {
            loader = loader.region(Region::new(name));
        }
        if let Some(name) = profile {
            loader = loader.profile_name(name);
        }
        let sdk_config = loader.load().await;
        Self::new(Client::new(&sdk_config))
    }
}

/// Classifies an SDK failure from its error metadata.
///
/// Failures that never produced a service response are transport failures;
/// everything else is classified by the service's error code.
fn classify<E, R>(err: &SdkError<E, R>) -> Failure
where
    E: ProvideErrorMetadata + Error + 'static,
    R: fmt::Debug,
{
    let message = DisplayErrorContext(err).to_string();
    let failure = match err {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) | SdkError::ResponseError(_) => {
            Failure::Transport(message)
        }
        _ => Failure::from_code(err.code().unwrap_or_default(), message),
    };
    debug!(failure = ?failure, "ssm call failed");
    failure
}

fn missing_field(operation: &str, field: &str) -> ServiceError {
    ServiceError::Transport {
        message: format!("{operation} response has no {field}"),
    }
}

impl CommandService for AwsSdkService {
    fn send_command<'a>(&'a self, request: &'a CommandRequest) -> ServiceFuture<'a, CommandId> {
        Box::pin(async move {
            let parameters: HashMap<String, Vec<String>> = request
                .parameters
                .iter()
                .map(|(name, values)| (name.clone(), values.clone()))
                .collect();
            let location = request.output_location.as_ref();
            let output = self
                .client
                .send_command()
                .instance_ids(request.instance_id.as_str())
                .document_name(request.document_name.as_str())
                .set_parameters(Some(parameters))
                .set_output_s3_bucket_name(location.map(|loc| loc.bucket.clone()))
                .set_output_s3_key_prefix(location.map(|loc| loc.key_prefix.clone()))
                .send()
                .await
                .map_err(|err| classify(&err).into_service_error(None))?;

            output
                .command()
                .and_then(|command| command.command_id())
                .map(CommandId::from)
                .ok_or_else(|| missing_field("send-command", "command id"))
        })
    }

    fn get_invocation<'a>(
        &'a self,
        command_id: &'a CommandId,
        instance_id: &'a InstanceId,
    ) -> ServiceFuture<'a, InvocationReport> {
        Box::pin(async move {
            let output = self
                .client
                .get_command_invocation()
                .command_id(command_id.as_str())
                .instance_id(instance_id.as_str())
                .send()
                .await
                .map_err(|err| classify(&err).into_service_error(Some((command_id, instance_id))))?;

            let status = output
                .status()
                .map(|status| status.as_str().to_owned())
                .ok_or_else(|| missing_field("get-command-invocation", "status"))?;
            Ok(InvocationReport {
                status,
                stdout: output
                    .standard_output_content()
                    .unwrap_or_default()
                    .to_owned(),
                stderr: output
                    .standard_error_content()
                    .unwrap_or_default()
                    .to_owned(),
            })
        })
    }
}
