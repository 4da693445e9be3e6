//! Configuration loading via `ortho-config`.

use std::ffi::OsString;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::aws::{AwsCliSettings, DEFAULT_AWS_BIN};
use crate::dispatch::{
    CommandTemplate, DEFAULT_DOCUMENT_NAME, DEFAULT_EXECUTION_TIMEOUT, DEFAULT_WORKING_DIR,
};
use crate::service::{CommandOpt, with_output_to_bucket};

/// Dispatch settings derived from environment variables and configuration
/// files.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "FLEETCMD")]
pub struct DispatchConfig {
    /// Service backend: `sdk` (default) or `cli`.
    #[ortho_config(default = DEFAULT_BACKEND.to_owned())]
    pub backend: String,
    /// Path to the `aws` executable used by the `cli` backend. Defaults to
    /// `aws` on `PATH`.
    #[ortho_config(default = DEFAULT_AWS_BIN.to_owned())]
    pub aws_bin: String,
    /// Region used for every call. Falls back to the standard AWS resolution
    /// when unset.
    pub region: Option<String>,
    /// Named AWS profile.
    pub profile: Option<String>,
    /// Document executed on the instance.
    #[ortho_config(default = DEFAULT_DOCUMENT_NAME.to_owned())]
    pub document_name: String,
    /// Remote working directory created before the command runs.
    #[ortho_config(default = DEFAULT_WORKING_DIR.to_owned())]
    pub working_dir: String,
    /// Remote execution timeout in seconds. Defaults to three hours.
    pub execution_timeout_secs: Option<u64>,
    /// Bucket receiving untruncated command output.
    pub output_bucket: Option<String>,
    /// Key prefix used together with `output_bucket`.
    pub output_key_prefix: Option<String>,
}

const DEFAULT_BACKEND: &str = "sdk";

/// Client used to reach the command service.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ServiceBackend {
    /// `aws-sdk-ssm`, classifying failures from typed error metadata.
    Sdk,
    /// The `aws ssm` CLI, classifying failures from its stderr.
    Cli,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }

    fn missing(&self) -> ConfigError {
        ConfigError::MissingField(format!(
            "missing {}: set {} or add {} to fleetcmd.toml",
            self.description, self.env_var, self.toml_key
        ))
    }
}

const AWS_BIN: FieldMetadata = FieldMetadata::new("AWS CLI binary", "FLEETCMD_AWS_BIN", "aws_bin");
const DOCUMENT_NAME: FieldMetadata =
    FieldMetadata::new("document name", "FLEETCMD_DOCUMENT_NAME", "document_name");
const WORKING_DIR: FieldMetadata =
    FieldMetadata::new("remote working directory", "FLEETCMD_WORKING_DIR", "working_dir");
const REGION: FieldMetadata = FieldMetadata::new("AWS region", "FLEETCMD_REGION", "region");
const PROFILE: FieldMetadata = FieldMetadata::new("AWS profile", "FLEETCMD_PROFILE", "profile");
const OUTPUT_BUCKET: FieldMetadata =
    FieldMetadata::new("output bucket", "FLEETCMD_OUTPUT_BUCKET", "output_bucket");
const OUTPUT_KEY_PREFIX: FieldMetadata = FieldMetadata::new(
    "output key prefix",
    "FLEETCMD_OUTPUT_KEY_PREFIX",
    "output_key_prefix",
);

impl DispatchConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(metadata.missing());
        }
        Ok(())
    }

    fn require_optional_field(
        value: Option<&str>,
        metadata: &FieldMetadata,
    ) -> Result<(), ConfigError> {
        value.map_or(Ok(()), |set| Self::require_field(set, metadata))
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("fleetcmd")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation. Error messages name the environment
    /// variable and configuration key that supply the missing value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty,
    /// an optional field is set to whitespace, or only one half of the output
    /// location is configured. Returns [`ConfigError::Invalid`] for a zero
    /// execution timeout or an unknown backend.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.backend()?;
        Self::require_field(&self.aws_bin, &AWS_BIN)?;
        Self::require_field(&self.document_name, &DOCUMENT_NAME)?;
        Self::require_field(&self.working_dir, &WORKING_DIR)?;
        Self::require_optional_field(self.region.as_deref(), &REGION)?;
        Self::require_optional_field(self.profile.as_deref(), &PROFILE)?;
        Self::require_optional_field(self.output_bucket.as_deref(), &OUTPUT_BUCKET)?;
        Self::require_optional_field(self.output_key_prefix.as_deref(), &OUTPUT_KEY_PREFIX)?;

        match (&self.output_bucket, &self.output_key_prefix) {
            (Some(_), None) => return Err(OUTPUT_KEY_PREFIX.missing()),
            (None, Some(_)) => return Err(OUTPUT_BUCKET.missing()),
            _ => {}
        }

        if self.execution_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid {
                field: String::from("execution_timeout_secs"),
                reason: String::from("must be greater than zero"),
            });
        }
        Ok(())
    }

    /// Parses the configured backend name, ignoring case.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for anything other than `sdk` or `cli`.
    pub fn backend(&self) -> Result<ServiceBackend, ConfigError> {
        match self.backend.trim().to_ascii_lowercase().as_str() {
            "sdk" => Ok(ServiceBackend::Sdk),
            "cli" => Ok(ServiceBackend::Cli),
            other => Err(ConfigError::Invalid {
                field: String::from("backend"),
                reason: format!("expected `sdk` or `cli`, got `{other}`"),
            }),
        }
    }

    /// Remote execution timeout, falling back to the default.
    #[must_use]
    pub fn execution_timeout(&self) -> Duration {
        self.execution_timeout_secs
            .map_or(DEFAULT_EXECUTION_TIMEOUT, Duration::from_secs)
    }

    /// Builds the command template from the configured values.
    #[must_use]
    pub fn as_template(&self) -> CommandTemplate {
        CommandTemplate {
            document_name: self.document_name.clone(),
            working_dir: self.working_dir.clone(),
            execution_timeout: self.execution_timeout(),
        }
    }

    /// Builds the AWS CLI invocation settings.
    #[must_use]
    pub fn as_cli_settings(&self) -> AwsCliSettings {
        AwsCliSettings {
            aws_bin: self.aws_bin.clone(),
            region: self.region.clone(),
            profile: self.profile.clone(),
        }
    }

    /// Returns the output redirection option when a bucket is configured.
    #[must_use]
    pub fn output_option(&self) -> Option<CommandOpt> {
        match (&self.output_bucket, &self.output_key_prefix) {
            (Some(bucket), Some(prefix)) => {
                Some(with_output_to_bucket(bucket.clone(), prefix.clone()))
            }
            _ => None,
        }
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// A field is present but holds an unusable value.
    #[error("invalid configuration field {field}: {reason}")]
    Invalid {
        /// Configuration key that failed validation.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
