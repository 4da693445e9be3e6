//! JSON shapes printed by `aws ssm ... --output json`.

use serde::Deserialize;

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub(super) struct SendCommandResponse {
    pub(super) command: SentCommand,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub(super) struct SentCommand {
    pub(super) command_id: String,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub(super) struct CommandInvocation {
    pub(super) status: String,
    #[serde(default)]
    pub(super) standard_output_content: String,
    #[serde(default)]
    pub(super) standard_error_content: String,
}
