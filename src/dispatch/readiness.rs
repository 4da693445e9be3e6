//! Instance readiness probing.

use tracing::info;

use crate::retry::Retrier;
use crate::service::{CommandOpt, CommandService};
use crate::types::InstanceId;

use super::{DispatchError, Dispatcher};

impl<S: CommandService> Dispatcher<S> {
    /// Blocks until `instance_id` completes a trivial probe command.
    ///
    /// Each attempt is a full dispatch of the probe command; the first
    /// successful one ends the wait.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::ReadinessTimeout`] when every probe attempt
    /// fails.
    pub async fn wait_until_ready(&self, instance_id: &InstanceId) -> Result<(), DispatchError> {
        let retrier = Retrier::new(self.settings.readiness);
        let probe = self.settings.probe_command;
        let no_options: Vec<CommandOpt> = Vec::new();
        let options = no_options.as_slice();
        let dispatcher = self;

        info!(%instance_id, "waiting for instance to accept commands");
        retrier
            .run(move || dispatcher.run(instance_id, probe, options))
            .await
            .map(|_| info!(%instance_id, "instance ready"))
            .map_err(|exhausted| DispatchError::ReadinessTimeout {
                instance_id: instance_id.clone(),
                attempts: exhausted.attempts,
                message: exhausted.last.to_string(),
            })
    }
}
