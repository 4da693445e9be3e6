//! Registration confirmation.
//!
//! The service acknowledges a submission before the invocation can be
//! queried. Until the lookup succeeds every error, "not found" included, is
//! read as "not registered yet".

use tracing::debug;

use crate::retry::Retrier;
use crate::service::CommandService;

use super::{DispatchError, Dispatcher, Invocation};

impl<S: CommandService> Dispatcher<S> {
    pub(super) async fn wait_for_registration(
        &self,
        invocation: &Invocation,
    ) -> Result<(), DispatchError> {
        let retrier = Retrier::new(self.settings.registration);
        let service = &self.service;
        let command_id = &invocation.command_id;
        let instance_id = &invocation.instance_id;

        debug!(%command_id, %instance_id, "waiting for command to be registered");
        retrier
            .run(move || service.get_invocation(command_id, instance_id))
            .await
            .map(|_| ())
            .map_err(|exhausted| DispatchError::RegistrationTimeout {
                command_id: command_id.clone(),
                instance_id: instance_id.clone(),
                attempts: exhausted.attempts,
                source: exhausted.last,
            })
    }
}
