//! Push message intake

use std::sync::Arc;

use provisioner_api::PushAck;
use tracing::{info, warn};

use crate::errors::ProvisionerError;
use crate::models::deployment::DeploymentRequest;
use crate::pubsub::envelope::{decode_envelope, decode_request};

/// Hands an accepted request to whatever runs it. Must not block.
pub trait Dispatch: Send + Sync {
    fn dispatch(&self, request: DeploymentRequest, message_id: String);
}

/// Decodes push deliveries and dispatches them
pub struct Subscriber {
    dispatcher: Arc<dyn Dispatch>,
    subscription_path: String,
}

impl Subscriber {
    pub fn new(dispatcher: Arc<dyn Dispatch>, subscription_path: impl Into<String>) -> Self {
        Self {
            dispatcher,
            subscription_path: subscription_path.into(),
        }
    }

    /// Decode a push body and dispatch it.
    ///
    /// Errors here are decode errors and leave the message unacknowledged.
    /// Once this returns `Ok` the run's outcome is reported, not returned.
    pub fn handle_push(&self, body: &[u8]) -> Result<PushAck, ProvisionerError> {
        let envelope = decode_envelope(body)?;
        if !envelope.subscription.is_empty() && envelope.subscription != self.subscription_path {
            warn!(
                expected = %self.subscription_path,
                received = %envelope.subscription,
                "push from unexpected subscription"
            );
        }

        let message_id = envelope.message.message_id().to_string();
        let request = decode_request(&envelope.message)?;

        info!(
            message_id = %message_id,
            project_id = %request.project_id,
            package_id = %request.package_id,
            action = %request.action,
            "accepted deployment request"
        );
        self.dispatcher.dispatch(request, message_id.clone());
        Ok(PushAck::accepted(message_id))
    }
}
