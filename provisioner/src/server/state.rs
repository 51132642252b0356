//! Server state

use std::sync::Arc;

use crate::pubsub::subscriber::Subscriber;

/// Server state shared across handlers
pub struct ServerState {
    pub subscriber: Arc<Subscriber>,
}

impl ServerState {
    pub fn new(subscriber: Arc<Subscriber>) -> Self {
        Self { subscriber }
    }
}
