//! HTTP models for the provisioner's own endpoints.

pub mod models;

pub use models::{
    ErrorResponse, HealthResponse, PushAck, PushEnvelope, PushMessage, VersionResponse,
};
