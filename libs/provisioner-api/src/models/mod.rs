//! Provisioner API models

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Push delivery envelope posted by the message broker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushEnvelope {
    pub message: PushMessage,

    #[serde(default, deserialize_with = "null_as_default")]
    pub subscription: String,
}

/// Message carried by a push envelope
///
/// Brokers send the identifier under several spellings, sometimes more than
/// one at once, so each spelling gets its own field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushMessage {
    /// Base64 string, raw JSON string, or inline JSON object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, rename = "messageId", skip_serializing_if = "Option::is_none")]
    pub message_id_camel: Option<String>,

    #[serde(default, rename = "message_id", skip_serializing_if = "Option::is_none")]
    pub message_id_snake: Option<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub attributes: HashMap<String, String>,

    #[serde(default, rename = "publishTime", skip_serializing_if = "Option::is_none")]
    pub publish_time: Option<String>,
}

impl PushMessage {
    /// The message identifier, whichever spelling carried it
    pub fn message_id(&self) -> &str {
        self.id
            .as_deref()
            .or(self.message_id_camel.as_deref())
            .or(self.message_id_snake.as_deref())
            .unwrap_or_default()
    }
}

/// Response to an accepted push
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushAck {
    pub message_id: String,
    pub status: String,
}

impl PushAck {
    pub fn accepted(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            status: "accepted".to_string(),
        }
    }
}

/// Health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Version response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Brokers send `null` for empty fields
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
