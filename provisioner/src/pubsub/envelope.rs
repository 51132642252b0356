//! Push envelope decoding

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use provisioner_api::{PushEnvelope, PushMessage};
use serde_json::Value;

use crate::errors::ProvisionerError;
use crate::models::deployment::DeploymentRequest;

/// Parse the push body
pub fn decode_envelope(body: &[u8]) -> Result<PushEnvelope, ProvisionerError> {
    serde_json::from_slice(body)
        .map_err(|e| ProvisionerError::DecodeError(format!("invalid push envelope: {}", e)))
}

/// Decode and validate the deployment request carried by a message.
///
/// `data` may be base64 (as brokers deliver it), a raw JSON string, or an
/// inline JSON object.
pub fn decode_request(message: &PushMessage) -> Result<DeploymentRequest, ProvisionerError> {
    let request: DeploymentRequest = match &message.data {
        None | Some(Value::Null) => {
            return Err(ProvisionerError::DecodeError(
                "message has no data".to_string(),
            ))
        }
        Some(Value::String(encoded)) => {
            let payload = match STANDARD.decode(encoded.trim()) {
                Ok(bytes) => bytes,
                Err(_) if looks_like_json(encoded) => encoded.as_bytes().to_vec(),
                Err(e) => return Err(e.into()),
            };
            serde_json::from_slice(&payload).map_err(payload_error)?
        }
        Some(inline @ Value::Object(_)) => {
            serde_json::from_value(inline.clone()).map_err(payload_error)?
        }
        Some(other) => {
            return Err(ProvisionerError::DecodeError(format!(
                "unexpected message data: {}",
                other
            )))
        }
    };

    request.validate()?;
    Ok(request)
}

fn looks_like_json(data: &str) -> bool {
    data.trim_start().starts_with('{')
}

fn payload_error(err: serde_json::Error) -> ProvisionerError {
    ProvisionerError::DecodeError(format!("invalid deployment request: {}", err))
}
