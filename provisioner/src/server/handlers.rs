//! HTTP request handlers

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use provisioner_api::{ErrorResponse, HealthResponse, VersionResponse};
use tracing::{error, warn};

use crate::server::state::ServerState;
use crate::utils::version_info;

/// Liveness handler
pub async fn root_handler() -> &'static str {
    "Provisioner is running"
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "provisioner".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

/// Push delivery handler.
///
/// 200 means the message was accepted, not that the deployment succeeded.
pub async fn push_handler(State(state): State<Arc<ServerState>>, body: Bytes) -> Response {
    match state.subscriber.handle_push(&body) {
        Ok(ack) => (StatusCode::OK, Json(ack)).into_response(),
        Err(e) if e.is_client_error() => {
            warn!("Rejected push message: {}", e);
            error_response(StatusCode::BAD_REQUEST, "invalid_message", e.to_string())
        }
        Err(e) => {
            error!("Failed to accept push message: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", e.to_string())
        }
    }
}

fn error_response(status: StatusCode, error: &str, message: String) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message,
        }),
    )
        .into_response()
}
