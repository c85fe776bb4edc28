//! One-shot HTTP endpoints.

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::protocol::{SendRequest, SendResponse, MESSAGE_RECEIVED};
use crate::state::AppState;

/// Echo a message to every open stream.
///
/// POST /message
///
/// Responds with the same acknowledgment no matter how many streams received it.
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SendRequest>,
) -> Json<SendResponse> {
    tracing::info!(
        "Received message from {}: {}",
        request.user_id.as_deref().unwrap_or("anonymous"),
        request.message
    );

    state.channel.publish(&request.message).await;

    Json(SendResponse {
        status: MESSAGE_RECEIVED.to_string(),
    })
}
