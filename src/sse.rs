//! Long-lived event stream endpoint.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::frame::EVENT_STREAM;
use crate::state::AppState;

/// Open a stream for the caller.
///
/// GET /sse
///
/// The response body stays open until the client goes away or the server closes
/// all streams. The registration is dropped together with the body.
pub async fn sse_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    let subscription = state.channel.subscribe().await;
    tracing::info!(
        "Client {} opened event stream from origin: {}",
        subscription.id(),
        origin
    );

    (
        [
            (header::CONTENT_TYPE, EVENT_STREAM),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Body::from_stream(subscription.into_stream()),
    )
        .into_response()
}
