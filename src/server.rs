//! HTTP surface: router construction and the serve loop.

use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use crate::{api, sse};

pub const STREAM_PATH: &str = "/sse";
pub const MESSAGE_PATH: &str = "/message";

/// Build the router. CORS is permissive on every route, preflight included.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(STREAM_PATH, get(sse::sse_handler))
        .route(MESSAGE_PATH, post(api::send_message))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` resolves, then close every open stream and drain.
pub async fn run_until<F>(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(state.clone());

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            tracing::info!("Shutting down, closing open streams");
            state.channel.close_all().await;
        })
        .await
}

/// Serve until Ctrl-C
pub async fn run_until_ctrl_c(listener: TcpListener, state: Arc<AppState>) -> std::io::Result<()> {
    run_until(listener, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to install Ctrl-C handler: {}", e);
            std::future::pending::<()>().await;
        }
    })
    .await
}
