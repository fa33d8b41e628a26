use axum::{
    Router,
    routing::{get, post},
};
use std::future::Future;
use tokio::net::TcpListener;
use tracing::info;

use super::{
    services::{
        active_uploads, cancel_upload, enqueue_upload, health, list_uploads, metrics, pause,
        resume,
    },
    state::AppState,
};

/// All control routes over `state`
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/uploads", post(enqueue_upload))
        .route("/uploads/active", get(active_uploads))
        .route("/uploads/{id}/cancel", post(cancel_upload))
        .route("/accounts/{account}/uploads", get(list_uploads))
        .route("/pause", post(pause))
        .route("/resume", post(resume))
        .with_state(state)
}

/// Serve the control API until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(address) = listener.local_addr() {
        info!(%address, "Control API listening");
    }

    axum::serve(listener, router(state).into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
}
