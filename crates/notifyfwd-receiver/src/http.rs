//! HTTP request handlers

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use notifyfwd_core::{NotifyRequest, VersionResponse, NOTIFY_PATH, VERSION_PATH};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::state::ReceiverState;

/// Create the receiver router
pub fn create_router(state: Arc<ReceiverState>) -> Router {
    Router::new()
        .route(VERSION_PATH, get(version_handler))
        .route(NOTIFY_PATH, post(notify_handler))
        .with_state(state)
}

/// Serve the router on `listener` until `shutdown` resolves
pub async fn serve<F>(
    listener: TcpListener,
    state: Arc<ReceiverState>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!("Receiver listening on {}", addr);
    }
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Report the receiver version
async fn version_handler(State(state): State<Arc<ReceiverState>>) -> Json<VersionResponse> {
    debug!("Version requested");
    Json(VersionResponse {
        version: state.version.clone(),
    })
}

/// Accept a notification and surface it to the operator
async fn notify_handler(
    State(state): State<Arc<ReceiverState>>,
    Json(request): Json<NotifyRequest>,
) -> StatusCode {
    info!(
        "[{} / {}] {}: {}",
        request.devicename, request.appname, request.title, request.description
    );
    state.publish(request);
    StatusCode::OK
}
