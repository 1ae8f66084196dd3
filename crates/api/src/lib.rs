//! Tenancy HTTP boundary.
//!
//! Routes under `/api/v1`, an authorization gate in front of everything but
//! the ping, static files for the rest. Every JSON body has the shape
//! `{"message": ...}`.

#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tenancy_provision::{Provisioner, StatusAggregator};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::info;

mod auth;
mod error;
mod routes;

pub use auth::{require_authorized, AuthorizationGate, OpenGate, StaticTokenGate};
pub use error::ApiError;

/// Response envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message<T> {
    pub message: T,
}

#[derive(Clone)]
pub struct AppState {
    pub provisioner: Arc<Provisioner>,
    pub status: Arc<StatusAggregator>,
    pub gate: Arc<dyn AuthorizationGate>,
}

impl AppState {
    pub fn new(provisioner: Provisioner, status: StatusAggregator, gate: Arc<dyn AuthorizationGate>) -> Self {
        Self { provisioner: Arc::new(provisioner), status: Arc::new(status), gate }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    /// Directory served at `/`; skipped when `None`.
    pub static_dir: Option<PathBuf>,
}

/// Build the router. Kept separate from [`serve`] so tests can drive it with
/// `oneshot`.
pub fn build_router(state: AppState, static_dir: Option<PathBuf>) -> Router {
    let gated = Router::new()
        .route("/api/v1/list", get(routes::list))
        .route("/api/v1/create/{namespace}", post(routes::create))
        .route("/api/v1/status/{namespace}", get(routes::status))
        .route_layer(middleware::from_fn_with_state(state.gate.clone(), require_authorized));

    let mut router = Router::new()
        .route("/api/v1", get(routes::ping))
        .route("/api/v1/", get(routes::ping))
        .merge(gated)
        .with_state(state);
    if let Some(dir) = static_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }
    router.layer(CorsLayer::permissive()).layer(TraceLayer::new_for_http())
}

/// Serve until Ctrl-C.
pub async fn serve(state: AppState, config: ServerConfig) -> anyhow::Result<()> {
    let app = build_router(state, config.static_dir.clone());
    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("binding {}", config.listen))?;
    info!(addr = %config.listen, static_dir = ?config.static_dir, "api: listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("api: Ctrl-C received; shutting down");
        })
        .await
        .context("http server")?;
    Ok(())
}
