use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::spooler::Spooler;

#[derive(Clone)]
pub struct DashboardState {
    pub spooler: Arc<Spooler>,
}

#[derive(Serialize)]
struct ServerControlResponse {
    success: bool,
    running: bool,
    addr: Option<String>,
    session_log: Option<String>,
    error: Option<String>,
}

/// JSON routes for a monitor process.
pub fn router(state: DashboardState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/status", get(status_handler))
        .route("/api/server/start", post(start_handler))
        .route("/api/server/stop", post(stop_handler))
        .route("/api/begin", post(begin_handler))
        .route("/api/resolve", post(resolve_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn run_dashboard(addr: SocketAddr, state: DashboardState) {
    let app = router(state);

    tracing::info!(addr = %addr, "Starting dashboard server");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind dashboard server");
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "Dashboard server failed");
    }
}

async fn status_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    Json(state.spooler.status().await)
}

async fn start_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    match state.spooler.start_server().await {
        Ok(addr) => (
            StatusCode::OK,
            Json(ServerControlResponse {
                success: true,
                running: true,
                addr: Some(addr.to_string()),
                session_log: None,
                error: None,
            }),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ServerControlResponse {
                success: false,
                running: false,
                addr: None,
                session_log: None,
                error: Some(e.to_string()),
            }),
        ),
    }
}

async fn stop_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    match state.spooler.stop_server().await {
        Ok(path) => (
            StatusCode::OK,
            Json(ServerControlResponse {
                success: true,
                running: false,
                addr: None,
                session_log: path.map(|p| p.display().to_string()),
                error: None,
            }),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ServerControlResponse {
                success: false,
                running: false,
                addr: None,
                session_log: None,
                error: Some(e.to_string()),
            }),
        ),
    }
}

async fn begin_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    state.spooler.begin_processing().await;
    Json(state.spooler.status().await)
}

async fn resolve_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    Json(state.spooler.force_resolve_deadlock().await)
}
