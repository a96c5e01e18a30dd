//! HTTP server initialization and routing

use crate::api;
use crate::maintenance;
use crate::shared::state::AppState;
use axum::routing::get;
use axum::Router;
use log::info;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::{health_check, shutdown_signal};

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .merge(api::configure())
        .merge(maintenance::configure())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub async fn run_server(state: AppState) -> std::io::Result<()> {
    let addr = state.config.bind_addr();
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}
