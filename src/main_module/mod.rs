pub mod server;

use crate::shared::state::AppState;
use axum::extract::State;
use axum::Json;
use log::info;
use serde_json::json;

pub async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": if state.store.is_degraded() { "degraded" } else { "ok" },
        "agents": state.store.list_agents().len(),
        "sseSessions": state.events.session_count(),
    }))
}

/// Resolves on ctrl-c or SIGTERM so the server can drain connections.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to install ctrl-c handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => log::error!("failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
