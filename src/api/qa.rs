use crate::api::{require_user, ApiError};
use crate::shared::models::{NewQaLog, QaLog, UserRole};
use crate::shared::state::AppState;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Json, Router};

pub fn configure() -> Router<AppState> {
    Router::new().route("/api/qa-logs", get(list_qa_logs).post(create_qa_log))
}

async fn list_qa_logs(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<QaLog>>, ApiError> {
    let user = require_user(&state, &headers)?;
    if !matches!(user.role, UserRole::QaAdmin | UserRole::MasterAdmin) {
        return Err(ApiError::Forbidden("qa admin required".to_string()));
    }
    Ok(Json(state.store.list_qa_logs()))
}

async fn create_qa_log(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<NewQaLog>,
) -> Result<Json<QaLog>, ApiError> {
    require_user(&state, &headers)?;
    Ok(Json(state.store.create_qa_log(payload)?))
}
