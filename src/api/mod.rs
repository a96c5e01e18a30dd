//! HTTP surface: thin axum handlers over the entity store.
//!
//! Identity arrives as the `X-User-Id` header, resolved against the user
//! collection; session handling itself lives in an external collaborator and
//! this layer trusts the identity it is handed.

pub mod agents;
pub mod chat;
pub mod directory;
pub mod docs;
pub mod events;
pub mod qa;

use crate::shared::errors::StoreError;
use crate::shared::models::{User, UserRole};
use crate::shared::state::AppState;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use log::warn;
use serde_json::json;

pub fn configure() -> Router<AppState> {
    Router::new()
        .merge(agents::configure())
        .merge(chat::configure())
        .merge(directory::configure())
        .merge(docs::configure())
        .merge(qa::configure())
        .merge(events::configure())
}

// ============================================================================
// Error mapping
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(msg) => Self::BadRequest(msg),
            StoreError::NotFound { .. } => Self::NotFound(err.to_string()),
            StoreError::CascadeConflict(msg) => Self::Conflict(msg),
            StoreError::Persistence(_) | StoreError::Encoding(_) => {
                Self::Internal(err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            Self::Unauthorized(m) => (StatusCode::UNAUTHORIZED, m),
            Self::Forbidden(m) => (StatusCode::FORBIDDEN, m),
            Self::NotFound(m) => (StatusCode::NOT_FOUND, m),
            Self::Conflict(m) => (StatusCode::CONFLICT, m),
            Self::Internal(m) => {
                warn!("internal error served as 500: {}", m);
                (StatusCode::INTERNAL_SERVER_ERROR, m)
            }
        };
        (status, Json(json!({ "message": message }))).into_response()
    }
}

// ============================================================================
// Identity
// ============================================================================

/// Resolves the request identity from the `X-User-Id` header. Missing header
/// and unknown user both read as unauthenticated.
pub fn require_user(state: &AppState, headers: &HeaderMap) -> Result<User, ApiError> {
    let id = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("missing X-User-Id header".to_string()))?;
    state
        .store
        .get_user(id)
        .map_err(|_| ApiError::Unauthorized(format!("unknown user: {}", id)))
}

pub fn require_master(user: &User) -> Result<(), ApiError> {
    if user.role.is_master() {
        Ok(())
    } else {
        Err(ApiError::Forbidden("master admin required".to_string()))
    }
}

/// Operator check used by agent and document mutations: the owning manager,
/// an editor, a document manager, or the master admin.
pub fn require_operator(
    user: &User,
    agent: &crate::shared::models::Agent,
) -> Result<(), ApiError> {
    if user.role == UserRole::MasterAdmin || agent.is_operator(&user.id) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!(
            "not an operator of agent {}",
            agent.id
        )))
    }
}
