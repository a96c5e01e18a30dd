use crate::api::{require_master, require_user, ApiError};
use crate::shared::models::{
    NewOrganizationCategory, OrganizationCategory, User, UserRole,
};
use crate::shared::state::AppState;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{delete, get, patch};
use axum::{Json, Router};
use chrono::Utc;
use log::info;
use serde::{Deserialize, Deserializer};

pub fn configure() -> Router<AppState> {
    Router::new()
        .route("/api/users", get(list_users).post(create_user))
        .route("/api/users/{id}", patch(update_user).delete(delete_user))
        .route(
            "/api/organization-categories",
            get(list_categories).post(create_category),
        )
        .route("/api/organization-categories/{id}", delete(delete_category))
}

// ============================================================================
// Users
// ============================================================================

async fn list_users(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<User>>, ApiError> {
    require_user(&state, &headers)?;
    Ok(Json(state.store.list_users()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewUser {
    id: String,
    username: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    role: Option<UserRole>,
    #[serde(default)]
    user_type: Option<String>,
    #[serde(default)]
    upper_category: Option<String>,
    #[serde(default)]
    lower_category: Option<String>,
    #[serde(default)]
    detail_category: Option<String>,
}

async fn create_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<NewUser>,
) -> Result<Json<User>, ApiError> {
    let requester = require_user(&state, &headers)?;
    require_master(&requester)?;

    let mut user = User::new(&payload.id, &payload.username);
    user.name = payload.name;
    user.email = payload.email;
    if let Some(role) = payload.role {
        user.role = role;
    }
    if let Some(user_type) = payload.user_type {
        user.user_type = user_type;
    }
    user.upper_category = payload.upper_category;
    user.lower_category = payload.lower_category;
    user.detail_category = payload.detail_category;

    let user = state.store.put_user(user)?;
    info!("user {} created by {}", user.id, requester.id);
    Ok(Json(user))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserPatch {
    username: Option<String>,
    name: Option<String>,
    email: Option<String>,
    role: Option<UserRole>,
    user_type: Option<String>,
    status: Option<String>,
    // double-option so "set to null" (rescope to unscoped) survives the patch
    #[serde(default, deserialize_with = "double_option")]
    upper_category: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    lower_category: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    detail_category: Option<Option<String>>,
}

/// A present-but-null field deserializes to `Some(None)`; an absent field
/// stays `None` through `#[serde(default)]`.
fn double_option<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

/// Users may edit their own profile fields; role changes and edits to other
/// accounts are master-only.
async fn update_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(patch): Json<UserPatch>,
) -> Result<Json<User>, ApiError> {
    let requester = require_user(&state, &headers)?;
    if requester.id != id {
        require_master(&requester)?;
    }
    if patch.role.is_some() {
        require_master(&requester)?;
    }

    let mut user = state.store.get_user(&id)?;
    if let Some(username) = patch.username {
        user.username = username;
    }
    if let Some(name) = patch.name {
        user.name = Some(name);
    }
    if let Some(email) = patch.email {
        user.email = Some(email);
    }
    if let Some(role) = patch.role {
        user.role = role;
    }
    if let Some(user_type) = patch.user_type {
        user.user_type = user_type;
    }
    if let Some(status) = patch.status {
        user.status = status;
    }
    if let Some(upper) = patch.upper_category {
        user.upper_category = upper;
    }
    if let Some(lower) = patch.lower_category {
        user.lower_category = lower;
    }
    if let Some(detail) = patch.detail_category {
        user.detail_category = detail;
    }
    user.updated_at = Utc::now();

    Ok(Json(state.store.put_user(user)?))
}

async fn delete_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let requester = require_user(&state, &headers)?;
    require_master(&requester)?;
    state.store.delete_user(&id)?;
    Ok(Json(serde_json::json!({ "message": "user deleted" })))
}

// ============================================================================
// Organization categories
// ============================================================================

fn require_category_admin(user: &User) -> Result<(), ApiError> {
    if user.role == UserRole::CategoryAdmin || user.role.is_master() {
        Ok(())
    } else {
        Err(ApiError::Forbidden("category admin required".to_string()))
    }
}

async fn list_categories(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<OrganizationCategory>>, ApiError> {
    require_user(&state, &headers)?;
    Ok(Json(state.store.list_categories()))
}

async fn create_category(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<NewOrganizationCategory>,
) -> Result<Json<OrganizationCategory>, ApiError> {
    let user = require_user(&state, &headers)?;
    require_category_admin(&user)?;
    Ok(Json(state.store.create_category(payload)?))
}

async fn delete_category(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = require_user(&state, &headers)?;
    require_category_admin(&user)?;
    state.store.delete_category(id)?;
    Ok(Json(serde_json::json!({ "message": "category deleted" })))
}
