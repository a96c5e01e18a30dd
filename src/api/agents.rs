use crate::api::{require_master, require_operator, require_user, ApiError};
use crate::events::AgentEvent;
use crate::shared::models::{Agent, Document, NewAgent, Visibility};
use crate::shared::state::AppState;
use crate::visibility::resolve_visible;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{get, patch};
use axum::{Json, Router};
use log::info;
use serde::Deserialize;

pub fn configure() -> Router<AppState> {
    Router::new()
        .route("/api/agents", get(list_agents).post(create_agent))
        .route("/api/agents/managed", get(managed_agents))
        .route(
            "/api/agents/{id}",
            patch(update_agent).delete(delete_agent),
        )
        .route("/api/agents/{id}/visibility", patch(update_visibility))
        .route("/api/agents/{id}/documents", get(agent_documents))
}

/// Agents the requester may see, in store order. Master admins see the full
/// collection unfiltered.
async fn list_agents(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Agent>>, ApiError> {
    let user = require_user(&state, &headers)?;
    let agents = state.store.list_agents();
    if user.role.is_master() {
        return Ok(Json(agents));
    }
    let visible = resolve_visible(&user, &agents, |manager_id| {
        state.store.get_user(manager_id).ok()
    });
    Ok(Json(visible.into_iter().cloned().collect()))
}

async fn managed_agents(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Agent>>, ApiError> {
    let user = require_user(&state, &headers)?;
    if user.role.is_master() {
        return Ok(Json(state.store.list_agents()));
    }
    Ok(Json(state.store.agents_by_manager(&user.id)))
}

async fn create_agent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<NewAgent>,
) -> Result<Json<Agent>, ApiError> {
    let user = require_user(&state, &headers)?;
    if !user.role.can_manage_agents() {
        return Err(ApiError::Forbidden(
            "agent admin role required".to_string(),
        ));
    }
    let agent = state.store.create_agent(payload)?;
    info!("agent {} created by {}", agent.id, user.id);
    state.events.publish(AgentEvent::agent_update(agent.id));
    Ok(Json(agent))
}

/// Partial update; absent fields keep their current values.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AgentPatch {
    name: Option<String>,
    description: Option<String>,
    category: Option<String>,
    icon: Option<String>,
    background_color: Option<String>,
    manager_id: Option<String>,
    editor_ids: Option<Vec<String>>,
    document_manager_ids: Option<Vec<String>>,
    is_active: Option<bool>,
}

async fn update_agent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(patch): Json<AgentPatch>,
) -> Result<Json<Agent>, ApiError> {
    let user = require_user(&state, &headers)?;
    let mut agent = state.store.get_agent(id)?;
    require_operator(&user, &agent)?;

    if let Some(name) = patch.name {
        agent.name = name;
    }
    if let Some(description) = patch.description {
        agent.description = description;
    }
    if let Some(category) = patch.category {
        agent.category = category;
    }
    if let Some(icon) = patch.icon {
        agent.icon = icon;
    }
    if let Some(background_color) = patch.background_color {
        agent.background_color = background_color;
    }
    if let Some(manager_id) = patch.manager_id {
        agent.manager_id = manager_id;
    }
    if let Some(editor_ids) = patch.editor_ids {
        agent.editor_ids = editor_ids;
    }
    if let Some(document_manager_ids) = patch.document_manager_ids {
        agent.document_manager_ids = document_manager_ids;
    }
    if let Some(is_active) = patch.is_active {
        agent.is_active = is_active;
    }

    let agent = state.store.update_agent(agent)?;
    state.events.publish(AgentEvent::agent_update(agent.id));
    Ok(Json(agent))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VisibilityUpdate {
    visibility: Visibility,
    #[serde(default)]
    upper_category: Option<String>,
    #[serde(default)]
    lower_category: Option<String>,
    #[serde(default)]
    detail_category: Option<String>,
}

async fn update_visibility(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(payload): Json<VisibilityUpdate>,
) -> Result<Json<Agent>, ApiError> {
    let user = require_user(&state, &headers)?;
    let agent = state.store.get_agent(id)?;
    require_operator(&user, &agent)?;

    let agent = state.store.set_agent_visibility(
        id,
        payload.visibility,
        payload.upper_category,
        payload.lower_category,
        payload.detail_category,
    )?;
    state.events.publish(AgentEvent::agent_update(agent.id));
    Ok(Json(agent))
}

async fn delete_agent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = require_user(&state, &headers)?;
    let agent = state.store.get_agent(id)?;
    if agent.manager_id != user.id {
        require_master(&user)?;
    }
    state.store.delete_agent(id)?;
    info!("agent {} deleted by {}", id, user.id);
    state.events.publish(AgentEvent::agent_update(id));
    Ok(Json(serde_json::json!({ "message": "agent deleted" })))
}

async fn agent_documents(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Document>>, ApiError> {
    require_user(&state, &headers)?;
    Ok(Json(state.store.agent_documents(id)?))
}
