use crate::api::{require_user, ApiError};
use crate::shared::models::{Conversation, Message, NewMessage};
use crate::shared::state::AppState;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;

pub fn configure() -> Router<AppState> {
    Router::new()
        .route(
            "/api/conversations",
            get(list_conversations).post(open_conversation),
        )
        .route("/api/conversations/{id}", delete(delete_conversation))
        .route("/api/conversations/{id}/messages", get(conversation_messages))
        .route("/api/conversations/{id}/read", post(mark_read))
        .route("/api/messages", post(create_message))
}

fn require_participant(
    state: &AppState,
    user_id: &str,
    conversation_id: i64,
) -> Result<Conversation, ApiError> {
    let conversation = state.store.get_conversation(conversation_id)?;
    let user = state.store.get_user(user_id);
    let is_master = user.map(|u| u.role.is_master()).unwrap_or(false);
    if conversation.user_id != user_id && !is_master {
        return Err(ApiError::Forbidden(format!(
            "not a participant of conversation {}",
            conversation_id
        )));
    }
    Ok(conversation)
}

async fn list_conversations(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Conversation>>, ApiError> {
    let user = require_user(&state, &headers)?;
    Ok(Json(state.store.user_conversations(&user.id)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenConversation {
    agent_id: i64,
}

/// Get-or-create: one conversation per (requester, agent) pair.
async fn open_conversation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<OpenConversation>,
) -> Result<Json<Conversation>, ApiError> {
    let user = require_user(&state, &headers)?;
    let conversation = state
        .store
        .get_or_create_conversation(&user.id, payload.agent_id)?;
    Ok(Json(conversation))
}

async fn conversation_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let user = require_user(&state, &headers)?;
    require_participant(&state, &user.id, id)?;
    Ok(Json(state.store.conversation_messages(id)?))
}

async fn mark_read(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Conversation>, ApiError> {
    let user = require_user(&state, &headers)?;
    require_participant(&state, &user.id, id)?;
    Ok(Json(state.store.mark_conversation_read(id)?))
}

async fn delete_conversation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = require_user(&state, &headers)?;
    require_participant(&state, &user.id, id)?;
    state.store.delete_conversation(id)?;
    Ok(Json(serde_json::json!({ "message": "conversation deleted" })))
}

async fn create_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<NewMessage>,
) -> Result<Json<Message>, ApiError> {
    let user = require_user(&state, &headers)?;
    require_participant(&state, &user.id, payload.conversation_id)?;
    Ok(Json(state.store.create_message(payload)?))
}
