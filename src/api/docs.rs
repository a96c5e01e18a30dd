use crate::api::{require_operator, require_user, ApiError};
use crate::shared::models::{Document, NewDocument};
use crate::shared::state::AppState;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{get, patch};
use axum::{Json, Router};
use serde::Deserialize;

pub fn configure() -> Router<AppState> {
    Router::new()
        .route("/api/documents", get(list_documents).post(create_document))
        .route(
            "/api/documents/{id}",
            patch(update_document).delete(delete_document),
        )
}

async fn list_documents(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Document>>, ApiError> {
    require_user(&state, &headers)?;
    Ok(Json(state.store.list_documents()))
}

/// Upload metadata only: file transfer and text extraction live in external
/// collaborators, which hand the extracted `content` back via PATCH.
async fn create_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut payload): Json<NewDocument>,
) -> Result<Json<Document>, ApiError> {
    let user = require_user(&state, &headers)?;
    let agent = state.store.get_agent(payload.agent_id)?;
    require_operator(&user, &agent)?;
    payload.uploaded_by = user.id;
    Ok(Json(state.store.create_document(payload)?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentPatch {
    filename: Option<String>,
    mime_type: Option<String>,
    content: Option<String>,
}

async fn update_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(patch): Json<DocumentPatch>,
) -> Result<Json<Document>, ApiError> {
    let user = require_user(&state, &headers)?;
    let mut document = state.store.get_document(id)?;
    let agent = state.store.get_agent(document.agent_id)?;
    require_operator(&user, &agent)?;

    if let Some(filename) = patch.filename {
        document.filename = filename;
    }
    if let Some(mime_type) = patch.mime_type {
        document.mime_type = mime_type;
    }
    if let Some(content) = patch.content {
        document.content = Some(content);
    }
    Ok(Json(state.store.update_document(document)?))
}

async fn delete_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = require_user(&state, &headers)?;
    let document = state.store.get_document(id)?;
    let agent = state.store.get_agent(document.agent_id)?;
    require_operator(&user, &agent)?;
    state.store.delete_document(id)?;
    Ok(Json(serde_json::json!({ "message": "document deleted" })))
}
