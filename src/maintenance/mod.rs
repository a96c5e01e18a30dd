//! Typed bulk-import jobs and the explicit persistence flush.
//!
//! Imports go through the store API exclusively: every row is validated like
//! any other mutation, bad rows are reported per-row instead of aborting the
//! batch, and nothing ever edits the data files directly.

use crate::api::{require_master, require_user, ApiError};
use crate::events::AgentEvent;
use crate::shared::models::{NewAgent, NewOrganizationCategory};
use crate::shared::state::AppState;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use log::info;
use serde::Serialize;

pub fn configure() -> Router<AppState> {
    Router::new()
        .route("/api/admin/import/agents", post(import_agents))
        .route(
            "/api/admin/import/organization-categories",
            post(import_categories),
        )
        .route("/api/admin/persist", post(persist))
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: Vec<RowError>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowError {
    pub row: usize,
    pub message: String,
}

/// Upsert by agent name: an existing agent with the same name is replaced
/// field-for-field (keeping its id), anything else is created.
async fn import_agents(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(rows): Json<Vec<NewAgent>>,
) -> Result<Json<ImportSummary>, ApiError> {
    let user = require_user(&state, &headers)?;
    require_master(&user)?;

    let mut summary = ImportSummary::default();

    for (row, new) in rows.into_iter().enumerate() {
        // re-resolve per row so a repeated name within one batch upserts
        // onto the row that just created it
        let current = state
            .store
            .list_agents()
            .into_iter()
            .find(|a| a.name == new.name);
        let result = match current {
            Some(mut agent) => {
                agent.description = new.description.clone();
                agent.category = new.category.clone();
                agent.icon = new.icon.clone();
                agent.background_color = new.background_color.clone();
                agent.visibility = new.visibility;
                agent.upper_category = new.upper_category.clone();
                agent.lower_category = new.lower_category.clone();
                agent.detail_category = new.detail_category.clone();
                agent.manager_id = new.manager_id.clone();
                agent.editor_ids = new.editor_ids.clone();
                agent.document_manager_ids = new.document_manager_ids.clone();
                agent.is_active = new.is_active;
                state.store.update_agent(agent).map(|a| (a.id, false))
            }
            None => state.store.create_agent(new).map(|a| (a.id, true)),
        };
        match result {
            Ok((agent_id, created)) => {
                if created {
                    summary.created += 1;
                } else {
                    summary.updated += 1;
                }
                state.events.publish(AgentEvent::agent_update(agent_id));
            }
            Err(e) => summary.errors.push(RowError {
                row,
                message: e.to_string(),
            }),
        }
    }

    info!(
        "agent import by {}: {} created, {} updated, {} errors",
        user.id,
        summary.created,
        summary.updated,
        summary.errors.len()
    );
    Ok(Json(summary))
}

/// Rows already present in the vocabulary are counted as skipped, not errors.
async fn import_categories(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(rows): Json<Vec<NewOrganizationCategory>>,
) -> Result<Json<ImportSummary>, ApiError> {
    let user = require_user(&state, &headers)?;
    require_master(&user)?;

    let mut summary = ImportSummary::default();
    for (row, new) in rows.into_iter().enumerate() {
        let duplicate = state.store.list_categories().iter().any(|c| {
            c.upper_category == new.upper_category
                && c.lower_category == new.lower_category
                && c.detail_category == new.detail_category
        });
        if duplicate {
            summary.skipped += 1;
            continue;
        }
        match state.store.create_category(new) {
            Ok(_) => summary.created += 1,
            Err(e) => summary.errors.push(RowError {
                row,
                message: e.to_string(),
            }),
        }
    }

    info!(
        "category import by {}: {} created, {} skipped, {} errors",
        user.id,
        summary.created,
        summary.skipped,
        summary.errors.len()
    );
    Ok(Json(summary))
}

/// Explicit flush; unlike the automatic flush after mutations, a failure here
/// surfaces to the caller.
async fn persist(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = require_user(&state, &headers)?;
    require_master(&user)?;
    state.store.persist()?;
    Ok(Json(serde_json::json!({ "message": "persisted" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_ok;
    use crate::config::{AppConfig, ServerConfig};
    use crate::events::EventBus;
    use crate::main_module::server::build_router;
    use crate::shared::models::{User, UserRole};
    use crate::store::EntityStore;
    use crate::tests::test_util::setup;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::json;
    use std::path::PathBuf;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let store = EntityStore::in_memory();
        assert_ok!(store.put_user(User::new("root", "root").with_role(UserRole::MasterAdmin)));
        assert_ok!(store.put_user(User::new("mgr", "manager").with_role(UserRole::AgentAdmin)));
        AppState {
            config: AppConfig {
                server: ServerConfig {
                    host: "127.0.0.1".to_string(),
                    port: 0,
                },
                data_dir: PathBuf::from("."),
            },
            store: Arc::new(store),
            events: Arc::new(EventBus::new()),
        }
    }

    async fn post_json(
        state: AppState,
        user_id: &str,
        uri: &str,
        body: serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        let response = build_router(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("x-user-id", user_id)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap();
        (status, json)
    }

    #[tokio::test]
    async fn agent_import_applies_good_rows_and_reports_bad_ones() {
        setup();
        let state = test_state();
        let rows = json!([
            { "name": "도서관봇", "description": "first", "category": "학교", "managerId": "mgr" },
            { "name": "유령봇", "description": "bad", "category": "학교", "managerId": "ghost" },
            { "name": "도서관봇", "description": "second", "category": "학교", "managerId": "mgr" }
        ]);

        let (status, summary) =
            post_json(state.clone(), "root", "/api/admin/import/agents", rows).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["created"], 1);
        assert_eq!(summary["updated"], 1);
        assert_eq!(summary["errors"].as_array().unwrap().len(), 1);
        assert_eq!(summary["errors"][0]["row"], 1);

        // a repeated name within the batch upserts instead of duplicating
        let agents = state.store.list_agents();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].name, "도서관봇");
        assert_eq!(agents[0].description, "second");
    }

    #[tokio::test]
    async fn category_import_counts_duplicates_as_skipped() {
        setup();
        let state = test_state();
        assert_ok!(state.store.create_category(NewOrganizationCategory {
            upper_category: "공과대학".to_string(),
            lower_category: "컴퓨터공학과".to_string(),
            detail_category: "전체".to_string(),
        }));

        let rows = json!([
            { "upperCategory": "공과대학", "lowerCategory": "컴퓨터공학과", "detailCategory": "전체" },
            { "upperCategory": "인문대학", "lowerCategory": "국어국문학과", "detailCategory": "전체" },
            { "upperCategory": "인문대학", "lowerCategory": "국어국문학과", "detailCategory": "전체" }
        ]);

        let (status, summary) = post_json(
            state.clone(),
            "root",
            "/api/admin/import/organization-categories",
            rows,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["created"], 1);
        assert_eq!(summary["skipped"], 2);
        assert!(summary["errors"].as_array().unwrap().is_empty());
        assert_eq!(state.store.list_categories().len(), 2);
    }

    #[tokio::test]
    async fn imports_are_master_only() {
        setup();
        let state = test_state();
        let (status, body) = post_json(
            state,
            "mgr",
            "/api/admin/import/agents",
            json!([]),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body["message"].is_string());
    }
}
