//! Task templates and access items.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use portal_common::access::Operation;
use serde::Deserialize;

use super::auth::Actor;
use super::{ApiError, ListQuery, SharedState, found, success};
use crate::portal::models::{AccessItemForm, TaskTemplateForm, TaskTemplatePatch};

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route(
            "/api/task-templates",
            get(list_templates).post(create_template),
        )
        .route("/api/task-templates/key-available", get(key_available))
        .route(
            "/api/task-templates/{id}",
            get(get_template).patch(update_template),
        )
        .route("/api/task-templates/{id}/deactivate", post(deactivate_template))
        .route("/api/task-templates/{id}/activate", post(activate_template))
        .route(
            "/api/access-items",
            get(list_access_items).post(create_access_item),
        )
        .route(
            "/api/access-items/{id}",
            get(get_access_item).put(update_access_item),
        )
        .route("/api/access-items/{id}/deactivate", post(deactivate_access_item))
        .route("/api/access-items/{id}/activate", post(activate_access_item))
}

#[derive(Debug, Deserialize)]
pub struct KeyQuery {
    pub key: String,
    pub partner_id: Option<i64>,
    pub exclude_id: Option<i64>,
}

// ── Task templates ────────────────────────────────────────────────────

async fn list_templates(
    State(state): State<SharedState>,
    Query(q): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let templates = state
        .db
        .call(move |db| db.list_task_templates(q.include_inactive))
        .await?;
    Ok(Json(templates))
}

async fn get_template(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let template = state.db.call(move |db| db.get_task_template(id)).await?;
    Ok(Json(found(template, "Task template", id)?))
}

async fn key_available(
    State(state): State<SharedState>,
    Query(q): Query<KeyQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let available = state
        .db
        .call(move |db| db.is_task_template_key_unique(&q.key, q.partner_id, q.exclude_id))
        .await?;
    Ok(Json(serde_json::json!({ "available": available })))
}

async fn create_template(
    State(state): State<SharedState>,
    actor: Actor,
    Json(form): Json<TaskTemplateForm>,
) -> Result<impl IntoResponse, ApiError> {
    let author = actor.authorize(Operation::EditCatalog)?;
    let template = state
        .db
        .call(move |db| db.create_task_template(&form, &author))
        .await?;
    Ok((StatusCode::CREATED, Json(template)))
}

async fn update_template(
    State(state): State<SharedState>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(patch): Json<TaskTemplatePatch>,
) -> Result<impl IntoResponse, ApiError> {
    let author = actor.authorize(Operation::EditCatalog)?;
    let template = state
        .db
        .call(move |db| db.update_task_template(id, &patch, &author))
        .await?;
    Ok(Json(template))
}

async fn deactivate_template(
    State(state): State<SharedState>,
    actor: Actor,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let author = actor.authorize(Operation::EditCatalog)?;
    state
        .db
        .call(move |db| db.deactivate_task_template(id, &author))
        .await?;
    Ok(success())
}

async fn activate_template(
    State(state): State<SharedState>,
    actor: Actor,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let author = actor.authorize(Operation::EditCatalog)?;
    state
        .db
        .call(move |db| db.activate_task_template(id, &author))
        .await?;
    Ok(success())
}

// ── Access items ──────────────────────────────────────────────────────

async fn list_access_items(
    State(state): State<SharedState>,
    Query(q): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let items = state
        .db
        .call(move |db| db.list_access_items(q.include_inactive))
        .await?;
    Ok(Json(items))
}

async fn get_access_item(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let item = state.db.call(move |db| db.get_access_item(id)).await?;
    Ok(Json(found(item, "Access item", id)?))
}

async fn create_access_item(
    State(state): State<SharedState>,
    actor: Actor,
    Json(form): Json<AccessItemForm>,
) -> Result<impl IntoResponse, ApiError> {
    let author = actor.authorize(Operation::EditAccessItems)?;
    let item = state
        .db
        .call(move |db| db.create_access_item(&form, &author))
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn update_access_item(
    State(state): State<SharedState>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(form): Json<AccessItemForm>,
) -> Result<impl IntoResponse, ApiError> {
    let author = actor.authorize(Operation::EditAccessItems)?;
    let item = state
        .db
        .call(move |db| db.update_access_item(id, &form, &author))
        .await?;
    Ok(Json(item))
}

async fn deactivate_access_item(
    State(state): State<SharedState>,
    actor: Actor,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let author = actor.authorize(Operation::EditAccessItems)?;
    state
        .db
        .call(move |db| db.deactivate_access_item(id, &author))
        .await?;
    Ok(success())
}

async fn activate_access_item(
    State(state): State<SharedState>,
    actor: Actor,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let author = actor.authorize(Operation::EditAccessItems)?;
    state
        .db
        .call(move |db| db.activate_access_item(id, &author))
        .await?;
    Ok(success())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use axum::http::StatusCode;
    use portal_common::access::{CAMPAIGN_EDIT, USER_LOGIN};
    use serde_json::json;

    fn template_body(title: &str, key: &str) -> serde_json::Value {
        json!({
            "type": "campaign_onboarding",
            "title": title,
            "key": key,
            "primary_participant": "campaign_manager",
            "grouping": "co_admin"
        })
    }

    #[tokio::test]
    async fn test_template_key_uniqueness_and_activity() {
        let (app, author) = test_app_with_author();

        let (status, template) = send(
            &app,
            "POST",
            "/api/task-templates",
            Some(template_body("Kickoff call", "kickoff")),
            author,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(template["template_category"], "default");
        let id = template["id"].as_i64().unwrap();

        let (status, _) = send(
            &app,
            "POST",
            "/api/task-templates",
            Some(template_body("Second kickoff", "kickoff")),
            author,
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, taken) =
            send(&app, "GET", "/api/task-templates/key-available?key=kickoff", None, author).await;
        assert_eq!(taken["available"], false);
        let (_, own) = send(
            &app,
            "GET",
            &format!("/api/task-templates/key-available?key=kickoff&exclude_id={}", id),
            None,
            author,
        )
        .await;
        assert_eq!(own["available"], true);

        let (_, activities) = send(
            &app,
            "GET",
            &format!("/api/activities/task_templates/{}", id),
            None,
            author,
        )
        .await;
        assert_eq!(activities[0]["activity_type"], "created_template");
    }

    #[tokio::test]
    async fn test_template_deactivate_moves_to_inactive_list() {
        let (app, author) = test_app_with_author();
        let (_, template) = send(
            &app,
            "POST",
            "/api/task-templates",
            Some(template_body("Audit", "audit")),
            author,
        )
        .await;
        let id = template["id"].as_i64().unwrap();

        let (status, _) = send(
            &app,
            "POST",
            &format!("/api/task-templates/{}/deactivate", id),
            None,
            author,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, active) = send(&app, "GET", "/api/task-templates", None, author).await;
        assert!(active.as_array().unwrap().is_empty());
        let (_, inactive) =
            send(&app, "GET", "/api/task-templates?include_inactive=true", None, author).await;
        assert_eq!(inactive[0]["id"], id);

        let (status, updated) = send(
            &app,
            "PATCH",
            &format!("/api/task-templates/{}", id),
            Some(json!({"title": "Quarterly audit"})),
            author,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["title"], "Quarterly audit");
    }

    #[tokio::test]
    async fn test_access_items_require_employee_edit() {
        let (app, author) = test_app_with_author();
        let body = json!({
            "username": "acme-admin",
            "email": "admin@acme.example",
            "access_item_owner": "partner",
            "tfa_type": "sms"
        });

        let (status, _) = send_as(
            &app,
            "POST",
            "/api/access-items",
            Some(body.clone()),
            Some(author),
            &[USER_LOGIN, CAMPAIGN_EDIT],
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, item) = send(&app, "POST", "/api/access-items", Some(body), author).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(item["username"], "acme-admin");
        assert_eq!(item["is_active"], true);

        let (status, _) = send(
            &app,
            "PUT",
            &format!("/api/access-items/{}", item["id"]),
            Some(json!({"username": "  ", "access_item_owner": "partner"})),
            author,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, "GET", "/api/access-items/999", None, author).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
