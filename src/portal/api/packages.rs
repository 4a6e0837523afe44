//! Packages, their service items and action items.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, patch, post, put},
};
use portal_common::ServiceType;
use portal_common::access::Operation;
use serde::Deserialize;

use super::auth::Actor;
use super::{ApiError, FieldUpdate, ListQuery, SharedState, found, success};
use crate::portal::models::{
    ActionItemOrder, DuplicatePackageForm, PackageActionItemForm, PackageForm,
    PackageServiceItemForm, PackageServiceItemPatch,
};

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/api/packages", get(list_packages).post(create_package))
        .route("/api/packages/search", get(search_packages))
        .route(
            "/api/packages/{id}",
            get(get_package)
                .put(update_basic_details)
                .delete(delete_package),
        )
        .route("/api/packages/{id}/field", patch(update_field))
        .route("/api/packages/{id}/duplicate", post(duplicate_package))
        .route("/api/packages/{id}/notes", get(list_notes).post(add_note))
        .route("/api/packages/{id}/activities", get(list_activities))
        .route(
            "/api/packages/{id}/service-items",
            get(list_service_items).post(add_service_item),
        )
        .route(
            "/api/packages/{id}/service-items/{row_id}",
            patch(update_service_item),
        )
        .route(
            "/api/packages/{id}/service-items/by-item/{service_item_id}",
            delete(remove_service_item),
        )
        .route(
            "/api/packages/{id}/action-items",
            get(list_action_items).post(add_action_item),
        )
        .route("/api/packages/{id}/action-items/order", put(reorder_action_items))
        .route(
            "/api/packages/{id}/action-items/{service_item_id}",
            delete(remove_action_item),
        )
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    pub partner_id: Option<i64>,
    pub campaign_profile_id: Option<i64>,
    #[serde(default)]
    pub include_inactive: bool,
    #[serde(rename = "type")]
    pub package_type: Option<ServiceType>,
}

#[derive(Deserialize)]
pub struct NoteRequest {
    pub content: String,
}

// ── Packages ──────────────────────────────────────────────────────────

async fn list_packages(
    State(state): State<SharedState>,
    Query(q): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let packages = state
        .db
        .call(move |db| db.list_packages(q.include_inactive))
        .await?;
    Ok(Json(packages))
}

async fn search_packages(
    State(state): State<SharedState>,
    Query(q): Query<SearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let packages = state
        .db
        .call(move |db| {
            db.search_packages(
                &q.q,
                q.partner_id,
                q.campaign_profile_id,
                q.include_inactive,
                q.package_type,
            )
        })
        .await?;
    Ok(Json(packages))
}

async fn get_package(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let package = state.db.call(move |db| db.get_package(id)).await?;
    Ok(Json(found(package, "Package", id)?))
}

async fn create_package(
    State(state): State<SharedState>,
    actor: Actor,
    Json(form): Json<PackageForm>,
) -> Result<impl IntoResponse, ApiError> {
    let author = actor.authorize(Operation::EditCatalog)?;
    let package = state
        .db
        .call(move |db| db.create_package(&form, &author))
        .await?;
    Ok((StatusCode::CREATED, Json(package)))
}

async fn update_basic_details(
    State(state): State<SharedState>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(form): Json<PackageForm>,
) -> Result<impl IntoResponse, ApiError> {
    let author = actor.authorize(Operation::EditCatalog)?;
    let package = state
        .db
        .call(move |db| db.update_package_basic_details(id, &form, &author))
        .await?;
    Ok(Json(package))
}

async fn update_field(
    State(state): State<SharedState>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(req): Json<FieldUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let author = actor.authorize(Operation::EditCatalog)?;
    let package = state
        .db
        .call(move |db| db.update_package_field(id, &req.field, &req.value, &author))
        .await?;
    Ok(Json(package))
}

async fn delete_package(
    State(state): State<SharedState>,
    actor: Actor,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let author = actor.authorize(Operation::EditCatalog)?;
    state
        .db
        .call(move |db| db.delete_package(id, &author))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn duplicate_package(
    State(state): State<SharedState>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(overrides): Json<DuplicatePackageForm>,
) -> Result<impl IntoResponse, ApiError> {
    let author = actor.authorize(Operation::EditCatalog)?;
    let package = state
        .db
        .call(move |db| db.duplicate_package(id, &overrides, &author))
        .await?;
    Ok((StatusCode::CREATED, Json(package)))
}

async fn list_notes(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let notes = state.db.call(move |db| db.package_notes(id)).await?;
    Ok(Json(notes))
}

async fn add_note(
    State(state): State<SharedState>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(req): Json<NoteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let author = actor.authorize(Operation::EditCatalog)?;
    let note_id = state
        .db
        .call(move |db| db.add_package_note(id, &req.content, &author))
        .await?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({"id": note_id}))))
}

async fn list_activities(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let activities = state.db.call(move |db| db.package_activities(id)).await?;
    Ok(Json(activities))
}

// ── Package service items ─────────────────────────────────────────────

async fn list_service_items(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let items = state
        .db
        .call(move |db| db.list_package_service_items(id))
        .await?;
    Ok(Json(items))
}

async fn add_service_item(
    State(state): State<SharedState>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(form): Json<PackageServiceItemForm>,
) -> Result<impl IntoResponse, ApiError> {
    let author = actor.authorize(Operation::EditCatalog)?;
    let item = state
        .db
        .call(move |db| db.add_package_service_item(id, &form, &author))
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn update_service_item(
    State(state): State<SharedState>,
    actor: Actor,
    Path((id, row_id)): Path<(i64, i64)>,
    Json(patch): Json<PackageServiceItemPatch>,
) -> Result<impl IntoResponse, ApiError> {
    let author = actor.authorize(Operation::EditCatalog)?;
    state
        .db
        .call(move |db| db.update_package_service_item(id, row_id, &patch, &author))
        .await?;
    Ok(success())
}

async fn remove_service_item(
    State(state): State<SharedState>,
    actor: Actor,
    Path((id, service_item_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    let author = actor.authorize(Operation::EditCatalog)?;
    state
        .db
        .call(move |db| db.remove_package_service_item(id, service_item_id, &author))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Package action items ──────────────────────────────────────────────

async fn list_action_items(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let items = state
        .db
        .call(move |db| db.list_package_action_items(id))
        .await?;
    Ok(Json(items))
}

async fn add_action_item(
    State(state): State<SharedState>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(form): Json<PackageActionItemForm>,
) -> Result<impl IntoResponse, ApiError> {
    let author = actor.authorize(Operation::EditCatalog)?;
    let action_id = state
        .db
        .call(move |db| db.add_package_action_item(id, &form, &author))
        .await?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({"id": action_id}))))
}

async fn remove_action_item(
    State(state): State<SharedState>,
    actor: Actor,
    Path((id, service_item_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    let author = actor.authorize(Operation::EditCatalog)?;
    state
        .db
        .call(move |db| db.remove_package_action_item(id, service_item_id, &author))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn reorder_action_items(
    State(state): State<SharedState>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(order): Json<Vec<ActionItemOrder>>,
) -> Result<impl IntoResponse, ApiError> {
    let author = actor.authorize(Operation::EditCatalog)?;
    state
        .db
        .call(move |db| db.reorder_package_action_items(id, &order, &author))
        .await?;
    Ok(success())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use axum::http::StatusCode;
    use serde_json::json;

    async fn seed_item(app: &axum::Router, author: i64, name: &str, mode: &str) -> i64 {
        let (status, item) = send(
            app,
            "POST",
            "/api/service-items",
            Some(json!({"name": name, "service_label": name, "proposal_mode": mode})),
            author,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        item["id"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn test_package_items_and_duplicate() {
        let (app, author) = test_app_with_author();
        let audit = seed_item(&app, author, "Audit", "both").await;
        let setup = seed_item(&app, author, "GA setup", "neither").await;

        let (status, package) = send(
            &app,
            "POST",
            "/api/packages",
            Some(json!({"name": "Starter", "type": "ongoing", "monthly_price_cents": 50000})),
            author,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = package["id"].as_i64().unwrap();

        let (status, row) = send(
            &app,
            "POST",
            &format!("/api/packages/{}/service-items", id),
            Some(json!({"service_item_id": audit})),
            author,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(row["quantity"], 1);
        assert_eq!(row["frequency"], "monthly");

        let (status, _) = send(
            &app,
            "POST",
            &format!("/api/packages/{}/action-items", id),
            Some(json!({"service_item_id": setup})),
            author,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, copy) = send(
            &app,
            "POST",
            &format!("/api/packages/{}/duplicate", id),
            Some(json!({})),
            author,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(copy["name"], "Starter (copy)");
        assert_eq!(copy["service_items"].as_array().unwrap().len(), 1);
        let copy_id = copy["id"].as_i64().unwrap();

        let (_, actions) = send(
            &app,
            "GET",
            &format!("/api/packages/{}/action-items", copy_id),
            None,
            author,
        )
        .await;
        assert_eq!(actions.as_array().unwrap().len(), 1);

        let (_, activities) = send(
            &app,
            "GET",
            &format!("/api/packages/{}/activities", copy_id),
            None,
            author,
        )
        .await;
        assert_eq!(activities[0]["details"], "Package duplicated from \"Starter\"");

        let (status, _) =
            send(&app, "POST", "/api/packages/999/duplicate", Some(json!({})), author).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_package_notes_version_chain() {
        let (app, author) = test_app_with_author();
        let (_, package) = send(
            &app,
            "POST",
            "/api/packages",
            Some(json!({"name": "Starter"})),
            author,
        )
        .await;
        let id = package["id"].as_i64().unwrap();

        for content in ["first", "second"] {
            let (status, _) = send(
                &app,
                "POST",
                &format!("/api/packages/{}/notes", id),
                Some(json!({"content": content})),
                author,
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (_, notes) =
            send(&app, "GET", &format!("/api/packages/{}/notes", id), None, author).await;
        let notes = notes.as_array().unwrap();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0]["content"], "second");
        assert_eq!(notes[0]["version_number"], 2);
        assert_eq!(notes[1]["is_current"], false);
    }

    #[tokio::test]
    async fn test_unknown_references_are_not_found() {
        let (app, author) = test_app_with_author();

        let (status, body) = send(
            &app,
            "POST",
            "/api/packages",
            Some(json!({"name": "Starter", "partner_entity_id": 4242})),
            author,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Partner 4242 not found");

        let (_, package) = send(
            &app,
            "POST",
            "/api/packages",
            Some(json!({"name": "Starter"})),
            author,
        )
        .await;
        let id = package["id"].as_i64().unwrap();

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/packages/{}/action-items", id),
            Some(json!({"service_item_id": 9999})),
            author,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Service item 9999 not found");

        let (status, _) = send(
            &app,
            "PATCH",
            &format!("/api/packages/{}/field", id),
            Some(json!({"field": "related_campaign_profile_id", "value": 777})),
            author,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_search_and_delete() {
        let (app, author) = test_app_with_author();
        for name in ["Local Starter", "Ecommerce Pro"] {
            send(&app, "POST", "/api/packages", Some(json!({"name": name})), author).await;
        }

        let (status, found) =
            send(&app, "GET", "/api/packages/search?q=starter", None, author).await;
        assert_eq!(status, StatusCode::OK);
        let found = found.as_array().unwrap();
        assert_eq!(found.len(), 1);
        let id = found[0]["id"].as_i64().unwrap();

        let (status, _) = send(
            &app,
            "PATCH",
            &format!("/api/packages/{}/field", id),
            Some(json!({"field": "created_by", "value": 1})),
            author,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) =
            send(&app, "DELETE", &format!("/api/packages/{}", id), None, author).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, "GET", &format!("/api/packages/{}", id), None, author).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
