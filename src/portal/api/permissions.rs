//! Permission rows and the partner-merged permission views.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch},
};
use portal_common::access::Operation;
use serde::Deserialize;

use super::auth::Actor;
use super::{ApiError, FieldUpdate, ListQuery, SharedState, found};
use crate::portal::models::{PermissionForm, PermissionPatch};

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route(
            "/api/permissions",
            get(list_permissions).post(create_permission),
        )
        .route("/api/permissions/base", get(base_permissions))
        .route("/api/permissions/defaults", get(default_permissions))
        .route("/api/permissions/check", get(check_permission))
        .route(
            "/api/permissions/partner/{partner_id}",
            get(partner_permissions),
        )
        .route(
            "/api/permissions/{id}",
            get(get_permission)
                .patch(update_permission)
                .delete(delete_permission),
        )
        .route("/api/permissions/{id}/field", patch(update_permission_field))
        .route(
            "/api/campaigns/{id}/permissions",
            get(campaign_permissions),
        )
}

#[derive(Debug, Default, Deserialize)]
pub struct DefaultsQuery {
    pub partner_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CheckQuery {
    pub partner_id: Option<i64>,
    pub key: String,
}

async fn list_permissions(
    State(state): State<SharedState>,
    Query(q): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let permissions = state
        .db
        .call(move |db| db.list_permissions(q.include_inactive))
        .await?;
    Ok(Json(permissions))
}

async fn get_permission(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let permission = state.db.call(move |db| db.get_permission(id)).await?;
    Ok(Json(found(permission, "Permission", id)?))
}

async fn base_permissions(
    State(state): State<SharedState>,
) -> Result<impl IntoResponse, ApiError> {
    let permissions = state.db.call(|db| db.base_permissions()).await?;
    Ok(Json(permissions))
}

async fn partner_permissions(
    State(state): State<SharedState>,
    Path(partner_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let permissions = state
        .db
        .call(move |db| db.permissions_for_partner(partner_id))
        .await?;
    Ok(Json(permissions))
}

async fn default_permissions(
    State(state): State<SharedState>,
    Query(q): Query<DefaultsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let merged = state
        .db
        .call(move |db| db.default_permissions_for_campaign(q.partner_id))
        .await?;
    Ok(Json(merged))
}

async fn campaign_permissions(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let merged = state
        .db
        .call(move |db| db.default_permissions_for_campaign_id(id))
        .await?;
    Ok(Json(merged))
}

async fn check_permission(
    State(state): State<SharedState>,
    Query(q): Query<CheckQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let key = q.key.clone();
    let permission_state = state
        .db
        .call(move |db| db.check_permission(q.partner_id, &q.key))
        .await?;
    Ok(Json(serde_json::json!({
        "permission_key": key,
        "permission_state": permission_state,
    })))
}

async fn create_permission(
    State(state): State<SharedState>,
    actor: Actor,
    Json(form): Json<PermissionForm>,
) -> Result<impl IntoResponse, ApiError> {
    let author = actor.authorize(Operation::EditCatalog)?;
    let permission = state
        .db
        .call(move |db| db.create_permission(&form, &author))
        .await?;
    Ok((StatusCode::CREATED, Json(permission)))
}

async fn update_permission(
    State(state): State<SharedState>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(patch): Json<PermissionPatch>,
) -> Result<impl IntoResponse, ApiError> {
    let author = actor.authorize(Operation::EditCatalog)?;
    let permission = state
        .db
        .call(move |db| db.update_permission(id, &patch, &author))
        .await?;
    Ok(Json(permission))
}

async fn update_permission_field(
    State(state): State<SharedState>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(req): Json<FieldUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let author = actor.authorize(Operation::EditCatalog)?;
    let permission = state
        .db
        .call(move |db| db.update_permission_field(id, &req.field, &req.value, &author))
        .await?;
    Ok(Json(permission))
}

async fn delete_permission(
    State(state): State<SharedState>,
    actor: Actor,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    actor.require(Operation::EditCatalog)?;
    state.db.call(move |db| db.delete_permission(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_partner_override_applies_to_campaign() {
        let (app, author) = test_app_with_author();
        let (_, partner) =
            send(&app, "POST", "/api/partners", Some(json!({"name": "Acme"})), author).await;
        let partner_id = partner["id"].as_i64().unwrap();
        let (_, campaign) = send(
            &app,
            "POST",
            &format!("/api/partners/{}/campaigns", partner_id),
            Some(json!({"site_url": "https://acme.example"})),
            author,
        )
        .await;

        for (key, state, partner) in [
            ("ads:spend", "not_allowed", None),
            ("content:blog", "allowed", None),
            ("ads:spend", "allowed_with_approval", Some(partner_id)),
        ] {
            let (status, _) = send(
                &app,
                "POST",
                "/api/permissions",
                Some(json!({
                    "name": key,
                    "permission_key": key,
                    "permission_state": state,
                    "partner_id": partner
                })),
                author,
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, merged) = send(
            &app,
            "GET",
            &format!("/api/campaigns/{}/permissions", campaign["id"]),
            None,
            author,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let merged = merged.as_array().unwrap();
        assert_eq!(merged.len(), 2);
        let ads = merged
            .iter()
            .find(|p| p["permission_key"] == "ads:spend")
            .unwrap();
        assert_eq!(ads["permission_state"], "allowed_with_approval");
        assert_eq!(ads["is_partner_override"], true);

        let (_, check) = send(&app, "GET", "/api/permissions/check?key=ads:spend", None, author).await;
        assert_eq!(check["permission_state"], "not_allowed");
        let (_, check) = send(&app, "GET", "/api/permissions/check?key=missing", None, author).await;
        assert!(check["permission_state"].is_null());
    }

    #[tokio::test]
    async fn test_invalid_key_and_soft_toggle() {
        let (app, author) = test_app_with_author();
        let (status, _) = send(
            &app,
            "POST",
            "/api/permissions",
            Some(json!({"permission_key": "Has Spaces", "permission_state": "allowed"})),
            author,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, created) = send(
            &app,
            "POST",
            "/api/permissions",
            Some(json!({"permission_key": "reporting", "permission_state": "allowed"})),
            author,
        )
        .await;
        let id = created["id"].as_i64().unwrap();

        let (status, updated) = send(
            &app,
            "PATCH",
            &format!("/api/permissions/{}/field", id),
            Some(json!({"field": "is_active", "value": "false"})),
            author,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["is_active"], false);

        let (_, inactive) =
            send(&app, "GET", "/api/permissions?include_inactive=true", None, author).await;
        assert_eq!(inactive.as_array().unwrap().len(), 1);

        let (status, _) =
            send(&app, "DELETE", &format!("/api/permissions/{}", id), None, author).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }
}
