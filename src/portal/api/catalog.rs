//! Campaign profiles, service categories and service items.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch},
};
use portal_common::ServiceType;
use portal_common::access::Operation;
use serde::Deserialize;

use super::auth::Actor;
use super::{ApiError, FieldUpdate, ListQuery, SharedState, found};
use crate::portal::models::{ServiceCategoryForm, ServiceCategoryPatch, ServiceItemForm};

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route(
            "/api/campaign-profiles",
            get(list_profiles).post(create_profile),
        )
        .route(
            "/api/campaign-profiles/{id}",
            get(get_profile).delete(delete_profile),
        )
        .route("/api/campaign-profiles/{id}/field", patch(update_profile_field))
        .route(
            "/api/service-categories",
            get(list_categories).post(create_category),
        )
        .route(
            "/api/service-categories/{id}",
            get(get_category).patch(update_category),
        )
        .route("/api/service-categories/{id}/status", patch(set_category_status))
        .route("/api/service-items", get(list_items).post(create_item))
        .route("/api/service-items/available", get(available_items))
        .route("/api/service-items/action-items", get(available_action_items))
        .route("/api/service-items/{id}", get(get_item).put(update_item))
}

#[derive(Deserialize)]
pub struct NewProfileRequest {
    pub name: String,
    pub short_description: Option<String>,
}

#[derive(Deserialize)]
pub struct StatusRequest {
    pub is_active: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct AvailableQuery {
    pub partner_id: Option<i64>,
    #[serde(rename = "type")]
    pub package_type: Option<ServiceType>,
}

// ── Campaign profiles ─────────────────────────────────────────────────

async fn list_profiles(
    State(state): State<SharedState>,
    Query(q): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let profiles = state
        .db
        .call(move |db| db.list_campaign_profiles(q.include_inactive))
        .await?;
    Ok(Json(profiles))
}

async fn get_profile(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = state.db.call(move |db| db.get_campaign_profile(id)).await?;
    Ok(Json(found(profile, "Campaign profile", id)?))
}

async fn create_profile(
    State(state): State<SharedState>,
    actor: Actor,
    Json(req): Json<NewProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let author = actor.authorize(Operation::EditCatalog)?;
    let profile = state
        .db
        .call(move |db| {
            db.create_campaign_profile(&req.name, req.short_description.as_deref(), &author)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

async fn update_profile_field(
    State(state): State<SharedState>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(req): Json<FieldUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let author = actor.authorize(Operation::EditCatalog)?;
    let profile = state
        .db
        .call(move |db| db.update_campaign_profile_field(id, &req.field, &req.value, &author))
        .await?;
    Ok(Json(profile))
}

async fn delete_profile(
    State(state): State<SharedState>,
    actor: Actor,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    actor.require(Operation::EditCatalog)?;
    state.db.call(move |db| db.delete_campaign_profile(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Service categories ────────────────────────────────────────────────

async fn list_categories(
    State(state): State<SharedState>,
    Query(q): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let categories = state
        .db
        .call(move |db| db.list_service_categories(q.include_inactive))
        .await?;
    Ok(Json(categories))
}

async fn get_category(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let category = state.db.call(move |db| db.get_service_category(id)).await?;
    Ok(Json(found(category, "Service category", id)?))
}

async fn create_category(
    State(state): State<SharedState>,
    actor: Actor,
    Json(form): Json<ServiceCategoryForm>,
) -> Result<impl IntoResponse, ApiError> {
    let author = actor.authorize(Operation::EditCatalog)?;
    let category = state
        .db
        .call(move |db| db.create_service_category(&form, &author))
        .await?;
    Ok((StatusCode::CREATED, Json(category)))
}

async fn update_category(
    State(state): State<SharedState>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(patch): Json<ServiceCategoryPatch>,
) -> Result<impl IntoResponse, ApiError> {
    let author = actor.authorize(Operation::EditCatalog)?;
    let category = state
        .db
        .call(move |db| db.update_service_category(id, &patch, &author))
        .await?;
    Ok(Json(category))
}

async fn set_category_status(
    State(state): State<SharedState>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(req): Json<StatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let author = actor.authorize(Operation::EditCatalog)?;
    state
        .db
        .call(move |db| db.set_service_category_active(id, req.is_active, &author))
        .await?;
    Ok(super::success())
}

// ── Service items ─────────────────────────────────────────────────────

async fn list_items(
    State(state): State<SharedState>,
    Query(q): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let items = state
        .db
        .call(move |db| db.list_service_items(q.include_inactive))
        .await?;
    Ok(Json(items))
}

async fn get_item(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let item = state.db.call(move |db| db.get_service_item(id)).await?;
    Ok(Json(found(item, "Service item", id)?))
}

async fn create_item(
    State(state): State<SharedState>,
    actor: Actor,
    Json(form): Json<ServiceItemForm>,
) -> Result<impl IntoResponse, ApiError> {
    let author = actor.authorize(Operation::EditCatalog)?;
    let item = state
        .db
        .call(move |db| db.create_service_item(&form, &author))
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn update_item(
    State(state): State<SharedState>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(form): Json<ServiceItemForm>,
) -> Result<impl IntoResponse, ApiError> {
    let author = actor.authorize(Operation::EditCatalog)?;
    let item = state
        .db
        .call(move |db| db.update_service_item(id, &form, &author))
        .await?;
    Ok(Json(item))
}

async fn available_items(
    State(state): State<SharedState>,
    Query(q): Query<AvailableQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let options = state
        .db
        .call(move |db| db.available_for_package(q.partner_id, q.package_type))
        .await?;
    Ok(Json(options))
}

async fn available_action_items(
    State(state): State<SharedState>,
    Query(q): Query<AvailableQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let options = state
        .db
        .call(move |db| db.available_action_items_for_package(q.partner_id))
        .await?;
    Ok(Json(options))
}
