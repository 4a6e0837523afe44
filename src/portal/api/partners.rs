//! Partners, employees and campaigns.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post, put},
};
use portal_common::CampaignStatus;
use portal_common::access::Operation;
use serde::Deserialize;

use super::auth::Actor;
use super::{ApiError, SharedState, found, success};
use crate::portal::models::{
    NewCampaign, NewEmployee, PartnerForm, PartnerProfilePatch, ProspectForm,
};

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/api/partners", get(list_partners).post(create_partner))
        .route("/api/partners/names", get(list_partner_names))
        .route("/api/partners/prospects", post(create_prospect))
        .route(
            "/api/partners/{id}",
            get(get_partner).put(save_partner).patch(update_profile),
        )
        .route("/api/partners/{id}/account-manager", put(set_account_manager))
        .route("/api/partners/{id}/notes", get(partner_notes))
        .route("/api/partners/{id}/contacts", get(partner_contacts))
        .route(
            "/api/partners/{id}/campaigns",
            get(list_campaigns).post(create_campaign),
        )
        .route("/api/campaigns/{id}", get(get_campaign))
        .route("/api/campaigns/{id}/status", patch(update_campaign_status))
        .route("/api/campaigns/{id}/partner", get(campaign_partner))
        .route("/api/employees", get(list_employees).post(create_employee))
}

#[derive(Deserialize)]
pub struct ProspectRequest {
    #[serde(flatten)]
    pub form: ProspectForm,
    /// Auth-provider id of the contact person, when they already have a login.
    pub auth_id: Option<String>,
}

#[derive(Deserialize)]
pub struct AccountManagerRequest {
    pub employee_id: i64,
    pub relationship_id: Option<i64>,
}

#[derive(Deserialize)]
pub struct CampaignStatusRequest {
    pub status: CampaignStatus,
}

// ── Partners ──────────────────────────────────────────────────────────

async fn list_partners(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let partners = state.db.call(|db| db.list_partners()).await?;
    Ok(Json(partners))
}

async fn list_partner_names(
    State(state): State<SharedState>,
) -> Result<impl IntoResponse, ApiError> {
    let names = state.db.call(|db| db.list_partner_names()).await?;
    Ok(Json(names))
}

async fn get_partner(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let partner = state.db.call(move |db| db.get_partner(id)).await?;
    Ok(Json(found(partner, "Partner", id)?))
}

async fn create_partner(
    State(state): State<SharedState>,
    actor: Actor,
    Json(form): Json<PartnerForm>,
) -> Result<impl IntoResponse, ApiError> {
    let author = actor.authorize(Operation::EditCampaigns)?;
    let id = state
        .db
        .call(move |db| db.save_partner(None, &form, &author))
        .await?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({"id": id}))))
}

async fn save_partner(
    State(state): State<SharedState>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(form): Json<PartnerForm>,
) -> Result<impl IntoResponse, ApiError> {
    let author = actor.authorize(Operation::EditCampaigns)?;
    let id = state
        .db
        .call(move |db| db.save_partner(Some(id), &form, &author))
        .await?;
    Ok(Json(serde_json::json!({"id": id})))
}

async fn update_profile(
    State(state): State<SharedState>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(patch): Json<PartnerProfilePatch>,
) -> Result<impl IntoResponse, ApiError> {
    actor.require(Operation::EditCampaigns)?;
    let result = state
        .db
        .call(move |db| db.update_partner_profile(id, &patch))
        .await?;
    Ok(Json(result))
}

async fn create_prospect(
    State(state): State<SharedState>,
    actor: Actor,
    Json(req): Json<ProspectRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let author = actor.authorize(Operation::EditCampaigns)?;
    let prospect = state
        .db
        .call(move |db| db.create_prospect(&req.form, req.auth_id.as_deref(), &author))
        .await?;
    Ok((StatusCode::CREATED, Json(prospect)))
}

async fn set_account_manager(
    State(state): State<SharedState>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(req): Json<AccountManagerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    actor.require(Operation::EditCampaigns)?;
    state
        .db
        .call(move |db| db.set_account_manager(id, req.employee_id, req.relationship_id))
        .await?;
    Ok(success())
}

async fn partner_notes(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let notes = state.db.call(move |db| db.partner_notes(id)).await?;
    Ok(Json(notes))
}

async fn partner_contacts(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let emails = state
        .db
        .call(move |db| db.partner_contact_emails(id))
        .await?;
    Ok(Json(emails))
}

// ── Campaigns ─────────────────────────────────────────────────────────

async fn list_campaigns(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let campaigns = state
        .db
        .call(move |db| db.list_campaigns_for_partner(id))
        .await?;
    Ok(Json(campaigns))
}

async fn create_campaign(
    State(state): State<SharedState>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(req): Json<NewCampaign>,
) -> Result<impl IntoResponse, ApiError> {
    let author = actor.authorize(Operation::EditCampaigns)?;
    let campaign = state
        .db
        .call(move |db| {
            db.create_campaign(id, &req.site_url, req.status, req.campaign_profile_id, &author)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(campaign)))
}

async fn get_campaign(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let campaign = state.db.call(move |db| db.get_campaign(id)).await?;
    Ok(Json(found(campaign, "Campaign", id)?))
}

async fn update_campaign_status(
    State(state): State<SharedState>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(req): Json<CampaignStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let author = actor.authorize(Operation::EditCampaigns)?;
    let campaign = state
        .db
        .call(move |db| db.update_campaign_status(id, req.status, &author))
        .await?;
    Ok(Json(campaign))
}

async fn campaign_partner(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let partner = state
        .db
        .call(move |db| db.get_partner_by_campaign(id))
        .await?;
    Ok(Json(found(partner, "Campaign", id)?))
}

// ── Employees ─────────────────────────────────────────────────────────

async fn list_employees(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let employees = state.db.call(|db| db.list_employees()).await?;
    Ok(Json(employees))
}

async fn create_employee(
    State(state): State<SharedState>,
    actor: Actor,
    Json(req): Json<NewEmployee>,
) -> Result<impl IntoResponse, ApiError> {
    actor.require(Operation::EditAccessItems)?;
    let employee = state
        .db
        .call(move |db| {
            db.create_employee(
                &req.first_name,
                &req.last_name,
                req.title.as_deref(),
                req.external_auth_id.as_deref(),
            )
        })
        .await?;
    Ok((StatusCode::CREATED, Json(employee)))
}
