//! JSON API over [`PortalDb`](super::db::PortalDb).
//!
//! Handlers are grouped by area; each area exposes a `routes()` fragment that
//! [`api_router`] merges. Database work always runs through
//! [`DbHandle::call`], and domain errors are mapped to status codes by
//! [`ApiError`].

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;

use super::db::DbHandle;
use crate::config::ActivitySection;
use crate::errors::PortalError;

pub mod auth;
mod catalog;
mod notes;
mod packages;
mod partners;
mod permissions;
mod templates;

#[cfg(test)]
pub(crate) mod test_support;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub db: DbHandle,
    pub activity: ActivitySection,
}

pub type SharedState = Arc<AppState>;

// ── Common query types ────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

/// Body of the single-field update endpoints.
#[derive(Debug, Deserialize)]
pub struct FieldUpdate {
    pub field: String,
    pub value: serde_json::Value,
}

pub(crate) fn success() -> Json<serde_json::Value> {
    Json(serde_json::json!({"success": true}))
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<PortalError> for ApiError {
    fn from(err: PortalError) -> Self {
        let msg = err.to_string();
        match err {
            PortalError::NotFound { .. } => ApiError::NotFound(msg),
            PortalError::Validation(_) => ApiError::BadRequest(msg),
            PortalError::VersionConflict { .. }
            | PortalError::NoteNotCurrent { .. }
            | PortalError::DuplicateKey { .. } => ApiError::Conflict(msg),
            PortalError::Forbidden(_) | PortalError::MissingActor => ApiError::Forbidden(msg),
            PortalError::LockPoisoned => ApiError::Internal(msg),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<PortalError>() {
            Ok(portal) => portal.into(),
            Err(other) if is_foreign_key_violation(&other) => {
                tracing::warn!(error = %format!("{:#}", other), "Rejected dangling reference");
                ApiError::BadRequest("Referenced record does not exist".to_string())
            }
            Err(other) => {
                tracing::error!(error = %format!("{:#}", other), "Request failed");
                ApiError::Internal(other.to_string())
            }
        }
    }
}

/// Writes pre-check the ids they are given; this catches any that slip past.
fn is_foreign_key_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<rusqlite::Error>(),
            Some(rusqlite::Error::SqliteFailure(e, _))
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY
        )
    })
}

/// Turn a missing row into a 404.
pub(crate) fn found<T>(row: Option<T>, kind: &'static str, id: i64) -> Result<T, ApiError> {
    row.ok_or_else(|| PortalError::not_found(kind, id).into())
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/internal/health", get(internal_health))
        .merge(partners::routes())
        .merge(catalog::routes())
        .merge(packages::routes())
        .merge(permissions::routes())
        .merge(templates::routes())
        .merge(notes::routes())
}

async fn health_check() -> &'static str {
    "ok"
}

async fn internal_health(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let active_partners = state.db.call(|db| db.count_active_partners()).await?;
    Ok(Json(serde_json::json!({
        "status": "ok",
        "active_partners": active_partners,
    })))
}
