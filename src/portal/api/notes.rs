//! Versioned notes and the activity feeds.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use portal_common::access::Operation;
use portal_common::{ActivityType, NoteEntityType, NoteType, RelatedTable};
use serde::Deserialize;

use super::auth::Actor;
use super::{ApiError, SharedState, found, success};
use crate::errors::PortalError;
use crate::portal::models::NoteDraft;

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/api/notes", get(list_notes).post(save_note))
        .route("/api/notes/current", get(current_note))
        .route("/api/notes/{id}", get(get_note).delete(retire_note))
        .route("/api/notes/{id}/history", get(note_history))
        .route("/api/activities/recent", get(recent_activity))
        .route("/api/activities/types", get(activity_by_type))
        .route("/api/activities/user/{user_id}", get(activity_by_user))
        .route("/api/activities/partner/{id}", get(activity_for_partner))
        .route("/api/activities/{table}/{id}", get(activities_for_item))
}

#[derive(Debug, Deserialize)]
pub struct SaveNoteRequest {
    /// Note being superseded. Absent when creating the first version.
    pub note_id: Option<i64>,
    /// Version the editor last saw; required with `note_id`.
    pub version: Option<i64>,
    #[serde(flatten)]
    pub draft: NoteDraft,
}

#[derive(Debug, Deserialize)]
pub struct NoteKeyQuery {
    pub entity_id: i64,
    pub entity_type: NoteEntityType,
    pub note_type: Option<NoteType>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TypesQuery {
    /// Comma-separated activity types.
    #[serde(default)]
    pub types: String,
    pub limit: Option<u32>,
}

// ── Notes ─────────────────────────────────────────────────────────────

async fn save_note(
    State(state): State<SharedState>,
    actor: Actor,
    Json(req): Json<SaveNoteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let author = actor.authorize(Operation::EditCampaigns)?;
    let id = state
        .db
        .call(move |db| db.save_note(req.note_id, req.version, &req.draft, &author))
        .await?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": id }))))
}

async fn list_notes(
    State(state): State<SharedState>,
    Query(q): Query<NoteKeyQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let notes = state
        .db
        .call(move |db| db.list_current_notes(q.entity_id, q.entity_type))
        .await?;
    Ok(Json(notes))
}

async fn current_note(
    State(state): State<SharedState>,
    Query(q): Query<NoteKeyQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let note_type = q.note_type.unwrap_or(NoteType::General);
    let note = state
        .db
        .call(move |db| db.current_note(q.entity_id, q.entity_type, note_type))
        .await?;
    let note = note.ok_or_else(|| {
        ApiError::NotFound(format!(
            "No current {} note for {} {}",
            note_type, q.entity_type, q.entity_id
        ))
    })?;
    Ok(Json(note))
}

async fn get_note(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let note = state.db.call(move |db| db.get_note(id)).await?;
    Ok(Json(found(note, "Note", id)?))
}

async fn note_history(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let history = state.db.call(move |db| db.note_history(id)).await?;
    if history.is_empty() {
        return Err(PortalError::not_found("Note", id).into());
    }
    Ok(Json(history))
}

async fn retire_note(
    State(state): State<SharedState>,
    actor: Actor,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    actor.require(Operation::EditCampaigns)?;
    state.db.call(move |db| db.mark_note_non_current(id)).await?;
    Ok(success())
}

// ── Activity feeds ────────────────────────────────────────────────────

async fn recent_activity(
    State(state): State<SharedState>,
    Query(q): Query<LimitQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = q.limit.unwrap_or(state.activity.recent_limit);
    let activities = state.db.call(move |db| db.recent_activity(limit)).await?;
    Ok(Json(activities))
}

async fn activity_by_user(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
    Query(q): Query<LimitQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = q.limit.unwrap_or(state.activity.feed_limit);
    let activities = state
        .db
        .call(move |db| db.activity_by_user(&user_id, limit))
        .await?;
    Ok(Json(activities))
}

async fn activity_for_partner(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Query(q): Query<LimitQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = q.limit.unwrap_or(state.activity.feed_limit);
    let activities = state
        .db
        .call(move |db| db.activity_for_partner(id, limit))
        .await?;
    Ok(Json(activities))
}

async fn activity_by_type(
    State(state): State<SharedState>,
    Query(q): Query<TypesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let types = q
        .types
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse::<ActivityType>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let limit = q.limit.unwrap_or(state.activity.feed_limit);
    let activities = state
        .db
        .call(move |db| db.activity_by_type(&types, limit))
        .await?;
    Ok(Json(activities))
}

async fn activities_for_item(
    State(state): State<SharedState>,
    Path((table, id)): Path<(RelatedTable, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    let activities = state
        .db
        .call(move |db| db.activities_for_item(table, id))
        .await?;
    Ok(Json(activities))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_note_versions_and_stale_save() {
        let (app, author) = test_app_with_author();
        let (_, partner) =
            send(&app, "POST", "/api/partners", Some(json!({"name": "Acme"})), author).await;
        let partner_id = partner["id"].as_i64().unwrap();

        let (status, first) = send(
            &app,
            "POST",
            "/api/notes",
            Some(json!({
                "entity_id": partner_id,
                "entity_type": "partner",
                "note_type": "access",
                "content": "Shared vault"
            })),
            author,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let first_id = first["id"].as_i64().unwrap();

        let edit = |version: i64, content: &str| {
            json!({
                "note_id": first_id,
                "version": version,
                "entity_id": partner_id,
                "entity_type": "partner",
                "note_type": "access",
                "content": content
            })
        };

        let (status, second) = send(&app, "POST", "/api/notes", Some(edit(1, "Vault moved")), author).await;
        assert_eq!(status, StatusCode::CREATED);
        let second_id = second["id"].as_i64().unwrap();

        let (status, _) = send(&app, "POST", "/api/notes", Some(edit(1, "Lost update")), author).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, current) = send(
            &app,
            "GET",
            &format!(
                "/api/notes/current?entity_id={}&entity_type=partner&note_type=access",
                partner_id
            ),
            None,
            author,
        )
        .await;
        assert_eq!(current["id"], second_id);
        assert_eq!(current["version_number"], 2);
        assert_eq!(current["content"], "Vault moved");

        let (_, history) = send(
            &app,
            "GET",
            &format!("/api/notes/{}/history", second_id),
            None,
            author,
        )
        .await;
        let versions: Vec<i64> = history
            .as_array()
            .unwrap()
            .iter()
            .map(|n| n["version_number"].as_i64().unwrap())
            .collect();
        assert_eq!(versions, vec![2, 1]);
    }

    #[tokio::test]
    async fn test_retired_note_leaves_current_list() {
        let (app, author) = test_app_with_author();
        let (_, note) = send(
            &app,
            "POST",
            "/api/notes",
            Some(json!({"entity_id": 7, "entity_type": "campaign", "content": "Launch plan"})),
            author,
        )
        .await;
        let id = note["id"].as_i64().unwrap();

        let (_, listed) = send(
            &app,
            "GET",
            "/api/notes?entity_id=7&entity_type=campaign",
            None,
            author,
        )
        .await;
        assert_eq!(listed.as_array().unwrap().len(), 1);

        let (status, _) = send(&app, "DELETE", &format!("/api/notes/{}", id), None, author).await;
        assert_eq!(status, StatusCode::OK);

        let (_, listed) = send(
            &app,
            "GET",
            "/api/notes?entity_id=7&entity_type=campaign",
            None,
            author,
        )
        .await;
        assert!(listed.as_array().unwrap().is_empty());
        let (status, _) = send(
            &app,
            "GET",
            "/api/notes/current?entity_id=7&entity_type=campaign",
            None,
            author,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_activity_feeds() {
        let (app, author) = test_app_with_author();
        let (_, partner) =
            send(&app, "POST", "/api/partners", Some(json!({"name": "Acme"})), author).await;
        let partner_id = partner["id"].as_i64().unwrap();

        let (status, recent) = send(&app, "GET", "/api/activities/recent?limit=5", None, author).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(recent[0]["activity_type"], "partner_created");
        assert_eq!(recent[0]["actor"], "Test Editor");

        let (_, by_user) = send(&app, "GET", "/api/activities/user/auth%7Ceditor", None, author).await;
        assert!(!by_user.as_array().unwrap().is_empty());

        let (_, by_partner) = send(
            &app,
            "GET",
            &format!("/api/activities/partner/{}", partner_id),
            None,
            author,
        )
        .await;
        assert_eq!(by_partner[0]["partner_id"], partner_id);

        let (_, by_type) = send(
            &app,
            "GET",
            "/api/activities/types?types=package_created,partner_created",
            None,
            author,
        )
        .await;
        assert_eq!(by_type.as_array().unwrap().len(), 1);

        let (status, _) =
            send(&app, "GET", "/api/activities/types?types=bogus", None, author).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
