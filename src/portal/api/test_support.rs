//! Router and request helpers shared by the handler tests.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use portal_common::access::{CAMPAIGN_EDIT, EMPLOYEE_EDIT, SERVICE_ITEM_EDIT, USER_LOGIN};
use tower::ServiceExt;

use super::auth::{ENTITY_HEADER, PERMISSIONS_HEADER, USER_HEADER};
use super::AppState;
use crate::config::ActivitySection;
use crate::portal::db::{DbHandle, PortalDb};
use crate::portal::server::build_router;

pub const EDITOR_PERMISSIONS: &[&str] =
    &[USER_LOGIN, CAMPAIGN_EDIT, SERVICE_ITEM_EDIT, EMPLOYEE_EDIT];

/// Full router over a fresh in-memory database with one employee seeded.
/// The employee's entity id is returned alongside.
pub fn test_app_with_author() -> (Router, i64) {
    let db = PortalDb::new_in_memory().unwrap();
    let employee = db
        .create_employee("Test", "Editor", None, Some("auth|editor"))
        .unwrap();
    let state = Arc::new(AppState {
        db: DbHandle::new(db),
        activity: ActivitySection::default(),
    });
    (build_router(state, false), employee.entity_id)
}

pub fn test_app() -> Router {
    test_app_with_author().0
}

pub async fn body_json<T: serde::de::DeserializeOwned>(body: Body) -> T {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Send a request as an editor holding every portal permission.
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
    entity_id: i64,
) -> (StatusCode, serde_json::Value) {
    send_as(app, method, uri, body, Some(entity_id), EDITOR_PERMISSIONS).await
}

pub async fn send_as(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
    entity_id: Option<i64>,
    permissions: &[&str],
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(USER_HEADER, "auth|editor")
        .header(PERMISSIONS_HEADER, permissions.join(","));
    if let Some(id) = entity_id {
        builder = builder.header(ENTITY_HEADER, id.to_string());
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}
