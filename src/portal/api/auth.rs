//! Caller identity and permission checks.
//!
//! An authenticating proxy in front of the portal sets trusted headers on
//! every request. [`route_gate`] checks them against the route access table
//! before any handler runs; handlers take an [`Actor`] to stamp authorship
//! and to check operation permissions.

use axum::{
    extract::{FromRequestParts, Request},
    http::{HeaderMap, StatusCode, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use portal_common::access::{self, Operation, RouteAccess};

use super::ApiError;
use crate::errors::PortalError;
use crate::portal::models::Author;

pub const USER_HEADER: &str = "x-portal-user";
pub const ENTITY_HEADER: &str = "x-portal-entity-id";
pub const PERMISSIONS_HEADER: &str = "x-portal-permissions";

/// User id recorded when the proxy did not name one.
const SYSTEM_USER: &str = "system";

#[derive(Debug, Clone)]
pub struct Actor {
    pub user_id: String,
    pub entity_id: Option<i64>,
    pub permissions: Vec<String>,
}

impl Actor {
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, ApiError> {
        let user_id = header_str(headers, USER_HEADER)
            .unwrap_or(SYSTEM_USER)
            .to_string();
        let entity_id = header_str(headers, ENTITY_HEADER)
            .map(|raw| {
                raw.parse::<i64>().map_err(|_| {
                    ApiError::BadRequest(format!("Invalid {} header '{}'", ENTITY_HEADER, raw))
                })
            })
            .transpose()?;
        let permissions = header_str(headers, PERMISSIONS_HEADER)
            .map(access::parse_permission_list)
            .unwrap_or_default();
        Ok(Self {
            user_id,
            entity_id,
            permissions,
        })
    }

    /// Fail with 403 unless the actor holds one of the operation's permissions.
    pub fn require(&self, op: Operation) -> Result<(), ApiError> {
        if access::allows(&self.permissions, op) {
            return Ok(());
        }
        tracing::warn!(user = %self.user_id, operation = ?op, "Operation denied");
        Err(PortalError::Forbidden(format!("requires one of {}", op.required().join(", "))).into())
    }

    /// The author stamped into `created_by`/`updated_by` and the activity log.
    pub fn author(&self) -> Result<Author, ApiError> {
        let entity_id = self.entity_id.ok_or(PortalError::MissingActor)?;
        Ok(Author {
            entity_id,
            user_id: self.user_id.clone(),
        })
    }

    /// [`require`](Self::require) then [`author`](Self::author).
    pub fn authorize(&self, op: Operation) -> Result<Author, ApiError> {
        self.require(op)?;
        self.author()
    }
}

impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Actor::from_headers(&parts.headers)
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Route-level gate. Paths the caller may not see answer 404, the same as
/// paths that do not exist.
pub async fn route_gate(req: Request, next: Next) -> Response {
    let path = req.uri().path().to_owned();
    match access::route_access(&path) {
        RouteAccess::Open => next.run(req).await,
        RouteAccess::Requires(permission) => {
            let granted = header_str(req.headers(), PERMISSIONS_HEADER)
                .map(access::parse_permission_list)
                .unwrap_or_default();
            if access::has_permission(&granted, permission) {
                next.run(req).await
            } else {
                tracing::warn!(%path, permission, "Route denied");
                StatusCode::NOT_FOUND.into_response()
            }
        }
        RouteAccess::Unlisted => {
            tracing::debug!(%path, "Unlisted route");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}
