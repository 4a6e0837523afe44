use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::api::{self, AppState, auth};
use super::db::{DbHandle, PortalDb};
use crate::config::PortalConfig;

/// Build the full application router: API routes behind the route gate,
/// request tracing, and optionally a permissive CORS layer.
pub fn build_router(state: Arc<AppState>, cors_permissive: bool) -> Router {
    let mut app = api::api_router()
        .layer(axum::middleware::from_fn(auth::route_gate))
        .layer(TraceLayer::new_for_http());

    if cors_permissive {
        app = app.layer(CorsLayer::permissive());
    }

    app.with_state(state)
}

/// Open the database at `path`, creating its directory and running migrations.
pub fn open_database(path: &Path) -> Result<PortalDb> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create database directory {}", parent.display())
        })?;
    }
    PortalDb::new(path)
        .with_context(|| format!("Failed to initialize portal database at {}", path.display()))
}

/// Start the portal server and run until Ctrl+C.
pub async fn start_server(config: &PortalConfig) -> Result<()> {
    let db = open_database(&config.database.path)?;
    let state = Arc::new(AppState {
        db: DbHandle::new(db),
        activity: config.activity.clone(),
    });

    let app = build_router(state, config.server.cors_permissive);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    tracing::info!(
        addr = %local_addr,
        db = %config.database.path.display(),
        cors_permissive = config.server.cors_permissive,
        "Portal listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ActivitySection;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn test_router(cors_permissive: bool) -> Router {
        let state = Arc::new(AppState {
            db: DbHandle::new(PortalDb::new_in_memory().unwrap()),
            activity: ActivitySection::default(),
        });
        build_router(state, cors_permissive)
    }

    #[tokio::test]
    async fn test_health_via_full_router() {
        let app = test_router(false);
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_api_hidden_without_login() {
        let app = test_router(false);
        let req = Request::builder()
            .uri("/api/packages")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unlisted_route_not_found() {
        let app = test_router(false);
        let req = Request::builder()
            .uri("/admin")
            .header(auth::PERMISSIONS_HEADER, "user:login")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_permissive_cors_sets_header() {
        let app = test_router(true);
        let req = Request::builder()
            .uri("/health")
            .header("origin", "http://localhost:5173")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(
            resp.headers()
                .get("access-control-allow-origin")
                .map(|v| v.to_str().unwrap()),
            Some("*")
        );
    }

    #[tokio::test]
    async fn test_cors_off_by_default() {
        let app = test_router(false);
        let req = Request::builder()
            .uri("/health")
            .header("origin", "http://localhost:5173")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert!(resp.headers().get("access-control-allow-origin").is_none());
    }

    #[test]
    fn test_open_database_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("portal.db");
        let db = open_database(&path).unwrap();
        assert!(path.exists());
        assert_eq!(db.count_active_partners().unwrap(), 0);
    }
}
