pub mod admin;
pub mod analytics;
pub mod auth;
pub mod complaints;
pub mod config;
pub mod error;
pub mod fanout;
pub mod files;
pub mod live;
pub mod notifications;
pub mod rate_limit;
pub mod retry;
pub mod session;
pub mod state;
pub mod upload;
pub mod views;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    routing::{get, patch, post},
};
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use state::{AppState, AppStateInner};

/// Headroom for multipart framing and text fields on top of the file bytes.
const FORM_OVERHEAD: usize = 1024 * 1024;

/// Build the full HTTP application.
pub fn app(state: AppState) -> Router {
    let body_limit = upload::validator::MAX_FILE_SIZE
        .saturating_mul(state.config.max_files.max(1))
        .saturating_add(FORM_OVERHEAD);

    let public = Router::new()
        .route("/api/complaints", post(complaints::submit))
        .route(
            "/api/complaints/{tracking_code}/attachments",
            post(complaints::upload_attachments),
        )
        .route("/api/track/{tracking_code}", get(complaints::track))
        .route("/api/attachments/{id}/download", get(files::download))
        .layer(DefaultBodyLimit::max(body_limit));

    let auth_routes = Router::new()
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/me", get(auth::me));

    let admin_routes = Router::new()
        .route("/api/admin/complaints", get(admin::list_complaints))
        .route(
            "/api/admin/complaints/{id}",
            get(admin::get_complaint)
                .patch(admin::update_complaint)
                .delete(admin::delete_complaint),
        )
        .route("/api/admin/analytics", get(analytics::report))
        .route("/api/admin/analytics/export", get(analytics::export));

    let notification_routes = Router::new()
        .route("/api/notifications", get(notifications::list))
        .route("/api/notifications/unread-count", get(notifications::unread_count))
        .route("/api/notifications/read-all", post(notifications::mark_all_read))
        .route("/api/notifications/stream", get(notifications::stream))
        .route("/api/notifications/{id}/read", patch(notifications::mark_read))
        .route(
            "/api/notifications/{id}",
            axum::routing::delete(notifications::remove),
        );

    Router::new()
        .route("/health", get(health))
        .merge(public)
        .merge(auth_routes)
        .merge(admin_routes)
        .merge(notification_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
