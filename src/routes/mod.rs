pub mod health;
pub mod jobs;
pub mod reset;
pub mod upload;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(landing))
        .route("/health", get(health::health))
        .nest("/upload", upload::single_router())
        .route("/uploads", get(upload::list_uploads))
        .nest("/jobs", jobs::router())
        .route("/reset", axum::routing::delete(reset::reset))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn landing() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "service": "mediaqueue-server",
        "operations": {
            "1_upload": "POST /upload -> {upload_id} (instant)",
            "2_create_job": "POST /jobs/create -> {job_id} (instant)",
            "3_poll_status": "GET /jobs/status/{job_id}",
            "4_download": "GET /jobs/download/{job_id}",
        },
    }))
}
