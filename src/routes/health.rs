use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::state::AppState;

/// Liveness probe: the store must answer a trivial command and the worker
/// must have completed a loop iteration recently.
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    let store_ok = state.queue.stats().await.is_ok();
    let heartbeat = *state.worker_heartbeat.read().await;
    let heartbeat_age_secs = (chrono::Utc::now() - heartbeat).num_seconds();
    let worker_ok = heartbeat_age_secs < 60;

    let status = if store_ok && worker_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(serde_json::json!({
            "status": if status == StatusCode::OK { "ok" } else { "degraded" },
            "store_reachable": store_ok,
            "worker_heartbeat_age_secs": heartbeat_age_secs,
        })),
    )
}
