use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::services::cleanup;
use crate::state::AppState;

/// Forces an immediate TTL=0 sweep of `uploads/` and `results/`.
pub async fn reset(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let config = state.config.clone();
    let (uploads, results) =
        tokio::task::spawn_blocking(move || cleanup::force_sweep(&config))
            .await
            .unwrap_or_default();

    tracing::warn!(
        uploads_deleted = uploads.files_deleted,
        results_deleted = results.files_deleted,
        "forced reset sweep executed"
    );

    Json(serde_json::json!({
        "uploads": uploads,
        "results": results,
    }))
}
