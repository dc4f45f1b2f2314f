use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::routing::get;
use axum::{Json, Router};

use crate::error::AppError;
use crate::state::AppState;

pub fn single_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", axum::routing::post(upload_file))
        .route("/{id}", get(get_upload).delete(delete_upload))
}

/// Streams the multipart body straight to a file under `uploads/` and
/// registers it immediately; does not wait for any job to consume it.
async fn upload_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, AppError> {
    let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    else {
        return Err(AppError::BadRequest("missing file field".into()));
    };

    let filename = field
        .file_name()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "upload.bin".to_string());

    let upload_id = uuid::Uuid::new_v4().to_string();
    std::fs::create_dir_all(&state.config.uploads_dir)?;
    let file_path = state
        .config
        .uploads_dir
        .join(format!("{upload_id}_{filename}"));

    let mut file = tokio::fs::File::create(&file_path).await?;
    let mut written: u64 = 0;
    let mut field = field;
    use tokio::io::AsyncWriteExt;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        written += chunk.len() as u64;
        if written > state.config.max_upload_bytes {
            drop(file);
            let _ = std::fs::remove_file(&file_path);
            return Err(AppError::BadRequest("upload exceeds size limit".into()));
        }
        file.write_all(&chunk).await?;
    }
    file.flush().await?;

    let file_size_mb = written as f64 / (1024.0 * 1024.0);
    let record = state
        .uploads
        .create(
            filename.clone(),
            file_path.to_string_lossy().to_string(),
            file_size_mb,
            Some(upload_id.clone()),
            state.config.upload_unused_ttl_secs,
        )
        .await?;

    tracing::info!(upload_id = %upload_id, file_size_mb = record.file_size_mb, "upload accepted");

    Ok(Json(serde_json::json!({
        "upload_id": record.upload_id,
        "filename": record.filename,
        "file_size_mb": record.file_size_mb,
        "status": "ready",
        "create_job_url": "/jobs/create",
    })))
}

async fn get_upload(
    State(state): State<Arc<AppState>>,
    Path(upload_id): Path<String>,
) -> Result<Json<crate::models::UploadRecord>, AppError> {
    state
        .uploads
        .get(&upload_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("upload not found".into()))
}

async fn delete_upload(
    State(state): State<Arc<AppState>>,
    Path(upload_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    use crate::services::upload_registry::DeleteOutcome;
    match state.uploads.delete_manual(&upload_id).await? {
        DeleteOutcome::Deleted => Ok(Json(serde_json::json!({
            "message": "upload deleted",
            "upload_id": upload_id,
        }))),
        DeleteOutcome::InUse => Err(AppError::BadRequest(
            "cannot delete: upload is referenced by an active job".into(),
        )),
        DeleteOutcome::NotFound => Err(AppError::NotFound("upload not found".into())),
    }
}

pub async fn list_uploads(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let uploads = state.uploads.list(100).await?;
    Ok(Json(serde_json::json!({
        "total": uploads.len(),
        "uploads": uploads,
    })))
}
