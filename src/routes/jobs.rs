use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tokio_util::io::ReaderStream;

use crate::error::AppError;
use crate::models::job::{JobStatus, JobType};
use crate::services::job_queue::{CancelOutcome, CreateJobRequest};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/create", axum::routing::post(create_job))
        .route("/status/{id}", get(get_status))
        .route("/queue", get(get_queue))
        .route("/download/{id}", get(download))
        .route("/{id}", axum::routing::delete(cancel))
        .route("/stats", get(stats))
}

/// Accepts either a reference to an existing upload (`upload_id` field) or a
/// raw file body, plus `job_type` and a JSON-encoded `parameters` field.
async fn create_job(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let mut upload_id: Option<String> = None;
    let mut job_type: Option<String> = None;
    let mut parameters = serde_json::json!({});
    let mut priority: Option<i32> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();
        let text = field
            .text()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
        match name.as_str() {
            "upload_id" => upload_id = Some(text),
            "job_type" => job_type = Some(text),
            "priority" => priority = text.parse().ok(),
            "parameters" => {
                parameters = serde_json::from_str(&text)
                    .map_err(|e| AppError::BadRequest(format!("invalid parameters JSON: {e}")))?;
            }
            _ => {}
        }
    }

    let job_type = job_type.ok_or_else(|| AppError::BadRequest("missing job_type".into()))?;
    let job_type = JobType::from_str_loose(&job_type)
        .ok_or_else(|| AppError::BadRequest(format!("unknown job_type '{job_type}'")))?;
    let upload_id = upload_id.ok_or_else(|| AppError::BadRequest("missing upload_id".into()))?;

    let upload = state
        .uploads
        .get(&upload_id)
        .await?
        .ok_or_else(|| AppError::BadRequest(format!("upload '{upload_id}' not found")))?;

    let priority = priority.unwrap_or_else(|| job_type.default_priority());

    let job = state
        .queue
        .create(CreateJobRequest {
            job_type,
            upload_id: Some(upload_id),
            input_file: upload.file_path,
            original_filename: upload.filename,
            file_size_mb: upload.file_size_mb,
            parameters,
            priority,
        })
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "job_id": job.id,
            "status": job.status,
            "priority": job.priority,
        })),
    ))
}

async fn get_status(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<crate::models::JobRecord>, AppError> {
    state
        .queue
        .get_status(&job_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("job not found".into()))
}

async fn get_queue(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, AppError> {
    let stats = state.queue.stats().await?;
    let pending = state.queue.list_pending(50).await?;
    Ok(Json(serde_json::json!({
        "stats": {
            "pending": stats.pending,
            "processing": stats.processing,
            "completed": stats.completed,
            "failed": stats.failed,
        },
        "total_pending": pending.len(),
        "pending_jobs": pending,
    })))
}

async fn download(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<axum::response::Response, AppError> {
    let job = state
        .queue
        .get_status(&job_id)
        .await?
        .ok_or_else(|| AppError::NotFound("job not found".into()))?;

    if job.status != JobStatus::Completed {
        return Err(AppError::BadRequest(format!(
            "job not completed, current status: {}",
            job.status.as_str()
        )));
    }

    let output_file = job
        .output_file
        .ok_or_else(|| AppError::NotFound("result expired or missing".into()))?;
    if !std::path::Path::new(&output_file).exists() {
        return Err(AppError::NotFound(
            "result file not found or already expired".into(),
        ));
    }

    let file = tokio::fs::File::open(&output_file).await?;
    let stream = ReaderStream::new(file);
    let body = Body::from_stream(stream);

    let ext = std::path::Path::new(&output_file)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");
    let mime = match ext {
        "mp4" => "video/mp4",
        "mp3" => "audio/mpeg",
        "webp" => "image/webp",
        "json" => "application/json",
        _ => "application/octet-stream",
    };

    let base_name = job
        .metadata
        .original_filename
        .rsplit_once('.')
        .map(|(base, _)| base.to_string())
        .unwrap_or(job.metadata.original_filename.clone());
    let download_filename = format!("{base_name}.{ext}");

    Ok((
        [
            (header::CONTENT_TYPE, mime.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{download_filename}\""),
            ),
        ],
        body,
    )
        .into_response())
}

async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    match state.queue.cancel(&job_id).await? {
        CancelOutcome::Cancelled => Ok(Json(serde_json::json!({
            "message": "job cancelled",
            "job_id": job_id,
        }))),
        CancelOutcome::InProgress => Err(AppError::BadRequest(
            "cannot cancel a job that is currently processing".into(),
        )),
        CancelOutcome::AlreadyTerminal => {
            let job = state.queue.get_status(&job_id).await?;
            Ok(Json(serde_json::json!({
                "message": format!("job already {}", job.map(|j| j.status.as_str().to_string()).unwrap_or_default()),
            })))
        }
        CancelOutcome::NotFound => Err(AppError::NotFound("job not found".into())),
    }
}

async fn stats(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, AppError> {
    let stats = state.queue.stats().await?;
    Ok(Json(serde_json::json!({
        "queue": {
            "pending": stats.pending,
            "processing": stats.processing,
        },
        "completed": { "last_retention_window": stats.completed },
        "failed": { "last_retention_window": stats.failed },
        "total_active": stats.pending + stats.processing,
    })))
}
