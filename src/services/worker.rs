//! Single-threaded job worker (§4.3). Pops the highest-priority job,
//! dispatches it to the media engine, and funnels the result back through
//! `JobQueue::update_status`.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::models::job::{JobRecord, JobStatus, JobType};
use crate::services::media_engine::MediaEngine;
use crate::state::AppState;

pub fn start_worker(state: Arc<AppState>, cancel: CancellationToken) {
    tokio::spawn(async move {
        match state.queue.reconcile_on_startup().await {
            Ok(report) => tracing::info!(
                requeued = report.requeued,
                failed_processing = report.failed_processing,
                "startup reconciliation complete"
            ),
            Err(e) => tracing::error!(error = %e, "startup reconciliation failed"),
        }

        tracing::info!("worker started, waiting for jobs");
        loop {
            if cancel.is_cancelled() {
                break;
            }

            match state.queue.pop_next().await {
                Ok(Some(job_id)) => {
                    run_job_with_heartbeat(&state, &job_id).await;
                    *state.worker_heartbeat.write().await = chrono::Utc::now();
                }
                Ok(None) => {
                    *state.worker_heartbeat.write().await = chrono::Utc::now();
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(std::time::Duration::from_secs(1)) => {}
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "worker loop error, backing off");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(std::time::Duration::from_secs(5)) => {}
                    }
                }
            }
        }
        tracing::info!("worker stopped");
    });
}

/// Drives `process_job` while touching the heartbeat every few seconds, so a
/// long-running `compress_video`/`convert_mp4` call (tens of minutes) doesn't
/// look stalled to `/health`'s heartbeat-age check.
async fn run_job_with_heartbeat(state: &Arc<AppState>, job_id: &str) {
    let job = process_job(state, job_id);
    tokio::pin!(job);
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(5));
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = &mut job => break,
            _ = ticker.tick() => {
                *state.worker_heartbeat.write().await = chrono::Utc::now();
            }
        }
    }
}

async fn process_job(state: &Arc<AppState>, job_id: &str) {
    let Ok(Some(job)) = state.queue.get_status(job_id).await else {
        tracing::error!(job_id = %job_id, "job not found, dropping");
        return;
    };

    tracing::info!(
        job_id = %job_id,
        job_type = job.job_type.as_str(),
        file = %job.metadata.original_filename,
        size_mb = job.metadata.file_size_mb,
        priority = job.priority,
        "starting job"
    );

    if let Err(e) = state
        .queue
        .update_status(job_id, JobStatus::Processing, Some(0), None, None)
        .await
    {
        tracing::error!(job_id = %job_id, error = %e, "failed to mark job processing");
        return;
    }

    match run_job(state, &job).await {
        Ok(output_file) => {
            let output_size_mb = std::fs::metadata(&output_file)
                .map(|m| m.len() as f64 / (1024.0 * 1024.0))
                .unwrap_or(0.0);
            tracing::info!(job_id = %job_id, output_size_mb, "job output generated");

            if let Err(e) = state
                .queue
                .update_status(
                    job_id,
                    JobStatus::Completed,
                    Some(100),
                    Some(output_file),
                    None,
                )
                .await
            {
                tracing::error!(job_id = %job_id, error = %e, "failed to mark job completed");
            }
            release_input(state, &job).await;
        }
        Err(e) => {
            tracing::error!(job_id = %job_id, error = %e, "job failed");
            if let Err(e2) = state
                .queue
                .update_status(job_id, JobStatus::Failed, None, None, Some(e.to_string()))
                .await
            {
                tracing::error!(job_id = %job_id, error = %e2, "failed to mark job failed");
            }
            release_input(state, &job).await;
        }
    }
}

async fn run_job(state: &Arc<AppState>, job: &JobRecord) -> anyhow::Result<String> {
    if !std::path::Path::new(&job.input_file).exists() {
        anyhow::bail!("input file not found: {}", job.input_file);
    }

    std::fs::create_dir_all(&state.config.results_dir)?;
    let output_file = state
        .config
        .results_dir
        .join(format!("{}_output.{}", job.id, job.job_type.output_extension()))
        .to_string_lossy()
        .to_string();

    dispatch(state.engine.as_ref(), job, &output_file).await?;

    if !std::path::Path::new(&output_file).exists() {
        anyhow::bail!("media engine did not produce an output file: {output_file}");
    }
    if std::fs::metadata(&output_file)?.len() == 0 {
        anyhow::bail!("media engine produced an empty output file: {output_file}");
    }

    Ok(output_file)
}

async fn dispatch(
    engine: &dyn MediaEngine,
    job: &JobRecord,
    output_file: &str,
) -> anyhow::Result<()> {
    let params = &job.metadata.parameters;
    match job.job_type {
        JobType::GetMetadata => {
            let metadata = engine.get_video_metadata(&job.input_file).await?;
            std::fs::write(output_file, serde_json::to_vec_pretty(&metadata)?)?;
            Ok(())
        }
        JobType::ExtractAudio => {
            let quality = params.get("quality").and_then(|v| v.as_i64()).unwrap_or(2) as i32;
            engine
                .extract_audio_from_video(&job.input_file, output_file, quality)
                .await
        }
        JobType::CompressVideo => {
            let max_threads = params
                .get("max_threads")
                .and_then(|v| v.as_u64())
                .unwrap_or(4) as u32;
            engine
                .compress_video(&job.input_file, output_file, 28, 30, "128k", max_threads)
                .await
        }
        JobType::ConvertMp4 => {
            let max_threads = params
                .get("max_threads")
                .and_then(|v| v.as_u64())
                .unwrap_or(4) as u32;
            engine
                .convert_to_mp4(&job.input_file, output_file, max_threads, false)
                .await
        }
        JobType::CutAudio => {
            let start_time = params
                .get("start_time")
                .and_then(|v| v.as_str())
                .ok_or_else(|| anyhow::anyhow!("missing start_time"))?;
            let end_time = params
                .get("end_time")
                .and_then(|v| v.as_str())
                .ok_or_else(|| anyhow::anyhow!("missing end_time"))?;
            engine
                .cut_audio(&job.input_file, output_file, start_time, end_time)
                .await
        }
        JobType::ConcatAudios => {
            let input_files: Vec<String> = params
                .get("input_files")
                .and_then(|v| v.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|v| v.as_str().map(String::from))
                        .collect()
                })
                .unwrap_or_else(|| vec![job.input_file.clone()]);
            engine.concat_audios(&input_files, output_file).await
        }
        JobType::CaptureFrame => {
            let timestamp = params
                .get("timestamp")
                .and_then(|v| v.as_str())
                .ok_or_else(|| anyhow::anyhow!("missing timestamp"))?;
            let quality = params
                .get("quality")
                .and_then(|v| v.as_i64())
                .unwrap_or(85) as i32;
            engine
                .capture_frame(&job.input_file, output_file, timestamp, quality)
                .await
        }
    }
}

/// Releases the upload reference held on behalf of this job, or deletes the
/// plain input file when the job was created from a raw multipart body
/// rather than a registered upload. `auto_delete` is `false`, matching the
/// production default: reclamation of unreferenced upload files is left to
/// the mtime sweep rather than eager deletion at zero ref-count.
async fn release_input(state: &Arc<AppState>, job: &JobRecord) {
    if let Some(upload_id) = &job.upload_id {
        if let Err(e) = state.uploads.decrement_ref(upload_id, false).await {
            tracing::error!(upload_id = %upload_id, error = %e, "failed to release upload reference");
        }
    } else if std::path::Path::new(&job.input_file).exists() {
        if let Err(e) = std::fs::remove_file(&job.input_file) {
            tracing::warn!(file = %job.input_file, error = %e, "failed to remove input file after job");
        }
    }
}
