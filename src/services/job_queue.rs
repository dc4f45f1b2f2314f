//! Job queue: creates jobs, orders them by priority, exposes status,
//! cancellation, and aggregate stats (§4.2).

use std::sync::Arc;

use uuid::Uuid;

use crate::models::job::{JobMetadata, JobStatus, JobType};
use crate::models::JobRecord;
use crate::services::upload_registry::UploadRegistry;
use crate::store::KvStore;

const JOB_QUEUE: &str = "job_queue";
const PENDING_JOBS: &str = "pending_jobs";
const PROCESSING_JOBS: &str = "processing_jobs";
const COMPLETED_JOBS: &str = "completed_jobs";
const FAILED_JOBS: &str = "failed_jobs";

/// Score multiplier for the priority band. Widened from the naive `10^6`
/// (which collides with the timestamp after ~11.5 days of uptime at
/// second resolution) to `10^10`, which survives for roughly three
/// centuries of millisecond-resolution timestamps. See DESIGN.md.
const PRIORITY_SCORE_MULTIPLIER: f64 = 1e10;

#[derive(Clone)]
pub struct JobQueue {
    store: Arc<dyn KvStore>,
    uploads: UploadRegistry,
    completed_ttl_secs: i64,
    failed_ttl_secs: i64,
}

pub struct CreateJobRequest {
    pub job_type: JobType,
    pub upload_id: Option<String>,
    pub input_file: String,
    pub original_filename: String,
    pub file_size_mb: f64,
    pub parameters: serde_json::Value,
    pub priority: i32,
}

impl JobQueue {
    pub fn new(store: Arc<dyn KvStore>, completed_ttl_secs: i64, failed_ttl_secs: i64) -> Self {
        let uploads = UploadRegistry::new(store.clone());
        Self {
            store,
            uploads,
            completed_ttl_secs,
            failed_ttl_secs,
        }
    }

    fn score(priority: i32, created_at: f64) -> f64 {
        priority as f64 * PRIORITY_SCORE_MULTIPLIER + created_at
    }

    pub async fn create(&self, req: CreateJobRequest) -> anyhow::Result<JobRecord> {
        req.job_type.validate_parameters(&req.parameters)?;

        let job_id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now();
        let now_ts = now.timestamp_millis() as f64 / 1000.0;

        let record = JobRecord {
            id: job_id.clone(),
            status: JobStatus::Pending,
            job_type: req.job_type,
            priority: req.priority,
            created_at: now.to_rfc3339(),
            started_at: None,
            completed_at: None,
            progress: 0,
            input_file: req.input_file,
            upload_id: req.upload_id.clone(),
            output_file: None,
            result_url: None,
            error: None,
            metadata: JobMetadata {
                original_filename: req.original_filename,
                file_size_mb: (req.file_size_mb * 100.0).round() / 100.0,
                parameters: req.parameters,
            },
            queue_position: None,
        };

        self.store
            .set(&JobRecord::key(&job_id), &serde_json::to_string(&record)?)
            .await?;
        self.store.zadd(PENDING_JOBS, &job_id, now_ts).await?;
        self.store
            .zadd(JOB_QUEUE, &job_id, Self::score(record.priority, now_ts))
            .await?;

        if let Some(upload_id) = &req.upload_id {
            self.uploads.increment_ref(upload_id).await?;
        }

        tracing::info!(
            job_id = %job_id,
            job_type = record.job_type.as_str(),
            priority = record.priority,
            file_size_mb = record.metadata.file_size_mb,
            "job created"
        );
        Ok(record)
    }

    /// Atomically removes and returns the highest-priority pending job id.
    pub async fn pop_next(&self) -> anyhow::Result<Option<String>> {
        let popped = self.store.zpopmin(JOB_QUEUE).await?;
        if let Some((job_id, _score)) = &popped {
            tracing::info!(job_id = %job_id, "job popped from queue");
        }
        Ok(popped.map(|(id, _)| id))
    }

    pub async fn get_status(&self, job_id: &str) -> anyhow::Result<Option<JobRecord>> {
        let Some(raw) = self.store.get(&JobRecord::key(job_id)).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    async fn save(&self, record: &JobRecord) -> anyhow::Result<()> {
        self.store
            .set(&JobRecord::key(&record.id), &serde_json::to_string(record)?)
            .await
    }

    /// Funnel for every job-state mutation; rejects transitions that aren't
    /// legal per the state machine in §4.2 of the spec.
    pub async fn update_status(
        &self,
        job_id: &str,
        new_status: JobStatus,
        progress: Option<i32>,
        output_file: Option<String>,
        error: Option<String>,
    ) -> anyhow::Result<Option<JobRecord>> {
        let Some(mut record) = self.get_status(job_id).await? else {
            tracing::warn!(job_id = %job_id, "update_status on missing job");
            return Ok(None);
        };

        if !is_legal_transition(record.status, new_status) {
            anyhow::bail!(
                "illegal job transition {:?} -> {:?}",
                record.status,
                new_status
            );
        }

        record.status = new_status;
        if let Some(p) = progress {
            record.progress = p;
        }

        match new_status {
            JobStatus::Processing => {
                if record.started_at.is_none() {
                    record.started_at = Some(chrono::Utc::now().to_rfc3339());
                    self.store.zrem(PENDING_JOBS, job_id).await?;
                    self.store.sadd(PROCESSING_JOBS, job_id).await?;
                }
            }
            JobStatus::Completed | JobStatus::Failed => {
                record.completed_at = Some(chrono::Utc::now().to_rfc3339());
                self.store.srem(PROCESSING_JOBS, job_id).await?;

                if new_status == JobStatus::Completed {
                    record.progress = 100;
                    record.output_file = output_file;
                    record.result_url = Some(format!("/jobs/download/{job_id}"));
                    self.store
                        .zadd(COMPLETED_JOBS, job_id, now_secs())
                        .await?;
                    tracing::info!(job_id = %job_id, "job completed");
                } else {
                    record.error = error;
                    self.store.zadd(FAILED_JOBS, job_id, now_secs()).await?;
                    tracing::error!(job_id = %job_id, error = ?record.error, "job failed");
                }
            }
            JobStatus::Pending => {}
        }

        self.save(&record).await?;

        if new_status == JobStatus::Completed {
            self.store
                .expire(&JobRecord::key(job_id), self.completed_ttl_secs)
                .await?;
        } else if new_status == JobStatus::Failed {
            self.store
                .expire(&JobRecord::key(job_id), self.failed_ttl_secs)
                .await?;
        }

        Ok(Some(record))
    }

    /// Allowed only from `pending`; a no-op in a terminal state; refuses
    /// while `processing`.
    pub async fn cancel(&self, job_id: &str) -> anyhow::Result<CancelOutcome> {
        let Some(record) = self.get_status(job_id).await? else {
            return Ok(CancelOutcome::NotFound);
        };

        match record.status {
            JobStatus::Completed | JobStatus::Failed => Ok(CancelOutcome::AlreadyTerminal),
            JobStatus::Processing => Ok(CancelOutcome::InProgress),
            JobStatus::Pending => {
                self.store.zrem(JOB_QUEUE, job_id).await?;
                self.store.zrem(PENDING_JOBS, job_id).await?;

                self.update_status(
                    job_id,
                    JobStatus::Failed,
                    None,
                    None,
                    Some("cancelled by user".to_string()),
                )
                .await?;

                if std::path::Path::new(&record.input_file).exists() {
                    if let Err(e) = std::fs::remove_file(&record.input_file) {
                        tracing::error!(job_id = %job_id, error = %e, "failed to remove input file on cancel");
                    }
                }

                tracing::info!(job_id = %job_id, "job cancelled");
                Ok(CancelOutcome::Cancelled)
            }
        }
    }

    pub async fn stats(&self) -> anyhow::Result<QueueStats> {
        Ok(QueueStats {
            pending: self.store.zcard(JOB_QUEUE).await?,
            processing: self.store.scard(PROCESSING_JOBS).await?,
            completed: self.store.zcard(COMPLETED_JOBS).await?,
            failed: self.store.zcard(FAILED_JOBS).await?,
        })
    }

    pub async fn list_pending(&self, limit: isize) -> anyhow::Result<Vec<JobRecord>> {
        let ids = self.store.zrange(JOB_QUEUE, 0, limit - 1).await?;
        let mut jobs = Vec::with_capacity(ids.len());
        for (i, id) in ids.into_iter().enumerate() {
            if let Some(mut job) = self.get_status(&id).await? {
                job.queue_position = Some((i + 1) as u64);
                jobs.push(job);
            }
        }
        Ok(jobs)
    }

    /// Startup reconciliation (§7): re-insert `pending` records missing from
    /// `job_queue` (worker crashed between `pop_next` and the `processing`
    /// transition), and rewrite orphaned `processing` records to `failed`.
    pub async fn reconcile_on_startup(&self) -> anyhow::Result<ReconcileReport> {
        let mut report = ReconcileReport::default();

        let pending_ids = self.store.zrange(PENDING_JOBS, 0, -1).await?;
        for job_id in pending_ids {
            let Some(record) = self.get_status(&job_id).await? else {
                continue;
            };
            if record.status != JobStatus::Pending {
                continue;
            }
            let in_queue = self
                .store
                .zrange(JOB_QUEUE, 0, -1)
                .await?
                .iter()
                .any(|id| id == &job_id);
            if !in_queue {
                let now_ts = chrono::Utc::now().timestamp_millis() as f64 / 1000.0;
                self.store
                    .zadd(JOB_QUEUE, &job_id, Self::score(record.priority, now_ts))
                    .await?;
                report.requeued += 1;
                tracing::warn!(job_id = %job_id, "re-queued orphaned pending job on startup");
            }
        }

        let processing_ids = self.store.smembers(PROCESSING_JOBS).await?;
        for job_id in processing_ids {
            self.update_status(
                &job_id,
                JobStatus::Failed,
                None,
                None,
                Some("worker restart".to_string()),
            )
            .await?;
            report.failed_processing += 1;
            tracing::warn!(job_id = %job_id, "marked orphaned processing job failed on startup");
        }

        Ok(report)
    }
}

#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub requeued: usize,
    pub failed_processing: usize,
}

pub struct QueueStats {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
}

pub enum CancelOutcome {
    Cancelled,
    InProgress,
    AlreadyTerminal,
    NotFound,
}

fn is_legal_transition(from: JobStatus, to: JobStatus) -> bool {
    use JobStatus::*;
    matches!(
        (from, to),
        (Pending, Processing)
            | (Pending, Failed)
            | (Processing, Completed)
            | (Processing, Failed)
    )
}

fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use serde_json::json;

    fn queue() -> JobQueue {
        JobQueue::new(Arc::new(MemoryStore::new()), 28_800, 604_800)
    }

    async fn create(queue: &JobQueue, job_type: JobType, priority: i32) -> JobRecord {
        let params = match job_type {
            JobType::GetMetadata => json!({}),
            JobType::CaptureFrame => json!({"timestamp": "00:00:01", "quality": 80}),
            JobType::ExtractAudio => json!({"quality": 2}),
            JobType::CutAudio => json!({"start_time": "00:00:00", "end_time": "00:00:01"}),
            JobType::ConcatAudios => json!({"input_files": ["/a.mp3", "/b.mp3"]}),
            JobType::CompressVideo | JobType::ConvertMp4 => json!({"max_threads": 4}),
        };
        queue
            .create(CreateJobRequest {
                job_type,
                upload_id: None,
                input_file: "/tmp/in.mp4".into(),
                original_filename: "in.mp4".into(),
                file_size_mb: 1.0,
                parameters: params,
                priority,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn priority_band_wins_over_fifo() {
        let q = queue();
        let low = create(&q, JobType::CompressVideo, JobType::CompressVideo.default_priority()).await;
        let high = create(&q, JobType::CaptureFrame, JobType::CaptureFrame.default_priority()).await;

        let first = q.pop_next().await.unwrap().unwrap();
        assert_eq!(first, high.id);
        let second = q.pop_next().await.unwrap().unwrap();
        assert_eq!(second, low.id);
    }

    #[tokio::test]
    async fn fifo_within_same_priority_band() {
        let q = queue();
        let first = create(&q, JobType::ExtractAudio, PRIORITY_NORMAL_FOR_TEST).await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = create(&q, JobType::ExtractAudio, PRIORITY_NORMAL_FOR_TEST).await;

        assert_eq!(q.pop_next().await.unwrap().unwrap(), first.id);
        assert_eq!(q.pop_next().await.unwrap().unwrap(), second.id);
    }

    const PRIORITY_NORMAL_FOR_TEST: i32 = crate::models::job::PRIORITY_NORMAL;

    #[tokio::test]
    async fn full_lifecycle_sets_monotonic_timestamps() {
        let q = queue();
        let job = create(&q, JobType::CutAudio, PRIORITY_NORMAL_FOR_TEST).await;

        q.update_status(&job.id, JobStatus::Processing, Some(0), None, None)
            .await
            .unwrap();
        let completed = q
            .update_status(
                &job.id,
                JobStatus::Completed,
                None,
                Some("/tmp/out.mp3".into()),
                None,
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(completed.progress, 100);
        assert!(completed.output_file.is_some());
        assert!(completed.error.is_none());
        assert!(completed.created_at <= completed.started_at.clone().unwrap());
        assert!(completed.started_at.unwrap() <= completed.completed_at.unwrap());
    }

    #[tokio::test]
    async fn illegal_transition_is_rejected() {
        let q = queue();
        let job = create(&q, JobType::CutAudio, PRIORITY_NORMAL_FOR_TEST).await;
        let result = q
            .update_status(&job.id, JobStatus::Completed, None, Some("/tmp/out.mp3".into()), None)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn cancel_only_works_from_pending() {
        let q = queue();
        let job = create(&q, JobType::CutAudio, PRIORITY_NORMAL_FOR_TEST).await;
        q.update_status(&job.id, JobStatus::Processing, Some(0), None, None)
            .await
            .unwrap();

        let outcome = q.cancel(&job.id).await.unwrap();
        assert!(matches!(outcome, CancelOutcome::InProgress));
    }

    #[tokio::test]
    async fn cancel_is_idempotent_on_terminal_jobs() {
        let q = queue();
        let job = create(&q, JobType::CutAudio, PRIORITY_NORMAL_FOR_TEST).await;
        q.cancel(&job.id).await.unwrap();
        let status_after_first_cancel = q.get_status(&job.id).await.unwrap().unwrap().status;

        let second = q.cancel(&job.id).await.unwrap();
        assert!(matches!(second, CancelOutcome::AlreadyTerminal));
        let status_after_second_cancel = q.get_status(&job.id).await.unwrap().unwrap().status;
        assert_eq!(status_after_first_cancel, status_after_second_cancel);
    }

    #[tokio::test]
    async fn stats_reflect_index_cardinality() {
        let q = queue();
        create(&q, JobType::CutAudio, PRIORITY_NORMAL_FOR_TEST).await;
        create(&q, JobType::CutAudio, PRIORITY_NORMAL_FOR_TEST).await;

        let stats = q.stats().await.unwrap();
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.processing, 0);
    }

    #[tokio::test]
    async fn reconcile_requeues_orphaned_pending_job() {
        let q = queue();
        let job = create(&q, JobType::CutAudio, PRIORITY_NORMAL_FOR_TEST).await;
        // Simulate a crash between pop_next and the processing transition:
        // the entry is gone from job_queue but status is still pending.
        q.pop_next().await.unwrap();

        let report = q.reconcile_on_startup().await.unwrap();
        assert_eq!(report.requeued, 1);
        assert_eq!(q.pop_next().await.unwrap().unwrap(), job.id);
    }

    #[tokio::test]
    async fn reconcile_fails_orphaned_processing_job() {
        let q = queue();
        let job = create(&q, JobType::CutAudio, PRIORITY_NORMAL_FOR_TEST).await;
        q.pop_next().await.unwrap();
        q.update_status(&job.id, JobStatus::Processing, Some(0), None, None)
            .await
            .unwrap();

        let report = q.reconcile_on_startup().await.unwrap();
        assert_eq!(report.failed_processing, 1);
        let record = q.get_status(&job.id).await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("worker restart"));
    }
}
