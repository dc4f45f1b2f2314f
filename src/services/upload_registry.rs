//! Upload registry: tracks every on-disk input file, its metadata, and a
//! reference count (§4.1).

use std::sync::Arc;

use uuid::Uuid;

use crate::models::UploadRecord;
use crate::store::KvStore;

const UPLOADS_INDEX: &str = "uploads";

#[derive(Clone)]
pub struct UploadRegistry {
    store: Arc<dyn KvStore>,
}

impl UploadRegistry {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Registers a freshly-written upload file. Idempotent only when
    /// `upload_id` is a fresh UUID the caller generated themselves; passing
    /// an id that already exists is undefined per the spec.
    pub async fn create(
        &self,
        filename: String,
        file_path: String,
        file_size_mb: f64,
        upload_id: Option<String>,
        unused_ttl_secs: i64,
    ) -> anyhow::Result<UploadRecord> {
        let upload_id = upload_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let record = UploadRecord::new(upload_id.clone(), filename, file_path, file_size_mb);

        let body = serde_json::to_string(&record)?;
        self.store.set(&UploadRecord::key(&upload_id), &body).await?;
        self.store
            .expire(&UploadRecord::key(&upload_id), unused_ttl_secs)
            .await?;
        self.store
            .zadd(UPLOADS_INDEX, &upload_id, now_timestamp())
            .await?;

        tracing::info!(
            upload_id = %upload_id,
            file_size_mb = record.file_size_mb,
            "upload registered"
        );
        Ok(record)
    }

    pub async fn get(&self, upload_id: &str) -> anyhow::Result<Option<UploadRecord>> {
        let Some(raw) = self.store.get(&UploadRecord::key(upload_id)).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    /// Increases `ref_count` by one and clears the unused-TTL. Called exactly
    /// once per job creation that cites this upload.
    pub async fn increment_ref(&self, upload_id: &str) -> anyhow::Result<()> {
        let Some(mut record) = self.get(upload_id).await? else {
            tracing::warn!(upload_id = %upload_id, "increment_ref on missing upload");
            return Ok(());
        };
        record.ref_count += 1;
        self.store
            .set(&UploadRecord::key(upload_id), &serde_json::to_string(&record)?)
            .await?;
        self.store.persist(&UploadRecord::key(upload_id)).await?;
        tracing::info!(upload_id = %upload_id, ref_count = record.ref_count, "ref incremented");
        Ok(())
    }

    /// Decreases `ref_count` by one. If `auto_delete` and the new count is
    /// `<= 0`, deletes the file and record immediately; otherwise the TTL
    /// sweep (§4.4) is the reclamation path.
    pub async fn decrement_ref(&self, upload_id: &str, auto_delete: bool) -> anyhow::Result<()> {
        let Some(mut record) = self.get(upload_id).await? else {
            tracing::warn!(upload_id = %upload_id, "decrement_ref on missing upload");
            return Ok(());
        };
        record.ref_count -= 1;
        tracing::info!(upload_id = %upload_id, ref_count = record.ref_count, "ref decremented");

        if auto_delete && record.ref_count <= 0 {
            self.delete_record(upload_id, &record).await?;
        } else {
            self.store
                .set(&UploadRecord::key(upload_id), &serde_json::to_string(&record)?)
                .await?;
        }
        Ok(())
    }

    pub async fn list(&self, limit: isize) -> anyhow::Result<Vec<UploadRecord>> {
        let ids = self.store.zrevrange(UPLOADS_INDEX, 0, limit - 1).await?;
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.get(&id).await? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Manual delete; refuses unless `ref_count == 0`.
    pub async fn delete_manual(&self, upload_id: &str) -> anyhow::Result<DeleteOutcome> {
        let Some(record) = self.get(upload_id).await? else {
            return Ok(DeleteOutcome::NotFound);
        };
        if record.ref_count > 0 {
            return Ok(DeleteOutcome::InUse);
        }
        self.delete_record(upload_id, &record).await?;
        Ok(DeleteOutcome::Deleted)
    }

    async fn delete_record(&self, upload_id: &str, record: &UploadRecord) -> anyhow::Result<()> {
        if let Err(e) = std::fs::remove_file(&record.file_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::error!(upload_id = %upload_id, error = %e, "failed to remove upload file");
            }
        }
        self.store.delete(&UploadRecord::key(upload_id)).await?;
        self.store.zrem(UPLOADS_INDEX, upload_id).await?;
        tracing::info!(upload_id = %upload_id, "upload deleted");
        Ok(())
    }
}

pub enum DeleteOutcome {
    Deleted,
    InUse,
    NotFound,
}

fn now_timestamp() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    fn registry() -> UploadRegistry {
        UploadRegistry::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let reg = registry();
        let created = reg
            .create("clip.mp4".into(), "/tmp/clip.mp4".into(), 3.456, None, 10_800)
            .await
            .unwrap();
        assert_eq!(created.file_size_mb, 3.46);
        assert_eq!(created.ref_count, 0);

        let fetched = reg.get(&created.upload_id).await.unwrap().unwrap();
        assert_eq!(fetched.upload_id, created.upload_id);
    }

    #[tokio::test]
    async fn ref_count_never_goes_negative_in_practice_and_round_trips() {
        let reg = registry();
        let created = reg
            .create("a.mp3".into(), "/tmp/a.mp3".into(), 1.0, None, 10_800)
            .await
            .unwrap();

        reg.increment_ref(&created.upload_id).await.unwrap();
        reg.increment_ref(&created.upload_id).await.unwrap();
        let mid = reg.get(&created.upload_id).await.unwrap().unwrap();
        assert_eq!(mid.ref_count, 2);

        reg.decrement_ref(&created.upload_id, false).await.unwrap();
        reg.decrement_ref(&created.upload_id, false).await.unwrap();
        let end = reg.get(&created.upload_id).await.unwrap().unwrap();
        assert_eq!(end.ref_count, 0);
    }

    #[tokio::test]
    async fn delete_manual_refuses_while_in_use() {
        let reg = registry();
        let created = reg
            .create("a.mp3".into(), "/tmp/a.mp3".into(), 1.0, None, 10_800)
            .await
            .unwrap();
        reg.increment_ref(&created.upload_id).await.unwrap();

        let outcome = reg.delete_manual(&created.upload_id).await.unwrap();
        assert!(matches!(outcome, DeleteOutcome::InUse));
    }

    #[tokio::test]
    async fn auto_delete_removes_record_at_zero() {
        let reg = registry();
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let path = tmp.path().to_string_lossy().to_string();
        let created = reg
            .create("a.mp3".into(), path, 1.0, None, 10_800)
            .await
            .unwrap();
        reg.increment_ref(&created.upload_id).await.unwrap();
        reg.decrement_ref(&created.upload_id, true).await.unwrap();

        assert!(reg.get(&created.upload_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_returns_newest_first() {
        let reg = registry();
        let a = reg
            .create("a.mp3".into(), "/tmp/a.mp3".into(), 1.0, None, 10_800)
            .await
            .unwrap();
        // Force distinct zset scores even when created in the same second.
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let b = reg
            .create("b.mp3".into(), "/tmp/b.mp3".into(), 1.0, None, 10_800)
            .await
            .unwrap();

        let listed = reg.list(50).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].upload_id, b.upload_id);
        assert_eq!(listed[1].upload_id, a.upload_id);
    }
}
