use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::media_engine::MediaEngine;
use crate::services::{job_queue::JobQueue, upload_registry::UploadRegistry};
use crate::store::KvStore;

/// Shared application state. No module-level caches or hidden singletons:
/// every component that needs the store, config, or media engine gets an
/// explicit handle here, constructed once in `main`.
pub struct AppState {
    pub config: AppConfig,
    pub uploads: UploadRegistry,
    pub queue: JobQueue,
    pub engine: Arc<dyn MediaEngine>,
    /// Last time the worker loop completed an iteration; used by `/health`.
    pub worker_heartbeat: Arc<tokio::sync::RwLock<chrono::DateTime<chrono::Utc>>>,
}

impl AppState {
    pub fn new(store: Arc<dyn KvStore>, config: AppConfig, engine: Arc<dyn MediaEngine>) -> Self {
        Self {
            uploads: UploadRegistry::new(store.clone()),
            queue: JobQueue::new(
                store,
                config.job_completed_ttl_secs,
                config.job_failed_ttl_secs,
            ),
            config,
            engine,
            worker_heartbeat: Arc::new(tokio::sync::RwLock::new(chrono::Utc::now())),
        }
    }
}
