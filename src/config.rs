use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    pub uploads_dir: PathBuf,
    pub results_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub valkey_host: String,
    pub valkey_port: u16,
    pub valkey_db: i64,
    pub log_level: String,
    pub upload_unused_ttl_secs: i64,
    pub cleanup_ttl_hours: i64,
    pub cleanup_sweep_interval_secs: u64,
    pub cleanup_initial_delay_secs: u64,
    pub job_completed_ttl_secs: i64,
    pub job_failed_ttl_secs: i64,
    pub max_upload_bytes: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let data_dir = std::env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));

        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            uploads_dir: data_dir.join("uploads"),
            results_dir: data_dir.join("results"),
            scratch_dir: data_dir.join("scratch"),
            data_dir,
            valkey_host: std::env::var("VALKEY_HOST").unwrap_or_else(|_| "valkey".into()),
            valkey_port: std::env::var("VALKEY_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(6379),
            valkey_db: std::env::var("VALKEY_DB")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            upload_unused_ttl_secs: std::env::var("UPLOAD_UNUSED_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10_800),
            cleanup_ttl_hours: std::env::var("CLEANUP_TTL_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
            cleanup_sweep_interval_secs: std::env::var("CLEANUP_SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3_600),
            cleanup_initial_delay_secs: std::env::var("CLEANUP_INITIAL_DELAY_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
            job_completed_ttl_secs: std::env::var("JOB_COMPLETED_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(28_800),
            job_failed_ttl_secs: std::env::var("JOB_FAILED_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(604_800),
            max_upload_bytes: std::env::var("MAX_UPLOAD_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5 * 1024 * 1024 * 1024),
        }
    }

    pub fn valkey_url(&self) -> String {
        format!(
            "redis://{}:{}/{}",
            self.valkey_host, self.valkey_port, self.valkey_db
        )
    }
}
