//! TTL sweep for `uploads/` and `results/` (§4.4). Runs on a fixed interval
//! after an initial delay, and can also be triggered synchronously (with
//! `ttl_hours == 0`) from the `/reset` endpoint for a full force-sweep.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::state::AppState;

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct SweepStats {
    pub files_deleted: u64,
    pub space_freed_mb: f64,
    pub errors: u64,
}

pub fn start_cleanup_loop(state: Arc<AppState>, cancel: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(std::time::Duration::from_secs(state.config.cleanup_initial_delay_secs)) => {}
        }

        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(state.config.cleanup_sweep_interval_secs));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let uploads_stats = sweep_directory(&state.config.uploads_dir, state.config.cleanup_ttl_hours, "uploads");
                    let results_stats = sweep_directory(&state.config.results_dir, state.config.cleanup_ttl_hours, "results");
                    tracing::info!(
                        uploads_deleted = uploads_stats.files_deleted,
                        uploads_freed_mb = uploads_stats.space_freed_mb,
                        results_deleted = results_stats.files_deleted,
                        results_freed_mb = results_stats.space_freed_mb,
                        "cleanup sweep complete"
                    );
                }
            }
        }
        tracing::info!("cleanup loop stopped");
    });
}

/// Force-sweeps both directories synchronously with `ttl_hours == 0`,
/// i.e. deletes everything regardless of age. Used by `/reset`.
pub fn force_sweep(config: &crate::config::AppConfig) -> (SweepStats, SweepStats) {
    let uploads_stats = sweep_directory(&config.uploads_dir, 0, "uploads");
    let results_stats = sweep_directory(&config.results_dir, 0, "results");
    (uploads_stats, results_stats)
}

/// Non-recursive mtime sweep: deletes regular files in `dir` older than
/// `ttl_hours`. Missing directories are not an error.
fn sweep_directory(dir: &std::path::Path, ttl_hours: i64, label: &str) -> SweepStats {
    let mut stats = SweepStats::default();

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(dir = %dir.display(), "cleanup directory does not exist");
            return stats;
        }
        Err(e) => {
            tracing::error!(dir = %dir.display(), error = %e, "failed to list cleanup directory");
            stats.errors += 1;
            return stats;
        }
    };

    let cutoff = std::time::SystemTime::now() - std::time::Duration::from_secs(ttl_hours.max(0) as u64 * 3600);

    for entry in entries.flatten() {
        let path = entry.path();
        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "failed to stat file during sweep");
                stats.errors += 1;
                continue;
            }
        };
        if !metadata.is_file() {
            continue;
        }

        let mtime = metadata.modified().unwrap_or(std::time::SystemTime::now());
        if mtime >= cutoff {
            continue;
        }

        let size = metadata.len();
        match std::fs::remove_file(&path) {
            Ok(()) => {
                stats.files_deleted += 1;
                stats.space_freed_mb += size as f64 / (1024.0 * 1024.0);
                tracing::info!(label, path = %path.display(), size_mb = size as f64 / (1024.0 * 1024.0), "swept stale file");
            }
            Err(e) => {
                stats.errors += 1;
                tracing::error!(label, path = %path.display(), error = %e, "failed to remove stale file");
            }
        }
    }

    stats.space_freed_mb = (stats.space_freed_mb * 100.0).round() / 100.0;
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweep_deletes_only_files_older_than_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let old_path = dir.path().join("old.bin");
        let fresh_path = dir.path().join("fresh.bin");
        std::fs::write(&old_path, b"0123456789").unwrap();
        std::fs::write(&fresh_path, b"0123456789").unwrap();

        let old_time = std::time::SystemTime::now() - std::time::Duration::from_secs(4 * 3600);
        std::fs::File::open(&old_path)
            .unwrap()
            .set_modified(old_time)
            .unwrap();

        let stats = sweep_directory(dir.path(), 3, "test");
        assert_eq!(stats.files_deleted, 1);
        assert!(!old_path.exists());
        assert!(fresh_path.exists());
    }

    #[test]
    fn sweep_missing_directory_is_not_an_error() {
        let stats = sweep_directory(std::path::Path::new("/nonexistent/does-not-exist"), 3, "test");
        assert_eq!(stats.files_deleted, 0);
        assert_eq!(stats.errors, 0);
    }

    #[test]
    fn force_sweep_with_zero_ttl_removes_everything() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.bin"), b"x").unwrap();
        let stats = sweep_directory(dir.path(), 0, "test");
        assert_eq!(stats.files_deleted, 1);
    }
}
