use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRecord {
    pub upload_id: String,
    pub filename: String,
    pub file_path: String,
    pub file_size_mb: f64,
    pub uploaded_at: String,
    pub ref_count: i64,
    pub status: String,
}

impl UploadRecord {
    pub fn new(upload_id: String, filename: String, file_path: String, file_size_mb: f64) -> Self {
        Self {
            upload_id,
            filename,
            file_path,
            file_size_mb: round2(file_size_mb),
            uploaded_at: chrono::Utc::now().to_rfc3339(),
            ref_count: 0,
            status: "ready".to_string(),
        }
    }

    pub fn key(upload_id: &str) -> String {
        format!("upload:{upload_id}")
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
