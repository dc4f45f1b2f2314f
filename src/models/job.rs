use serde::{Deserialize, Serialize};

pub const PRIORITY_HIGH: i32 = 10;
pub const PRIORITY_NORMAL: i32 = 50;
pub const PRIORITY_LOW: i32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    GetMetadata,
    CaptureFrame,
    ExtractAudio,
    CutAudio,
    ConcatAudios,
    CompressVideo,
    ConvertMp4,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::GetMetadata => "get_metadata",
            JobType::CaptureFrame => "capture_frame",
            JobType::ExtractAudio => "extract_audio",
            JobType::CutAudio => "cut_audio",
            JobType::ConcatAudios => "concat_audios",
            JobType::CompressVideo => "compress_video",
            JobType::ConvertMp4 => "convert_mp4",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        Some(match s {
            "get_metadata" => JobType::GetMetadata,
            "capture_frame" => JobType::CaptureFrame,
            "extract_audio" => JobType::ExtractAudio,
            "cut_audio" => JobType::CutAudio,
            "concat_audios" => JobType::ConcatAudios,
            "compress_video" => JobType::CompressVideo,
            "convert_mp4" => JobType::ConvertMp4,
            _ => return None,
        })
    }

    /// Output file extension, without the leading dot.
    pub fn output_extension(&self) -> &'static str {
        match self {
            JobType::GetMetadata => "json",
            JobType::CaptureFrame => "webp",
            JobType::ExtractAudio | JobType::CutAudio | JobType::ConcatAudios => "mp3",
            JobType::CompressVideo | JobType::ConvertMp4 => "mp4",
        }
    }

    pub fn default_priority(&self) -> i32 {
        match self {
            JobType::GetMetadata | JobType::CaptureFrame => PRIORITY_HIGH,
            JobType::ExtractAudio | JobType::CutAudio | JobType::ConcatAudios => PRIORITY_NORMAL,
            JobType::CompressVideo | JobType::ConvertMp4 => PRIORITY_LOW,
        }
    }

    /// Validates that `parameters` carries the fields this operation requires.
    pub fn validate_parameters(&self, parameters: &serde_json::Value) -> anyhow::Result<()> {
        let obj = parameters
            .as_object()
            .ok_or_else(|| anyhow::anyhow!("parameters must be a JSON object"))?;
        let require = |field: &str| -> anyhow::Result<()> {
            if obj.contains_key(field) {
                Ok(())
            } else {
                anyhow::bail!("missing required parameter '{field}' for job type '{}'", self.as_str())
            }
        };
        match self {
            JobType::GetMetadata => {}
            JobType::CaptureFrame => {
                require("timestamp")?;
                require("quality")?;
            }
            JobType::ExtractAudio => require("quality")?,
            JobType::CutAudio => {
                require("start_time")?;
                require("end_time")?;
            }
            JobType::ConcatAudios => {
                require("input_files")?;
                if !obj["input_files"].is_array() {
                    anyhow::bail!("'input_files' must be an array of paths");
                }
            }
            JobType::CompressVideo | JobType::ConvertMp4 => require("max_threads")?,
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMetadata {
    pub original_filename: String,
    pub file_size_mb: f64,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub status: JobStatus,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub priority: i32,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub progress: i32,
    pub input_file: String,
    pub upload_id: Option<String>,
    pub output_file: Option<String>,
    pub result_url: Option<String>,
    pub error: Option<String>,
    pub metadata: JobMetadata,
    /// Populated only by `list_pending`; absent from the stored record.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub queue_position: Option<u64>,
}

impl JobRecord {
    pub fn key(job_id: &str) -> String {
        format!("job:{job_id}")
    }
}
