//! The `ffmpeg`/`ffprobe` transformation surface (§6.1). Every call shells
//! out to an external binary and is synchronous; the worker dispatches
//! through `spawn_blocking` so it never stalls the tokio reactor.

use async_trait::async_trait;
use std::process::{Command, Output};

#[async_trait]
pub trait MediaEngine: Send + Sync {
    async fn get_video_metadata(&self, input_path: &str) -> anyhow::Result<serde_json::Value>;

    async fn extract_audio_from_video(
        &self,
        input_path: &str,
        output_path: &str,
        quality: i32,
    ) -> anyhow::Result<()>;

    async fn compress_video(
        &self,
        input_path: &str,
        output_path: &str,
        crf: i32,
        fps: i32,
        audio_bitrate: &str,
        max_threads: u32,
    ) -> anyhow::Result<()>;

    async fn cut_audio(
        &self,
        input_path: &str,
        output_path: &str,
        start_time: &str,
        end_time: &str,
    ) -> anyhow::Result<()>;

    async fn concat_audios(&self, input_paths: &[String], output_path: &str) -> anyhow::Result<()>;

    async fn capture_frame(
        &self,
        input_path: &str,
        output_path: &str,
        timestamp: &str,
        quality: i32,
    ) -> anyhow::Result<()>;

    async fn convert_to_mp4(
        &self,
        input_path: &str,
        output_path: &str,
        max_threads: u32,
        force_reencode: bool,
    ) -> anyhow::Result<()>;
}

/// Default engine: shells out to the real `ffmpeg`/`ffprobe` binaries on
/// `PATH`.
pub struct FfmpegEngine;

impl FfmpegEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FfmpegEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn check(label: &str, output: Output) -> anyhow::Result<()> {
    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("{label} failed (status {}): {stderr}", output.status)
    }
}

fn effective_threads(max_threads: u32) -> u32 {
    if max_threads == 0 {
        std::thread::available_parallelism()
            .map(|n| n.get() as u32)
            .unwrap_or(4)
    } else {
        max_threads
    }
}

#[async_trait]
impl MediaEngine for FfmpegEngine {
    async fn get_video_metadata(&self, input_path: &str) -> anyhow::Result<serde_json::Value> {
        let input_path = input_path.to_string();
        tokio::task::spawn_blocking(move || {
            tracing::info!(input = %input_path, "probing metadata");
            let output = Command::new("ffprobe")
                .args([
                    "-v",
                    "quiet",
                    "-print_format",
                    "json",
                    "-show_format",
                    "-show_streams",
                    &input_path,
                ])
                .output()?;
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                anyhow::bail!("ffprobe failed (status {}): {stderr}", output.status);
            }
            Ok(serde_json::from_slice(&output.stdout)?)
        })
        .await?
    }

    async fn extract_audio_from_video(
        &self,
        input_path: &str,
        output_path: &str,
        quality: i32,
    ) -> anyhow::Result<()> {
        let (input_path, output_path) = (input_path.to_string(), output_path.to_string());
        tokio::task::spawn_blocking(move || {
            tracing::info!(input = %input_path, output = %output_path, quality, "extracting audio");
            let output = Command::new("ffmpeg")
                .args([
                    "-i",
                    &input_path,
                    "-vn",
                    "-acodec",
                    "libmp3lame",
                    "-q:a",
                    &quality.to_string(),
                    "-y",
                    &output_path,
                ])
                .output()?;
            check("ffmpeg extract_audio", output)
        })
        .await?
    }

    async fn compress_video(
        &self,
        input_path: &str,
        output_path: &str,
        crf: i32,
        fps: i32,
        audio_bitrate: &str,
        max_threads: u32,
    ) -> anyhow::Result<()> {
        let input_path = input_path.to_string();
        let output_path = output_path.to_string();
        let audio_bitrate = audio_bitrate.to_string();
        let threads = effective_threads(max_threads);
        tokio::task::spawn_blocking(move || {
            tracing::info!(input = %input_path, output = %output_path, crf, fps, threads, "compressing video");
            let output = Command::new("ffmpeg")
                .args([
                    "-i",
                    &input_path,
                    "-vcodec",
                    "libx264",
                    "-crf",
                    &crf.to_string(),
                    "-r",
                    &fps.to_string(),
                    "-preset",
                    "veryfast",
                    "-threads",
                    &threads.to_string(),
                    "-acodec",
                    "aac",
                    "-b:a",
                    &audio_bitrate,
                    "-y",
                    &output_path,
                ])
                .output()?;
            check("ffmpeg compress_video", output)
        })
        .await?
    }

    async fn cut_audio(
        &self,
        input_path: &str,
        output_path: &str,
        start_time: &str,
        end_time: &str,
    ) -> anyhow::Result<()> {
        let input_path = input_path.to_string();
        let output_path = output_path.to_string();
        let start_time = start_time.to_string();
        let end_time = end_time.to_string();
        tokio::task::spawn_blocking(move || {
            tracing::info!(input = %input_path, output = %output_path, %start_time, %end_time, "cutting audio");
            let output = Command::new("ffmpeg")
                .args([
                    "-i",
                    &input_path,
                    "-ss",
                    &start_time,
                    "-to",
                    &end_time,
                    "-c",
                    "copy",
                    "-y",
                    &output_path,
                ])
                .output()?;
            check("ffmpeg cut_audio", output)
        })
        .await?
    }

    async fn concat_audios(&self, input_paths: &[String], output_path: &str) -> anyhow::Result<()> {
        let input_paths = input_paths.to_vec();
        let output_path = output_path.to_string();
        tokio::task::spawn_blocking(move || {
            let list_file_path = format!("{output_path}.list.txt");
            tracing::info!(count = input_paths.len(), output = %output_path, "concatenating audio");

            let contents: String = input_paths
                .iter()
                .map(|p| format!("file '{p}'\n"))
                .collect();
            std::fs::write(&list_file_path, contents)?;

            let result = (|| -> anyhow::Result<()> {
                let output = Command::new("ffmpeg")
                    .args([
                        "-f",
                        "concat",
                        "-safe",
                        "0",
                        "-i",
                        &list_file_path,
                        "-c",
                        "copy",
                        "-y",
                        &output_path,
                    ])
                    .output()?;
                check("ffmpeg concat_audios", output)
            })();

            if std::path::Path::new(&list_file_path).exists() {
                let _ = std::fs::remove_file(&list_file_path);
            }
            result
        })
        .await?
    }

    async fn capture_frame(
        &self,
        input_path: &str,
        output_path: &str,
        timestamp: &str,
        quality: i32,
    ) -> anyhow::Result<()> {
        let input_path = input_path.to_string();
        let output_path = output_path.to_string();
        let timestamp = timestamp.to_string();
        tokio::task::spawn_blocking(move || {
            tracing::info!(input = %input_path, output = %output_path, %timestamp, quality, "capturing frame");
            let output = Command::new("ffmpeg")
                .args([
                    "-ss",
                    &timestamp,
                    "-i",
                    &input_path,
                    "-frames:v",
                    "1",
                    "-c:v",
                    "libwebp",
                    "-quality",
                    &quality.to_string(),
                    "-compression_level",
                    "6",
                    "-y",
                    &output_path,
                ])
                .output()?;
            check("ffmpeg capture_frame", output)
        })
        .await?
    }

    /// MKV/WEBM go straight to stream-copy (dropping subtitles, which
    /// otherwise fail the mux). Everything else tries stream-copy first and
    /// falls back to a full re-encode if that exits non-zero, removing the
    /// partial output before retrying.
    async fn convert_to_mp4(
        &self,
        input_path: &str,
        output_path: &str,
        max_threads: u32,
        force_reencode: bool,
    ) -> anyhow::Result<()> {
        let input_path = input_path.to_string();
        let output_path = output_path.to_string();
        let threads = effective_threads(max_threads);
        tokio::task::spawn_blocking(move || {
            let extension = std::path::Path::new(&input_path)
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_lowercase())
                .unwrap_or_default();
            tracing::info!(input = %input_path, output = %output_path, extension = %extension, "converting to mp4");

            if (extension == "mkv" || extension == "webm") && !force_reencode {
                let output = Command::new("ffmpeg")
                    .args([
                        "-i",
                        &input_path,
                        "-c",
                        "copy",
                        "-sn",
                        "-movflags",
                        "+faststart",
                        "-y",
                        &output_path,
                    ])
                    .output()?;
                return check("ffmpeg convert_to_mp4 stream copy", output);
            }

            if !force_reencode {
                let output = Command::new("ffmpeg")
                    .args([
                        "-i",
                        &input_path,
                        "-c",
                        "copy",
                        "-movflags",
                        "+faststart",
                        "-y",
                        &output_path,
                    ])
                    .output()?;
                if output.status.success() {
                    return Ok(());
                }
                tracing::warn!(status = %output.status, "stream copy failed, falling back to re-encode");
                if std::path::Path::new(&output_path).exists() {
                    let _ = std::fs::remove_file(&output_path);
                }
            }

            tracing::warn!(threads, "re-encoding (may take several minutes)");
            let output = Command::new("ffmpeg")
                .args([
                    "-i",
                    &input_path,
                    "-c:v",
                    "libx264",
                    "-preset",
                    "veryfast",
                    "-crf",
                    "23",
                    "-c:a",
                    "aac",
                    "-b:a",
                    "192k",
                    "-threads",
                    &threads.to_string(),
                    "-movflags",
                    "+faststart",
                    "-y",
                    &output_path,
                ])
                .output()?;
            check("ffmpeg convert_to_mp4 reencode", output)
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_threads_passes_through_explicit_value() {
        assert_eq!(effective_threads(4), 4);
    }

    #[test]
    fn effective_threads_auto_detects_on_zero() {
        assert!(effective_threads(0) >= 1);
    }
}
