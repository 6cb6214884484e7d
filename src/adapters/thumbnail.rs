// Thumbnail generation via FFmpeg frame grab
use crate::error::PipelineError;
use async_trait::async_trait;
use std::process::Command;
use tracing::info;

#[async_trait]
pub trait ThumbnailGenerator: Send + Sync {
    /// Grab a representative frame from the video as encoded JPEG bytes.
    async fn generate(&self, video_url: &str) -> Result<Vec<u8>, PipelineError>;
}

/// FFmpeg-backed thumbnail generator. Requires ffmpeg on PATH; construction
/// fails when it is absent so the pipeline can skip the stage instead.
#[derive(Debug, Clone)]
pub struct FfmpegThumbnailGenerator {
    seek_seconds: f64,
    width: u32,
}

impl FfmpegThumbnailGenerator {
    pub fn new() -> Option<Self> {
        if Command::new("ffmpeg").arg("-version").output().is_err() {
            return None;
        }
        Some(Self {
            seek_seconds: 1.0,
            width: 640,
        })
    }
}

#[async_trait]
impl ThumbnailGenerator for FfmpegThumbnailGenerator {
    async fn generate(&self, video_url: &str) -> Result<Vec<u8>, PipelineError> {
        let url = video_url.to_string();
        let seek = self.seek_seconds;
        let width = self.width;

        // ffmpeg blocks; keep it off the async workers.
        let output = tokio::task::spawn_blocking(move || {
            Command::new("ffmpeg")
                .args([
                    "-ss",
                    &format!("{}", seek),
                    "-i",
                    &url,
                    "-frames:v",
                    "1",
                    "-vf",
                    &format!("scale={}:-1", width),
                    "-f",
                    "mjpeg",
                    "pipe:1",
                ])
                .output()
        })
        .await
        .map_err(|e| PipelineError::service("thumbnail", format!("task join error: {}", e)))?
        .map_err(|e| PipelineError::service("thumbnail", format!("failed to run ffmpeg: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::service(
                "thumbnail",
                format!("ffmpeg error: {}", stderr.trim()),
            ));
        }
        if output.stdout.is_empty() {
            return Err(PipelineError::service(
                "thumbnail",
                "ffmpeg produced no frame data",
            ));
        }

        info!("🖼️ Generated thumbnail ({} bytes)", output.stdout.len());
        Ok(output.stdout)
    }
}
