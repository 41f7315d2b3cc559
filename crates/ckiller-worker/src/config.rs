//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Work directory for downloads and intermediate renders
    pub work_dir: PathBuf,
    /// Wall-clock limit for one job
    pub job_timeout: Duration,
    /// Interval between uploaded-file state polls during `PROCESSING`
    pub processing_poll_interval: Duration,
    /// Limit for the AI service to finish processing an upload
    pub processing_timeout: Duration,
    /// Limit for a single FFmpeg invocation, in seconds
    pub ffmpeg_timeout_secs: u64,
    /// Optional source domain whitelist; empty allows any public host
    pub allowed_domains: Vec<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("/tmp/ckiller"),
            job_timeout: Duration::from_secs(3600), // 1 hour
            processing_poll_interval: Duration::from_millis(2000),
            processing_timeout: Duration::from_secs(600),
            ffmpeg_timeout_secs: 1800,
            allowed_domains: Vec::new(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/tmp/ckiller")),
            job_timeout: Duration::from_secs(
                std::env::var("WORKER_JOB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
            processing_poll_interval: Duration::from_millis(
                std::env::var("WORKER_PROCESSING_POLL_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2000),
            ),
            processing_timeout: Duration::from_secs(
                std::env::var("WORKER_PROCESSING_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
            ffmpeg_timeout_secs: std::env::var("WORKER_FFMPEG_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1800),
            allowed_domains: std::env::var("ALLOWED_VIDEO_DOMAINS")
                .map(|s| {
                    s.split(',')
                        .map(|d| d.trim().to_lowercase())
                        .filter(|d| !d.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    /// Scratch directory of one job.
    pub fn job_dir(&self, project_id: &str, job: &str) -> PathBuf {
        self.work_dir.join(project_id).join(job)
    }
}
