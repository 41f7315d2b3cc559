//! Step sequences of the generation jobs.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{WorkerError, WorkerResult};

mod description;
mod video;

pub use description::{run_description_steps, DescriptionJob};
pub use video::{run_video_steps, VideoJob};

/// Progress reports buffered between an action and its driver.
pub(crate) const PROGRESS_BUFFER: usize = 128;

/// Time limit of one job, measured from its start.
///
/// Steps run inside [`JobDeadline::run`]; cleanup runs outside it, so an
/// expired job still releases its workspace and uploads.
#[derive(Debug, Clone, Copy)]
pub struct JobDeadline {
    at: Instant,
    limit: Duration,
}

impl JobDeadline {
    pub fn after(limit: Duration) -> Self {
        Self {
            at: Instant::now() + limit,
            limit,
        }
    }

    pub async fn run<F, T>(&self, steps: F) -> WorkerResult<T>
    where
        F: Future<Output = WorkerResult<T>>,
    {
        match tokio::time::timeout_at(self.at, steps).await {
            Ok(result) => result,
            Err(_) => Err(WorkerError::Timeout(self.limit.as_secs())),
        }
    }
}
