//! Seam between the job watcher and the network.

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use ckiller_models::{JobEvent, JobKind, ProjectId};

use crate::error::ClientResult;

/// Stream of pushed job events. Ends when the server closes the channel.
pub type EventStream = BoxStream<'static, ClientResult<JobEvent>>;

/// Pull and push access to one job's state.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch the current state once.
    async fn status(&self, project_id: &ProjectId, kind: JobKind) -> ClientResult<JobEvent>;

    /// Open the push channel.
    async fn events(&self, project_id: &ProjectId, kind: JobKind) -> ClientResult<EventStream>;
}
