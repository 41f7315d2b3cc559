//! Per-job broadcast channels.

use std::collections::HashMap;

use ckiller_models::{JobEvent, JobKind, ProjectId};
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

/// Events buffered per job before slow subscribers start lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

type ChannelKey = (ProjectId, JobKind);

/// Fan-out of [`JobEvent`]s to live subscribers.
///
/// Delivery is best-effort: events published while nobody listens are
/// dropped, and subscribers recover missed state from the project store.
/// Sequence numbers are assigned by the store update that produced the
/// event, never by the hub.
pub struct ProgressHub {
    channels: RwLock<HashMap<ChannelKey, broadcast::Sender<JobEvent>>>,
    capacity: usize,
}

impl ProgressHub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Subscribe to future events of one job.
    pub async fn subscribe(&self, project_id: &ProjectId, kind: JobKind) -> broadcast::Receiver<JobEvent> {
        let key = (project_id.clone(), kind);
        let mut channels = self.channels.write().await;
        channels
            .entry(key)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Deliver an event to current subscribers. Returns how many received it.
    ///
    /// A terminal event closes the channel after delivery: subscribers read it
    /// and then observe the stream end.
    pub async fn publish(&self, event: JobEvent) -> usize {
        let key = (event.project_id.clone(), event.kind());
        let terminal = event.snapshot.is_terminal();
        let seq = event.seq;

        let mut channels = self.channels.write().await;
        let Some(sender) = channels.get(&key) else {
            return 0;
        };

        let delivered = sender.send(event).unwrap_or(0);
        if terminal || sender.receiver_count() == 0 {
            channels.remove(&key);
        }

        debug!(
            project_id = %key.0,
            job = %key.1,
            seq,
            delivered,
            "Published job event"
        );
        delivered
    }

    /// Remove the channel of one job if nobody listens to it anymore.
    ///
    /// Subscribers call this after dropping their receiver; `publish` only
    /// prunes the channels it sends on.
    pub async fn release(&self, project_id: &ProjectId, kind: JobKind) {
        let key = (project_id.clone(), kind);
        let mut channels = self.channels.write().await;
        if channels.get(&key).is_some_and(|s| s.receiver_count() == 0) {
            channels.remove(&key);
        }
    }

    /// Drop every channel of a project, ending its open subscriptions.
    pub async fn close_project(&self, project_id: &ProjectId) {
        let mut channels = self.channels.write().await;
        channels.retain(|(id, _), _| id != project_id);
    }

    /// Live subscribers of one job.
    pub async fn subscriber_count(&self, project_id: &ProjectId, kind: JobKind) -> usize {
        let channels = self.channels.read().await;
        channels
            .get(&(project_id.clone(), kind))
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }

    /// Number of open job channels.
    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new()
    }
}
