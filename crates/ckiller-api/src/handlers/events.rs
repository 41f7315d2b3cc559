//! Server-sent job events.
//!
//! A stream starts with the persisted snapshot, then forwards every newer
//! hub event. While the job sits in a push-phase step the latest snapshot
//! is repeated every heartbeat. The stream ends after a terminal snapshot,
//! or after the first snapshot that leaves the push phase; clients poll
//! from there.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, Sse};
use ckiller_models::{JobEvent, JobKind, ProjectId};
use ckiller_progress::ProgressHub;
use ckiller_storage::ProjectRecordStore;
use futures_util::future;
use futures_util::stream::{self, Stream, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info_span, warn, Instrument};

use super::{load_project, parse_job_kind, parse_project_id};
use crate::error::ApiResult;
use crate::metrics;
use crate::state::AppState;

/// Events buffered between the forwarder task and the HTTP body.
const SSE_BUFFER: usize = 32;

/// GET /api/projects/:project_id/jobs/:kind/events
pub async fn job_events(
    State(state): State<AppState>,
    Path((project_id, kind)): Path<(String, String)>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let project_id = parse_project_id(&project_id)?;
    let kind = parse_job_kind(&kind)?;

    // Subscribe first: a transition persisted after the read below is
    // then guaranteed to arrive on the receiver.
    let rx = state.hub.subscribe(&project_id, kind).await;
    let initial = load_project(&state, &project_id).await?.event(kind);

    let (tx, mut events) = mpsc::channel(SSE_BUFFER);
    let forwarder = Forwarder {
        project_id: project_id.clone(),
        kind,
        store: Arc::clone(&state.store),
        hub: Arc::clone(&state.hub),
        heartbeat: state.config.sse_heartbeat,
        tx,
    };
    let span = info_span!("sse", project_id = %project_id, job = %kind);
    tokio::spawn(forwarder.run(rx, initial).instrument(span));

    let body = stream::poll_fn(move |cx| events.poll_recv(cx))
        .filter_map(|event| future::ready(to_sse_event(&event).map(Ok::<_, Infallible>)));
    Ok(Sse::new(body))
}

/// Whether the stream ends after sending `event`.
fn closes_stream(event: &JobEvent, was_pushing: bool) -> bool {
    event.snapshot.is_terminal() || (was_pushing && !event.snapshot.in_push_phase())
}

fn to_sse_event(event: &JobEvent) -> Option<Event> {
    match Event::default()
        .event("state")
        .id(event.seq.to_string())
        .json_data(event)
    {
        Ok(sse) => Some(sse),
        Err(e) => {
            warn!("Failed to encode job event: {}", e);
            None
        }
    }
}

enum Wake {
    Event(JobEvent),
    Heartbeat,
    /// The hub dropped events or closed the channel; the store is the
    /// source of truth.
    Resync { closed: bool },
    Disconnected,
}

struct Forwarder {
    project_id: ProjectId,
    kind: JobKind,
    store: Arc<dyn ProjectRecordStore>,
    hub: Arc<ProgressHub>,
    heartbeat: Duration,
    tx: mpsc::Sender<JobEvent>,
}

impl Forwarder {
    async fn run(self, rx: broadcast::Receiver<JobEvent>, initial: JobEvent) {
        metrics::record_sse_opened(self.kind.as_str());
        let _closed = scopeguard::guard((), |_| metrics::record_sse_closed());

        self.forward(rx, initial).await;
        self.hub.release(&self.project_id, self.kind).await;
    }

    async fn forward(&self, mut rx: broadcast::Receiver<JobEvent>, initial: JobEvent) {
        let mut last = initial;
        if !self.send(&last).await || closes_stream(&last, false) {
            return;
        }

        let mut ticker = tokio::time::interval(self.heartbeat);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            let wake = tokio::select! {
                received = rx.recv() => match received {
                    Ok(event) => Wake::Event(event),
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("Stream lagged by {} events", skipped);
                        Wake::Resync { closed: false }
                    }
                    Err(RecvError::Closed) => Wake::Resync { closed: true },
                },
                _ = ticker.tick() => Wake::Heartbeat,
                _ = self.tx.closed() => Wake::Disconnected,
            };

            let (next, closed) = match wake {
                Wake::Event(event) => (Some(event), false),
                Wake::Heartbeat => {
                    if last.snapshot.in_push_phase() && !self.send(&last).await {
                        break;
                    }
                    continue;
                }
                Wake::Resync { closed } => (self.reload().await, closed),
                Wake::Disconnected => break,
            };

            if let Some(event) = next.filter(|e| e.seq > last.seq) {
                let was_pushing = last.snapshot.in_push_phase();
                last = event;
                if !self.send(&last).await || closes_stream(&last, was_pushing) {
                    break;
                }
            }
            if closed {
                break;
            }
        }
        debug!(seq = last.seq, "Event stream finished");
    }

    async fn send(&self, event: &JobEvent) -> bool {
        if self.tx.send(event.clone()).await.is_err() {
            return false;
        }
        metrics::record_sse_event(self.kind.as_str());
        true
    }

    async fn reload(&self) -> Option<JobEvent> {
        match self.store.get(&self.project_id).await {
            Ok(Some(record)) => Some(record.event(self.kind)),
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to reload job state: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use ckiller_models::{
        DescriptionStep, JobSnapshot, NewProject, ProjectRecord, StepPlan, StepState,
    };
    use ckiller_storage::MemoryProjectStore;

    use super::*;

    fn forwarder(
        project_id: &ProjectId,
        store: Arc<dyn ProjectRecordStore>,
        hub: Arc<ProgressHub>,
        heartbeat: Duration,
    ) -> (Forwarder, mpsc::Receiver<JobEvent>) {
        let (tx, rx) = mpsc::channel(SSE_BUFFER);
        let forwarder = Forwarder {
            project_id: project_id.clone(),
            kind: JobKind::Description,
            store,
            hub,
            heartbeat,
            tx,
        };
        (forwarder, rx)
    }

    fn new_record() -> ProjectRecord {
        ProjectRecord::new(
            ProjectId::new(),
            NewProject {
                name: "demo".to_string(),
                source_url: "https://example.com/v1".to_string(),
                options: Default::default(),
            },
        )
    }

    fn downloading(project_id: &ProjectId, seq: u64, progress: u8) -> JobEvent {
        let mut event = event_at(&[DescriptionStep::Preparing, DescriptionStep::Downloading]);
        if let JobSnapshot::Description(state) = &mut event.snapshot {
            state.report_progress(progress);
        }
        JobEvent::new(project_id.clone(), seq, event.snapshot)
    }

    fn event_at(steps: &[DescriptionStep]) -> JobEvent {
        let plan = StepPlan::description();
        let mut state = StepState::new();
        for step in steps {
            state.advance(&plan, *step).unwrap();
        }
        JobEvent::new(ProjectId::new(), steps.len() as u64, JobSnapshot::Description(state))
    }

    #[test]
    fn test_stream_closes_when_leaving_push_phase() {
        let idle = event_at(&[]);
        let preparing = event_at(&[DescriptionStep::Preparing]);
        let downloading = event_at(&[DescriptionStep::Preparing, DescriptionStep::Downloading]);
        let uploading = event_at(&[
            DescriptionStep::Preparing,
            DescriptionStep::Downloading,
            DescriptionStep::Uploading,
        ]);

        assert!(!closes_stream(&idle, false));
        assert!(!closes_stream(&preparing, false));
        assert!(!closes_stream(&downloading, false));
        assert!(!closes_stream(&uploading, false));
        assert!(closes_stream(&uploading, true));
        assert!(!closes_stream(&downloading, true));
    }

    #[test]
    fn test_stream_closes_on_terminal() {
        let mut failed = event_at(&[DescriptionStep::Preparing]);
        if let JobSnapshot::Description(state) = &mut failed.snapshot {
            state.fail(DescriptionStep::Preparing, "boom");
        }
        assert!(closes_stream(&failed, false));
    }

    #[test]
    fn test_sse_event_encodes() {
        assert!(to_sse_event(&event_at(&[DescriptionStep::Preparing])).is_some());
    }

    #[tokio::test]
    async fn test_lagged_subscriber_resyncs_from_store() {
        let store: Arc<dyn ProjectRecordStore> = Arc::new(MemoryProjectStore::new());
        let hub = Arc::new(ProgressHub::with_capacity(1));
        let mut record = new_record();
        let id = record.id.clone();
        let initial = record.event(JobKind::Description);

        let rx = hub.subscribe(&id, JobKind::Description).await;
        for seq in 1..=4u64 {
            hub.publish(downloading(&id, seq, (seq * 20) as u8)).await;
        }

        let plan = StepPlan::description();
        for step in plan.steps() {
            record.description_state.advance(&plan, *step).unwrap();
        }
        record
            .description_state
            .advance(&plan, DescriptionStep::Completed)
            .unwrap();
        record.description_seq = 5;
        store.put(&record).await.unwrap();

        let (forwarder, mut events) =
            forwarder(&id, store, Arc::clone(&hub), Duration::from_secs(3600));
        forwarder.run(rx, initial).await;

        let mut seqs = Vec::new();
        while let Some(event) = events.recv().await {
            seqs.push(event.seq);
        }
        assert_eq!(seqs, [0, 5]);
        assert_eq!(hub.channel_count().await, 0);
    }

    #[tokio::test]
    async fn test_heartbeat_repeats_push_phase_snapshot() {
        let store: Arc<dyn ProjectRecordStore> = Arc::new(MemoryProjectStore::new());
        let hub = Arc::new(ProgressHub::new());
        let id = ProjectId::new();
        let rx = hub.subscribe(&id, JobKind::Description).await;

        let (forwarder, mut events) =
            forwarder(&id, store, Arc::clone(&hub), Duration::from_millis(20));
        let task = tokio::spawn(forwarder.run(rx, downloading(&id, 2, 40)));

        for _ in 0..3 {
            let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(event.seq, 2);
            assert_eq!(event.snapshot.progress(), Some(40));
        }

        // A disconnected client ends the forwarder and frees the channel.
        drop(events);
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hub.channel_count().await, 0);
    }

    #[tokio::test]
    async fn test_no_heartbeat_outside_push_phase() {
        let store: Arc<dyn ProjectRecordStore> = Arc::new(MemoryProjectStore::new());
        let hub = Arc::new(ProgressHub::new());
        let id = ProjectId::new();
        let rx = hub.subscribe(&id, JobKind::Description).await;

        let mut preparing = event_at(&[DescriptionStep::Preparing]);
        preparing.project_id = id.clone();
        let (forwarder, mut events) =
            forwarder(&id, store, Arc::clone(&hub), Duration::from_millis(20));
        let task = tokio::spawn(forwarder.run(rx, preparing));

        assert_eq!(events.recv().await.unwrap().seq, 1);
        let quiet = tokio::time::timeout(Duration::from_millis(150), events.recv()).await;
        assert!(quiet.is_err());

        drop(events);
        task.await.unwrap();
    }
}
