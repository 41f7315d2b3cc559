//! Local copy of one job's state, fed by polls and pushed events.

use ckiller_models::{JobEvent, JobKind, JobSnapshot};
use tokio::sync::watch;

/// Latest known event of one job, exposed through a watch channel.
///
/// Events with a sequence number at or below the cached one are dropped,
/// so duplicates from overlapping poll and push delivery are harmless.
#[derive(Debug)]
pub struct StateCache {
    kind: JobKind,
    tx: watch::Sender<Option<JobEvent>>,
}

impl StateCache {
    pub fn new(kind: JobKind) -> Self {
        let (tx, _) = watch::channel(None);
        Self { kind, tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<JobEvent>> {
        self.tx.subscribe()
    }

    /// Apply an event. Returns whether the cached state changed.
    pub fn apply(&self, event: JobEvent) -> bool {
        if event.kind() != self.kind {
            return false;
        }
        self.tx.send_if_modified(|current| {
            let snapshot = match current.as_ref() {
                Some(cached) if event.seq <= cached.seq => return false,
                Some(cached) => keep_progress(&cached.snapshot, event.snapshot),
                None => event.snapshot,
            };
            *current = Some(JobEvent { snapshot, ..event });
            true
        })
    }

    pub fn latest(&self) -> Option<JobEvent> {
        self.tx.borrow().clone()
    }

    pub fn last_seq(&self) -> u64 {
        self.tx.borrow().as_ref().map_or(0, |e| e.seq)
    }

    pub fn in_push_phase(&self) -> bool {
        self.tx
            .borrow()
            .as_ref()
            .is_some_and(|e| e.snapshot.in_push_phase())
    }

    pub fn is_terminal(&self) -> bool {
        self.tx
            .borrow()
            .as_ref()
            .is_some_and(|e| e.snapshot.is_terminal())
    }
}

/// Carry the cached progress over when `next` reports the same step with
/// a lower value.
fn keep_progress(previous: &JobSnapshot, mut next: JobSnapshot) -> JobSnapshot {
    if previous.current_step() != next.current_step() {
        return next;
    }
    if let Some(value) = previous.progress() {
        match &mut next {
            JobSnapshot::Description(state) => {
                state.report_progress(value);
            }
            JobSnapshot::Video(state) => {
                state.report_progress(value);
            }
        }
    }
    next
}

#[cfg(test)]
mod tests {
    use ckiller_models::{DescriptionStep, ProjectId, StepPlan, StepState};

    use super::*;

    fn downloading(seq: u64, progress: Option<u8>) -> JobEvent {
        let plan = StepPlan::description();
        let mut state = StepState::new();
        state.advance(&plan, DescriptionStep::Preparing).unwrap();
        state.advance(&plan, DescriptionStep::Downloading).unwrap();
        if let Some(value) = progress {
            state.report_progress(value);
        }
        JobEvent::new(ProjectId::from("p"), seq, JobSnapshot::Description(state))
    }

    #[test]
    fn test_stale_and_duplicate_events_are_ignored() {
        let cache = StateCache::new(JobKind::Description);
        assert!(cache.apply(downloading(5, Some(40))));
        assert!(!cache.apply(downloading(5, Some(90))));
        assert!(!cache.apply(downloading(3, Some(10))));
        assert_eq!(cache.last_seq(), 5);
        assert_eq!(cache.latest().unwrap().snapshot.progress(), Some(40));
    }

    #[test]
    fn test_progress_never_regresses_within_a_step() {
        let cache = StateCache::new(JobKind::Description);
        cache.apply(downloading(5, Some(60)));
        assert!(cache.apply(downloading(6, Some(20))));
        let latest = cache.latest().unwrap();
        assert_eq!(latest.seq, 6);
        assert_eq!(latest.snapshot.progress(), Some(60));
        assert!(cache.in_push_phase());
    }

    #[test]
    fn test_other_job_kind_is_rejected() {
        let cache = StateCache::new(JobKind::Video);
        assert!(!cache.apply(downloading(1, None)));
        assert!(cache.latest().is_none());
    }

    #[tokio::test]
    async fn test_watchers_see_updates() {
        let cache = StateCache::new(JobKind::Description);
        let mut rx = cache.subscribe();
        cache.apply(downloading(1, None));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().as_ref().unwrap().seq, 1);
    }
}
