//! Follows one job to completion over polling and the push channel.
//!
//! The watcher polls until the job reaches a push-phase step, follows the
//! push channel for as long as the state stays there, and falls back to
//! polling when the channel closes. An exhausted retry budget disables push
//! for the rest of the watch.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::watch;
use tracing::{debug, info, info_span, warn, Instrument};

use ckiller_models::{JobEvent, JobKind, ProjectId};

use crate::cache::StateCache;
use crate::config::ClientConfig;
use crate::error::ClientResult;
use crate::push::{CloseReason, PushMachine};
use crate::transport::Transport;

/// How one push session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushOutcome {
    pub reason: CloseReason,
    pub reconnects: u32,
    /// Last connection error, kept only when retries ran out
    pub last_error: Option<String>,
}

pub struct JobWatcher<T: Transport + ?Sized> {
    transport: Arc<T>,
    project_id: ProjectId,
    kind: JobKind,
    config: ClientConfig,
    cache: StateCache,
}

impl<T: Transport + ?Sized> JobWatcher<T> {
    pub fn new(transport: Arc<T>, project_id: ProjectId, kind: JobKind, config: ClientConfig) -> Self {
        Self {
            transport,
            project_id,
            kind,
            config,
            cache: StateCache::new(kind),
        }
    }

    /// Receive every state change the watcher accepts.
    pub fn subscribe(&self) -> watch::Receiver<Option<JobEvent>> {
        self.cache.subscribe()
    }

    pub fn latest(&self) -> Option<JobEvent> {
        self.cache.latest()
    }

    /// Watch the job until it completes or fails, returning its final event.
    pub async fn run(&self) -> ClientResult<JobEvent> {
        let span = info_span!("watch", project_id = %self.project_id, kind = %self.kind);
        self.run_inner().instrument(span).await
    }

    async fn run_inner(&self) -> ClientResult<JobEvent> {
        let mut push_enabled = true;
        let mut poll_failures = 0u32;

        loop {
            if let Some(event) = self.cache.latest() {
                if event.snapshot.is_terminal() {
                    return Ok(event);
                }
            }

            if push_enabled && self.cache.in_push_phase() {
                let outcome = self.follow_push().await;
                if outcome.reason == CloseReason::RetriesExhausted {
                    warn!(
                        reconnects = outcome.reconnects,
                        error = outcome.last_error.as_deref().unwrap_or("none"),
                        "Push channel unavailable, falling back to polling"
                    );
                    push_enabled = false;
                }
                continue;
            }

            match self.transport.status(&self.project_id, self.kind).await {
                Ok(event) => {
                    poll_failures = 0;
                    self.cache.apply(event);
                }
                Err(e) if e.is_client_error() => return Err(e),
                Err(e) => {
                    poll_failures += 1;
                    if poll_failures > self.config.max_poll_failures {
                        return Err(e);
                    }
                    warn!(attempt = poll_failures, "Status poll failed: {}", e);
                }
            }

            let switch_to_push = push_enabled && self.cache.in_push_phase();
            if !self.cache.is_terminal() && !switch_to_push {
                tokio::time::sleep(self.config.poll_interval).await;
            }
        }
    }

    /// Follow the push channel until it closes for good.
    pub async fn follow_push(&self) -> PushOutcome {
        let mut machine = PushMachine::new(self.config.retry_budget, self.config.reconnect.clone());
        let mut last_error = None;

        loop {
            match self.transport.events(&self.project_id, self.kind).await {
                Ok(mut events) => {
                    machine.opened();
                    while let Some(item) = events.next().await {
                        match item {
                            Ok(event) => {
                                machine.received();
                                if self.cache.apply(event) {
                                    debug!(seq = self.cache.last_seq(), "Pushed state applied");
                                }
                            }
                            Err(e) => {
                                last_error = Some(e.to_string());
                                break;
                            }
                        }
                    }
                }
                Err(e) => last_error = Some(e.to_string()),
            }

            match machine.disconnected(self.cache.in_push_phase()) {
                Some(delay) => {
                    info!(
                        attempt = machine.reconnects(),
                        delay_ms = delay.as_millis() as u64,
                        "Push channel dropped, reconnecting"
                    );
                    tokio::time::sleep(delay).await;
                    machine.reconnecting();
                }
                None => break,
            }
        }

        let reason = machine.close_reason().unwrap_or(CloseReason::Expected);
        PushOutcome {
            reason,
            reconnects: machine.reconnects(),
            last_error: match reason {
                CloseReason::RetriesExhausted => last_error,
                CloseReason::Expected => None,
            },
        }
    }
}
