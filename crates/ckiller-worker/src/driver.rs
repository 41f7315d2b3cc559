//! Generic step driver shared by all generation jobs.
//!
//! A [`StepDriver`] owns the [`StepState`] of one running job. Every change is
//! written into the project record first and published on the progress hub
//! second, so any state a subscriber sees is already durable.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use ckiller_models::{
    DescriptionStep, JobEvent, JobSnapshot, JobStep, ProjectId, ProjectRecord, StepPlan,
    StepState, VideoStep,
};
use ckiller_progress::ProgressHub;
use ckiller_storage::ProjectRecordStore;
use tokio::sync::mpsc;

use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;

/// Step types whose state lives in a [`ProjectRecord`] field.
pub trait RecordStep: JobStep {
    fn state(record: &ProjectRecord) -> &StepState<Self>;

    fn state_mut(record: &mut ProjectRecord) -> &mut StepState<Self>;

    fn snapshot(state: StepState<Self>) -> JobSnapshot;
}

impl RecordStep for DescriptionStep {
    fn state(record: &ProjectRecord) -> &StepState<Self> {
        &record.description_state
    }

    fn state_mut(record: &mut ProjectRecord) -> &mut StepState<Self> {
        &mut record.description_state
    }

    fn snapshot(state: StepState<Self>) -> JobSnapshot {
        JobSnapshot::Description(state)
    }
}

impl RecordStep for VideoStep {
    fn state(record: &ProjectRecord) -> &StepState<Self> {
        &record.video_state
    }

    fn state_mut(record: &mut ProjectRecord) -> &mut StepState<Self> {
        &mut record.video_state
    }

    fn snapshot(state: StepState<Self>) -> JobSnapshot {
        JobSnapshot::Video(state)
    }
}

/// How a job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed { step: &'static str, message: String },
}

pub struct StepDriver<S: RecordStep> {
    project_id: ProjectId,
    plan: StepPlan<S>,
    state: StepState<S>,
    seq: u64,
    store: Arc<dyn ProjectRecordStore>,
    hub: Arc<ProgressHub>,
    logger: JobLogger,
    step_started: Instant,
}

impl<S: RecordStep> StepDriver<S> {
    /// Reset the job to `IDLE` and persist it.
    pub async fn start(
        project_id: ProjectId,
        plan: StepPlan<S>,
        store: Arc<dyn ProjectRecordStore>,
        hub: Arc<ProgressHub>,
    ) -> WorkerResult<Self> {
        let logger = JobLogger::new(&project_id, S::KIND);
        let mut driver = Self {
            project_id,
            plan,
            state: StepState::new(),
            seq: 0,
            store,
            hub,
            logger,
            step_started: Instant::now(),
        };
        driver.persist_with(|_| {}).await?;
        Ok(driver)
    }

    pub fn project_id(&self) -> &ProjectId {
        &self.project_id
    }

    pub fn plan(&self) -> &StepPlan<S> {
        &self.plan
    }

    pub fn state(&self) -> &StepState<S> {
        &self.state
    }

    pub fn logger(&self) -> &JobLogger {
        &self.logger
    }

    pub fn store(&self) -> &Arc<dyn ProjectRecordStore> {
        &self.store
    }

    /// Advance into `step`, persist, then publish.
    pub async fn enter(&mut self, step: S) -> WorkerResult<()> {
        let previous = self.state.current_step();
        self.state.advance(&self.plan, step)?;
        self.record_step_duration(previous);
        self.logger.log_step(step.as_str());
        self.persist_with(|_| {}).await
    }

    /// Advance into `COMPLETED`, storing the job's outputs in the same write.
    pub async fn complete<F>(&mut self, apply: F) -> WorkerResult<()>
    where
        F: FnOnce(&mut ProjectRecord) + Send + 'static,
    {
        let previous = self.state.current_step();
        self.state.advance(&self.plan, S::COMPLETED)?;
        self.record_step_duration(previous);
        self.persist_with(apply).await
    }

    /// Apply a progress report; persists and publishes only on change.
    pub async fn report_progress(&mut self, value: u8) -> WorkerResult<()> {
        if self.state.report_progress(value) {
            self.persist_with(|_| {}).await?;
        }
        Ok(())
    }

    /// Await `action` while relaying its progress reports.
    pub async fn run_with_progress<T, Fut>(
        &mut self,
        action: Fut,
        mut progress: mpsc::Receiver<u8>,
    ) -> WorkerResult<T>
    where
        Fut: Future<Output = WorkerResult<T>>,
    {
        tokio::pin!(action);
        let mut open = true;

        loop {
            tokio::select! {
                biased;
                value = progress.recv(), if open => match value {
                    Some(value) => self.report_progress(value).await?,
                    None => open = false,
                },
                result = &mut action => {
                    while let Ok(value) = progress.try_recv() {
                        self.report_progress(value).await?;
                    }
                    return result;
                }
            }
        }
    }

    /// Fail the job at its current step and persist.
    pub async fn fail(&mut self, message: impl Into<String>) -> WorkerResult<()> {
        let at = self.state.current_step();
        if self.state.fail(at, message) {
            self.record_step_duration(at);
            self.persist_with(|_| {}).await?;
        }
        Ok(())
    }

    /// Fail the job without touching the store.
    ///
    /// Used once persistence itself is broken: live subscribers still learn
    /// that the job stopped, the stored state is repaired by restart recovery.
    pub async fn abandon(&mut self, message: impl Into<String>) {
        let at = self.state.current_step();
        if self.state.fail(at, message) {
            self.publish_unpersisted().await;
        }
    }

    async fn publish_unpersisted(&mut self) {
        self.seq += 1;
        let event = JobEvent::new(
            self.project_id.clone(),
            self.seq,
            S::snapshot(self.state.clone()),
        );
        self.hub.publish(event).await;
    }

    /// Settle the job from the result of its step sequence.
    pub async fn finish(&mut self, result: WorkerResult<()>) -> JobOutcome {
        if let Err(e) = result {
            let message = e.failure_message();
            self.logger.log_error(&message);

            if e.is_persistence_failure() {
                self.abandon(message).await;
            } else if let Err(persist) = self.fail(message).await {
                self.logger
                    .log_error(&format!("Failed to persist job failure: {}", persist));
                self.publish_unpersisted().await;
            }
        }

        let failure = self
            .state
            .error()
            .map(|f| (f.step.as_str(), f.message.clone()));
        match failure {
            Some((step, message)) => JobOutcome::Failed { step, message },
            None if self.state.is_completed() => {
                self.logger.log_completion(&format!(
                    "{} steps",
                    self.state.completed_steps().len()
                ));
                JobOutcome::Completed
            }
            None => {
                // The step sequence returned without reaching a terminal step.
                let step = self.state.current_step().as_str();
                let message = "job ended before completion".to_string();
                self.abandon(message.clone()).await;
                JobOutcome::Failed { step, message }
            }
        }
    }

    async fn persist_with<F>(&mut self, apply: F) -> WorkerResult<()>
    where
        F: FnOnce(&mut ProjectRecord) + Send + 'static,
    {
        let state = self.state.clone();
        let record = self
            .store
            .update(
                &self.project_id,
                Box::new(move |record: &mut ProjectRecord| {
                    *S::state_mut(record) = state;
                    record.bump_seq(S::KIND);
                    apply(record);
                }),
            )
            .await?;

        self.seq = record.seq(S::KIND);
        self.hub.publish(record.event(S::KIND)).await;
        Ok(())
    }

    fn record_step_duration(&mut self, step: S) {
        if step != S::IDLE {
            metrics::histogram!(
                "ckiller_job_step_duration_seconds",
                "job" => S::KIND.as_str(),
                "step" => step.as_str()
            )
            .record(self.step_started.elapsed().as_secs_f64());
        }
        self.step_started = Instant::now();
    }
}
