//! Job runner: starts jobs as tokio tasks and tracks which are active.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use ckiller_models::{
    DescriptionStep, JobEvent, JobKind, ProjectId, ProjectRecord, StepPlan, VideoStep,
};
use ckiller_progress::ProgressHub;
use ckiller_storage::ProjectRecordStore;
use scopeguard::ScopeGuard;
use tracing::{info, warn, Instrument};

use crate::actions::{AudioAction, CommentaryAction, DescriptionAction, VideoAction};
use crate::config::WorkerConfig;
use crate::driver::{JobOutcome, StepDriver};
use crate::error::{WorkerError, WorkerResult};
use crate::jobs::{run_description_steps, run_video_steps, DescriptionJob, JobDeadline, VideoJob};
use crate::security::validate_source_url;

/// Failure message for jobs found running when the process starts.
pub const INTERRUPTED_MESSAGE: &str = "interrupted by server restart";

type JobKey = (ProjectId, JobKind);

/// Registry of running jobs, one per project and kind.
#[derive(Debug, Default)]
pub struct ActiveJobs {
    jobs: Mutex<HashSet<JobKey>>,
}

/// Registry slot held by a job task. Dropping it frees the slot, however
/// the task ends.
pub struct JobSlot {
    _guard: ScopeGuard<JobKey, Box<dyn FnOnce(JobKey) + Send>>,
}

impl ActiveJobs {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<JobKey>> {
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim the slot of a job. Returns `None` while the job is running.
    pub fn try_acquire(self: &Arc<Self>, project_id: &ProjectId, kind: JobKind) -> Option<JobSlot> {
        let key = (project_id.clone(), kind);
        let active = {
            let mut jobs = self.lock();
            if !jobs.insert(key.clone()) {
                return None;
            }
            jobs.len()
        };
        metrics::gauge!("ckiller_active_jobs").set(active as f64);

        let registry = Arc::clone(self);
        let release: Box<dyn FnOnce(JobKey) + Send> = Box::new(move |key| {
            let active = {
                let mut jobs = registry.lock();
                jobs.remove(&key);
                jobs.len()
            };
            metrics::gauge!("ckiller_active_jobs").set(active as f64);
        });
        Some(JobSlot {
            _guard: scopeguard::guard(key, release),
        })
    }

    pub fn is_active(&self, project_id: &ProjectId, kind: JobKind) -> bool {
        self.lock().contains(&(project_id.clone(), kind))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Collaborators invoked by the jobs.
#[derive(Clone)]
pub struct JobActions {
    pub description: Arc<dyn DescriptionAction>,
    pub commentary: Arc<dyn CommentaryAction>,
    pub audio: Arc<dyn AudioAction>,
    pub video: Arc<dyn VideoAction>,
}

/// Entry point for starting jobs and querying their registry.
#[derive(Clone)]
pub struct JobRunner {
    config: WorkerConfig,
    store: Arc<dyn ProjectRecordStore>,
    hub: Arc<ProgressHub>,
    actions: JobActions,
    active: Arc<ActiveJobs>,
}

impl JobRunner {
    pub fn new(
        config: WorkerConfig,
        store: Arc<dyn ProjectRecordStore>,
        hub: Arc<ProgressHub>,
        actions: JobActions,
    ) -> Self {
        Self {
            config,
            store,
            hub,
            actions,
            active: Arc::new(ActiveJobs::new()),
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn active_jobs(&self) -> &Arc<ActiveJobs> {
        &self.active
    }

    pub fn is_active(&self, project_id: &ProjectId, kind: JobKind) -> bool {
        self.active.is_active(project_id, kind)
    }

    async fn load(&self, project_id: &ProjectId) -> WorkerResult<ProjectRecord> {
        self.store
            .get(project_id)
            .await?
            .ok_or_else(|| WorkerError::ProjectNotFound(project_id.to_string()))
    }

    fn acquire(&self, project_id: &ProjectId, kind: JobKind) -> WorkerResult<JobSlot> {
        self.active
            .try_acquire(project_id, kind)
            .ok_or_else(|| WorkerError::AlreadyRunning(kind.to_string()))
    }

    /// Validate inputs, reset the description state to `IDLE` and run the
    /// job in the background. Returns the persisted initial event.
    pub async fn start_description(&self, project_id: &ProjectId) -> WorkerResult<JobEvent> {
        let record = self.load(project_id).await?;
        let source_url = validate_source_url(&record.metadata.source_url, &self.config.allowed_domains)
            .map_err(WorkerError::InvalidUrl)?;
        record.options.description.validate()?;

        let slot = self.acquire(project_id, JobKind::Description)?;
        let mut driver = StepDriver::<DescriptionStep>::start(
            project_id.clone(),
            StepPlan::description(),
            Arc::clone(&self.store),
            Arc::clone(&self.hub),
        )
        .await?;
        let initial = self.current_event(project_id, JobKind::Description).await?;

        let job = DescriptionJob {
            project_id: project_id.clone(),
            source_url,
            options: record.options.description,
        };
        let action = Arc::clone(&self.actions.description);
        let job_timeout = self.config.job_timeout;
        let span = driver.logger().create_span();
        driver.logger().log_start(&job.source_url);

        tokio::spawn(
            async move {
                let _slot = slot;
                let deadline = JobDeadline::after(job_timeout);
                let result =
                    run_description_steps(&mut driver, action.as_ref(), &job, deadline).await;
                record_outcome(JobKind::Description, &driver.finish(result).await);
            }
            .instrument(span),
        );

        Ok(initial)
    }

    /// Validate inputs, reset the video state to `IDLE` and run the job in
    /// the background. Returns the persisted initial event.
    pub async fn start_video(&self, project_id: &ProjectId) -> WorkerResult<JobEvent> {
        let record = self.load(project_id).await?;
        if record.commentary.is_empty() {
            return Err(WorkerError::precondition(
                "commentary is empty; generate commentary before the video",
            ));
        }
        let source_url = validate_source_url(&record.metadata.source_url, &self.config.allowed_domains)
            .map_err(WorkerError::InvalidUrl)?;
        record.options.video.validate()?;

        let slot = self.acquire(project_id, JobKind::Video)?;
        let options = record.options.video;
        let mut driver = StepDriver::<VideoStep>::start(
            project_id.clone(),
            StepPlan::video(options.subtitles_enabled),
            Arc::clone(&self.store),
            Arc::clone(&self.hub),
        )
        .await?;
        let initial = self.current_event(project_id, JobKind::Video).await?;

        let job = VideoJob {
            project_id: project_id.clone(),
            source_url,
            options,
            workspace: self.config.job_dir(project_id.as_str(), JobKind::Video.as_str()),
        };
        let audio = Arc::clone(&self.actions.audio);
        let video = Arc::clone(&self.actions.video);
        let job_timeout = self.config.job_timeout;
        let span = driver.logger().create_span();
        driver.logger().log_start(&format!("{} commentary segments", record.commentary.len()));

        tokio::spawn(
            async move {
                let _slot = slot;
                let deadline = JobDeadline::after(job_timeout);
                let result =
                    run_video_steps(&mut driver, audio.as_ref(), video.as_ref(), &job, deadline)
                        .await;
                record_outcome(JobKind::Video, &driver.finish(result).await);
            }
            .instrument(span),
        );

        Ok(initial)
    }

    /// Generate commentary from the stored description and save it.
    pub async fn generate_commentary(&self, project_id: &ProjectId) -> WorkerResult<ProjectRecord> {
        let record = self.load(project_id).await?;
        if record.description.is_empty() {
            return Err(WorkerError::precondition(
                "description is empty; run the description job first",
            ));
        }
        let options = record.options.commentary;
        options.validate()?;

        let commentary = self
            .actions
            .commentary
            .generate(&record.description, &options)
            .await?;
        info!(
            project_id = %project_id,
            "Generated {} commentary segments",
            commentary.len()
        );

        Ok(self
            .store
            .update(
                project_id,
                Box::new(move |record: &mut ProjectRecord| record.commentary = commentary),
            )
            .await?)
    }

    async fn current_event(&self, project_id: &ProjectId, kind: JobKind) -> WorkerResult<JobEvent> {
        Ok(self.load(project_id).await?.event(kind))
    }

    /// Fail every persisted job that is neither idle nor finished.
    ///
    /// Must run before any job is started by this process: a running state
    /// found at that point belongs to a task that no longer exists.
    pub async fn recover_interrupted_jobs(&self) -> WorkerResult<usize> {
        let mut recovered = 0;

        for record in self.store.list_all().await? {
            if !record.is_running(JobKind::Description) && !record.is_running(JobKind::Video) {
                continue;
            }

            let mut changed = Vec::new();
            let updated = self
                .store
                .update(
                    &record.id,
                    Box::new(|record: &mut ProjectRecord| changed = record.fail_unfinished(INTERRUPTED_MESSAGE)),
                )
                .await?;

            for kind in changed {
                warn!(project_id = %record.id, job = %kind, "Failed interrupted job");
                self.hub.publish(updated.event(kind)).await;
                recovered += 1;
            }
        }

        if recovered > 0 {
            info!("Recovered {} interrupted jobs", recovered);
        }
        Ok(recovered)
    }
}

fn record_outcome(kind: JobKind, outcome: &JobOutcome) {
    match outcome {
        JobOutcome::Completed => {
            metrics::counter!("ckiller_jobs_completed_total", "job" => kind.as_str()).increment(1);
        }
        JobOutcome::Failed { step, .. } => {
            metrics::counter!(
                "ckiller_jobs_failed_total",
                "job" => kind.as_str(),
                "step" => *step
            )
            .increment(1);
        }
    }
}
