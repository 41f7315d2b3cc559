//! Description job: download the source, upload it and describe it.

use std::path::Path;

use ckiller_models::{DescriptionOptions, DescriptionStep, ProjectId};
use tokio::sync::mpsc;

use super::{JobDeadline, PROGRESS_BUFFER};
use crate::actions::{DescriptionAction, UploadedVideo};
use crate::driver::StepDriver;
use crate::error::{WorkerError, WorkerResult};

/// Inputs of one description job.
#[derive(Debug, Clone)]
pub struct DescriptionJob {
    pub project_id: ProjectId,
    pub source_url: String,
    pub options: DescriptionOptions,
}

/// Run every description step; the driver settles the outcome.
pub async fn run_description_steps(
    driver: &mut StepDriver<DescriptionStep>,
    action: &dyn DescriptionAction,
    job: &DescriptionJob,
    deadline: JobDeadline,
) -> WorkerResult<()> {
    let workspace = deadline
        .run(async {
            driver.enter(DescriptionStep::Preparing).await?;
            action.prepare(&job.project_id, &job.source_url).await
        })
        .await?;

    let mut upload = None;
    let result = deadline
        .run(describe(driver, action, job, &workspace, &mut upload))
        .await;
    action.cleanup(&workspace, upload.as_ref()).await;
    result
}

async fn describe(
    driver: &mut StepDriver<DescriptionStep>,
    action: &dyn DescriptionAction,
    job: &DescriptionJob,
    workspace: &Path,
    upload: &mut Option<UploadedVideo>,
) -> WorkerResult<()> {
    driver.enter(DescriptionStep::Downloading).await?;
    let (tx, rx) = mpsc::channel(PROGRESS_BUFFER);
    let video = driver
        .run_with_progress(action.download(&job.source_url, workspace, tx), rx)
        .await?;

    driver.enter(DescriptionStep::Uploading).await?;
    let uploaded = upload.insert(action.upload(&video).await?).clone();

    driver.enter(DescriptionStep::Processing).await?;
    let active = action.process(&uploaded).await?;

    driver.enter(DescriptionStep::Generating).await?;
    let description = action.generate(&active, &job.options).await?;
    if description.is_empty() {
        return Err(WorkerError::action_failed("no description segments were generated"));
    }

    driver.logger().log_completion(&format!("{} description segments", description.len()));
    driver
        .complete(move |record| record.description = description)
        .await
}
