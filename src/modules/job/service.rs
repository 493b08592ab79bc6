use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use tokio::sync::mpsc;
use tracing::warn;

use crate::config::settings::AppConfig;
use crate::infrastructure::storage::ObjectStorage;
use crate::modules::job::model::{Job, JobStatus};
use crate::modules::job::repository::JobRepository;
use crate::modules::job::upload::{UploadEngine, UPLOAD_COMPLETED};
use crate::modules::video::service::VideoService;

/// Drives one job through the encoding pipeline, persisting every status
/// transition before running the phase it announces. Any phase failure moves
/// the job sideways to `Failed` and surfaces the original error.
pub struct JobService {
    job: Job,
    job_repository: Arc<dyn JobRepository>,
    video_service: VideoService,
    storage: Arc<dyn ObjectStorage>,
    config: AppConfig,
}

impl JobService {
    pub fn new(
        job: Job,
        job_repository: Arc<dyn JobRepository>,
        video_service: VideoService,
        storage: Arc<dyn ObjectStorage>,
        config: AppConfig,
    ) -> Self {
        Self {
            job,
            job_repository,
            video_service,
            storage,
            config,
        }
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn into_job(self) -> Job {
        self.job
    }

    pub async fn start(&mut self) -> Result<()> {
        match self.run_pipeline().await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(e).await),
        }
    }

    async fn run_pipeline(&mut self) -> Result<()> {
        self.change_status(JobStatus::Downloading).await?;
        self.video_service
            .download(&self.config.input_bucket)
            .await?;

        self.change_status(JobStatus::Fragmenting).await?;
        self.video_service.fragment().await?;

        self.change_status(JobStatus::Encoding).await?;
        self.video_service.encode().await?;

        self.perform_upload().await?;

        self.change_status(JobStatus::Finishing).await?;
        self.video_service.finish().await?;

        self.change_status(JobStatus::Completed).await?;

        Ok(())
    }

    /// Persists `Uploading`, launches the upload engine and blocks on its
    /// `done` channel. Anything other than the completion sentinel fails the
    /// job with that value as the message.
    async fn perform_upload(&mut self) -> Result<()> {
        self.change_status(JobStatus::Uploading).await?;

        let local_storage_path = PathBuf::from(&self.config.local_storage_path);
        let engine = Arc::new(UploadEngine::new(
            self.config.output_bucket.clone(),
            local_storage_path.join(self.job.video.id.to_string()),
            local_storage_path,
            Arc::clone(&self.storage),
        ));

        let (done_tx, mut done_rx) = mpsc::channel(1);
        tokio::spawn(engine.process(self.config.concurrency_upload, done_tx));

        let result = done_rx
            .recv()
            .await
            .ok_or_else(|| anyhow!("upload engine finished without reporting a result"))?;

        if result != UPLOAD_COMPLETED {
            bail!("{}", result);
        }

        Ok(())
    }

    async fn change_status(&mut self, next: JobStatus) -> Result<()> {
        if !self.job.status.can_transition_to(next) {
            bail!(
                "illegal status transition {} -> {}",
                self.job.status,
                next
            );
        }

        self.job.status = next;
        self.job = self.job_repository.update(&self.job).await?;
        Ok(())
    }

    /// Marks the job failed with the cause's message and persists it.
    /// Temporaries are removed best-effort even on this path. If persisting
    /// the failure itself fails, the persistence error supersedes the cause.
    async fn fail(&mut self, cause: anyhow::Error) -> anyhow::Error {
        if let Err(e) = self.video_service.finish().await {
            warn!("cleanup after failure did not complete: {}", e);
        }

        self.job.status = JobStatus::Failed;
        self.job.error = Some(cause.to_string());

        match self.job_repository.update(&self.job).await {
            Ok(updated) => {
                self.job = updated;
                cause
            }
            Err(persistence_error) => persistence_error,
        }
    }
}
