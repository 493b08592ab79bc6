use std::sync::Arc;

use lapin::message::Delivery;
use tokio::sync::{mpsc, Mutex};
use tracing::info;

use crate::config::settings::AppConfig;
use crate::infrastructure::storage::ObjectStorage;
use crate::modules::job::events::EncodeRequest;
use crate::modules::job::model::{Job, JobStatus};
use crate::modules::job::repository::{JobRepository, PgJobRepository};
use crate::modules::job::service::JobService;
use crate::modules::video::repository::{PgVideoRepository, VideoRepository};
use crate::modules::video::service::VideoService;
use crate::state::AppState;

/// Outcome of one delivery. `job` is present once the job row exists, which
/// lets the manager tell job failures apart from parse/validation failures.
pub struct JobWorkerResult {
    pub job: Option<Job>,
    pub delivery: Delivery,
    pub error: Option<anyhow::Error>,
}

#[derive(Debug)]
pub(crate) struct WorkerFailure {
    pub job: Option<Job>,
    pub error: anyhow::Error,
}

impl WorkerFailure {
    fn bare(error: anyhow::Error) -> Self {
        Self { job: None, error }
    }
}

/// Long-lived worker loop. Each worker owns its repositories and services;
/// deliveries are pulled off the shared channel and every one produces
/// exactly one result for the manager. The worker never acks or rejects.
pub async fn run_worker(
    worker_id: usize,
    state: AppState,
    messages: Arc<Mutex<mpsc::Receiver<Delivery>>>,
    results: mpsc::Sender<JobWorkerResult>,
) {
    info!("🎥 Worker {} started", worker_id);

    let video_repository: Arc<dyn VideoRepository> =
        Arc::new(PgVideoRepository::new(state.db.clone()));
    let job_repository: Arc<dyn JobRepository> = Arc::new(PgJobRepository::new(state.db.clone()));
    let storage: Arc<dyn ObjectStorage> = state.storage.clone();

    loop {
        let delivery = { messages.lock().await.recv().await };
        let Some(delivery) = delivery else { break };

        info!("📦 Worker {} received a delivery", worker_id);

        let result = match process_delivery(
            Arc::clone(&video_repository),
            Arc::clone(&job_repository),
            Arc::clone(&storage),
            &state.config,
            &delivery.data,
        )
        .await
        {
            Ok(job) => JobWorkerResult {
                job: Some(job),
                delivery,
                error: None,
            },
            Err(failure) => JobWorkerResult {
                job: failure.job,
                delivery,
                error: Some(failure.error),
            },
        };

        if results.send(result).await.is_err() {
            break;
        }
    }

    info!("Worker {} stopped", worker_id);
}

/// Runs the per-message lifecycle: parse, validate, materialize Video + Job,
/// drive the job service.
pub(crate) async fn process_delivery(
    video_repository: Arc<dyn VideoRepository>,
    job_repository: Arc<dyn JobRepository>,
    storage: Arc<dyn ObjectStorage>,
    config: &AppConfig,
    body: &[u8],
) -> Result<Job, WorkerFailure> {
    let request = EncodeRequest::parse(body).map_err(WorkerFailure::bare)?;
    request.validate().map_err(WorkerFailure::bare)?;

    let video = request.into_video();
    video.validate().map_err(WorkerFailure::bare)?;

    let mut video_service = VideoService::new(
        video,
        Arc::clone(&storage),
        video_repository,
        config.clone(),
    );
    video_service.insert_video().await.map_err(WorkerFailure::bare)?;

    let job = Job::new(
        config.output_bucket.clone(),
        JobStatus::Starting,
        video_service.video.clone(),
    );
    let job = job_repository
        .insert(&job)
        .await
        .map_err(WorkerFailure::bare)?;

    let mut job_service = JobService::new(job, job_repository, video_service, storage, config.clone());

    match job_service.start().await {
        Ok(()) => Ok(job_service.into_job()),
        Err(error) => Err(WorkerFailure {
            job: Some(job_service.into_job()),
            error,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        test_config, FakeObjectStorage, InMemoryJobRepository, InMemoryVideoRepository,
    };
    use tempfile::TempDir;

    struct Fixture {
        video_repository: Arc<InMemoryVideoRepository>,
        job_repository: Arc<InMemoryJobRepository>,
        storage: Arc<FakeObjectStorage>,
        config: AppConfig,
        _local: TempDir,
    }

    fn fixture() -> Fixture {
        let local = TempDir::new().unwrap();
        let config = test_config(local.path());
        Fixture {
            video_repository: Arc::new(InMemoryVideoRepository::new()),
            job_repository: Arc::new(InMemoryJobRepository::new()),
            storage: Arc::new(FakeObjectStorage::new()),
            config,
            _local: local,
        }
    }

    async fn process(fixture: &Fixture, body: &[u8]) -> Result<Job, WorkerFailure> {
        process_delivery(
            fixture.video_repository.clone(),
            fixture.job_repository.clone(),
            fixture.storage.clone(),
            &fixture.config,
            body,
        )
        .await
    }

    #[tokio::test]
    async fn a_valid_message_runs_to_completion() {
        let fixture = fixture();
        fixture.storage.seed_object("bucket-in", "v.mp4", b"mp4");

        let job = process(&fixture, br#"{"resource_id":"r1","file_path":"v.mp4"}"#)
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.output_bucket_path, "bucket-out");
        assert_eq!(job.video.resource_id, "r1");
        assert_eq!(fixture.video_repository.len(), 1);
        assert_eq!(fixture.job_repository.len(), 1);

        // Round-trip: both aggregates can be found again by id.
        let found_video = fixture
            .video_repository
            .find(job.video.id)
            .await
            .unwrap()
            .expect("video is persisted");
        assert_eq!(found_video.video.file_path, "v.mp4");

        let found_job = fixture
            .job_repository
            .find(job.id)
            .await
            .unwrap()
            .expect("job is persisted");
        assert_eq!(found_job.status, JobStatus::Completed);
        assert_eq!(found_job.video.id, job.video.id);
    }

    #[tokio::test]
    async fn each_message_gets_its_own_video_and_job() {
        let fixture = fixture();
        fixture.storage.seed_object("bucket-in", "v.mp4", b"mp4");

        let body = br#"{"resource_id":"r1","file_path":"v.mp4"}"#;
        let first = process(&fixture, body).await.unwrap();
        let second = process(&fixture, body).await.unwrap();

        assert_ne!(first.id, second.id);
        assert_ne!(first.video.id, second.video.id);
        assert_eq!(fixture.video_repository.len(), 2);
        assert_eq!(fixture.job_repository.len(), 2);
    }

    #[tokio::test]
    async fn concurrent_messages_produce_distinct_jobs() {
        let fixture = Arc::new(fixture());
        fixture.storage.seed_object("bucket-in", "v.mp4", b"mp4");

        let mut handles = Vec::new();
        for _ in 0..10 {
            let fixture = Arc::clone(&fixture);
            handles.push(tokio::spawn(async move {
                process_delivery(
                    fixture.video_repository.clone(),
                    fixture.job_repository.clone(),
                    fixture.storage.clone(),
                    &fixture.config,
                    br#"{"resource_id":"r1","file_path":"v.mp4"}"#,
                )
                .await
            }));
        }

        let mut job_ids = std::collections::HashSet::new();
        let mut video_ids = std::collections::HashSet::new();
        for handle in handles {
            let job = handle.await.unwrap().unwrap();
            assert_eq!(job.status, JobStatus::Completed);
            job_ids.insert(job.id);
            video_ids.insert(job.video.id);
        }

        assert_eq!(job_ids.len(), 10);
        assert_eq!(video_ids.len(), 10);
        assert_eq!(fixture.job_repository.len(), 10);
        assert_eq!(fixture.video_repository.len(), 10);
    }

    #[tokio::test]
    async fn a_malformed_body_fails_before_any_row_exists() {
        let fixture = fixture();

        let failure = process(&fixture, b"not json").await.unwrap_err();

        assert!(failure.job.is_none());
        assert!(failure.error.to_string().contains("not valid JSON"));
        assert_eq!(fixture.video_repository.len(), 0);
        assert_eq!(fixture.job_repository.len(), 0);
    }

    #[tokio::test]
    async fn a_message_missing_file_path_fails_validation() {
        let fixture = fixture();

        let failure = process(&fixture, br#"{"resource_id":"r1"}"#).await.unwrap_err();

        assert!(failure.job.is_none());
        assert!(failure.error.to_string().contains("file_path"));
        assert_eq!(fixture.job_repository.len(), 0);
    }

    #[tokio::test]
    async fn a_download_failure_reports_the_failed_job() {
        let fixture = fixture();
        // No source object in the input bucket.

        let failure = process(&fixture, br#"{"resource_id":"r1","file_path":"missing.mp4"}"#)
            .await
            .unwrap_err();

        let job = failure.job.expect("job row exists by the time download runs");
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("not found"));
    }
}
