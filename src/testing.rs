//! In-memory doubles for the repository and storage contracts, shared by the
//! unit tests across modules.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::config::settings::AppConfig;
use crate::infrastructure::storage::ObjectStorage;
use crate::modules::job::model::{Job, JobStatus};
use crate::modules::job::repository::JobRepository;
use crate::modules::video::model::{Video, VideoWithJobs};
use crate::modules::video::repository::VideoRepository;

#[derive(Default)]
pub struct InMemoryVideoRepository {
    videos: Mutex<HashMap<Uuid, Video>>,
}

impl InMemoryVideoRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.videos.lock().unwrap().len()
    }
}

#[async_trait]
impl VideoRepository for InMemoryVideoRepository {
    async fn insert(&self, video: &Video) -> Result<Video> {
        let mut video = video.clone();
        if video.id.is_nil() {
            video.id = Uuid::new_v4();
        }
        self.videos
            .lock()
            .unwrap()
            .insert(video.id, video.clone());
        Ok(video)
    }

    async fn find(&self, id: Uuid) -> Result<Option<VideoWithJobs>> {
        Ok(self
            .videos
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .map(|video| VideoWithJobs {
                video,
                jobs: Vec::new(),
            }))
    }
}

#[derive(Default)]
pub struct InMemoryJobRepository {
    jobs: Mutex<HashMap<Uuid, Job>>,
    status_log: Mutex<Vec<JobStatus>>,
    fail_on_status: Mutex<Option<JobStatus>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every status passed through `update`, in order.
    pub fn status_log(&self) -> Vec<JobStatus> {
        self.status_log.lock().unwrap().clone()
    }

    pub fn get(&self, id: Uuid) -> Option<Job> {
        self.jobs.lock().unwrap().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    /// Makes `update` fail when asked to persist the given status.
    pub fn fail_on_status(&self, status: JobStatus) {
        *self.fail_on_status.lock().unwrap() = Some(status);
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn insert(&self, job: &Job) -> Result<Job> {
        self.jobs.lock().unwrap().insert(job.id, job.clone());
        Ok(job.clone())
    }

    async fn update(&self, job: &Job) -> Result<Job> {
        if *self.fail_on_status.lock().unwrap() == Some(job.status) {
            bail!("simulated persistence failure");
        }
        if !self.jobs.lock().unwrap().contains_key(&job.id) {
            bail!("job {} does not exist", job.id);
        }

        let mut updated = job.clone();
        updated.updated_at = OffsetDateTime::now_utc();
        self.status_log.lock().unwrap().push(updated.status);
        self.jobs.lock().unwrap().insert(updated.id, updated.clone());
        Ok(updated)
    }

    async fn find(&self, id: Uuid) -> Result<Option<Job>> {
        Ok(self.jobs.lock().unwrap().get(&id).cloned())
    }
}

/// Object store backed by a map, instrumented so tests can observe upload
/// attempts and the peak number of concurrent writes.
#[derive(Default)]
pub struct FakeObjectStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    fail_keys: Mutex<HashSet<String>>,
    upload_delay_ms: u64,
    uploads: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_upload_delay_ms(mut self, delay_ms: u64) -> Self {
        self.upload_delay_ms = delay_ms;
        self
    }

    pub fn seed_object(&self, bucket: &str, key: &str, bytes: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(format!("{bucket}/{key}"), bytes.to_vec());
    }

    pub fn fail_on_key(&self, key: &str) {
        self.fail_keys.lock().unwrap().insert(key.to_string());
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.objects
            .lock()
            .unwrap()
            .contains_key(&format!("{bucket}/{key}"))
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStorage for FakeObjectStorage {
    async fn download_to_file(&self, bucket: &str, key: &str, dest: &Path) -> Result<()> {
        let bytes = self
            .objects
            .lock()
            .unwrap()
            .get(&format!("{bucket}/{key}"))
            .cloned();

        match bytes {
            Some(bytes) => {
                tokio::fs::write(dest, bytes).await?;
                Ok(())
            }
            None => bail!("object '{}' not found in bucket '{}'", key, bucket),
        }
    }

    async fn upload_public(&self, bucket: &str, key: &str, src: &Path) -> Result<()> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if self.upload_delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.upload_delay_ms)).await;
        }

        let should_fail = self.fail_keys.lock().unwrap().contains(key);
        let result = if should_fail {
            Err(anyhow!("simulated upload failure for {}", key))
        } else {
            match tokio::fs::read(src).await {
                Ok(bytes) => {
                    self.objects
                        .lock()
                        .unwrap()
                        .insert(format!("{bucket}/{key}"), bytes);
                    Ok(())
                }
                Err(e) => Err(e.into()),
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Config pointing the pipeline at a scratch directory, with the external
/// tools replaced by `true` so phases succeed without Bento4.
pub fn test_config(local_storage_path: &Path) -> AppConfig {
    AppConfig {
        concurrency_workers: 2,
        concurrency_upload: 2,
        input_bucket: "bucket-in".to_string(),
        output_bucket: "bucket-out".to_string(),
        local_storage_path: local_storage_path.display().to_string(),
        rabbitmq_url: String::new(),
        consumer_queue: "videos".to_string(),
        consumer_name: "encoder-test".to_string(),
        dead_letter_exchange: "dlx".to_string(),
        notification_exchange: "videos.notification".to_string(),
        notification_routing_key: "jobs".to_string(),
        dsn: String::new(),
        dsn_test: String::new(),
        auto_migrate_db: false,
        debug: false,
        env: "test".to_string(),
        s3_endpoint: String::new(),
        s3_access_key: String::new(),
        s3_secret_key: String::new(),
        mp4fragment_path: "true".to_string(),
        mp4dash_path: "true".to_string(),
        bento4_bin_path: "/opt/bento4/bin/".to_string(),
        tool_timeout_secs: 30,
    }
}
