use anyhow::{bail, Result};
use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::modules::job::model::Job;

/// A source video registered from an inbound encode request. Created once per
/// message and read-only afterwards; one video owns many jobs.
#[derive(Debug, Serialize, FromRow, Clone)]
pub struct Video {
    pub id: Uuid,
    pub resource_id: String,
    pub file_path: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Video {
    pub fn new(resource_id: String, file_path: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            resource_id,
            file_path,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.is_nil() {
            bail!("video id must not be empty");
        }
        if self.resource_id.is_empty() {
            bail!("resource_id must not be empty");
        }
        if self.file_path.is_empty() {
            bail!("file_path must not be empty");
        }
        Ok(())
    }
}

/// `find` result carrying the video's jobs, mirroring the jobs preload.
#[derive(Debug, Clone)]
pub struct VideoWithJobs {
    pub video: Video,
    pub jobs: Vec<Job>,
}
