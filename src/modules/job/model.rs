use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::modules::video::model::Video;

/// Encoding pipeline phases. Persisted as the uppercase strings; transitions
/// only move forward along the pipeline, or sideways to `Failed` from any
/// non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Starting,
    Downloading,
    Fragmenting,
    Encoding,
    Uploading,
    Finishing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Starting => "STARTING",
            JobStatus::Downloading => "DOWNLOADING",
            JobStatus::Fragmenting => "FRAGMENTING",
            JobStatus::Encoding => "ENCODING",
            JobStatus::Uploading => "UPLOADING",
            JobStatus::Finishing => "FINISHING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// The next phase in the pipeline, if any.
    pub fn successor(&self) -> Option<JobStatus> {
        match self {
            JobStatus::Starting => Some(JobStatus::Downloading),
            JobStatus::Downloading => Some(JobStatus::Fragmenting),
            JobStatus::Fragmenting => Some(JobStatus::Encoding),
            JobStatus::Encoding => Some(JobStatus::Uploading),
            JobStatus::Uploading => Some(JobStatus::Finishing),
            JobStatus::Finishing => Some(JobStatus::Completed),
            JobStatus::Completed | JobStatus::Failed => None,
        }
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == JobStatus::Failed {
            return true;
        }
        self.successor() == Some(next)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "STARTING" => JobStatus::Starting,
            "DOWNLOADING" => JobStatus::Downloading,
            "FRAGMENTING" => JobStatus::Fragmenting,
            "ENCODING" => JobStatus::Encoding,
            "UPLOADING" => JobStatus::Uploading,
            "FINISHING" => JobStatus::Finishing,
            "COMPLETED" => JobStatus::Completed,
            "FAILED" => JobStatus::Failed,
            other => bail!("unknown job status: {}", other),
        })
    }
}

/// One unit of end-to-end encoding work on a single source video.
#[derive(Debug, Serialize, Clone)]
pub struct Job {
    #[serde(rename = "job_id")]
    pub id: Uuid,
    pub output_bucket_path: String,
    pub status: JobStatus,
    pub video: Video,
    pub error: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Job {
    pub fn new(output_bucket_path: String, status: JobStatus, video: Video) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            output_bucket_path,
            status,
            video,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}
