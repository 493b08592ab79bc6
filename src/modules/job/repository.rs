use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::infrastructure::db::pool::DbPool;
use crate::modules::job::model::{Job, JobStatus};
use crate::modules::video::model::Video;

#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn insert(&self, job: &Job) -> Result<Job>;

    async fn update(&self, job: &Job) -> Result<Job>;

    /// Looks up a job with its video preloaded. `Ok(None)` means no such row,
    /// distinct from transport errors.
    async fn find(&self, id: Uuid) -> Result<Option<Job>>;
}

/// Raw `jobs` row; composed with its video into a [`Job`].
#[derive(Debug, FromRow)]
pub struct JobRow {
    pub id: Uuid,
    pub video_id: Uuid,
    pub output_bucket_path: String,
    pub status: String,
    pub error: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl JobRow {
    pub fn into_job(self, video: Video) -> Result<Job> {
        Ok(Job {
            id: self.id,
            output_bucket_path: self.output_bucket_path,
            status: self.status.parse::<JobStatus>()?,
            video,
            error: self.error,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub struct PgJobRepository {
    pool: DbPool,
}

impl PgJobRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn insert(&self, job: &Job) -> Result<Job> {
        sqlx::query(
            r#"
            INSERT INTO jobs (id, video_id, output_bucket_path, status, error, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(job.id)
        .bind(job.video.id)
        .bind(&job.output_bucket_path)
        .bind(job.status.as_str())
        .bind(&job.error)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(job.clone())
    }

    async fn update(&self, job: &Job) -> Result<Job> {
        let now = OffsetDateTime::now_utc();

        let result = sqlx::query(
            "UPDATE jobs SET status = $1, error = $2, updated_at = $3 WHERE id = $4",
        )
        .bind(job.status.as_str())
        .bind(&job.error)
        .bind(now)
        .bind(job.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            bail!("job {} does not exist", job.id);
        }

        let mut updated = job.clone();
        updated.updated_at = now;
        Ok(updated)
    }

    async fn find(&self, id: Uuid) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT id, video_id, output_bucket_path, status, error, created_at, updated_at
            FROM jobs WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let video = sqlx::query_as::<_, Video>(
            "SELECT id, resource_id, file_path, created_at FROM videos WHERE id = $1",
        )
        .bind(row.video_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| anyhow!("job {} references missing video {}", id, row.video_id))?;

        Ok(Some(row.into_job(video)?))
    }
}
