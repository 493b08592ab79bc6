use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::infrastructure::db::pool::DbPool;
use crate::modules::job::repository::JobRow;
use crate::modules::video::model::{Video, VideoWithJobs};

#[async_trait]
pub trait VideoRepository: Send + Sync {
    /// Inserts the video, assigning a fresh id when the caller left it nil.
    async fn insert(&self, video: &Video) -> Result<Video>;

    /// Looks up a video with its jobs preloaded. `Ok(None)` means no such row,
    /// distinct from transport errors.
    async fn find(&self, id: Uuid) -> Result<Option<VideoWithJobs>>;
}

pub struct PgVideoRepository {
    pool: DbPool,
}

impl PgVideoRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VideoRepository for PgVideoRepository {
    async fn insert(&self, video: &Video) -> Result<Video> {
        let mut video = video.clone();
        if video.id.is_nil() {
            video.id = Uuid::new_v4();
        }

        sqlx::query(
            "INSERT INTO videos (id, resource_id, file_path, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(video.id)
        .bind(&video.resource_id)
        .bind(&video.file_path)
        .bind(video.created_at)
        .execute(&self.pool)
        .await?;

        Ok(video)
    }

    async fn find(&self, id: Uuid) -> Result<Option<VideoWithJobs>> {
        let video = sqlx::query_as::<_, Video>(
            "SELECT id, resource_id, file_path, created_at FROM videos WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(video) = video else {
            return Ok(None);
        };

        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT id, video_id, output_bucket_path, status, error, created_at, updated_at
            FROM jobs WHERE video_id = $1 ORDER BY created_at
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let jobs = rows
            .into_iter()
            .map(|row| row.into_job(video.clone()))
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(VideoWithJobs { video, jobs }))
    }
}
