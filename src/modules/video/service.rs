use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::info;

use crate::config::settings::AppConfig;
use crate::infrastructure::storage::ObjectStorage;
use crate::modules::video::model::Video;
use crate::modules::video::repository::VideoRepository;

/// Runs the per-video encoding phases. Each phase's success is a precondition
/// for the next: download → fragment → encode → (upload, elsewhere) → finish.
pub struct VideoService {
    pub video: Video,
    storage: Arc<dyn ObjectStorage>,
    repository: Arc<dyn VideoRepository>,
    config: AppConfig,
}

impl VideoService {
    pub fn new(
        video: Video,
        storage: Arc<dyn ObjectStorage>,
        repository: Arc<dyn VideoRepository>,
        config: AppConfig,
    ) -> Self {
        Self {
            video,
            storage,
            repository,
            config,
        }
    }

    fn mp4_path(&self) -> PathBuf {
        PathBuf::from(&self.config.local_storage_path).join(format!("{}.mp4", self.video.id))
    }

    fn frag_path(&self) -> PathBuf {
        PathBuf::from(&self.config.local_storage_path).join(format!("{}.frag", self.video.id))
    }

    fn output_dir(&self) -> PathBuf {
        PathBuf::from(&self.config.local_storage_path).join(self.video.id.to_string())
    }

    /// Downloads the source object to `<localStoragePath>/<id>.mp4`,
    /// overwriting any existing file.
    pub async fn download(&self, bucket: &str) -> Result<()> {
        self.storage
            .download_to_file(bucket, &self.video.file_path, &self.mp4_path())
            .await?;

        info!("video {} has been stored", self.video.id);
        Ok(())
    }

    /// Creates the segment output directory and fragments the source mp4.
    pub async fn fragment(&self) -> Result<()> {
        tokio::fs::create_dir(self.output_dir())
            .await
            .with_context(|| format!("failed to create {}", self.output_dir().display()))?;

        self.run_tool(
            &self.config.mp4fragment_path,
            &[
                self.mp4_path().display().to_string(),
                self.frag_path().display().to_string(),
            ],
        )
        .await
    }

    /// Packages the fragmented video into DASH segments and manifests.
    pub async fn encode(&self) -> Result<()> {
        self.run_tool(
            &self.config.mp4dash_path,
            &[
                self.frag_path().display().to_string(),
                "--use-segment-timeline".to_string(),
                "-o".to_string(),
                self.output_dir().display().to_string(),
                "-f".to_string(),
                "--exec-dir".to_string(),
                self.config.bento4_bin_path.clone(),
            ],
        )
        .await
    }

    /// Removes the downloaded mp4, the fragment file and the segment
    /// directory. All three removals are attempted; the first error is
    /// reported. Missing files are fine (cleanup also runs on failure paths,
    /// where earlier phases may not have produced them).
    pub async fn finish(&self) -> Result<()> {
        let mut first_error: Option<anyhow::Error> = None;

        for path in [self.mp4_path(), self.frag_path()] {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                if e.kind() != ErrorKind::NotFound && first_error.is_none() {
                    first_error = Some(anyhow!("failed to remove {}: {}", path.display(), e));
                }
            }
        }

        if let Err(e) = tokio::fs::remove_dir_all(self.output_dir()).await {
            if e.kind() != ErrorKind::NotFound && first_error.is_none() {
                first_error = Some(anyhow!(
                    "failed to remove {}: {}",
                    self.output_dir().display(),
                    e
                ));
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!("files have been removed: {}", self.video.id);
                Ok(())
            }
        }
    }

    pub async fn insert_video(&mut self) -> Result<()> {
        self.video = self.repository.insert(&self.video).await?;
        Ok(())
    }

    /// Runs an external tool under the configured deadline, capturing its
    /// combined output for diagnostics. Non-zero exit and timeout both fail
    /// the phase; on timeout the child is killed.
    async fn run_tool(&self, program: &str, args: &[String]) -> Result<()> {
        let deadline = Duration::from_secs(self.config.tool_timeout_secs);

        let output = timeout(
            deadline,
            Command::new(program)
                .args(args)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| {
            anyhow!(
                "{} timed out after {}s",
                program,
                self.config.tool_timeout_secs
            )
        })?
        .with_context(|| format!("failed to run {}", program))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stdout.trim().is_empty() || !stderr.trim().is_empty() {
            info!("=====> {} output: {}{}", program, stdout, stderr);
        }

        if !output.status.success() {
            bail!(
                "{} exited with {}: {}",
                program,
                output.status,
                stderr.trim()
            );
        }

        Ok(())
    }
}
