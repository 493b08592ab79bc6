use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::error;

use crate::infrastructure::storage::ObjectStorage;

/// Sentinel the engine emits on `done` when every segment made it to the
/// output bucket. Anything else on `done` is the first upload error.
pub const UPLOAD_COMPLETED: &str = "upload completed";

/// Uploads every file produced under a video's segment directory to the
/// output bucket with bounded concurrency, aborting the report on the first
/// failure. Object keys are the file paths relative to the local storage
/// root, and every object is created world-readable.
pub struct UploadEngine {
    output_bucket: String,
    video_path: PathBuf,
    local_storage_path: PathBuf,
    storage: Arc<dyn ObjectStorage>,
    errors: Mutex<Vec<String>>,
}

impl UploadEngine {
    pub fn new(
        output_bucket: String,
        video_path: PathBuf,
        local_storage_path: PathBuf,
        storage: Arc<dyn ObjectStorage>,
    ) -> Self {
        Self {
            output_bucket,
            video_path,
            local_storage_path,
            storage,
            errors: Mutex::new(Vec::new()),
        }
    }

    /// Paths that failed to upload, for diagnostics.
    pub async fn errors(&self) -> Vec<String> {
        self.errors.lock().await.clone()
    }

    /// Walks the segment directory and drives `concurrency` upload workers
    /// over the collected paths. Exactly one value is sent on `done`: the
    /// first error text, or `"upload completed"` once the count of successes
    /// reaches the number of files.
    ///
    /// On the success path the collector closes the input channel, the
    /// workers drain and emit the completion sentinel, and the first sentinel
    /// is forwarded. On the failure path a shutdown signal stops the producer
    /// and the workers; uploads already issued run to completion but no new
    /// indices are dispatched.
    pub async fn process(
        self: Arc<Self>,
        concurrency: usize,
        done: mpsc::Sender<String>,
    ) -> Result<()> {
        let paths = match self.load_paths() {
            Ok(paths) => Arc::new(paths),
            Err(e) => {
                let _ = done.send(e.to_string()).await;
                return Err(e);
            }
        };

        if paths.is_empty() {
            let _ = done.send(UPLOAD_COMPLETED.to_string()).await;
            return Ok(());
        }

        let concurrency = concurrency.max(1);

        let (input_tx, input_rx) = mpsc::channel::<usize>(paths.len());
        let input_rx = Arc::new(Mutex::new(input_rx));
        let (results_tx, mut results_rx) = mpsc::channel::<String>(paths.len() + concurrency);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        for _ in 0..concurrency {
            tokio::spawn(Self::upload_worker(
                Arc::clone(&self),
                Arc::clone(&paths),
                Arc::clone(&input_rx),
                results_tx.clone(),
                shutdown_rx.clone(),
            ));
        }
        drop(results_tx);

        let producer_tx = input_tx.clone();
        let mut producer_shutdown = shutdown_rx.clone();
        let total = paths.len();
        tokio::spawn(async move {
            for index in 0..total {
                tokio::select! {
                    _ = producer_shutdown.changed() => return,
                    sent = producer_tx.send(index) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                }
            }
        });

        // The collector owns the input sender: the channel stays open until
        // every success has been counted, so workers emit the completion
        // sentinel only after all results are in.
        let mut input_tx = Some(input_tx);
        let mut completed = 0usize;

        while let Some(result) = results_rx.recv().await {
            if result == UPLOAD_COMPLETED {
                let _ = done.send(result).await;
                return Ok(());
            }

            if !result.is_empty() {
                let _ = shutdown_tx.send(true);
                let _ = done.send(result).await;
                return Ok(());
            }

            completed += 1;
            if completed == paths.len() {
                input_tx.take();
            }
        }

        Ok(())
    }

    async fn upload_worker(
        engine: Arc<Self>,
        paths: Arc<Vec<PathBuf>>,
        input: Arc<Mutex<mpsc::Receiver<usize>>>,
        results: mpsc::Sender<String>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            let index = {
                let mut input = input.lock().await;
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => None,
                    index = input.recv() => index,
                }
            };

            let Some(index) = index else { break };

            match engine.upload_object(&paths[index]).await {
                Ok(()) => {
                    if results.send(String::new()).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    let path = paths[index].display().to_string();
                    error!("error during the upload: {}. Error: {}", path, e);
                    engine.errors.lock().await.push(path);
                    if results.send(e.to_string()).await.is_err() {
                        return;
                    }
                }
            }
        }

        let _ = results.send(UPLOAD_COMPLETED.to_string()).await;
    }

    async fn upload_object(&self, path: &Path) -> Result<()> {
        let key = self.object_key(path);
        self.storage
            .upload_public(&self.output_bucket, &key, path)
            .await
    }

    fn object_key(&self, path: &Path) -> String {
        path.strip_prefix(&self.local_storage_path)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned()
    }

    /// Collects every regular file under the video directory, in a stable
    /// order. Directories themselves are skipped.
    fn load_paths(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        let mut pending = vec![self.video_path.clone()];

        while let Some(dir) = pending.pop() {
            let entries = std::fs::read_dir(&dir)
                .with_context(|| format!("failed to read {}", dir.display()))?;

            for entry in entries {
                let entry = entry?;
                if entry.file_type()?.is_dir() {
                    pending.push(entry.path());
                } else {
                    paths.push(entry.path());
                }
            }
        }

        paths.sort();
        Ok(paths)
    }
}
