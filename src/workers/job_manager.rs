use std::sync::Arc;

use anyhow::{anyhow, Result};
use lapin::message::Delivery;
use lapin::options::{BasicAckOptions, BasicRejectOptions};
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info};

use crate::modules::job::events::JobNotificationError;
use crate::state::AppState;
use crate::workers::job_worker::{run_worker, JobWorkerResult};

/// Owns the worker pool and resolves every delivery: each worker result is
/// turned into a notification publish plus exactly one ack or reject.
pub struct JobManager {
    state: AppState,
    message_rx: Arc<Mutex<mpsc::Receiver<Delivery>>>,
}

impl JobManager {
    pub fn new(state: AppState, message_rx: mpsc::Receiver<Delivery>) -> Self {
        Self {
            state,
            message_rx: Arc::new(Mutex::new(message_rx)),
        }
    }

    /// Runs until the result channel closes, which happens only when every
    /// worker has exited (at shutdown, once the delivery channel closes).
    pub async fn start(self) -> Result<()> {
        let concurrency = self.state.config.concurrency_workers;
        let (results_tx, mut results_rx) = mpsc::channel::<JobWorkerResult>(concurrency.max(1));

        info!("Starting {} workers", concurrency);
        for worker_id in 0..concurrency {
            tokio::spawn(run_worker(
                worker_id,
                self.state.clone(),
                Arc::clone(&self.message_rx),
                results_tx.clone(),
            ));
        }
        drop(results_tx);

        while let Some(result) = results_rx.recv().await {
            let outcome = match &result.error {
                None => self.notify_success(&result).await,
                Some(_) => self.notify_error(&result).await,
            };

            if let Err(e) = outcome {
                error!(
                    "Failed to resolve delivery {}: {}",
                    result.delivery.delivery_tag, e
                );
                if let Err(e) = result
                    .delivery
                    .reject(BasicRejectOptions { requeue: false })
                    .await
                {
                    error!(
                        "Failed to reject delivery {}: {}",
                        result.delivery.delivery_tag, e
                    );
                }
            }
        }

        info!("Job manager stopped");
        Ok(())
    }

    async fn notify_success(&self, result: &JobWorkerResult) -> Result<()> {
        let job = result
            .job
            .as_ref()
            .ok_or_else(|| anyhow!("successful result without a job"))?;

        let payload = serde_json::to_vec(job)?;
        self.notify(&payload).await?;

        result.delivery.ack(BasicAckOptions::default()).await?;
        Ok(())
    }

    async fn notify_error(&self, result: &JobWorkerResult) -> Result<()> {
        let error_text = result
            .error
            .as_ref()
            .map(|e| e.to_string())
            .unwrap_or_default();

        match &result.job {
            Some(job) => error!(
                "MessageID: {}. Error during the job {} with video {}. Error: {}",
                result.delivery.delivery_tag, job.id, job.video.id, error_text
            ),
            None => error!(
                "MessageID: {}. Error parsing message: {}",
                result.delivery.delivery_tag, error_text
            ),
        }

        let notification = JobNotificationError {
            message: String::from_utf8_lossy(&result.delivery.data).into_owned(),
            error: error_text,
        };

        match serde_json::to_vec(&notification) {
            Ok(payload) => self.notify(&payload).await?,
            // Never publish invalid JSON; the reject below still resolves
            // the delivery.
            Err(e) => error!("Failed to serialize error notification: {}", e),
        }

        result
            .delivery
            .reject(BasicRejectOptions { requeue: false })
            .await?;
        Ok(())
    }

    async fn notify(&self, payload: &[u8]) -> Result<()> {
        self.state
            .queue
            .publish(
                &self.state.config.notification_exchange,
                &self.state.config.notification_routing_key,
                payload,
                "application/json",
            )
            .await
    }
}
