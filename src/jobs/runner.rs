//! Async job runner for the server: an unbounded channel drained by a tokio task.
//!
//! Every job runs on its own blocking task, so work for different datasets proceeds concurrently.
//! Failures are logged and dropped; retrying is left to whoever enqueues.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{execute, Job, JobError, JobQueue};
use crate::data::crossref::MediaSettings;
use crate::store::Store;

#[derive(Debug, Clone)]
pub struct JobSender {
    tx: mpsc::UnboundedSender<Job>,
}

impl JobQueue for JobSender {
    fn enqueue(&self, job: Job) -> Result<(), JobError> {
        tracing::debug!(%job, "job queued");
        self.tx.send(job).map_err(|_| JobError::Closed)
    }
}

pub struct JobRunner {
    rx: mpsc::UnboundedReceiver<Job>,
    sender: JobSender,
    store: Arc<dyn Store>,
    media: MediaSettings,
}

impl JobRunner {
    pub fn new(store: Arc<dyn Store>, media: MediaSettings) -> (JobSender, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sender = JobSender { tx };
        let runner = Self {
            rx,
            sender: sender.clone(),
            store,
            media,
        };
        (sender, runner)
    }

    /// Spawn the dispatch loop on the current tokio runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        while let Some(job) = self.rx.recv().await {
            let store = Arc::clone(&self.store);
            let sender = self.sender.clone();
            let media = self.media.clone();
            tokio::spawn(async move {
                let result =
                    tokio::task::spawn_blocking(move || execute(job, &*store, &sender, &media))
                        .await;
                match result {
                    Ok(Ok(outcome)) => {
                        let summary = serde_json::to_string(&outcome).unwrap_or_default();
                        tracing::info!(%job, outcome = %summary, "job finished");
                    }
                    Ok(Err(err)) => tracing::error!(%job, error = %err, "job failed"),
                    Err(err) => tracing::error!(%job, error = %err, "job panicked"),
                }
            });
        }
    }
}
