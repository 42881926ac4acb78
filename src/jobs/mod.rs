//! Named jobs parameterized by a dataset, and the queues that carry them.
//!
//! The importer enqueues a [`Job::Scan`] after it commits; nothing calls the scanner directly
//! from inside an import.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;

use serde::Serialize;
use thiserror::Error;

use crate::data::assets::{scan_assets, ScanError, ScanOutcome};
use crate::data::crossref::MediaSettings;
use crate::data::import::{import_table, ImportError, ImportOutcome};
use crate::data::model::DatasetId;
use crate::store::Store;

pub mod runner;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "job", content = "dataset", rename_all = "snake_case")]
pub enum Job {
    Import(DatasetId),
    Scan(DatasetId),
}

impl Job {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Import(_) => "import",
            Self::Scan(_) => "scan",
        }
    }

    pub fn dataset(&self) -> DatasetId {
        match self {
            Self::Import(id) | Self::Scan(id) => *id,
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.dataset())
    }
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("job queue is closed")]
    Closed,
    #[error("queue lock poisoned")]
    Poisoned,
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error(transparent)]
    Scan(#[from] ScanError),
}

pub trait JobQueue: Send + Sync {
    fn enqueue(&self, job: Job) -> Result<(), JobError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum JobOutcome {
    Import(ImportOutcome),
    Scan(ScanOutcome),
}

/// Run one job to completion. Follow-up jobs go onto `queue`.
pub fn execute(
    job: Job,
    store: &dyn Store,
    queue: &dyn JobQueue,
    media: &MediaSettings,
) -> Result<JobOutcome, JobError> {
    match job {
        Job::Import(id) => Ok(JobOutcome::Import(import_table(store, queue, id)?)),
        Job::Scan(id) => Ok(JobOutcome::Scan(scan_assets(store, id, media)?)),
    }
}

/// FIFO queue drained inline by the caller. Used by the CLI and tests.
#[derive(Debug, Default)]
pub struct LocalQueue {
    pending: Mutex<VecDeque<Job>>,
}

impl LocalQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Vec<Job> {
        self.pending
            .lock()
            .map(|q| q.iter().copied().collect())
            .unwrap_or_default()
    }

    fn pop(&self) -> Result<Option<Job>, JobError> {
        let mut pending = self.pending.lock().map_err(|_| JobError::Poisoned)?;
        Ok(pending.pop_front())
    }

    /// Execute queued jobs, including any they enqueue, until the queue is empty.
    pub fn drain(
        &self,
        store: &dyn Store,
        media: &MediaSettings,
    ) -> Result<Vec<(Job, JobOutcome)>, JobError> {
        let mut done = Vec::new();
        while let Some(job) = self.pop()? {
            let outcome = execute(job, store, self, media)?;
            done.push((job, outcome));
        }
        Ok(done)
    }
}

impl JobQueue for LocalQueue {
    fn enqueue(&self, job: Job) -> Result<(), JobError> {
        let mut pending = self.pending.lock().map_err(|_| JobError::Poisoned)?;
        pending.push_back(job);
        Ok(())
    }
}
