//! Persistent store contract.
//!
//! Every mutating call is one atomic commit: readers either see the previous state or the new one,
//! never a partially replaced row or asset set.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::data::model::{AssetRecord, AudioMap, Dataset, DatasetId, NewRow, Row};

pub mod file;

pub use file::FileStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store document error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("dataset {0} not found")]
    UnknownDataset(DatasetId),
    #[error("dataset slug '{0}' is already registered")]
    DuplicateSlug(String),
    #[error("generations {expected} were superseded by {actual}")]
    GenerationChanged {
        expected: Generations,
        actual: Generations,
    },
    #[error("store lock poisoned")]
    Poisoned,
}

/// Replace counters for a dataset's row and asset sets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct Generations {
    pub rows: u64,
    pub assets: u64,
}

impl fmt::Display for Generations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rows={}, assets={}", self.rows, self.assets)
    }
}

/// Committed row set, sorted by `(row_id, seq)`.
#[derive(Debug, Clone)]
pub struct RowSnapshot {
    pub generation: u64,
    pub rows: Arc<Vec<Row>>,
}

/// Committed asset inventory, sorted by `(language, stem)`.
#[derive(Debug, Clone)]
pub struct AssetSnapshot {
    pub generation: u64,
    pub assets: Arc<Vec<AssetRecord>>,
}

pub trait Store: Send + Sync {
    fn datasets(&self) -> Result<Vec<Dataset>, StoreError>;

    fn dataset(&self, id: DatasetId) -> Result<Option<Dataset>, StoreError>;

    fn dataset_by_slug(&self, slug: &str) -> Result<Option<Dataset>, StoreError>;

    /// Insert a new dataset or overwrite the settings of an existing one. Rows, assets and the
    /// detected column order are kept; only [`Store::commit_import`] changes the column order.
    fn save_dataset(&self, dataset: Dataset) -> Result<(), StoreError>;

    /// Remove a dataset together with its rows and assets. Returns false if it did not exist.
    fn delete_dataset(&self, id: DatasetId) -> Result<bool, StoreError>;

    /// Record the detected column order and replace the whole row set in one commit.
    /// Returns the new row generation.
    fn commit_import(
        &self,
        id: DatasetId,
        columns: Vec<String>,
        rows: Vec<NewRow>,
    ) -> Result<u64, StoreError>;

    fn rows(&self, id: DatasetId) -> Result<RowSnapshot, StoreError>;

    /// Overwrite the audio mapping of rows identified by `seq`, all in one commit. Fails with
    /// [`StoreError::GenerationChanged`] if the row set or the asset set was replaced since the
    /// snapshots behind `basis` were read.
    fn update_audio(
        &self,
        id: DatasetId,
        basis: Generations,
        updates: Vec<(u64, AudioMap)>,
    ) -> Result<usize, StoreError>;

    /// Replace the whole asset set in one commit. Returns the new asset generation.
    fn replace_assets(&self, id: DatasetId, assets: Vec<AssetRecord>) -> Result<u64, StoreError>;

    fn assets(&self, id: DatasetId) -> Result<AssetSnapshot, StoreError>;

    fn generations(&self, id: DatasetId) -> Result<Generations, StoreError>;
}
