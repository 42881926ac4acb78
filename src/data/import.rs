//! Schema-discovering import: read the dataset's tabular source and replace its row set.

use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::data::model::{DatasetId, NewRow, RowData};
use crate::data::table::{read_table, Table, TableError};
use crate::jobs::{Job, JobQueue};
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ImportOutcome {
    Ok {
        rows: usize,
        columns: Vec<String>,
        join_column: Option<String>,
        generation: u64,
    },
    /// Source locator empty or not a file. Nothing was changed.
    MissingSource { path: String },
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to read '{path}': {source}")]
    Table {
        path: String,
        #[source]
        source: TableError,
    },
}

pub fn import_table(
    store: &dyn Store,
    queue: &dyn JobQueue,
    id: DatasetId,
) -> Result<ImportOutcome, ImportError> {
    let dataset = store.dataset(id)?.ok_or(StoreError::UnknownDataset(id))?;
    let source = dataset.source_path.trim();
    if source.is_empty() || !Path::new(source).is_file() {
        tracing::warn!(dataset = %dataset.slug, path = source, "import source missing");
        return Ok(ImportOutcome::MissingSource {
            path: source.to_string(),
        });
    }

    let table = read_table(Path::new(source)).map_err(|source_err| ImportError::Table {
        path: source.to_string(),
        source: source_err,
    })?;
    let rows = build_rows(&table, &dataset.id_column);
    let row_count = rows.len();
    let columns = table.headers;

    let generation = store.commit_import(id, columns.clone(), rows)?;

    let join_column = store
        .dataset(id)?
        .and_then(|d| d.join_column().map(str::to_string));

    tracing::info!(
        dataset = %dataset.slug,
        rows = row_count,
        columns = columns.len(),
        generation,
        "import committed"
    );

    if let Err(err) = queue.enqueue(Job::Scan(id)) {
        tracing::warn!(dataset = %dataset.slug, error = %err, "failed to enqueue asset scan");
    }

    Ok(ImportOutcome::Ok {
        rows: row_count,
        columns,
        join_column,
        generation,
    })
}

/// Zip headers with cells. The row id comes from `id_column` when present and non-empty,
/// otherwise from the 1-based data row position.
fn build_rows(table: &Table, id_column: &str) -> Vec<NewRow> {
    let id_index = table.headers.iter().position(|h| h == id_column);
    table
        .rows
        .iter()
        .enumerate()
        .map(|(i, cells)| {
            let data: RowData = table
                .headers
                .iter()
                .cloned()
                .zip(cells.iter().cloned())
                .collect();
            let row_id = id_index
                .and_then(|idx| cells.get(idx))
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| (i + 1).to_string());
            NewRow { row_id, data }
        })
        .collect()
}
