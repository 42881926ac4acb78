//! Asset discovery: walk each language root and replace the dataset's asset inventory.
//!
//! Traversal is depth-first with directory entries sorted by file name, so when two files in one
//! language share a stem, the one that sorts later wins and the outcome is reproducible.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::UNIX_EPOCH;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use walkdir::WalkDir;

use crate::data::crossref::{cross_reference, CrossRefError, CrossRefOutcome, MediaSettings};
use crate::data::model::{AssetRecord, DatasetId};
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanOutcome {
    pub status: &'static str,
    pub audio_files_indexed: usize,
    pub generation: u64,
    /// Languages whose root is missing or not a directory.
    pub skipped_languages: Vec<String>,
    pub cross_reference: CrossRefOutcome,
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to walk '{root}': {source}")]
    Walk {
        root: String,
        #[source]
        source: walkdir::Error,
    },
    #[error(transparent)]
    CrossRef(#[from] CrossRefError),
}

/// Build the complete inventory for every configured language root.
/// Returns the records (sorted by language, then stem) and the languages that were skipped.
pub fn discover_assets(
    roots: &BTreeMap<String, std::path::PathBuf>,
) -> Result<(Vec<AssetRecord>, Vec<String>), ScanError> {
    let mut inventory: BTreeMap<(String, String), AssetRecord> = BTreeMap::new();
    let mut skipped = Vec::new();

    for (language, root) in roots {
        if root.as_os_str().is_empty() || !root.is_dir() {
            tracing::warn!(language = %language, root = %root.display(), "asset root missing, skipping");
            skipped.push(language.clone());
            continue;
        }
        for record in walk_language(language, root)? {
            inventory.insert((record.language.clone(), record.stem.clone()), record);
        }
    }

    Ok((inventory.into_values().collect(), skipped))
}

fn walk_language(language: &str, root: &Path) -> Result<Vec<AssetRecord>, ScanError> {
    let mut records = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|source| ScanError::Walk {
            root: root.display().to_string(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
            continue;
        };
        let metadata = entry.metadata().map_err(|source| ScanError::Walk {
            root: root.display().to_string(),
            source,
        })?;
        let mtime = DateTime::<Utc>::from(metadata.modified().unwrap_or(UNIX_EPOCH));
        records.push(AssetRecord {
            language: language.to_string(),
            stem,
            file_path: path.to_path_buf(),
            mtime,
        });
    }
    Ok(records)
}

/// Rescan a dataset's asset roots, commit the new inventory, then cross-reference rows against it.
pub fn scan_assets(
    store: &dyn Store,
    id: DatasetId,
    media: &MediaSettings,
) -> Result<ScanOutcome, ScanError> {
    let dataset = store.dataset(id)?.ok_or(StoreError::UnknownDataset(id))?;
    let (records, skipped_languages) = discover_assets(&dataset.audio_roots)?;
    let audio_files_indexed = records.len();

    let generation = store.replace_assets(id, records)?;
    tracing::info!(
        dataset = %dataset.slug,
        files = audio_files_indexed,
        skipped = skipped_languages.len(),
        generation,
        "asset scan committed"
    );

    let cross_reference = cross_reference(store, id, media)?;

    Ok(ScanOutcome {
        status: "ok",
        audio_files_indexed,
        generation,
        skipped_languages,
        cross_reference,
    })
}
