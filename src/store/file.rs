//! JSON-document store: one file per dataset under `<root>/datasets/<uuid>.json`.
//!
//! Commits write a temp file, fsync it and rename it over the document, then swap the new
//! snapshot into memory. Readers only ever clone committed snapshots.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{AssetSnapshot, Generations, RowSnapshot, Store, StoreError};
use crate::data::model::{AssetRecord, AudioMap, Dataset, DatasetId, NewRow, Row};

const DATASETS_DIR: &str = "datasets";

#[derive(Debug, Clone)]
struct Entry {
    dataset: Dataset,
    row_generation: u64,
    asset_generation: u64,
    rows: Arc<Vec<Row>>,
    assets: Arc<Vec<AssetRecord>>,
}

impl Entry {
    fn generations(&self) -> Generations {
        Generations {
            rows: self.row_generation,
            assets: self.asset_generation,
        }
    }
}

#[derive(Serialize)]
struct DocumentRef<'a> {
    dataset: &'a Dataset,
    row_generation: u64,
    asset_generation: u64,
    rows: &'a [Row],
    assets: &'a [AssetRecord],
}

#[derive(Deserialize)]
struct Document {
    dataset: Dataset,
    #[serde(default)]
    row_generation: u64,
    #[serde(default)]
    asset_generation: u64,
    #[serde(default)]
    rows: Vec<Row>,
    #[serde(default)]
    assets: Vec<AssetRecord>,
}

#[derive(Debug)]
pub struct FileStore {
    root: Option<PathBuf>,
    state: RwLock<BTreeMap<DatasetId, Entry>>,
    writer: Mutex<()>,
}

impl FileStore {
    /// Open (or create) a store rooted at `root`, loading every dataset document found there.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        let dir = root.join(DATASETS_DIR);
        fs::create_dir_all(&dir)?;

        let mut state = BTreeMap::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().map_or(true, |e| e != "json") {
                continue;
            }
            let file = fs::File::open(&path)?;
            let doc: Document = serde_json::from_reader(BufReader::new(file))?;
            let mut rows = doc.rows;
            sort_rows(&mut rows);
            state.insert(
                doc.dataset.id,
                Entry {
                    dataset: doc.dataset,
                    row_generation: doc.row_generation,
                    asset_generation: doc.asset_generation,
                    rows: Arc::new(rows),
                    assets: Arc::new(doc.assets),
                },
            );
        }
        tracing::debug!(root = %root.display(), datasets = state.len(), "store opened");

        Ok(Self {
            root: Some(root),
            state: RwLock::new(state),
            writer: Mutex::new(()),
        })
    }

    /// Store without disk persistence. Commits are still all-or-nothing in memory.
    pub fn in_memory() -> Self {
        Self {
            root: None,
            state: RwLock::new(BTreeMap::new()),
            writer: Mutex::new(()),
        }
    }

    fn document_path(&self, id: DatasetId) -> Option<PathBuf> {
        self.root
            .as_ref()
            .map(|root| root.join(DATASETS_DIR).join(format!("{id}.json")))
    }

    fn entry(&self, id: DatasetId) -> Result<Option<Entry>, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        Ok(state.get(&id).cloned())
    }

    fn existing(&self, id: DatasetId) -> Result<Entry, StoreError> {
        self.entry(id)?.ok_or(StoreError::UnknownDataset(id))
    }

    /// Persist `entry` and publish it. Callers must hold the writer lock.
    fn commit(&self, entry: Entry) -> Result<(), StoreError> {
        if let Some(path) = self.document_path(entry.dataset.id) {
            write_document(&path, &entry)?;
        }
        let mut state = self.state.write().map_err(|_| StoreError::Poisoned)?;
        state.insert(entry.dataset.id, entry);
        Ok(())
    }
}

fn write_document(path: &Path, entry: &Entry) -> Result<(), StoreError> {
    let tmp = path.with_extension("json.tmp");
    let doc = DocumentRef {
        dataset: &entry.dataset,
        row_generation: entry.row_generation,
        asset_generation: entry.asset_generation,
        rows: &entry.rows,
        assets: &entry.assets,
    };
    {
        let file = fs::File::create(&tmp)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &doc)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn sort_rows(rows: &mut [Row]) {
    rows.sort_by(|a, b| a.row_id.cmp(&b.row_id).then(a.seq.cmp(&b.seq)));
}

impl Store for FileStore {
    fn datasets(&self) -> Result<Vec<Dataset>, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        Ok(state.values().map(|e| e.dataset.clone()).collect())
    }

    fn dataset(&self, id: DatasetId) -> Result<Option<Dataset>, StoreError> {
        Ok(self.entry(id)?.map(|e| e.dataset))
    }

    fn dataset_by_slug(&self, slug: &str) -> Result<Option<Dataset>, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        Ok(state
            .values()
            .find(|e| e.dataset.slug == slug)
            .map(|e| e.dataset.clone()))
    }

    fn save_dataset(&self, mut dataset: Dataset) -> Result<(), StoreError> {
        let _guard = self.writer.lock().map_err(|_| StoreError::Poisoned)?;
        {
            let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
            if state
                .values()
                .any(|e| e.dataset.slug == dataset.slug && e.dataset.id != dataset.id)
            {
                return Err(StoreError::DuplicateSlug(dataset.slug));
            }
        }
        dataset.updated_at = Utc::now();
        let entry = match self.entry(dataset.id)? {
            Some(existing) => {
                dataset.column_order = existing.dataset.column_order.clone();
                dataset.created_at = existing.dataset.created_at;
                Entry { dataset, ..existing }
            }
            None => Entry {
                dataset,
                row_generation: 0,
                asset_generation: 0,
                rows: Arc::new(Vec::new()),
                assets: Arc::new(Vec::new()),
            },
        };
        self.commit(entry)
    }

    fn delete_dataset(&self, id: DatasetId) -> Result<bool, StoreError> {
        let _guard = self.writer.lock().map_err(|_| StoreError::Poisoned)?;
        if self.entry(id)?.is_none() {
            return Ok(false);
        }
        if let Some(path) = self.document_path(id) {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        let mut state = self.state.write().map_err(|_| StoreError::Poisoned)?;
        Ok(state.remove(&id).is_some())
    }

    fn commit_import(
        &self,
        id: DatasetId,
        columns: Vec<String>,
        rows: Vec<NewRow>,
    ) -> Result<u64, StoreError> {
        let _guard = self.writer.lock().map_err(|_| StoreError::Poisoned)?;
        let mut entry = self.existing(id)?;
        let now = Utc::now();

        let mut new_rows: Vec<Row> = rows
            .into_iter()
            .enumerate()
            .map(|(seq, row)| Row::from_new(seq as u64, row, now))
            .collect();
        sort_rows(&mut new_rows);

        entry.dataset.column_order = columns;
        entry.dataset.updated_at = now;
        entry.row_generation += 1;
        entry.rows = Arc::new(new_rows);
        let generation = entry.row_generation;
        self.commit(entry)?;
        Ok(generation)
    }

    fn rows(&self, id: DatasetId) -> Result<RowSnapshot, StoreError> {
        let entry = self.existing(id)?;
        Ok(RowSnapshot {
            generation: entry.row_generation,
            rows: entry.rows,
        })
    }

    fn update_audio(
        &self,
        id: DatasetId,
        basis: Generations,
        updates: Vec<(u64, AudioMap)>,
    ) -> Result<usize, StoreError> {
        let _guard = self.writer.lock().map_err(|_| StoreError::Poisoned)?;
        let mut entry = self.existing(id)?;
        let actual = entry.generations();
        if actual != basis {
            return Err(StoreError::GenerationChanged {
                expected: basis,
                actual,
            });
        }
        if updates.is_empty() {
            return Ok(0);
        }

        let mut rows: Vec<Row> = (*entry.rows).clone();
        let position: HashMap<u64, usize> =
            rows.iter().enumerate().map(|(i, r)| (r.seq, i)).collect();
        let mut applied = 0usize;
        for (seq, audio) in updates {
            if let Some(&i) = position.get(&seq) {
                rows[i].audio = audio;
                applied += 1;
            }
        }
        entry.rows = Arc::new(rows);
        self.commit(entry)?;
        Ok(applied)
    }

    fn replace_assets(&self, id: DatasetId, assets: Vec<AssetRecord>) -> Result<u64, StoreError> {
        let _guard = self.writer.lock().map_err(|_| StoreError::Poisoned)?;
        let mut entry = self.existing(id)?;
        entry.asset_generation += 1;
        entry.assets = Arc::new(assets);
        let generation = entry.asset_generation;
        self.commit(entry)?;
        Ok(generation)
    }

    fn assets(&self, id: DatasetId) -> Result<AssetSnapshot, StoreError> {
        let entry = self.existing(id)?;
        Ok(AssetSnapshot {
            generation: entry.asset_generation,
            assets: entry.assets,
        })
    }

    fn generations(&self, id: DatasetId) -> Result<Generations, StoreError> {
        Ok(self.existing(id)?.generations())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::RowData;

    fn new_row(row_id: &str, name: &str) -> NewRow {
        let mut data = RowData::new();
        data.insert("id".to_string(), row_id.to_string());
        data.insert("name".to_string(), name.to_string());
        NewRow {
            row_id: row_id.to_string(),
            data,
        }
    }

    #[test]
    fn commit_import_replaces_whole_generation() {
        let store = FileStore::in_memory();
        let ds = Dataset::new("greetings", "Greetings");
        let id = ds.id;
        store.save_dataset(ds).expect("save");

        let columns = vec!["id".to_string(), "name".to_string()];
        store
            .commit_import(id, columns.clone(), vec![new_row("b", "Bob"), new_row("a", "Alice")])
            .expect("first import");
        let generation = store
            .commit_import(id, columns, vec![new_row("c", "Carol")])
            .expect("second import");

        let snapshot = store.rows(id).expect("rows");
        assert_eq!(generation, 2);
        assert_eq!(snapshot.generation, 2);
        let ids: Vec<&str> = snapshot.rows.iter().map(|r| r.row_id.as_str()).collect();
        assert_eq!(ids, vec!["c"]);
    }

    #[test]
    fn rows_are_sorted_by_row_id_then_position() {
        let store = FileStore::in_memory();
        let ds = Dataset::new("greetings", "Greetings");
        let id = ds.id;
        store.save_dataset(ds).expect("save");
        store
            .commit_import(
                id,
                vec!["id".to_string(), "name".to_string()],
                vec![new_row("2", "x"), new_row("10", "y"), new_row("2", "z")],
            )
            .expect("import");

        let snapshot = store.rows(id).expect("rows");
        let order: Vec<(&str, u64)> = snapshot
            .rows
            .iter()
            .map(|r| (r.row_id.as_str(), r.seq))
            .collect();
        assert_eq!(order, vec![("10", 1), ("2", 0), ("2", 2)]);
    }

    #[test]
    fn update_audio_rejects_superseded_generation() {
        let store = FileStore::in_memory();
        let ds = Dataset::new("greetings", "Greetings");
        let id = ds.id;
        store.save_dataset(ds).expect("save");
        let columns = vec!["id".to_string(), "name".to_string()];
        store
            .commit_import(id, columns.clone(), vec![new_row("a", "Alice")])
            .expect("import");
        store
            .commit_import(id, columns, vec![new_row("a", "Alice")])
            .expect("reimport");

        let mut audio = AudioMap::new();
        audio.insert("en".to_string(), "/media/audio/en/a.wav".to_string());
        let stale = Generations { rows: 1, assets: 0 };
        let err = store.update_audio(id, stale, vec![(0, audio)]).unwrap_err();
        assert!(matches!(
            err,
            StoreError::GenerationChanged {
                expected: Generations { rows: 1, assets: 0 },
                actual: Generations { rows: 2, assets: 0 },
            }
        ));
    }

    #[test]
    fn update_audio_rejects_replaced_assets() {
        let store = FileStore::in_memory();
        let ds = Dataset::new("greetings", "Greetings");
        let id = ds.id;
        store.save_dataset(ds).expect("save");
        store
            .commit_import(id, vec!["id".to_string()], vec![new_row("a", "Alice")])
            .expect("import");
        let basis = store.generations(id).expect("generations");
        store.replace_assets(id, Vec::new()).expect("rescan");

        let mut audio = AudioMap::new();
        audio.insert("en".to_string(), "/media/audio/en/a.wav".to_string());
        let err = store.update_audio(id, basis, vec![(0, audio)]).unwrap_err();
        assert!(matches!(
            err,
            StoreError::GenerationChanged { actual, .. } if actual.assets == 1
        ));
        assert!(store.rows(id).expect("rows").rows[0].audio.is_empty());
    }

    #[test]
    fn duplicate_slug_is_rejected() {
        let store = FileStore::in_memory();
        store.save_dataset(Dataset::new("a", "A")).expect("save");
        let err = store.save_dataset(Dataset::new("a", "Other")).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateSlug(slug) if slug == "a"));
    }

    #[test]
    fn documents_survive_reopen_and_delete_cascades() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ds = Dataset::new("greetings", "Greetings");
        let id = ds.id;
        {
            let store = FileStore::open(dir.path()).expect("open");
            store.save_dataset(ds).expect("save");
            store
                .commit_import(
                    id,
                    vec!["id".to_string(), "name".to_string()],
                    vec![new_row("1", "Alice")],
                )
                .expect("import");
        }

        let store = FileStore::open(dir.path()).expect("reopen");
        let dataset = store.dataset(id).expect("lookup").expect("dataset persisted");
        assert_eq!(dataset.column_order, vec!["id", "name"]);
        assert_eq!(store.rows(id).expect("rows").rows.len(), 1);
        assert_eq!(store.generations(id).expect("generations").rows, 1);

        assert!(store.delete_dataset(id).expect("delete"));
        assert!(store.dataset(id).expect("lookup").is_none());
        assert!(!dir
            .path()
            .join(DATASETS_DIR)
            .join(format!("{id}.json"))
            .exists());
        assert!(matches!(store.rows(id), Err(StoreError::UnknownDataset(_))));
    }
}
