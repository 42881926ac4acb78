//! Join rows to the committed asset inventory by key-column value.
//!
//! Each run recomputes every row's audio mapping from scratch, so identical rows and assets always
//! produce identical mappings and stale matches disappear.

use std::collections::{BTreeMap, HashMap};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::model::{AssetRecord, AudioMap, DatasetId, Row};
use crate::store::{Generations, Store, StoreError};

pub const DEFAULT_MEDIA_PREFIX: &str = "/media/audio";

/// Address scheme of the static asset server: `<prefix>/<language>/<file name>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaSettings {
    pub prefix: String,
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_MEDIA_PREFIX.to_string(),
        }
    }
}

impl MediaSettings {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Mount point for one language, e.g. `/media/audio/en`.
    pub fn language_path(&self, language: &str) -> String {
        format!("{}/{}", self.prefix.trim_end_matches('/'), language)
    }

    pub fn served_location(&self, language: &str, file_name: &str) -> String {
        format!("{}/{}", self.language_path(language), file_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CrossRefOutcome {
    Ok {
        join_column: String,
        rows_examined: usize,
        rows_updated: usize,
    },
    /// No key column configured and no columns detected yet. Nothing was written.
    NoJoinColumn,
    /// The row set or the asset set was replaced before this run could write. Whoever replaced it
    /// runs (or has queued) a newer cross-reference.
    Superseded { join_column: String },
}

#[derive(Debug, Error)]
pub enum CrossRefError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// language -> stem -> served location
type Lookup = BTreeMap<String, HashMap<String, String>>;

fn build_lookup(assets: &[AssetRecord], media: &MediaSettings) -> Lookup {
    let mut lookup = Lookup::new();
    for asset in assets {
        let Some(file_name) = asset.file_name() else {
            continue;
        };
        lookup
            .entry(asset.language.clone())
            .or_default()
            .insert(asset.stem.clone(), media.served_location(&asset.language, &file_name));
    }
    lookup
}

fn audio_for(row: &Row, join_column: &str, lookup: &Lookup) -> AudioMap {
    let key = row.data.get(join_column).map(|v| v.trim()).unwrap_or("");
    if key.is_empty() {
        return AudioMap::new();
    }
    lookup
        .iter()
        .filter_map(|(language, stems)| {
            stems
                .get(key)
                .map(|location| (language.clone(), location.clone()))
        })
        .collect()
}

/// Rows whose recomputed mapping differs from the stored one, as `(seq, audio)`.
pub fn changed_audio(
    rows: &[Row],
    join_column: &str,
    assets: &[AssetRecord],
    media: &MediaSettings,
) -> Vec<(u64, AudioMap)> {
    let lookup = build_lookup(assets, media);
    rows.par_iter()
        .filter_map(|row| {
            let audio = audio_for(row, join_column, &lookup);
            (audio != row.audio).then_some((row.seq, audio))
        })
        .collect()
}

pub fn cross_reference(
    store: &dyn Store,
    id: DatasetId,
    media: &MediaSettings,
) -> Result<CrossRefOutcome, CrossRefError> {
    let dataset = store.dataset(id)?.ok_or(StoreError::UnknownDataset(id))?;
    let Some(join_column) = dataset.join_column().map(str::to_string) else {
        tracing::info!(dataset = %dataset.slug, "no join column, cross-reference skipped");
        return Ok(CrossRefOutcome::NoJoinColumn);
    };

    let snapshot = store.rows(id)?;
    let assets = store.assets(id)?;
    let basis = Generations {
        rows: snapshot.generation,
        assets: assets.generation,
    };
    let updates = changed_audio(&snapshot.rows, &join_column, &assets.assets, media);
    let rows_updated = updates.len();

    match store.update_audio(id, basis, updates) {
        Ok(_) => {}
        Err(StoreError::GenerationChanged { expected, actual }) => {
            tracing::warn!(
                dataset = %dataset.slug,
                %expected,
                %actual,
                "rows or assets replaced during cross-reference"
            );
            return Ok(CrossRefOutcome::Superseded { join_column });
        }
        Err(err) => return Err(err.into()),
    }

    tracing::info!(
        dataset = %dataset.slug,
        join_column = %join_column,
        rows = snapshot.rows.len(),
        updated = rows_updated,
        "cross-reference applied"
    );

    Ok(CrossRefOutcome::Ok {
        join_column,
        rows_examined: snapshot.rows.len(),
        rows_updated,
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use chrono::Utc;

    use super::*;
    use crate::data::model::{NewRow, RowData};

    fn row(seq: u64, key: &str) -> Row {
        let mut data = RowData::new();
        data.insert("id".to_string(), key.to_string());
        Row::from_new(
            seq,
            NewRow {
                row_id: seq.to_string(),
                data,
            },
            Utc::now(),
        )
    }

    fn asset(language: &str, file: &str) -> AssetRecord {
        let path = PathBuf::from("/srv/audio").join(language).join(file);
        AssetRecord {
            language: language.to_string(),
            stem: path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            file_path: path,
            mtime: Utc::now(),
        }
    }

    #[test]
    fn served_location_uses_prefix_language_and_file_name() {
        let media = MediaSettings::new("/media/audio/");
        assert_eq!(
            media.served_location("en", "hello.wav"),
            "/media/audio/en/hello.wav"
        );
    }

    #[test]
    fn matching_languages_are_set_and_others_absent() {
        let rows = vec![row(0, " hello "), row(1, "bye"), row(2, "")];
        let assets = vec![asset("en", "hello.wav"), asset("ja", "bye.mp3")];

        let updates = changed_audio(&rows, "id", &assets, &MediaSettings::default());
        let by_seq: BTreeMap<u64, AudioMap> = updates.into_iter().collect();

        assert_eq!(
            by_seq.get(&0),
            Some(&AudioMap::from([(
                "en".to_string(),
                "/media/audio/en/hello.wav".to_string()
            )]))
        );
        assert_eq!(
            by_seq.get(&1),
            Some(&AudioMap::from([(
                "ja".to_string(),
                "/media/audio/ja/bye.mp3".to_string()
            )]))
        );
        assert!(!by_seq.contains_key(&2), "empty key with empty audio is unchanged");
    }

    #[test]
    fn stale_matches_are_cleared() {
        let mut stale = row(0, "gone");
        stale
            .audio
            .insert("en".to_string(), "/media/audio/en/gone.wav".to_string());
        let mut blank = row(1, "");
        blank
            .audio
            .insert("en".to_string(), "/media/audio/en/old.wav".to_string());

        let updates = changed_audio(&[stale, blank], "id", &[], &MediaSettings::default());
        assert_eq!(updates, vec![(0, AudioMap::new()), (1, AudioMap::new())]);
    }

    #[test]
    fn unchanged_rows_produce_no_writes() {
        let assets = vec![asset("en", "hello.wav")];
        let media = MediaSettings::default();
        let mut rows = vec![row(0, "hello")];
        for (seq, audio) in changed_audio(&rows, "id", &assets, &media) {
            rows[seq as usize].audio = audio;
        }
        assert!(changed_audio(&rows, "id", &assets, &media).is_empty());
    }
}
