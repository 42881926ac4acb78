//! Dataset, row and asset records shared by the importer, scanner, cross-referencer and query layer.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_ID_COLUMN: &str = "id";

/// Column name -> cell value, in the dataset's column order.
pub type RowData = IndexMap<String, String>;

/// Language -> served location. Languages without a matching asset are absent.
pub type AudioMap = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetId(pub Uuid);

impl DatasetId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DatasetId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: DatasetId,
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub source_path: String,
    /// Language -> asset root directory.
    #[serde(default)]
    pub audio_roots: BTreeMap<String, PathBuf>,
    /// Column whose value is matched against asset stems. Falls back to the first column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_column: Option<String>,
    #[serde(default = "default_id_column")]
    pub id_column: String,
    /// Header order detected by the last successful import.
    #[serde(default)]
    pub column_order: Vec<String>,
    #[serde(default)]
    pub members: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_id_column() -> String {
    DEFAULT_ID_COLUMN.to_string()
}

impl Dataset {
    pub fn new(slug: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: DatasetId::new(),
            slug: slug.into(),
            name: name.into(),
            source_path: String::new(),
            audio_roots: BTreeMap::new(),
            key_column: None,
            id_column: default_id_column(),
            column_order: Vec::new(),
            members: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Configured key column, else the first detected column.
    pub fn join_column(&self) -> Option<&str> {
        self.key_column
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .or_else(|| self.column_order.first().map(String::as_str))
    }

    pub fn is_member(&self, caller: &str) -> bool {
        !caller.is_empty() && self.members.contains(caller)
    }
}

/// A row as produced by the importer, before the store assigns its position.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRow {
    pub row_id: String,
    pub data: RowData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Position within the import generation; breaks ties between equal row ids.
    pub seq: u64,
    pub row_id: String,
    pub data: RowData,
    #[serde(default)]
    pub audio: AudioMap,
    /// Lowercased serialized `data`, used for substring search.
    #[serde(default)]
    pub search_text: String,
    pub indexed_at: DateTime<Utc>,
}

impl Row {
    pub fn from_new(seq: u64, new_row: NewRow, indexed_at: DateTime<Utc>) -> Self {
        let search_text = search_text_for(&new_row.data);
        Self {
            seq,
            row_id: new_row.row_id,
            data: new_row.data,
            audio: AudioMap::new(),
            search_text,
            indexed_at,
        }
    }

    pub fn matches(&self, needle_lower: &str) -> bool {
        needle_lower.is_empty() || self.search_text.contains(needle_lower)
    }
}

/// Serialize row data the way it is stored and lowercase it for case-insensitive matching.
pub fn search_text_for(data: &RowData) -> String {
    serde_json::to_string(data)
        .unwrap_or_default()
        .to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub language: String,
    pub stem: String,
    pub file_path: PathBuf,
    pub mtime: DateTime<Utc>,
}

impl AssetRecord {
    pub fn file_name(&self) -> Option<String> {
        self.file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
    }
}
