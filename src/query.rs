//! Read side: paginated, optionally searched rows of one dataset, plus the caller's dataset list.
//!
//! Datasets the caller is not a member of are reported exactly like datasets that do not exist.

use serde::Serialize;
use thiserror::Error;

use crate::data::model::{AudioMap, Dataset, Row, RowData};
use crate::store::{Generations, Store, StoreError};

pub const DEFAULT_PAGE_SIZE: usize = 100;
pub const MAX_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowQuery {
    pub page: Option<usize>,
    pub page_size: Option<usize>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowItem {
    pub row_id: String,
    pub data: RowData,
    pub audio: AudioMap,
}

impl From<&Row> for RowItem {
    fn from(row: &Row) -> Self {
        Self {
            row_id: row.row_id.clone(),
            data: row.data.clone(),
            audio: row.audio.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowPage {
    pub page: usize,
    pub pages: usize,
    pub total: usize,
    pub page_size: usize,
    pub rows: Vec<RowItem>,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetSummary {
    pub slug: String,
    pub name: String,
    pub columns: usize,
    pub generations: Generations,
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Dataset not found")]
    NotFound,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Resolved pagination window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: usize,
    pub pages: usize,
    pub page_size: usize,
    pub start: usize,
    pub end: usize,
}

/// Clamp `page_size` to `1..=MAX_PAGE_SIZE` and `page` to the valid range. An empty result still
/// has one (empty) page.
pub fn paginate(total: usize, page: Option<usize>, page_size: Option<usize>) -> PageWindow {
    let page_size = page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let pages = total.div_ceil(page_size).max(1);
    let page = page.unwrap_or(1).clamp(1, pages);
    let start = (page - 1) * page_size;
    let end = (start + page_size).min(total);
    PageWindow {
        page,
        pages,
        page_size,
        start,
        end,
    }
}

/// The dataset behind `slug`, if `caller` is a member. Otherwise [`QueryError::NotFound`].
pub fn visible_dataset(
    store: &dyn Store,
    caller: &str,
    slug: &str,
) -> Result<Dataset, QueryError> {
    store
        .dataset_by_slug(slug)?
        .filter(|d| d.is_member(caller))
        .ok_or(QueryError::NotFound)
}

pub fn list_rows(
    store: &dyn Store,
    caller: &str,
    slug: &str,
    query: &RowQuery,
) -> Result<RowPage, QueryError> {
    let dataset = visible_dataset(store, caller, slug)?;
    let snapshot = store.rows(dataset.id)?;

    let needle = query
        .search
        .as_deref()
        .map(str::trim)
        .unwrap_or("")
        .to_lowercase();
    let matching: Vec<&Row> = snapshot.rows.iter().filter(|r| r.matches(&needle)).collect();

    let window = paginate(matching.len(), query.page, query.page_size);
    let rows = matching[window.start..window.end]
        .iter()
        .map(|r| RowItem::from(*r))
        .collect();

    Ok(RowPage {
        page: window.page,
        pages: window.pages,
        total: matching.len(),
        page_size: window.page_size,
        rows,
        columns: dataset.column_order,
    })
}

/// Datasets the caller may read, ordered by name.
pub fn list_datasets(store: &dyn Store, caller: &str) -> Result<Vec<DatasetSummary>, QueryError> {
    let mut visible: Vec<Dataset> = store
        .datasets()?
        .into_iter()
        .filter(|d| d.is_member(caller))
        .collect();
    visible.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.slug.cmp(&b.slug)));

    visible
        .into_iter()
        .map(|d| {
            let generations = store.generations(d.id)?;
            Ok(DatasetSummary {
                slug: d.slug,
                name: d.name,
                columns: d.column_order.len(),
                generations,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::NewRow;
    use crate::store::FileStore;

    fn seeded_store(names: &[(&str, &str)]) -> FileStore {
        let store = FileStore::in_memory();
        let mut ds = Dataset::new("people", "People");
        ds.members.insert("alice".to_string());
        let id = ds.id;
        store.save_dataset(ds).expect("save");
        let rows = names
            .iter()
            .map(|(id, name)| {
                let mut data = RowData::new();
                data.insert("id".to_string(), id.to_string());
                data.insert("name".to_string(), name.to_string());
                NewRow {
                    row_id: id.to_string(),
                    data,
                }
            })
            .collect();
        store
            .commit_import(id, vec!["id".to_string(), "name".to_string()], rows)
            .expect("import");
        store
    }

    fn ids(page: &RowPage) -> Vec<&str> {
        page.rows.iter().map(|r| r.row_id.as_str()).collect()
    }

    #[test]
    fn pages_clamp_past_the_end() {
        let store = seeded_store(&[("3", "c"), ("1", "a"), ("5", "e"), ("2", "b"), ("4", "d")]);
        let query = |page| RowQuery {
            page: Some(page),
            page_size: Some(2),
            search: None,
        };

        let first = list_rows(&store, "alice", "people", &query(1)).expect("page 1");
        assert_eq!(ids(&first), vec!["1", "2"]);
        assert_eq!((first.pages, first.total, first.page_size), (3, 5, 2));

        let third = list_rows(&store, "alice", "people", &query(3)).expect("page 3");
        assert_eq!(ids(&third), vec!["5"]);

        let fourth = list_rows(&store, "alice", "people", &query(4)).expect("page 4");
        assert_eq!(fourth, third);
        assert_eq!(fourth.page, 3);
    }

    #[test]
    fn search_is_case_insensitive_substring() {
        let store = seeded_store(&[("1", "Alice"), ("2", "Bob")]);
        let page = list_rows(
            &store,
            "alice",
            "people",
            &RowQuery {
                search: Some("  ali ".to_string()),
                ..RowQuery::default()
            },
        )
        .expect("search");
        assert_eq!(ids(&page), vec!["1"]);
        assert_eq!(page.total, 1);
        assert_eq!(page.columns, vec!["id", "name"]);
    }

    #[test]
    fn search_matches_column_names_too() {
        let store = seeded_store(&[("1", "Alice"), ("2", "Bob")]);
        let page = list_rows(
            &store,
            "alice",
            "people",
            &RowQuery {
                search: Some("NAME".to_string()),
                ..RowQuery::default()
            },
        )
        .expect("search");
        assert_eq!(page.total, 2);
    }

    #[test]
    fn non_members_see_not_found() {
        let store = seeded_store(&[("1", "Alice")]);
        let hidden = list_rows(&store, "mallory", "people", &RowQuery::default()).unwrap_err();
        let missing = list_rows(&store, "alice", "nope", &RowQuery::default()).unwrap_err();
        assert_eq!(hidden.to_string(), missing.to_string());
        assert!(matches!(hidden, QueryError::NotFound));
        assert!(matches!(missing, QueryError::NotFound));
    }

    #[test]
    fn page_size_is_clamped() {
        assert_eq!(paginate(5000, Some(1), Some(50_000)).page_size, MAX_PAGE_SIZE);
        assert_eq!(paginate(10, Some(1), Some(0)).page_size, 1);
        assert_eq!(paginate(10, None, None).page_size, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn empty_result_has_one_page() {
        let window = paginate(0, Some(7), Some(10));
        assert_eq!(
            window,
            PageWindow {
                page: 1,
                pages: 1,
                page_size: 10,
                start: 0,
                end: 0
            }
        );
    }

    #[test]
    fn page_zero_clamps_to_first_page() {
        assert_eq!(paginate(10, Some(0), Some(3)).page, 1);
    }

    #[test]
    fn dataset_list_only_shows_memberships() {
        let store = seeded_store(&[("1", "Alice")]);
        store
            .save_dataset(Dataset::new("private", "Private"))
            .expect("save");

        let listed = list_datasets(&store, "alice").expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].slug, "people");
        assert_eq!(listed[0].columns, 2);
        assert_eq!(listed[0].generations.rows, 1);
        assert!(list_datasets(&store, "").expect("list").is_empty());
    }
}
