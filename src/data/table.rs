//! Read a tabular source (CSV or any workbook calamine understands) into header + string cells.
//!
//! Cell text is kept as read; only header names are trimmed.

use std::collections::HashMap;
use std::path::Path;

use calamine::Reader;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("failed to read CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to read workbook: {0}")]
    Workbook(#[from] calamine::Error),
    #[error("workbook has no worksheets")]
    NoWorksheet,
}

/// Header names plus data rows. Every row has exactly `headers.len()` cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

pub fn read_table(path: &Path) -> Result<Table, TableError> {
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
    let raw = if is_csv {
        read_csv(path)?
    } else {
        read_workbook(path)?
    };
    Ok(Table::from_raw(raw))
}

fn read_csv(path: &Path) -> Result<Vec<Vec<String>>, TableError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;
    let mut raw = Vec::new();
    for record in reader.records() {
        let record = record?;
        raw.push(record.iter().map(str::to_string).collect());
    }
    Ok(raw)
}

fn read_workbook(path: &Path) -> Result<Vec<Vec<String>>, TableError> {
    let mut wb = calamine::open_workbook_auto(path)?;
    let sheet_name = wb
        .sheet_names()
        .first()
        .cloned()
        .ok_or(TableError::NoWorksheet)?;
    let range = wb.worksheet_range(&sheet_name)?;
    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_str).collect())
        .collect())
}

fn cell_str(d: &calamine::Data) -> String {
    match d {
        calamine::Data::Empty | calamine::Data::Error(_) => String::new(),
        calamine::Data::String(s) => s.clone(),
        calamine::Data::Float(f) => format!("{}", f),
        calamine::Data::Int(i) => format!("{}", i),
        calamine::Data::Bool(b) => format!("{}", b),
        other => other.to_string(),
    }
}

impl Table {
    /// First raw row becomes the header; the rest are padded or cut to its width.
    fn from_raw(raw: Vec<Vec<String>>) -> Self {
        let mut raw = raw.into_iter();
        let Some(header_row) = raw.next() else {
            return Table::default();
        };
        let headers = normalize_headers(header_row);
        let width = headers.len();
        let rows = raw
            .map(|mut cells| {
                cells.resize(width, String::new());
                cells
            })
            .collect();
        Table { headers, rows }
    }
}

/// Blank headers become `column_<n>`; repeats get `.1`, `.2`, ... suffixes.
fn normalize_headers(raw: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut headers = Vec::with_capacity(raw.len());
    for (i, cell) in raw.into_iter().enumerate() {
        let base = match cell.trim() {
            "" => format!("column_{}", i + 1),
            name => name.to_string(),
        };
        let mut name = base.clone();
        while seen.contains_key(&name) {
            let n = seen.entry(base.clone()).or_insert(0);
            *n += 1;
            name = format!("{base}.{n}");
        }
        seen.insert(name.clone(), 0);
        headers.push(name);
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn blank_and_duplicate_headers_are_renamed() {
        let headers = normalize_headers(strings(&["name", "", "name", " name ", "name.1"]));
        assert_eq!(
            headers,
            strings(&["name", "column_2", "name.1", "name.2", "name.1.1"])
        );
    }

    #[test]
    fn short_rows_are_padded_and_long_rows_cut() {
        let table = Table::from_raw(vec![
            strings(&["id", "text"]),
            strings(&["1"]),
            strings(&["2", "hi", "extra"]),
        ]);
        assert_eq!(table.headers, strings(&["id", "text"]));
        assert_eq!(table.rows, vec![strings(&["1", ""]), strings(&["2", "hi"])]);
    }

    #[test]
    fn empty_source_has_no_headers() {
        assert_eq!(Table::from_raw(Vec::new()), Table::default());
    }

    #[test]
    fn csv_cells_keep_their_whitespace() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("lines.csv");
        std::fs::write(&path, "id,count, note\n007, 3 ,\n2,,  padded text  \n").expect("fixture");

        let table = read_table(&path).expect("csv should parse");
        assert_eq!(table.headers, strings(&["id", "count", "note"]));
        assert_eq!(
            table.rows,
            vec![strings(&["007", " 3 ", ""]), strings(&["2", "", "  padded text  "])]
        );
    }

    #[test]
    fn workbook_strings_are_not_trimmed() {
        let cell = calamine::Data::String("  Hello  ".to_string());
        assert_eq!(cell_str(&cell), "  Hello  ");
    }

    #[test]
    fn whole_floats_render_without_decimal_point() {
        assert_eq!(cell_str(&calamine::Data::Float(3.0)), "3");
        assert_eq!(cell_str(&calamine::Data::Float(2.5)), "2.5");
        assert_eq!(cell_str(&calamine::Data::Empty), "");
    }
}
