//! Row-oriented external storage.
//!
//! [`RowStore`] is the raw capability a backend provides (a spreadsheet, or
//! [`MemoryRowStore`] in tests). [`StateStore`] sits on top of it and is the
//! only component that reads or writes bot state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod memory;
pub mod sheets;
pub mod state;

pub use memory::{Fixture, MemoryRowStore};
pub use sheets::SheetsRowStore;
pub use state::{StateStore, UserUpdate};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("row store unavailable: {0}")]
    Unavailable(String),

    #[error("row store request timed out")]
    Timeout,

    #[error("sheet '{0}' not found")]
    SheetNotFound(String),

    #[error("sheet '{sheet}' has no '{column}' column")]
    MissingColumn { sheet: String, column: String },

    #[error("row store rejected the request: {0}")]
    Rejected(String),
}

impl StoreError {
    /// Transient failures that are safe to retry for reads.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout)
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// One sheet: a header row plus data rows. Rows may be shorter than the
/// header; missing cells read as empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub headers: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h.trim() == name)
    }

    pub fn require_column(&self, sheet: &str, name: &str) -> Result<usize> {
        self.column(name).ok_or_else(|| StoreError::MissingColumn {
            sheet: sheet.to_string(),
            column: name.to_string(),
        })
    }

    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Index of the first data row whose `col` cell equals `key` (trimmed).
    pub fn find(&self, col: usize, key: &str) -> Option<usize> {
        let key = key.trim();
        (0..self.rows.len()).find(|i| self.cell(*i, col).trim() == key)
    }

    /// The data row at `idx` as header → value pairs.
    pub fn record(&self, idx: usize) -> Row {
        Row {
            index: idx,
            fields: self
                .headers
                .iter()
                .enumerate()
                .map(|(col, h)| (h.trim().to_string(), self.cell(idx, col).to_string()))
                .collect(),
        }
    }
}

/// A data row keyed by header name. `index` is zero-based over data rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub index: usize,
    pub fields: Vec<(String, String)>,
}

impl Row {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(h, _)| h == column)
            .map(|(_, v)| v.as_str())
    }
}

/// Raw capability surface of the external row store.
#[async_trait]
pub trait RowStore: Send + Sync {
    async fn read_all_rows(&self, sheet: &str) -> Result<Table>;

    async fn find_row_by_key(
        &self,
        sheet: &str,
        key_column: &str,
        key: &str,
    ) -> Result<Option<Row>> {
        let table = self.read_all_rows(sheet).await?;
        let col = table.require_column(sheet, key_column)?;
        Ok(table.find(col, key).map(|idx| table.record(idx)))
    }

    /// Overwrite a single cell. `row` is a zero-based data row index, `column`
    /// a header name.
    async fn write_cell(&self, sheet: &str, row: usize, column: &str, value: &str) -> Result<()>;

    /// Overwrite several cells of the row whose `key_column` equals `key` in
    /// one remote operation: either every field is written or none is.
    /// Returns `false` when no row has that key.
    async fn write_row_fields(
        &self,
        sheet: &str,
        key_column: &str,
        key: &str,
        fields: &[(String, String)],
    ) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Table {
        Table {
            headers: vec!["아이디".into(), " 이름 ".into()],
            rows: vec![vec!["u1".into(), "하나".into()], vec!["u2".into()]],
        }
    }

    #[test]
    fn short_rows_read_as_empty() {
        let t = table();
        assert_eq!(t.cell(1, 1), "");
        assert_eq!(t.cell(9, 0), "");
    }

    #[test]
    fn headers_are_trimmed_for_lookup() {
        let t = table();
        assert_eq!(t.column("이름"), Some(1));
        assert!(matches!(
            t.require_column("명단", "소지금"),
            Err(StoreError::MissingColumn { .. })
        ));
    }

    #[test]
    fn record_pairs_headers_and_cells() {
        let t = table();
        let idx = t.find(0, " u1 ").unwrap();
        let row = t.record(idx);
        assert_eq!(row.get("이름"), Some("하나"));
        assert_eq!(row.index, 0);
    }

    #[test]
    fn retryable_kinds() {
        assert!(StoreError::Timeout.is_retryable());
        assert!(!StoreError::Rejected("bad range".into()).is_retryable());
        assert!(!StoreError::SheetNotFound("x".into()).is_retryable());
    }
}
