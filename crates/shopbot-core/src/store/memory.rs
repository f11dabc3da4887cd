use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::{Result, RowStore, StoreError, Table};
use crate::io::atomic_write;

/// On-disk form of a whole workbook, used by `shopbot exec --fixture`.
///
/// ```yaml
/// sheets:
///   명단:
///     headers: [아이디, 이름]
///     rows:
///       - [u1, 하나]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub sheets: BTreeMap<String, Table>,
}

impl Fixture {
    pub fn load(path: &Path) -> crate::Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&data)?)
    }

    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let data = serde_yaml::to_string(self)?;
        atomic_write(path, data.as_bytes())
    }
}

#[derive(Debug, Default)]
struct Inner {
    sheets: BTreeMap<String, Table>,
    writes: usize,
    failing_writes: HashSet<usize>,
    fail_reads: bool,
    read_delay: Option<Duration>,
}

/// In-process [`RowStore`] with fault injection.
#[derive(Debug, Default)]
pub struct MemoryRowStore {
    inner: Mutex<Inner>,
}

impl MemoryRowStore {
    pub fn new(fixture: Fixture) -> Self {
        Self {
            inner: Mutex::new(Inner {
                sheets: fixture.sheets,
                ..Inner::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert_sheet(&self, name: &str, table: Table) {
        self.lock().sheets.insert(name.to_string(), table);
    }

    pub fn snapshot(&self) -> Fixture {
        Fixture {
            sheets: self.lock().sheets.clone(),
        }
    }

    /// Make the `n`th write call (zero-based, counted from store creation)
    /// fail with [`StoreError::Unavailable`] without applying anything.
    pub fn fail_write(&self, n: usize) {
        self.lock().failing_writes.insert(n);
    }

    /// Make every read fail with [`StoreError::Unavailable`].
    pub fn set_fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    /// Sleep this long before serving each read, so concurrent callers
    /// interleave the way they would against a remote store.
    pub fn set_read_delay(&self, delay: Duration) {
        self.lock().read_delay = Some(delay);
    }

    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    fn begin_write(inner: &mut Inner) -> Result<()> {
        let n = inner.writes;
        inner.writes += 1;
        if inner.failing_writes.contains(&n) {
            return Err(StoreError::Unavailable(format!("injected failure on write {n}")));
        }
        Ok(())
    }
}

fn sheet_mut<'a>(inner: &'a mut Inner, sheet: &str) -> Result<&'a mut Table> {
    inner
        .sheets
        .get_mut(sheet)
        .ok_or_else(|| StoreError::SheetNotFound(sheet.to_string()))
}

fn set_cell(table: &mut Table, row: usize, col: usize, value: &str) {
    if let Some(cells) = table.rows.get_mut(row) {
        if cells.len() <= col {
            cells.resize(col + 1, String::new());
        }
        cells[col] = value.to_string();
    }
}

#[async_trait]
impl RowStore for MemoryRowStore {
    async fn read_all_rows(&self, sheet: &str) -> Result<Table> {
        let delay = self.lock().read_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let inner = self.lock();
        if inner.fail_reads {
            return Err(StoreError::Unavailable("injected read failure".into()));
        }
        inner
            .sheets
            .get(sheet)
            .cloned()
            .ok_or_else(|| StoreError::SheetNotFound(sheet.to_string()))
    }

    async fn write_cell(&self, sheet: &str, row: usize, column: &str, value: &str) -> Result<()> {
        let mut inner = self.lock();
        Self::begin_write(&mut inner)?;
        let table = sheet_mut(&mut inner, sheet)?;
        let col = table.require_column(sheet, column)?;
        if row >= table.rows.len() {
            return Err(StoreError::Rejected(format!("row {row} out of range in '{sheet}'")));
        }
        set_cell(table, row, col, value);
        Ok(())
    }

    async fn write_row_fields(
        &self,
        sheet: &str,
        key_column: &str,
        key: &str,
        fields: &[(String, String)],
    ) -> Result<bool> {
        let mut inner = self.lock();
        Self::begin_write(&mut inner)?;
        let table = sheet_mut(&mut inner, sheet)?;
        let key_col = table.require_column(sheet, key_column)?;
        let cols = fields
            .iter()
            .map(|(name, _)| table.require_column(sheet, name))
            .collect::<Result<Vec<_>>>()?;
        let Some(row) = table.find(key_col, key) else {
            return Ok(false);
        };
        for (col, (_, value)) in cols.into_iter().zip(fields) {
            set_cell(table, row, col, value);
        }
        Ok(true)
    }
}
