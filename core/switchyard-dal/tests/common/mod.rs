//! In-memory spreadsheet service shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use switchyard_dal::{
    DalError, DalResult, SheetData, SheetsClient, SpreadsheetAdapter, SpreadsheetConfig,
};
use switchyard_model::{value_as_text, Record};

/// Spreadsheet double that counts calls and can be slowed or broken.
#[derive(Default)]
pub struct MemorySheets {
    sheets: Mutex<HashMap<String, SheetData>>,
    fetches: AtomicUsize,
    appends: AtomicUsize,
    deletes: AtomicUsize,
    truncates: AtomicUsize,
    fetch_delay: Mutex<Option<Duration>>,
    fail_fetch: AtomicBool,
    reject_cell: Mutex<Option<String>>,
    no_bulk_append: bool,
    no_truncate: bool,
}

impl MemorySheets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends accept a single row per call.
    pub fn without_bulk_append(mut self) -> Self {
        self.no_bulk_append = true;
        self
    }

    /// Clearing a sheet has to go through `delete_rows`.
    pub fn without_truncate(mut self) -> Self {
        self.no_truncate = true;
        self
    }

    pub fn with_sheet(self, name: &str, header: &[&str], rows: Vec<Vec<Value>>) -> Self {
        self.put_sheet(name, header, rows);
        self
    }

    pub fn put_sheet(&self, name: &str, header: &[&str], rows: Vec<Vec<Value>>) {
        self.sheets.lock().unwrap().insert(
            name.to_string(),
            SheetData {
                header: header.iter().map(|h| h.to_string()).collect(),
                rows,
            },
        );
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = Some(delay);
    }

    pub fn fail_fetches(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    /// Any append containing a cell with this text fails.
    pub fn reject_rows_containing(&self, text: &str) {
        *self.reject_cell.lock().unwrap() = Some(text.to_string());
    }

    pub fn sheet(&self, name: &str) -> Option<SheetData> {
        self.sheets.lock().unwrap().get(name).cloned()
    }

    pub fn row_count(&self, name: &str) -> usize {
        self.sheet(name).map_or(0, |s| s.rows.len())
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn append_calls(&self) -> usize {
        self.appends.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn truncate_calls(&self) -> usize {
        self.truncates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SheetsClient for MemorySheets {
    fn provider_name(&self) -> &'static str {
        "memory"
    }

    fn supports_bulk_append(&self) -> bool {
        !self.no_bulk_append
    }

    fn supports_truncate(&self) -> bool {
        !self.no_truncate
    }

    async fn fetch(&self, sheet: &str) -> DalResult<SheetData> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let delay = *self.fetch_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(DalError::ExternalService("quota exceeded".into()));
        }
        self.sheet(sheet)
            .ok_or_else(|| DalError::NotFound(format!("sheet {sheet}")))
    }

    async fn append_rows(&self, sheet: &str, rows: Vec<Vec<Value>>) -> DalResult<()> {
        self.appends.fetch_add(1, Ordering::SeqCst);
        if rows.len() > 1 && self.no_bulk_append {
            return Err(DalError::ExternalService("bulk append unsupported".into()));
        }
        let reject = self.reject_cell.lock().unwrap().clone();
        if let Some(reject) = reject {
            if rows.iter().flatten().any(|cell| cell == &json!(reject)) {
                return Err(DalError::ExternalService(format!("rejected row with {reject}")));
            }
        }
        let mut sheets = self.sheets.lock().unwrap();
        let data = sheets
            .get_mut(sheet)
            .ok_or_else(|| DalError::NotFound(format!("sheet {sheet}")))?;
        data.rows.extend(rows);
        Ok(())
    }

    async fn update_row(&self, sheet: &str, row_number: usize, values: Vec<Value>) -> DalResult<()> {
        let mut sheets = self.sheets.lock().unwrap();
        let data = sheets
            .get_mut(sheet)
            .ok_or_else(|| DalError::NotFound(format!("sheet {sheet}")))?;
        if row_number == 1 {
            data.header = values.iter().map(value_as_text).collect();
            return Ok(());
        }
        let slot = row_number
            .checked_sub(2)
            .and_then(|idx| data.rows.get_mut(idx))
            .ok_or_else(|| DalError::NotFound(format!("row {row_number}")))?;
        *slot = values;
        Ok(())
    }

    async fn delete_rows(&self, sheet: &str, start_row: usize, count: usize) -> DalResult<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if start_row < 2 {
            return Err(DalError::Permission("header row".into()));
        }
        let mut sheets = self.sheets.lock().unwrap();
        let data = sheets
            .get_mut(sheet)
            .ok_or_else(|| DalError::NotFound(format!("sheet {sheet}")))?;
        let start = start_row - 2;
        let end = (start + count).min(data.rows.len());
        if start >= end {
            return Err(DalError::NotFound(format!("row {start_row}")));
        }
        data.rows.drain(start..end);
        Ok(())
    }

    async fn truncate(&self, sheet: &str) -> DalResult<()> {
        self.truncates.fetch_add(1, Ordering::SeqCst);
        let mut sheets = self.sheets.lock().unwrap();
        let data = sheets
            .get_mut(sheet)
            .ok_or_else(|| DalError::NotFound(format!("sheet {sheet}")))?;
        data.rows.clear();
        Ok(())
    }

    async fn ensure_sheet(&self, sheet: &str, header: &[String]) -> DalResult<bool> {
        let mut sheets = self.sheets.lock().unwrap();
        let data = sheets.entry(sheet.to_string()).or_default();
        if data.header.is_empty() && !header.is_empty() {
            data.header = header.to_vec();
            return Ok(true);
        }
        Ok(false)
    }
}

/// Adapter over `sheets` with no inter-chunk delays.
pub fn adapter(sheets: &Arc<MemorySheets>) -> SpreadsheetAdapter {
    adapter_with(sheets, quick_config())
}

pub fn adapter_with(sheets: &Arc<MemorySheets>, config: SpreadsheetConfig) -> SpreadsheetAdapter {
    let client: Arc<dyn SheetsClient> = sheets.clone();
    SpreadsheetAdapter::new(client, config)
}

pub fn quick_config() -> SpreadsheetConfig {
    SpreadsheetConfig {
        chunk_delay_ms: 0,
        delete_chunk_delay_ms: 0,
        ..Default::default()
    }
}

/// Three policy rows: two active, one retired.
pub fn policy_sheet() -> MemorySheets {
    MemorySheets::new().with_sheet(
        "policy",
        &["id", "name", "status", "rate"],
        vec![
            vec![json!("p-1"), json!("Basic"), json!("active"), json!(10)],
            vec![json!("p-2"), json!("Plus"), json!("active"), json!(20)],
            vec![json!("p-3"), json!("Legacy"), json!("retired"), json!(5)],
        ],
    )
}

/// Builds a record from a JSON object literal.
pub fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}
