//! In-memory adapter and spreadsheet service shared by the migration and
//! backup tests.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use switchyard_dal::{
    Capabilities, DalError, DalResult, DataAdapter, SheetData, SheetsClient,
};
use switchyard_model::{matches_filter, record_id, value_as_text, Filter, Record};

/// Adapter keeping tables in memory.
///
/// Records whose id is in `rejected` fail to insert, and a batch containing
/// one fails as a whole. Tables in `broken` cannot be read.
#[derive(Default)]
pub struct MemoryAdapter {
    tables: Mutex<HashMap<String, Vec<Record>>>,
    rejected: Mutex<HashSet<String>>,
    broken: Mutex<HashSet<String>>,
    batch_calls: AtomicUsize,
    create_calls: AtomicUsize,
    invalidations: AtomicUsize,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self, name: &str, rows: Vec<Record>) -> Self {
        self.tables.lock().unwrap().insert(name.to_string(), rows);
        self
    }

    pub fn reject_id(&self, id: &str) {
        self.rejected.lock().unwrap().insert(id.to_string());
    }

    pub fn break_table(&self, name: &str) {
        self.broken.lock().unwrap().insert(name.to_string());
    }

    pub fn rows(&self, name: &str) -> Vec<Record> {
        self.tables.lock().unwrap().get(name).cloned().unwrap_or_default()
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.lock().unwrap().contains_key(name)
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn invalidations(&self) -> usize {
        self.invalidations.load(Ordering::SeqCst)
    }

    fn check(&self, record: &Record) -> DalResult<()> {
        let id = record_id(record).unwrap_or_default();
        if self.rejected.lock().unwrap().contains(&id) {
            return Err(DalError::ExternalService(format!("constraint violation on {id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl DataAdapter for MemoryAdapter {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            batch_create: true,
            delete_all: true,
            transactions: false,
        }
    }

    async fn create(&self, entity: &str, record: Record) -> DalResult<Record> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.check(&record)?;
        self.tables
            .lock()
            .unwrap()
            .entry(entity.to_string())
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    async fn read(&self, entity: &str, filter: &Filter) -> DalResult<Vec<Record>> {
        if self.broken.lock().unwrap().contains(entity) {
            return Err(DalError::ExternalService(format!("{entity} is unreadable")));
        }
        let tables = self.tables.lock().unwrap();
        let rows = tables
            .get(entity)
            .ok_or_else(|| DalError::NotFound(format!("table {entity}")))?;
        Ok(rows.iter().filter(|r| matches_filter(r, filter)).cloned().collect())
    }

    async fn update(&self, entity: &str, id: &str, record: Record) -> DalResult<Record> {
        let mut tables = self.tables.lock().unwrap();
        let row = tables
            .get_mut(entity)
            .and_then(|rows| rows.iter_mut().find(|r| record_id(r).as_deref() == Some(id)))
            .ok_or_else(|| DalError::NotFound(format!("{entity} row {id}")))?;
        row.extend(record);
        Ok(row.clone())
    }

    async fn delete(&self, entity: &str, id: &str) -> DalResult<()> {
        let mut tables = self.tables.lock().unwrap();
        let rows = tables
            .get_mut(entity)
            .ok_or_else(|| DalError::NotFound(format!("table {entity}")))?;
        rows.retain(|r| record_id(r).as_deref() != Some(id));
        Ok(())
    }

    async fn batch_create(&self, entity: &str, records: Vec<Record>) -> DalResult<Vec<Record>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        for record in &records {
            self.check(record)?;
        }
        self.tables
            .lock()
            .unwrap()
            .entry(entity.to_string())
            .or_default()
            .extend(records.iter().cloned());
        Ok(records)
    }

    async fn delete_all(&self, entity: &str) -> DalResult<usize> {
        let mut tables = self.tables.lock().unwrap();
        Ok(tables.get_mut(entity).map_or(0, |rows| rows.drain(..).count()))
    }

    async fn invalidate(&self, _entity: &str) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

/// `count` rows with ids `r-0..`, a name and a numeric-looking rate string.
pub fn numbered_rows(count: usize) -> Vec<Record> {
    (0..count)
        .map(|i| record(json!({"id": format!("r-{i}"), "name": format!("row {i}"), "rate": format!("{}", i * 10)})))
        .collect()
}

/// Spreadsheet service whose appends fail when a row holds `reject`.
#[derive(Default)]
pub struct MemorySheets {
    sheets: Mutex<HashMap<String, SheetData>>,
    reject: Mutex<Option<String>>,
}

impl MemorySheets {
    pub fn reject_rows_containing(&self, text: &str) {
        *self.reject.lock().unwrap() = Some(text.to_string());
    }

    pub fn row_count(&self, sheet: &str) -> usize {
        self.sheets.lock().unwrap().get(sheet).map_or(0, |s| s.rows.len())
    }

    pub fn column(&self, sheet: &str, field: &str) -> Vec<Value> {
        let sheets = self.sheets.lock().unwrap();
        let Some(data) = sheets.get(sheet) else {
            return Vec::new();
        };
        let Some(idx) = data.header.iter().position(|f| f == field) else {
            return Vec::new();
        };
        data.rows.iter().map(|row| row[idx].clone()).collect()
    }
}

#[async_trait]
impl SheetsClient for MemorySheets {
    fn provider_name(&self) -> &'static str {
        "memory"
    }

    async fn fetch(&self, sheet: &str) -> DalResult<SheetData> {
        self.sheets
            .lock()
            .unwrap()
            .get(sheet)
            .cloned()
            .ok_or_else(|| DalError::NotFound(format!("sheet {sheet}")))
    }

    async fn append_rows(&self, sheet: &str, rows: Vec<Vec<Value>>) -> DalResult<()> {
        let reject = self.reject.lock().unwrap().clone();
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
        } else if let Some(slot) = data.rows.get_mut(row_number - 2) {
            *slot = values;
        }
        Ok(())
    }

    async fn delete_rows(&self, sheet: &str, start_row: usize, count: usize) -> DalResult<()> {
        let mut sheets = self.sheets.lock().unwrap();
        if let Some(data) = sheets.get_mut(sheet) {
            let start = start_row.saturating_sub(2).min(data.rows.len());
            let end = (start + count).min(data.rows.len());
            data.rows.drain(start..end);
        }
        Ok(())
    }

    async fn truncate(&self, sheet: &str) -> DalResult<()> {
        if let Some(data) = self.sheets.lock().unwrap().get_mut(sheet) {
            data.rows.clear();
        }
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
