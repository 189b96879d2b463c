//! Spreadsheet adapter.
//!
//! Reads go through a per-sheet snapshot cache with single-flight fetches and
//! are filtered in memory. Writes address rows directly and invalidate the
//! sheet's cache namespace on success. Fields without a column get one
//! appended to the header row before the write. Bulk inserts and bulk deletes are
//! chunked with a fixed delay between chunks to stay under the upstream rate
//! limits.

use super::cache::{CacheStatsSnapshot, SnapshotCache};
use super::client::{SheetData, SheetsClient};
use super::google::{GoogleSheetsClient, GoogleSheetsConfig};
use super::rows::{record_to_row, row_to_record, sheet_records};
use crate::adapter::{Capabilities, DataAdapter, NameMapping};
use crate::error::{DalError, DalResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use switchyard_model::{matches_filter, record_id, values_match, Filter, Record, ID_FIELD};
use tracing::{debug, info};
use uuid::Uuid;

/// Caching, chunking and naming for the spreadsheet adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpreadsheetConfig {
    /// How long a sheet snapshot is served from cache.
    pub cache_ttl_secs: u64,
    /// Rows per bulk-insert chunk.
    pub chunk_size: usize,
    /// Pause between bulk-insert chunks.
    pub chunk_delay_ms: u64,
    /// Rows per delete call when the sheet cannot be truncated in one call.
    pub delete_chunk_size: usize,
    /// Pause between delete chunks.
    pub delete_chunk_delay_ms: u64,
    /// Logical entity → sheet title overrides.
    pub table_names: NameMapping,
}

impl Default for SpreadsheetConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 300,
            chunk_size: 50,
            chunk_delay_ms: 1000,
            delete_chunk_size: 5,
            delete_chunk_delay_ms: 500,
            table_names: NameMapping::default(),
        }
    }
}

/// One cached sheet: its header plus every data row as a record.
#[derive(Debug, Clone, Default)]
pub struct SheetSnapshot {
    pub header: Vec<String>,
    pub records: Vec<Record>,
}

impl From<SheetData> for SheetSnapshot {
    fn from(data: SheetData) -> Self {
        let records = sheet_records(&data);
        Self {
            header: data.header,
            records,
        }
    }
}

/// CRUD over a remote spreadsheet, one sheet per entity.
pub struct SpreadsheetAdapter {
    client: Arc<dyn SheetsClient>,
    config: SpreadsheetConfig,
    cache: SnapshotCache<SheetSnapshot>,
}

impl SpreadsheetAdapter {
    pub fn new(client: Arc<dyn SheetsClient>, config: SpreadsheetConfig) -> Self {
        let cache = SnapshotCache::new(Duration::from_secs(config.cache_ttl_secs));
        Self {
            client,
            config,
            cache,
        }
    }

    /// Builds the adapter over Google Sheets. Fails with `Configuration` when
    /// credentials are missing.
    pub fn from_config(google: &GoogleSheetsConfig, config: &SpreadsheetConfig) -> DalResult<Self> {
        let client = GoogleSheetsClient::new(google.clone())?;
        info!(
            spreadsheet = %google.spreadsheet_id,
            "spreadsheet adapter ready"
        );
        Ok(Self::new(Arc::new(client), config.clone()))
    }

    pub fn client(&self) -> &Arc<dyn SheetsClient> {
        &self.client
    }

    pub fn cache_stats(&self) -> CacheStatsSnapshot {
        self.cache.stats()
    }

    fn sheet<'a>(&'a self, entity: &'a str) -> &'a str {
        self.config.table_names.physical(entity)
    }

    /// Full-sheet snapshot through the cache.
    async fn snapshot(&self, sheet: &str) -> DalResult<Arc<SheetSnapshot>> {
        let client = Arc::clone(&self.client);
        let owned = sheet.to_string();
        self.cache
            .get_or_fetch(&cache_key(sheet), move || async move {
                let data = client.fetch(&owned).await?;
                Ok(SheetSnapshot::from(data))
            })
            .await
    }

    /// Header for a write of `fields`. Creates the sheet and header row when
    /// either is missing, and adds a column for every field the header lacks.
    async fn header_for_write(&self, sheet: &str, fields: Vec<String>) -> DalResult<Vec<String>> {
        let existing = match self.snapshot(sheet).await {
            Ok(snapshot) => Some(snapshot.header.clone()),
            Err(DalError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };
        if let Some(header) = existing.filter(|h| h.iter().any(|f| !f.is_empty())) {
            if missing_columns(&header, &fields).is_empty() {
                return Ok(header);
            }
            // The cached header may be stale; widen what the sheet has now.
            let current = self.client.fetch(sheet).await?.header;
            return self.widen_header(sheet, current, &fields).await;
        }
        self.client.ensure_sheet(sheet, &fields).await?;
        self.invalidate_sheet(sheet);
        info!(sheet, fields = fields.len(), "initialized sheet header");
        Ok(fields)
    }

    /// Appends columns for `fields` missing from `header` and rewrites the
    /// header row.
    async fn widen_header(
        &self,
        sheet: &str,
        mut header: Vec<String>,
        fields: &[String],
    ) -> DalResult<Vec<String>> {
        let missing = missing_columns(&header, fields);
        if missing.is_empty() {
            return Ok(header);
        }
        header.extend(missing.iter().cloned());
        let row = header.iter().map(|f| Value::String(f.clone())).collect();
        self.client.update_row(sheet, 1, row).await?;
        self.invalidate_sheet(sheet);
        info!(sheet, added = ?missing, "added header columns");
        Ok(header)
    }

    /// Uncached read used to locate a row before a positional write.
    async fn locate(&self, sheet: &str, id: &str) -> DalResult<(SheetData, usize)> {
        let data = self.client.fetch(sheet).await?;
        let id_col = data
            .header
            .iter()
            .position(|f| f == ID_FIELD)
            .ok_or_else(|| DalError::NotFound(format!("sheet {sheet} has no {ID_FIELD} column")))?;
        let target = Value::String(id.to_string());
        let index = data
            .rows
            .iter()
            .position(|row| row.get(id_col).is_some_and(|cell| values_match(cell, &target)))
            .ok_or_else(|| DalError::NotFound(format!("{sheet} row {id}")))?;
        Ok((data, index))
    }

    fn invalidate_sheet(&self, sheet: &str) {
        self.cache.invalidate_prefix(&namespace(sheet));
    }

    /// Appends `rows` chunk by chunk. A failure after some rows landed is
    /// reported as `PartialWrite` with the number already appended.
    async fn append_chunks(&self, sheet: &str, rows: Vec<Vec<Value>>) -> DalResult<()> {
        let chunk_size = self.config.chunk_size.max(1);
        let delay = Duration::from_millis(self.config.chunk_delay_ms);
        let bulk = self.client.supports_bulk_append();
        let chunk_count = rows.len().div_ceil(chunk_size);
        let mut committed = 0;

        let partial = |committed: usize, cause: DalError| {
            if committed == 0 {
                cause
            } else {
                DalError::PartialWrite {
                    committed,
                    cause: Box::new(cause),
                }
            }
        };

        for (idx, chunk) in rows.chunks(chunk_size).enumerate() {
            if idx > 0 {
                tokio::time::sleep(delay).await;
            }
            if bulk {
                self.client
                    .append_rows(sheet, chunk.to_vec())
                    .await
                    .map_err(|e| partial(committed, e))?;
                committed += chunk.len();
            } else {
                for row in chunk {
                    self.client
                        .append_rows(sheet, vec![row.clone()])
                        .await
                        .map_err(|e| partial(committed, e))?;
                    committed += 1;
                }
            }
            debug!(sheet, chunk = idx + 1, of = chunk_count, "appended chunk");
        }
        Ok(())
    }

    async fn delete_in_chunks(&self, sheet: &str, row_count: usize) -> DalResult<()> {
        let chunk_size = self.config.delete_chunk_size.max(1);
        let delay = Duration::from_millis(self.config.delete_chunk_delay_ms);
        // Bottom-up, so the rows still to be deleted never shift.
        let mut remaining = row_count;
        while remaining > 0 {
            let count = remaining.min(chunk_size);
            let start = SheetData::row_number(remaining - count);
            self.client.delete_rows(sheet, start, count).await?;
            remaining -= count;
            if remaining > 0 {
                tokio::time::sleep(delay).await;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DataAdapter for SpreadsheetAdapter {
    fn backend_name(&self) -> &'static str {
        "spreadsheet"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            batch_create: true,
            delete_all: true,
            transactions: false,
        }
    }

    async fn create(&self, entity: &str, record: Record) -> DalResult<Record> {
        let sheet = self.sheet(entity);
        let record = with_id(record);
        let header = self.header_for_write(sheet, fields_of(&record)).await?;
        let row = record_to_row(&header, &record);

        self.client.append_rows(sheet, vec![row.clone()]).await?;
        self.invalidate_sheet(sheet);
        debug!(sheet, "created row");
        Ok(row_to_record(&header, &row))
    }

    async fn read(&self, entity: &str, filter: &Filter) -> DalResult<Vec<Record>> {
        let snapshot = self.snapshot(self.sheet(entity)).await?;
        Ok(snapshot
            .records
            .iter()
            .filter(|record| matches_filter(record, filter))
            .cloned()
            .collect())
    }

    async fn update(&self, entity: &str, id: &str, record: Record) -> DalResult<Record> {
        let sheet = self.sheet(entity);
        let (data, index) = self.locate(sheet, id).await?;

        let mut merged = row_to_record(&data.header, &data.rows[index]);
        for (field, value) in record {
            if field != ID_FIELD {
                merged.insert(field, value);
            }
        }
        let header = self.widen_header(sheet, data.header, &fields_of(&merged)).await?;
        let row = record_to_row(&header, &merged);
        self.client
            .update_row(sheet, SheetData::row_number(index), row.clone())
            .await?;
        self.invalidate_sheet(sheet);
        debug!(sheet, id, "updated row");
        Ok(row_to_record(&header, &row))
    }

    async fn delete(&self, entity: &str, id: &str) -> DalResult<()> {
        let sheet = self.sheet(entity);
        let (_, index) = self.locate(sheet, id).await?;
        self.client
            .delete_rows(sheet, SheetData::row_number(index), 1)
            .await?;
        self.invalidate_sheet(sheet);
        debug!(sheet, id, "deleted row");
        Ok(())
    }

    async fn batch_create(&self, entity: &str, records: Vec<Record>) -> DalResult<Vec<Record>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let sheet = self.sheet(entity);
        let records: Vec<Record> = records.into_iter().map(with_id).collect();

        let mut fields = Vec::new();
        for record in &records {
            for field in record.keys() {
                if !fields.contains(field) {
                    fields.push(field.clone());
                }
            }
        }
        let header = self.header_for_write(sheet, fields).await?;
        let rows: Vec<Vec<Value>> = records.iter().map(|r| record_to_row(&header, r)).collect();

        let outcome = self.append_chunks(sheet, rows.clone()).await;
        // Earlier chunks may have landed even when a later one failed.
        self.invalidate_sheet(sheet);
        outcome?;

        info!(sheet, count = rows.len(), "batch created rows");
        Ok(rows.iter().map(|row| row_to_record(&header, row)).collect())
    }

    async fn delete_all(&self, entity: &str) -> DalResult<usize> {
        let sheet = self.sheet(entity);
        let row_count = match self.client.fetch(sheet).await {
            Ok(data) => data.rows.len(),
            Err(DalError::NotFound(_)) => return Ok(0),
            Err(e) => return Err(e),
        };
        if row_count == 0 {
            return Ok(0);
        }

        let outcome = if self.client.supports_truncate() {
            self.client.truncate(sheet).await
        } else {
            self.delete_in_chunks(sheet, row_count).await
        };
        self.invalidate_sheet(sheet);
        outcome?;

        info!(sheet, rows = row_count, "cleared sheet");
        Ok(row_count)
    }

    async fn invalidate(&self, entity: &str) {
        self.invalidate_sheet(self.sheet(entity));
    }
}

fn cache_key(sheet: &str) -> String {
    format!("{sheet}:all")
}

fn namespace(sheet: &str) -> String {
    format!("{sheet}:")
}

/// Ensures the record carries an identifier, placing a generated one first.
fn with_id(record: Record) -> Record {
    if record_id(&record).is_some() {
        return record;
    }
    let mut out = Record::new();
    out.insert(ID_FIELD.to_string(), Value::String(Uuid::now_v7().to_string()));
    for (field, value) in record {
        if field != ID_FIELD {
            out.insert(field, value);
        }
    }
    out
}

fn fields_of(record: &Record) -> Vec<String> {
    record.keys().cloned().collect()
}

/// Fields with no column in `header`, in first-seen order.
fn missing_columns(header: &[String], fields: &[String]) -> Vec<String> {
    let mut missing: Vec<String> = Vec::new();
    for field in fields {
        if !field.is_empty() && !header.contains(field) && !missing.contains(field) {
            missing.push(field.clone());
        }
    }
    missing
}
