//! Batch insert with per-row fallback, shared by migration and restore.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use switchyard_dal::DataAdapter;
use switchyard_model::Record;
use tracing::{debug, warn};

/// Batch size and pacing for destination inserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSettings {
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub row_delay: Duration,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            batch_delay: Duration::from_millis(500),
            row_delay: Duration::from_millis(100),
        }
    }
}

/// One entry of a migration or restore error log.
///
/// Row-level entries carry the 1-based source row and the record; validation
/// failures list every rule broken, insert failures carry the single error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row: Option<usize>,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ErrorEntry {
    pub fn invalid(row: usize, data: Record, errors: Vec<String>) -> Self {
        Self {
            row: Some(row),
            data: Value::Object(data),
            errors: Some(errors),
            error: None,
        }
    }

    pub fn insert_failed(row: usize, data: Record, error: String) -> Self {
        Self {
            row: Some(row),
            data: Value::Object(data),
            errors: None,
            error: Some(error),
        }
    }

    /// An error that stopped a whole table.
    pub fn table(error: String) -> Self {
        Self {
            row: None,
            data: Value::Null,
            errors: None,
            error: Some(error),
        }
    }
}

/// What an insert run achieved.
#[derive(Debug, Default)]
pub struct InsertOutcome {
    pub inserted: usize,
    pub failures: Vec<ErrorEntry>,
}

/// Inserts `rows` (source row number, record) into `entity` in batches.
///
/// A failed batch is retried one row at a time, so a single bad row costs
/// only itself. When the destination reports that a prefix of the batch was
/// stored before the failure, only the remainder is retried.
pub async fn insert_with_fallback(
    destination: &dyn DataAdapter,
    entity: &str,
    rows: Vec<(usize, Record)>,
    settings: &BatchSettings,
) -> InsertOutcome {
    let mut outcome = InsertOutcome::default();
    let batch_size = settings.batch_size.max(1);
    let bulk = destination.capabilities().batch_create;
    let batch_count = rows.len().div_ceil(batch_size);

    for (idx, batch) in rows.chunks(batch_size).enumerate() {
        if idx > 0 {
            tokio::time::sleep(settings.batch_delay).await;
        }

        let mut pending = batch;
        if bulk {
            let records = batch.iter().map(|(_, r)| r.clone()).collect();
            match destination.batch_create(entity, records).await {
                Ok(created) => {
                    outcome.inserted += created.len();
                    debug!(entity, batch = idx + 1, of = batch_count, "batch inserted");
                    continue;
                }
                Err(e) => {
                    let committed = e.committed().min(batch.len());
                    outcome.inserted += committed;
                    pending = &batch[committed..];
                    warn!(
                        entity,
                        batch = idx + 1,
                        rows = batch.len(),
                        committed,
                        error = %e,
                        "batch insert failed, retrying remaining rows one by one"
                    );
                }
            }
        }

        for (pos, (row, record)) in pending.iter().enumerate() {
            if pos > 0 {
                tokio::time::sleep(settings.row_delay).await;
            }
            match destination.create(entity, record.clone()).await {
                Ok(_) => outcome.inserted += 1,
                Err(e) => {
                    debug!(entity, row, error = %e, "row insert failed");
                    outcome
                        .failures
                        .push(ErrorEntry::insert_failed(*row, record.clone(), e.to_string()));
                }
            }
        }
    }
    outcome
}
