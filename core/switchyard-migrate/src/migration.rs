//! Table-by-table migration from one adapter to another.
//!
//! Each table goes extract → transform → validate → load. Rows that fail
//! validation or insertion are counted and logged in the table's result;
//! only infrastructure failures (source unreadable, destination unusable)
//! abort a table, and `migrate_all` records those and moves on.

use crate::batch::{insert_with_fallback, BatchSettings, ErrorEntry};
use crate::error::MigrateResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use switchyard_dal::DataAdapter;
use switchyard_model::{Filter, Record, Validator};
use tracing::{info, warn};

/// Per-record hook run before validation. `None` skips the record.
pub type RecordTransform = Arc<dyn Fn(Record) -> Option<Record> + Send + Sync>;

/// One source → destination table mapping.
#[derive(Clone)]
pub struct TableDescriptor {
    pub source: String,
    pub destination: String,
    pub transform: Option<RecordTransform>,
}

impl fmt::Debug for TableDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableDescriptor")
            .field("source", &self.source)
            .field("destination", &self.destination)
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

impl TableDescriptor {
    pub fn new(source: &str, destination: &str) -> Self {
        Self {
            source: source.to_string(),
            destination: destination.to_string(),
            transform: None,
        }
    }

    /// Same entity name on both sides.
    pub fn same(name: &str) -> Self {
        Self::new(name, name)
    }

    pub fn with_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(Record) -> Option<Record> + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }
}

/// Migration pacing and behaviour switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationOptions {
    /// Validate only; nothing is written.
    pub dry_run: bool,
    pub batch_size: usize,
    pub batch_delay_ms: u64,
    pub row_delay_ms: u64,
    /// Pause between tables in `migrate_all`.
    pub table_delay_ms: u64,
    /// Drop the source adapter's cached snapshot before reading.
    pub fresh_reads: bool,
    /// Empty the destination table before loading, when it supports that.
    pub clear_destination: bool,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            batch_size: 100,
            batch_delay_ms: 500,
            row_delay_ms: 100,
            table_delay_ms: 1000,
            fresh_reads: false,
            clear_destination: false,
        }
    }
}

impl MigrationOptions {
    fn batch_settings(&self) -> BatchSettings {
        BatchSettings {
            batch_size: self.batch_size,
            batch_delay: Duration::from_millis(self.batch_delay_ms),
            row_delay: Duration::from_millis(self.row_delay_ms),
        }
    }
}

/// Counts and errors for one migrated table.
///
/// `total == success + failed + skipped` once a table has finished.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MigrationResult {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: Vec<ErrorEntry>,
}

impl MigrationResult {
    pub fn is_balanced(&self) -> bool {
        self.total == self.success + self.failed + self.skipped
    }

    /// The first `limit` errors, for display.
    pub fn error_preview(&self, limit: usize) -> &[ErrorEntry] {
        &self.errors[..self.errors.len().min(limit)]
    }

    /// Writes every error as a JSON array.
    pub fn write_error_log(&self, path: &Path) -> MigrateResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, serde_json::to_vec_pretty(&self.errors)?)?;
        info!(path = %path.display(), errors = self.errors.len(), "wrote migration error log");
        Ok(())
    }

    fn absorb(&mut self, other: MigrationResult) {
        self.total += other.total;
        self.success += other.success;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.errors.extend(other.errors);
    }
}

/// Results of a multi-table run, keyed by destination entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MigrationReport {
    pub tables: BTreeMap<String, MigrationResult>,
    /// Destinations whose run stopped on an infrastructure error.
    pub aborted: Vec<String>,
}

impl MigrationReport {
    pub fn total(&self) -> usize {
        self.tables.values().map(|r| r.total).sum()
    }

    pub fn success(&self) -> usize {
        self.tables.values().map(|r| r.success).sum()
    }

    pub fn failed(&self) -> usize {
        self.tables.values().map(|r| r.failed).sum()
    }

    pub fn skipped(&self) -> usize {
        self.tables.values().map(|r| r.skipped).sum()
    }

    /// True when nothing failed and no table was aborted.
    pub fn is_clean(&self) -> bool {
        self.aborted.is_empty() && self.failed() == 0
    }
}

/// Moves tables from a source adapter into a destination adapter.
pub struct MigrationPipeline {
    source: Arc<dyn DataAdapter>,
    destination: Arc<dyn DataAdapter>,
    validator: Validator,
    options: MigrationOptions,
}

impl MigrationPipeline {
    /// Validation rules are looked up by destination entity name.
    pub fn new(
        source: Arc<dyn DataAdapter>,
        destination: Arc<dyn DataAdapter>,
        validator: Validator,
        options: MigrationOptions,
    ) -> Self {
        Self {
            source,
            destination,
            validator,
            options,
        }
    }

    pub fn options(&self) -> &MigrationOptions {
        &self.options
    }

    /// Migrates one table.
    pub async fn migrate_table(&self, table: &TableDescriptor) -> MigrateResult<MigrationResult> {
        let dest = table.destination.as_str();
        info!(
            source = %table.source,
            destination = dest,
            dry_run = self.options.dry_run,
            "migrating table"
        );

        if self.options.fresh_reads {
            self.source.invalidate(&table.source).await;
        }
        let records = self.source.read(&table.source, &Filter::new()).await?;

        let mut result = MigrationResult {
            total: records.len(),
            ..Default::default()
        };
        let mut valid = Vec::with_capacity(records.len());

        for (idx, record) in records.into_iter().enumerate() {
            let row = idx + 1;
            let record = match &table.transform {
                Some(transform) => match transform(record) {
                    Some(record) => record,
                    None => {
                        result.skipped += 1;
                        continue;
                    }
                },
                None => record,
            };
            let record = self.validator.transform(dest, record);
            let outcome = self.validator.validate(dest, &record);
            if outcome.valid {
                valid.push((row, record));
            } else {
                result.failed += 1;
                result
                    .errors
                    .push(ErrorEntry::invalid(row, record, outcome.errors));
            }
        }

        if self.options.dry_run {
            result.skipped += valid.len();
            info!(
                destination = dest,
                would_insert = valid.len(),
                invalid = result.failed,
                "dry run complete"
            );
            return Ok(result);
        }

        if self.options.clear_destination {
            if self.destination.capabilities().delete_all {
                let removed = self.destination.delete_all(dest).await?;
                info!(destination = dest, removed, "cleared destination");
            } else {
                warn!(destination = dest, "destination cannot be cleared, loading on top");
            }
        }

        let outcome = insert_with_fallback(
            self.destination.as_ref(),
            dest,
            valid,
            &self.options.batch_settings(),
        )
        .await;
        result.success = outcome.inserted;
        result.failed += outcome.failures.len();
        result.errors.extend(outcome.failures);

        info!(
            destination = dest,
            total = result.total,
            success = result.success,
            failed = result.failed,
            skipped = result.skipped,
            "table migrated"
        );
        Ok(result)
    }

    /// Migrates tables in order. A table that fails outright is recorded and
    /// the run continues with the next one.
    pub async fn migrate_all(&self, tables: &[TableDescriptor]) -> MigrationReport {
        let mut report = MigrationReport::default();
        let delay = Duration::from_millis(self.options.table_delay_ms);

        for (idx, table) in tables.iter().enumerate() {
            if idx > 0 {
                tokio::time::sleep(delay).await;
            }
            let result = match self.migrate_table(table).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(
                        source = %table.source,
                        destination = %table.destination,
                        error = %e,
                        "table migration aborted"
                    );
                    report.aborted.push(table.destination.clone());
                    MigrationResult {
                        errors: vec![ErrorEntry::table(e.to_string())],
                        ..Default::default()
                    }
                }
            };
            report
                .tables
                .entry(table.destination.clone())
                .or_default()
                .absorb(result);
        }

        info!(
            tables = report.tables.len(),
            total = report.total(),
            success = report.success(),
            failed = report.failed(),
            aborted = report.aborted.len(),
            "migration finished"
        );
        report
    }
}
