//! Snapshot backup and restore.
//!
//! A backup reads every selected table through an adapter and writes one JSON
//! artifact (optionally zipped) into the backup directory, then prunes old
//! artifacts down to the retention count. Restore loads an artifact and
//! inserts each table through the same batch-then-per-row path as migration.

use crate::batch::{insert_with_fallback, BatchSettings, ErrorEntry};
use crate::error::{MigrateError, MigrateResult};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use switchyard_dal::DataAdapter;
use switchyard_model::{Filter, Record};
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

/// Name of the single entry inside a zipped artifact.
pub const ARCHIVE_ENTRY: &str = "backup.json";

const FILE_PREFIX: &str = "backup-";

/// Backup location, table set, retention and restore pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    pub dir: PathBuf,
    /// Tables backed up when the caller names none.
    pub tables: Vec<String>,
    /// Artifacts kept after a backup; older ones are deleted.
    pub retention: usize,
    pub compress: bool,
    pub batch_size: usize,
    pub batch_delay_ms: u64,
    pub row_delay_ms: u64,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("backups"),
            tables: Vec::new(),
            retention: 10,
            compress: false,
            batch_size: 100,
            batch_delay_ms: 500,
            row_delay_ms: 100,
        }
    }
}

/// Artifact header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    pub timestamp: String,
    pub version: String,
    pub tables: Vec<String>,
    pub total_rows: usize,
}

/// One table inside an artifact. A table that could not be read carries
/// `error` and no rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSnapshot {
    pub table_name: String,
    pub row_count: usize,
    #[serde(default)]
    pub data: Vec<Record>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A full backup artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupSnapshot {
    pub metadata: SnapshotMetadata,
    pub data: BTreeMap<String, TableSnapshot>,
}

impl BackupSnapshot {
    /// Tables that were read without error.
    pub fn healthy_tables(&self) -> impl Iterator<Item = &TableSnapshot> {
        self.data.values().filter(|t| t.error.is_none())
    }
}

/// Where a backup landed and what it left behind.
#[derive(Debug, Clone)]
pub struct BackupOutcome {
    pub path: PathBuf,
    pub metadata: SnapshotMetadata,
    pub failed_tables: Vec<String>,
    pub pruned: Vec<PathBuf>,
    /// Set when the artifact was written but retention pruning failed.
    pub prune_error: Option<String>,
}

impl BackupOutcome {
    fn new(path: PathBuf, snapshot: BackupSnapshot, pruned: MigrateResult<Vec<PathBuf>>) -> Self {
        let failed_tables = snapshot
            .data
            .values()
            .filter(|t| t.error.is_some())
            .map(|t| t.table_name.clone())
            .collect();
        let (pruned, prune_error) = match pruned {
            Ok(pruned) => (pruned, None),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "backup written but pruning failed");
                (Vec::new(), Some(e.to_string()))
            }
        };
        Self {
            path,
            metadata: snapshot.metadata,
            failed_tables,
            pruned,
            prune_error,
        }
    }
}

/// An artifact found in the backup directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    pub path: PathBuf,
    pub modified: SystemTime,
    pub size: u64,
    pub compressed: bool,
}

/// Restore selection and target naming.
#[derive(Debug, Clone, Default)]
pub struct RestoreOptions {
    /// Tables to restore; empty means every table in the artifact.
    pub tables: Vec<String>,
    /// Count rows without writing.
    pub dry_run: bool,
    /// Artifact table name → destination entity.
    pub rename: BTreeMap<String, String>,
}

/// Outcome of restoring one table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableRestore {
    pub destination: String,
    /// Rows in the artifact for this table.
    pub expected: usize,
    pub restored: usize,
    pub failed: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
    #[serde(default)]
    pub errors: Vec<ErrorEntry>,
}

/// Outcome of a restore run, keyed by artifact table name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RestoreReport {
    pub dry_run: bool,
    pub tables: BTreeMap<String, TableRestore>,
}

impl RestoreReport {
    pub fn restored(&self) -> usize {
        self.tables.values().map(|t| t.restored).sum()
    }

    pub fn failed(&self) -> usize {
        self.tables.values().map(|t| t.failed).sum()
    }

    pub fn skipped_tables(&self) -> Vec<&str> {
        self.tables
            .iter()
            .filter(|(_, t)| t.skipped.is_some())
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Writes, lists, prunes and restores snapshot artifacts.
pub struct BackupService {
    source: Arc<dyn DataAdapter>,
    config: BackupConfig,
}

impl BackupService {
    pub fn new(source: Arc<dyn DataAdapter>, config: BackupConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    /// Reads `tables` (or the configured set when empty) into a snapshot.
    /// Per-table read failures are recorded in the snapshot, not raised.
    pub async fn snapshot(&self, tables: &[String]) -> BackupSnapshot {
        let tables = if tables.is_empty() {
            self.config.tables.clone()
        } else {
            tables.to_vec()
        };

        let mut data = BTreeMap::new();
        let mut total_rows = 0;
        for table in &tables {
            let snapshot = match self.source.read(table, &Filter::new()).await {
                Ok(rows) => {
                    total_rows += rows.len();
                    debug!(table = %table, rows = rows.len(), "table read for backup");
                    TableSnapshot {
                        table_name: table.clone(),
                        row_count: rows.len(),
                        data: rows,
                        error: None,
                    }
                }
                Err(e) => {
                    warn!(table = %table, error = %e, "table backup failed");
                    TableSnapshot {
                        table_name: table.clone(),
                        row_count: 0,
                        data: Vec::new(),
                        error: Some(e.to_string()),
                    }
                }
            };
            data.insert(table.clone(), snapshot);
        }

        BackupSnapshot {
            metadata: SnapshotMetadata {
                timestamp: Utc::now().to_rfc3339(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                tables,
                total_rows,
            },
            data,
        }
    }

    /// Takes a snapshot, writes it and prunes old artifacts.
    ///
    /// Only a failure to write the artifact is an error. A pruning failure is
    /// reported in [`BackupOutcome::prune_error`].
    pub async fn backup(&self, tables: &[String]) -> MigrateResult<BackupOutcome> {
        let snapshot = self.snapshot(tables).await;
        let path = self.write_artifact(&snapshot)?;
        info!(
            path = %path.display(),
            tables = snapshot.metadata.tables.len(),
            rows = snapshot.metadata.total_rows,
            "backup written"
        );
        let pruned = self.prune();
        Ok(BackupOutcome::new(path, snapshot, pruned))
    }

    /// Writes `snapshot` as a new artifact in the backup directory.
    pub fn write_artifact(&self, snapshot: &BackupSnapshot) -> MigrateResult<PathBuf> {
        fs::create_dir_all(&self.config.dir)?;
        let json = serde_json::to_vec_pretty(snapshot)?;
        let extension = if self.config.compress { "zip" } else { "json" };
        let path = self.fresh_path(extension);

        if self.config.compress {
            let mut zip = ZipWriter::new(fs::File::create(&path)?);
            let options =
                SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
            zip.start_file(ARCHIVE_ENTRY, options)?;
            zip.write_all(&json)?;
            zip.finish()?;
        } else {
            fs::write(&path, json)?;
        }
        Ok(path)
    }

    fn fresh_path(&self, extension: &str) -> PathBuf {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%3fZ");
        let mut path = self
            .config
            .dir
            .join(format!("{FILE_PREFIX}{stamp}.{extension}"));
        let mut n = 1;
        while path.exists() {
            path = self
                .config
                .dir
                .join(format!("{FILE_PREFIX}{stamp}-{n}.{extension}"));
            n += 1;
        }
        path
    }

    /// Artifacts in the backup directory, newest first.
    pub fn list_backups(&self) -> MigrateResult<Vec<BackupEntry>> {
        let entries = match fs::read_dir(&self.config.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut backups = Vec::new();
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.starts_with(FILE_PREFIX) {
                continue;
            }
            let compressed = name.ends_with(".zip");
            if !compressed && !name.ends_with(".json") {
                continue;
            }
            let meta = entry.metadata()?;
            if !meta.is_file() {
                continue;
            }
            backups.push(BackupEntry {
                path,
                modified: meta.modified()?,
                size: meta.len(),
                compressed,
            });
        }
        // Stems carry the timestamp (plus a collision suffix), so they break mtime ties.
        backups.sort_by(|a, b| {
            b.modified
                .cmp(&a.modified)
                .then_with(|| b.path.file_stem().cmp(&a.path.file_stem()))
        });
        Ok(backups)
    }

    /// Deletes artifacts beyond the retention count, oldest first.
    pub fn prune(&self) -> MigrateResult<Vec<PathBuf>> {
        let mut removed = Vec::new();
        for entry in self.list_backups()?.into_iter().skip(self.config.retention) {
            fs::remove_file(&entry.path)?;
            debug!(path = %entry.path.display(), "pruned backup");
            removed.push(entry.path);
        }
        if !removed.is_empty() {
            info!(count = removed.len(), "pruned old backups");
        }
        Ok(removed)
    }

    /// Reads an artifact, unzipping it when needed.
    pub fn load_snapshot(path: &Path) -> MigrateResult<BackupSnapshot> {
        let bytes = fs::read(path)?;
        let json = if bytes.starts_with(b"PK") {
            let mut archive = ZipArchive::new(std::io::Cursor::new(bytes))?;
            let mut entry = match archive.by_name(ARCHIVE_ENTRY) {
                Ok(entry) => entry,
                Err(zip::result::ZipError::FileNotFound) => {
                    return Err(MigrateError::MissingEntry(ARCHIVE_ENTRY.to_string()));
                }
                Err(e) => return Err(e.into()),
            };
            let mut json = Vec::new();
            entry.read_to_end(&mut json)?;
            json
        } else {
            bytes
        };
        serde_json::from_slice(&json)
            .map_err(|e| MigrateError::InvalidSnapshot(format!("{}: {e}", path.display())))
    }

    /// Restores an artifact into `destination`.
    pub async fn restore(
        &self,
        path: &Path,
        destination: &dyn DataAdapter,
        options: &RestoreOptions,
    ) -> MigrateResult<RestoreReport> {
        let snapshot = Self::load_snapshot(path)?;
        let selected: Vec<String> = if options.tables.is_empty() {
            snapshot.data.keys().cloned().collect()
        } else {
            options.tables.clone()
        };
        let settings = BatchSettings {
            batch_size: self.config.batch_size,
            batch_delay: Duration::from_millis(self.config.batch_delay_ms),
            row_delay: Duration::from_millis(self.config.row_delay_ms),
        };

        let mut report = RestoreReport {
            dry_run: options.dry_run,
            ..Default::default()
        };
        for table in selected {
            let target = options.rename.get(&table).cloned().unwrap_or_else(|| table.clone());
            let mut outcome = TableRestore {
                destination: target.clone(),
                ..Default::default()
            };

            let Some(stored) = snapshot.data.get(&table) else {
                warn!(table = %table, "table not in backup, skipping");
                outcome.skipped = Some("not present in backup".to_string());
                report.tables.insert(table, outcome);
                continue;
            };
            if let Some(error) = &stored.error {
                warn!(table = %table, error = %error, "table failed at backup time, skipping");
                outcome.skipped = Some(format!("backup error: {error}"));
                report.tables.insert(table, outcome);
                continue;
            }

            outcome.expected = stored.data.len();
            if options.dry_run {
                info!(table = %table, destination = %target, rows = outcome.expected, "dry run: would restore");
                report.tables.insert(table, outcome);
                continue;
            }

            let rows = stored.data.iter().cloned().enumerate().map(|(i, r)| (i + 1, r)).collect();
            let inserted = insert_with_fallback(destination, &target, rows, &settings).await;
            outcome.restored = inserted.inserted;
            outcome.failed = inserted.failures.len();
            outcome.errors = inserted.failures;
            info!(
                table = %table,
                destination = %target,
                restored = outcome.restored,
                failed = outcome.failed,
                "table restored"
            );
            report.tables.insert(table, outcome);
        }
        Ok(report)
    }
}
