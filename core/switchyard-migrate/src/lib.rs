//! Migration and backup for Switchyard.
//!
//! - [`MigrationPipeline`] moves tables from one adapter to another
//!   (normally spreadsheet → relational) through coercion and validation,
//!   isolating bad rows into the per-table [`MigrationResult`]
//! - [`BackupService`] writes point-in-time JSON snapshots, optionally zipped,
//!   keeps a bounded history, and restores snapshots into any adapter
//!
//! Both load data with the same batch-then-per-row fallback so one bad row
//! never costs the rest of its batch.

mod backup;
mod batch;
mod error;
mod migration;

pub use backup::{
    BackupConfig, BackupEntry, BackupOutcome, BackupService, BackupSnapshot, RestoreOptions,
    RestoreReport, SnapshotMetadata, TableRestore, TableSnapshot, ARCHIVE_ENTRY,
};
pub use batch::{insert_with_fallback, BatchSettings, ErrorEntry, InsertOutcome};
pub use error::{MigrateError, MigrateResult};
pub use migration::{
    MigrationOptions, MigrationPipeline, MigrationReport, MigrationResult, RecordTransform,
    TableDescriptor,
};
