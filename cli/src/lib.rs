//! Configuration and command handlers behind the `switchyard` binary.

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use switchyard_dal::{DalConfig, DalFactory, DalStatus, DataAdapter};
use switchyard_flags::{FlagConfig, FlagMap, FlagStore};
use switchyard_migrate::{
    BackupConfig, BackupOutcome, BackupService, MigrationOptions, MigrationPipeline,
    MigrationReport, RestoreOptions, RestoreReport, TableDescriptor,
};
use switchyard_model::{RuleSet, Validator};
use tracing::{info, warn};

/// A backend the commands can read from or write to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    Spreadsheet,
    Relational,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Backend::Spreadsheet => "spreadsheet",
            Backend::Relational => "relational",
        })
    }
}

/// One sheet to migrate. The destination defaults to the source name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMapping {
    pub source: String,
    #[serde(default)]
    pub destination: Option<String>,
}

impl TableMapping {
    fn destination(&self) -> &str {
        self.destination.as_deref().unwrap_or(&self.source)
    }

    fn descriptor(&self) -> TableDescriptor {
        TableDescriptor::new(&self.source, self.destination())
    }
}

/// `[migration]` section: pipeline options plus the table list and rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationSection {
    #[serde(flatten)]
    pub options: MigrationOptions,
    pub tables: Vec<TableMapping>,
    /// Validation rules keyed by destination entity.
    pub rules: RuleSet,
    /// Directory for per-table error logs. Unset disables them.
    pub error_log_dir: Option<PathBuf>,
}

/// Top-level configuration file. Every section is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchyardConfig {
    pub dal: DalConfig,
    pub flags: FlagConfig,
    pub migration: MigrationSection,
    pub backup: BackupConfig,
}

impl SwitchyardConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("invalid configuration")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Like [`load`](Self::load), but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }
}

/// Parses a `FROM=TO` restore rename.
pub fn parse_rename(arg: &str) -> Result<(String, String), String> {
    match arg.split_once('=') {
        Some((from, to)) if !from.trim().is_empty() && !to.trim().is_empty() => {
            Ok((from.trim().to_string(), to.trim().to_string()))
        }
        _ => Err(format!("expected FROM=TO, got {arg:?}")),
    }
}

/// The configured factory plus the command handlers.
pub struct App {
    config: SwitchyardConfig,
    factory: DalFactory,
}

impl App {
    /// Opens the flag store and builds whichever adapters the configuration allows.
    pub fn open(config: SwitchyardConfig) -> Result<Self> {
        let flags = FlagStore::open(config.flags.clone()).with_context(|| {
            format!("failed to open flag file {}", config.flags.path.display())
        })?;
        let factory = DalFactory::from_config(Arc::new(flags), &config.dal);
        Ok(Self::with_factory(config, factory))
    }

    pub fn with_factory(config: SwitchyardConfig, factory: DalFactory) -> Self {
        Self { config, factory }
    }

    pub fn config(&self) -> &SwitchyardConfig {
        &self.config
    }

    pub fn status(&self) -> DalStatus {
        self.factory.status()
    }

    pub fn flags(&self) -> FlagMap {
        self.factory.all_flags()
    }

    pub fn set_flag(&self, key: &str, enabled: bool) -> Result<()> {
        self.factory
            .set_flag(key, enabled)
            .with_context(|| format!("failed to set flag {key}"))
    }

    pub fn reload_flags(&self) -> Result<FlagMap> {
        self.factory.reload_flags().context("failed to reload flags")?;
        Ok(self.factory.all_flags())
    }

    fn adapter(&self, backend: Backend) -> Result<Arc<dyn DataAdapter>> {
        let adapter = match backend {
            Backend::Spreadsheet => self.factory.spreadsheet(),
            Backend::Relational => self.factory.relational(),
        };
        adapter
            .cloned()
            .ok_or_else(|| anyhow!("the {backend} adapter is unavailable"))
    }

    /// Migrates the configured tables (or the named subset) from the
    /// spreadsheet into the relational database.
    pub async fn migrate(&self, dry_run: bool, only: &[String]) -> Result<MigrationReport> {
        let section = &self.config.migration;
        let tables: Vec<TableDescriptor> = section
            .tables
            .iter()
            .filter(|t| {
                only.is_empty()
                    || only.iter().any(|n| *n == t.source || n == t.destination())
            })
            .map(TableMapping::descriptor)
            .collect();
        if tables.is_empty() {
            if only.is_empty() {
                bail!("no migration tables configured");
            }
            bail!("none of {only:?} is a configured migration table");
        }

        let source = self.adapter(Backend::Spreadsheet)?;
        let destination = self.adapter(Backend::Relational)?;
        let options = MigrationOptions {
            dry_run: dry_run || section.options.dry_run,
            ..section.options.clone()
        };
        let pipeline = MigrationPipeline::new(
            source,
            destination,
            Validator::new(section.rules.clone()),
            options,
        );
        let report = pipeline.migrate_all(&tables).await;

        if let Some(dir) = &section.error_log_dir {
            for (table, result) in &report.tables {
                if result.errors.is_empty() {
                    continue;
                }
                let path = dir.join(format!("{table}-errors.json"));
                result
                    .write_error_log(&path)
                    .with_context(|| format!("failed to write {}", path.display()))?;
            }
        }
        Ok(report)
    }

    /// Snapshots tables from `from` into a new backup artifact.
    pub async fn backup(
        &self,
        from: Backend,
        tables: &[String],
        compress: bool,
    ) -> Result<BackupOutcome> {
        let mut config = self.config.backup.clone();
        config.compress |= compress;
        if tables.is_empty() && config.tables.is_empty() {
            bail!("no tables to back up: pass --table or set backup.tables");
        }
        let service = BackupService::new(self.adapter(from)?, config);
        let outcome = service.backup(tables).await.context("backup failed")?;
        if !outcome.failed_tables.is_empty() {
            warn!(tables = ?outcome.failed_tables, "some tables could not be read");
        }
        Ok(outcome)
    }

    /// Restores an artifact into `into`.
    pub async fn restore(
        &self,
        path: &Path,
        into: Backend,
        options: &RestoreOptions,
    ) -> Result<RestoreReport> {
        let destination = self.adapter(into)?;
        let service = BackupService::new(Arc::clone(&destination), self.config.backup.clone());
        let report = service
            .restore(path, destination.as_ref(), options)
            .await
            .with_context(|| format!("failed to restore {}", path.display()))?;
        info!(
            path = %path.display(),
            restored = report.restored(),
            failed = report.failed(),
            "restore finished"
        );
        Ok(report)
    }
}
