//! JSON-file backed flag store.

use crate::error::{FlagError, FlagResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Environment variable prefix for mode defaults (`SWITCHYARD_USE_DB_POLICY`).
pub const DEFAULT_ENV_PREFIX: &str = "SWITCHYARD_USE_DB_";

/// Flag key → enabled.
pub type FlagMap = BTreeMap<String, bool>;

/// Looks up an environment variable by name.
pub type EnvSource = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Flag store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlagConfig {
    /// Location of the persisted flag file.
    pub path: PathBuf,
    /// Top-level mode keys that get an environment-derived default.
    pub modes: Vec<String>,
    /// Prefix prepended to the upper-cased mode name to form the env var.
    pub env_prefix: String,
}

impl Default for FlagConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("switchyard-flags.json"),
            modes: Vec::new(),
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
        }
    }
}

/// Persisted boolean routing table with hierarchical key resolution.
pub struct FlagStore {
    config: FlagConfig,
    env: EnvSource,
    flags: RwLock<FlagMap>,
}

impl std::fmt::Debug for FlagStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlagStore")
            .field("config", &self.config)
            .field("flags", &self.all())
            .finish()
    }
}

impl FlagStore {
    /// Opens the store, reading defaults from the process environment.
    ///
    /// If the flag file does not exist it is created, seeded with the
    /// environment defaults.
    pub fn open(config: FlagConfig) -> FlagResult<Self> {
        Self::with_env(config, Arc::new(|name: &str| std::env::var(name).ok()))
    }

    /// Opens the store with an explicit environment lookup.
    pub fn with_env(config: FlagConfig, env: EnvSource) -> FlagResult<Self> {
        let store = Self {
            config,
            env,
            flags: RwLock::new(FlagMap::new()),
        };
        let flags = store.derive_flags(true)?;
        *store.flags.write().unwrap_or_else(PoisonError::into_inner) = flags;
        Ok(store)
    }

    /// Path of the persisted flag file.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Resolves a key: exact match, else the part before the first `:`, else `false`.
    pub fn is_enabled(&self, key: &str) -> bool {
        let flags = self.flags.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(value) = flags.get(key) {
            return *value;
        }
        key.split_once(':')
            .and_then(|(parent, _)| flags.get(parent).copied())
            .unwrap_or(false)
    }

    /// Snapshot of every flag currently held.
    pub fn all(&self) -> FlagMap {
        self.flags
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Sets one flag and persists the full map.
    pub fn set_flag(&self, key: &str, value: bool) -> FlagResult<()> {
        check_key(key)?;
        let snapshot = {
            let mut flags = self.flags.write().unwrap_or_else(PoisonError::into_inner);
            flags.insert(key.to_string(), value);
            flags.clone()
        };
        info!(key, value, "flag updated");
        self.persist(&snapshot)
    }

    /// Sets several flags at once and persists the full map.
    pub fn set_flags(&self, updates: &FlagMap) -> FlagResult<()> {
        for key in updates.keys() {
            check_key(key)?;
        }
        let snapshot = {
            let mut flags = self.flags.write().unwrap_or_else(PoisonError::into_inner);
            flags.extend(updates.iter().map(|(k, v)| (k.clone(), *v)));
            flags.clone()
        };
        info!(count = updates.len(), "flags updated");
        self.persist(&snapshot)
    }

    /// Re-derives environment defaults, re-reads the file and replaces the
    /// in-memory table.
    pub fn reload(&self) -> FlagResult<()> {
        let flags = self.derive_flags(false)?;
        *self.flags.write().unwrap_or_else(PoisonError::into_inner) = flags;
        debug!(path = %self.config.path.display(), "flags reloaded");
        Ok(())
    }

    fn derive_flags(&self, seed_missing_file: bool) -> FlagResult<FlagMap> {
        let mut flags = self.env_defaults();
        match read_flag_file(&self.config.path)? {
            Some(persisted) => flags.extend(persisted),
            None if seed_missing_file => {
                info!(
                    path = %self.config.path.display(),
                    "flag file missing, seeding from environment"
                );
                self.persist(&flags)?;
            }
            None => warn!(
                path = %self.config.path.display(),
                "flag file missing on reload, using environment defaults"
            ),
        }
        Ok(flags)
    }

    fn env_defaults(&self) -> FlagMap {
        self.config
            .modes
            .iter()
            .map(|mode| {
                let var = format!("{}{}", self.config.env_prefix, mode.to_uppercase());
                let enabled = (self.env)(&var).is_some_and(|raw| parse_env_bool(&raw));
                (mode.clone(), enabled)
            })
            .collect()
    }

    fn persist(&self, flags: &FlagMap) -> FlagResult<()> {
        let path = &self.config.path;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let bytes = serde_json::to_vec_pretty(flags)?;
        fs::write(path, bytes)?;
        Ok(())
    }
}

fn read_flag_file(path: &Path) -> FlagResult<Option<FlagMap>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(FlagError::Io(e)),
    }
}

fn check_key(key: &str) -> FlagResult<()> {
    if key.trim().is_empty() {
        return Err(FlagError::InvalidKey(key.to_string()));
    }
    Ok(())
}

fn parse_env_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
