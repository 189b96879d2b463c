//! Composition root: builds both adapters and routes keys between them.

use crate::adapter::DataAdapter;
use crate::config::DalConfig;
use crate::error::{DalError, DalResult};
use crate::facade::DataAccess;
use crate::relational::RelationalAdapter;
use crate::sheets::SpreadsheetAdapter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use switchyard_flags::{FlagMap, FlagStore};
use tracing::{debug, info, warn};

/// Snapshot of which backends are usable and how keys are routed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DalStatus {
    pub relational_available: bool,
    pub spreadsheet_available: bool,
    pub flags: FlagMap,
}

/// Owns the flag store and whichever adapters could be built.
pub struct DalFactory {
    flags: Arc<FlagStore>,
    relational: Option<Arc<dyn DataAdapter>>,
    spreadsheet: Option<Arc<dyn DataAdapter>>,
}

impl DalFactory {
    /// Takes the outcome of each adapter initializer. A failed initializer is
    /// logged and leaves that backend unavailable.
    pub fn new(
        flags: Arc<FlagStore>,
        relational: DalResult<Arc<dyn DataAdapter>>,
        spreadsheet: DalResult<Arc<dyn DataAdapter>>,
    ) -> Self {
        let relational = available("relational", relational);
        let spreadsheet = available("spreadsheet", spreadsheet);
        info!(
            relational = relational.is_some(),
            spreadsheet = spreadsheet.is_some(),
            "data access factory ready"
        );
        Self {
            flags,
            relational,
            spreadsheet,
        }
    }

    /// Builds both adapters from configuration.
    pub fn from_config(flags: Arc<FlagStore>, config: &DalConfig) -> Self {
        let relational = RelationalAdapter::open(&config.relational)
            .map(|a| Arc::new(a) as Arc<dyn DataAdapter>);
        let spreadsheet = SpreadsheetAdapter::from_config(&config.google, &config.spreadsheet)
            .map(|a| Arc::new(a) as Arc<dyn DataAdapter>);
        Self::new(flags, relational, spreadsheet)
    }

    /// Resolves the facade serving `key`.
    ///
    /// The relational backend is chosen only when the key's flag is on and
    /// the backend is available; otherwise the spreadsheet backend serves.
    pub fn get_dal(&self, key: &str) -> DalResult<DataAccess> {
        if self.flags.is_enabled(key) {
            if let Some(adapter) = &self.relational {
                debug!(key, "routing to relational adapter");
                return Ok(DataAccess::new(Arc::clone(adapter)));
            }
            warn!(key, "relational adapter requested but unavailable, using spreadsheet");
        }
        match &self.spreadsheet {
            Some(adapter) => {
                debug!(key, "routing to spreadsheet adapter");
                Ok(DataAccess::new(Arc::clone(adapter)))
            }
            None => Err(DalError::NoImplementationAvailable(key.to_string())),
        }
    }

    pub fn status(&self) -> DalStatus {
        DalStatus {
            relational_available: self.relational.is_some(),
            spreadsheet_available: self.spreadsheet.is_some(),
            flags: self.flags.all(),
        }
    }

    pub fn relational(&self) -> Option<&Arc<dyn DataAdapter>> {
        self.relational.as_ref()
    }

    pub fn spreadsheet(&self) -> Option<&Arc<dyn DataAdapter>> {
        self.spreadsheet.as_ref()
    }

    pub fn flag_store(&self) -> &Arc<FlagStore> {
        &self.flags
    }

    // ── Flag administration ─────────────────────────────────────

    pub fn all_flags(&self) -> FlagMap {
        self.flags.all()
    }

    pub fn set_flag(&self, key: &str, enabled: bool) -> DalResult<()> {
        Ok(self.flags.set_flag(key, enabled)?)
    }

    pub fn set_flags(&self, updates: &FlagMap) -> DalResult<()> {
        Ok(self.flags.set_flags(updates)?)
    }

    pub fn reload_flags(&self) -> DalResult<()> {
        Ok(self.flags.reload()?)
    }
}

fn available(
    name: &str,
    adapter: DalResult<Arc<dyn DataAdapter>>,
) -> Option<Arc<dyn DataAdapter>> {
    match adapter {
        Ok(adapter) => Some(adapter),
        Err(e) => {
            warn!(adapter = name, error = %e, "adapter unavailable");
            None
        }
    }
}
