//! Aggregate configuration for building both adapters.

use crate::relational::RelationalConfig;
use crate::sheets::{GoogleSheetsConfig, SpreadsheetConfig};
use serde::{Deserialize, Serialize};

/// Everything the factory needs to build the two adapters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DalConfig {
    /// Remote spreadsheet service credentials and endpoints.
    pub google: GoogleSheetsConfig,
    /// Caching, chunking and naming for the spreadsheet adapter.
    pub spreadsheet: SpreadsheetConfig,
    /// Relational backend location and naming.
    pub relational: RelationalConfig,
}
