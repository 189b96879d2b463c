//! Remote spreadsheet service interface.

use crate::error::DalResult;
use async_trait::async_trait;
use serde_json::Value;

/// The full contents of one sheet: header row plus data rows.
///
/// `rows[i]` lives on sheet row `i + 2` (row 1 is the header).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetData {
    pub header: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl SheetData {
    /// 1-based sheet row number of the data row at `index`.
    pub fn row_number(index: usize) -> usize {
        index + 2
    }
}

/// Low-level operations against a spreadsheet service.
///
/// Row numbers are 1-based sheet rows; row 1 is the header.
#[async_trait]
pub trait SheetsClient: Send + Sync {
    /// Returns the name of the spreadsheet provider.
    fn provider_name(&self) -> &'static str;

    /// Whether `append_rows` accepts more than one row per call.
    fn supports_bulk_append(&self) -> bool {
        true
    }

    /// Whether `truncate` is available as a single call.
    fn supports_truncate(&self) -> bool {
        true
    }

    /// Reads the whole sheet. Missing sheets are `NotFound`.
    async fn fetch(&self, sheet: &str) -> DalResult<SheetData>;

    /// Appends rows after the last data row.
    async fn append_rows(&self, sheet: &str, rows: Vec<Vec<Value>>) -> DalResult<()>;

    /// Overwrites one row in place.
    async fn update_row(&self, sheet: &str, row_number: usize, values: Vec<Value>) -> DalResult<()>;

    /// Deletes `count` rows starting at `start_row`, shifting later rows up.
    async fn delete_rows(&self, sheet: &str, start_row: usize, count: usize) -> DalResult<()>;

    /// Drops every row except the header in one call.
    async fn truncate(&self, sheet: &str) -> DalResult<()>;

    /// Creates the sheet if missing and writes `header` when the header row is
    /// empty. Returns true when anything was created.
    async fn ensure_sheet(&self, sheet: &str, header: &[String]) -> DalResult<bool>;
}
