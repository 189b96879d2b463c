//! Spreadsheet backend.

mod adapter;
mod cache;
mod client;
mod google;
mod guarded;
mod rows;

pub use adapter::{SheetSnapshot, SpreadsheetAdapter, SpreadsheetConfig};
pub use cache::{CacheStatsSnapshot, SnapshotCache};
pub use client::{SheetData, SheetsClient};
pub use google::{GoogleSheetsClient, GoogleSheetsConfig};
pub use guarded::{OwnedSheet, OWNER_FIELD, PRIVATE, PUBLIC, VISIBILITY_FIELD};
pub use rows::{record_to_row, row_to_record, sheet_records};
