//! Owner-scoped sheet whose row-moving operations run through the
//! [`SerializedWriter`].

use super::client::{SheetData, SheetsClient};
use super::rows::{record_to_row, row_to_record, sheet_records};
use crate::error::{DalError, DalResult};
use crate::writer::SerializedWriter;
use serde_json::Value;
use std::sync::Arc;
use switchyard_model::{record_id, value_as_text, Record, ID_FIELD};
use tracing::{info, warn};
use uuid::Uuid;

/// Column holding the identity that created a row.
pub const OWNER_FIELD: &str = "created_by";
/// Column holding the row's visibility.
pub const VISIBILITY_FIELD: &str = "visibility";
/// Visibility value that exposes a row to every requester.
pub const PUBLIC: &str = "public";
/// Visibility assigned when an appended record carries none.
pub const PRIVATE: &str = "private";

/// A sheet of rows owned by their creators.
///
/// Reads here bypass the adapter snapshot cache: every call sees the sheet as
/// it is after all previously queued writes.
pub struct OwnedSheet {
    client: Arc<dyn SheetsClient>,
    sheet: String,
    header: Vec<String>,
    writer: SerializedWriter,
}

impl OwnedSheet {
    /// `fields` are the payload columns; the identifier, owner and visibility
    /// columns are added in front of them.
    pub fn new(
        client: Arc<dyn SheetsClient>,
        sheet: &str,
        fields: &[&str],
        writer: SerializedWriter,
    ) -> Self {
        let mut header = vec![
            ID_FIELD.to_string(),
            OWNER_FIELD.to_string(),
            VISIBILITY_FIELD.to_string(),
        ];
        for field in fields {
            if !header.iter().any(|h| h == field) {
                header.push((*field).to_string());
            }
        }
        Self {
            client,
            sheet: sheet.to_string(),
            header,
            writer,
        }
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Creates the sheet and its header row if either is missing.
    pub async fn ensure_ready(&self) -> DalResult<bool> {
        let client = Arc::clone(&self.client);
        let sheet = self.sheet.clone();
        let header = self.header.clone();
        self.writer
            .submit("ensure sheet", move || async move {
                let created = client.ensure_sheet(&sheet, &header).await?;
                if created {
                    info!(sheet = %sheet, "prepared owned sheet");
                }
                Ok(created)
            })
            .await
    }

    /// Appends `record` as owned by `requester`, with a generated identifier.
    pub async fn append(&self, requester: &str, record: Record) -> DalResult<Record> {
        let requester = require_identity(requester)?;
        let client = Arc::clone(&self.client);
        let sheet = self.sheet.clone();
        let header = self.header.clone();

        self.writer
            .submit("append record", move || async move {
                let mut stored = Record::new();
                stored.insert(ID_FIELD.to_string(), Value::String(Uuid::now_v7().to_string()));
                stored.insert(OWNER_FIELD.to_string(), Value::String(requester));
                let visibility = record
                    .get(VISIBILITY_FIELD)
                    .map(value_as_text)
                    .filter(|v| !v.trim().is_empty())
                    .unwrap_or_else(|| PRIVATE.to_string());
                stored.insert(VISIBILITY_FIELD.to_string(), Value::String(visibility));
                for (field, value) in record {
                    if !stored.contains_key(&field) {
                        stored.insert(field, value);
                    }
                }

                let row = record_to_row(&header, &stored);
                client.append_rows(&sheet, vec![row.clone()]).await?;
                Ok(row_to_record(&header, &row))
            })
            .await
    }

    /// Rows `requester` created plus every public row.
    pub async fn list_visible(&self, requester: &str) -> DalResult<Vec<Record>> {
        let requester = require_identity(requester)?;
        let client = Arc::clone(&self.client);
        let sheet = self.sheet.clone();

        self.writer
            .submit("list records", move || async move {
                let data = client.fetch(&sheet).await?;
                Ok(sheet_records(&data)
                    .into_iter()
                    .filter(|record| is_visible_to(record, &requester))
                    .collect())
            })
            .await
    }

    /// Deletes the row identified by `id` if `requester` created it.
    pub async fn delete_owned(&self, requester: &str, id: &str) -> DalResult<()> {
        let requester = require_identity(requester)?;
        if id.trim().is_empty() {
            return Err(DalError::InvalidInput("id must not be empty".to_string()));
        }
        let client = Arc::clone(&self.client);
        let sheet = self.sheet.clone();
        let id = id.to_string();

        self.writer
            .submit("delete record", move || async move {
                let data = client.fetch(&sheet).await?;
                let (index, record) = sheet_records(&data)
                    .into_iter()
                    .enumerate()
                    .find(|(_, record)| record_id(record).as_deref() == Some(id.as_str()))
                    .ok_or_else(|| DalError::NotFound(format!("{sheet} row {id}")))?;

                let owner = record.get(OWNER_FIELD).map(value_as_text).unwrap_or_default();
                if owner != requester {
                    warn!(sheet = %sheet, id = %id, "delete refused: requester is not the creator");
                    return Err(DalError::Permission(format!(
                        "{requester} did not create {sheet} row {id}"
                    )));
                }

                // Data rows start below the header, so this never addresses row 1.
                client.delete_rows(&sheet, SheetData::row_number(index), 1).await?;
                info!(sheet = %sheet, id = %id, "deleted owned row");
                Ok(())
            })
            .await
    }
}

fn require_identity(requester: &str) -> DalResult<String> {
    let requester = requester.trim();
    if requester.is_empty() {
        return Err(DalError::InvalidInput("requester must not be empty".to_string()));
    }
    Ok(requester.to_string())
}

fn is_visible_to(record: &Record, requester: &str) -> bool {
    let owner = record.get(OWNER_FIELD).map(value_as_text);
    let visibility = record.get(VISIBILITY_FIELD).map(value_as_text);
    owner.as_deref() == Some(requester)
        || visibility.is_some_and(|v| v.trim().eq_ignore_ascii_case(PUBLIC))
}
