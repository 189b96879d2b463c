//! Backend-agnostic access facade.
//!
//! Checks arguments and delegates. All storage semantics live in the adapter
//! the facade is bound to.

use crate::adapter::{Capabilities, DataAdapter, TransactionScope};
use crate::error::{DalError, DalResult};
use serde_json::Value;
use std::sync::Arc;
use switchyard_model::{Filter, Record};

/// CRUD entry point bound to one adapter.
#[derive(Clone)]
pub struct DataAccess {
    adapter: Arc<dyn DataAdapter>,
}

impl std::fmt::Debug for DataAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataAccess")
            .field("backend", &self.adapter.backend_name())
            .finish()
    }
}

impl DataAccess {
    pub fn new(adapter: Arc<dyn DataAdapter>) -> Self {
        Self { adapter }
    }

    /// Name of the bound backend (`relational` or `spreadsheet`).
    pub fn backend_name(&self) -> &'static str {
        self.adapter.backend_name()
    }

    pub fn capabilities(&self) -> Capabilities {
        self.adapter.capabilities()
    }

    pub fn adapter(&self) -> &Arc<dyn DataAdapter> {
        &self.adapter
    }

    pub async fn create(&self, entity: &str, record: Value) -> DalResult<Record> {
        check_entity(entity)?;
        let record = into_object(record, "record")?;
        self.adapter.create(entity, record).await
    }

    pub async fn read(&self, entity: &str, filter: Value) -> DalResult<Vec<Record>> {
        check_entity(entity)?;
        let filter: Filter = into_object(filter, "filter")?;
        self.adapter.read(entity, &filter).await
    }

    pub async fn update(&self, entity: &str, id: &str, record: Value) -> DalResult<Record> {
        check_entity(entity)?;
        check_id(id)?;
        let record = into_object(record, "record")?;
        self.adapter.update(entity, id, record).await
    }

    pub async fn delete(&self, entity: &str, id: &str) -> DalResult<()> {
        check_entity(entity)?;
        check_id(id)?;
        self.adapter.delete(entity, id).await
    }

    pub async fn batch_create(&self, entity: &str, records: Vec<Value>) -> DalResult<Vec<Record>> {
        check_entity(entity)?;
        let records = records
            .into_iter()
            .map(|r| into_object(r, "record"))
            .collect::<DalResult<Vec<_>>>()?;
        self.adapter.batch_create(entity, records).await
    }

    /// Removes every record of `entity`.
    pub async fn delete_all(&self, entity: &str) -> DalResult<usize> {
        check_entity(entity)?;
        if !self.capabilities().delete_all {
            return Err(DalError::capability(self.backend_name(), "delete_all"));
        }
        self.adapter.delete_all(entity).await
    }

    /// Runs `work` in a native transaction. Fails with `Capability` when the
    /// bound adapter has none.
    pub async fn transaction<F>(&self, work: F) -> DalResult<Value>
    where
        F: FnOnce(&mut dyn TransactionScope) -> DalResult<Value> + Send + 'static,
    {
        if !self.capabilities().transactions {
            return Err(DalError::capability(self.backend_name(), "transaction"));
        }
        self.adapter.transaction(Box::new(work)).await
    }
}

fn check_entity(entity: &str) -> DalResult<()> {
    if entity.trim().is_empty() {
        return Err(DalError::InvalidInput("entity must not be empty".to_string()));
    }
    Ok(())
}

fn check_id(id: &str) -> DalResult<()> {
    if id.trim().is_empty() {
        return Err(DalError::InvalidInput("id must not be empty".to_string()));
    }
    Ok(())
}

fn into_object(value: Value, what: &str) -> DalResult<Record> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(DalError::InvalidInput(format!(
            "{what} must be an object, got {}",
            kind(&other)
        ))),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
