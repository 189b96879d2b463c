//! Backend capability interface.
//!
//! Both backends implement [`DataAdapter`]. Optional operations are advertised
//! up front through [`Capabilities`] so callers never have to probe by trial.

use crate::error::{DalError, DalResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use switchyard_model::{Filter, Record};

/// Operations an adapter offers beyond basic CRUD.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub batch_create: bool,
    pub delete_all: bool,
    pub transactions: bool,
}

/// Synchronous CRUD handle passed to a transaction body.
///
/// Everything done through the scope commits together when the body returns
/// `Ok`, and is rolled back when it returns `Err`.
pub trait TransactionScope {
    fn create(&mut self, entity: &str, record: Record) -> DalResult<Record>;
    fn read(&mut self, entity: &str, filter: &Filter) -> DalResult<Vec<Record>>;
    fn update(&mut self, entity: &str, id: &str, record: Record) -> DalResult<Record>;
    fn delete(&mut self, entity: &str, id: &str) -> DalResult<()>;
}

/// Body of a transaction.
pub type TransactionFn = Box<dyn FnOnce(&mut dyn TransactionScope) -> DalResult<Value> + Send>;

/// A backend-specific implementation of the CRUD capability set.
#[async_trait]
pub trait DataAdapter: Send + Sync {
    /// Short backend name used in logs and errors.
    fn backend_name(&self) -> &'static str;

    /// Optional operations this adapter supports.
    fn capabilities(&self) -> Capabilities;

    /// Inserts one record and returns it as stored (with its identifier).
    async fn create(&self, entity: &str, record: Record) -> DalResult<Record>;

    /// Returns every record matching the equality filter.
    async fn read(&self, entity: &str, filter: &Filter) -> DalResult<Vec<Record>>;

    /// Merges `record` into the record identified by `id`.
    async fn update(&self, entity: &str, id: &str, record: Record) -> DalResult<Record>;

    /// Removes the record identified by `id`.
    async fn delete(&self, entity: &str, id: &str) -> DalResult<()>;

    /// Inserts many records. An adapter that can fail part way returns
    /// `PartialWrite` naming how many leading records were stored.
    async fn batch_create(&self, entity: &str, records: Vec<Record>) -> DalResult<Vec<Record>>;

    /// Removes every record of an entity, returning how many were removed.
    async fn delete_all(&self, entity: &str) -> DalResult<usize> {
        let _ = entity;
        Err(DalError::capability(self.backend_name(), "delete_all"))
    }

    /// Runs `work` inside a native transaction.
    async fn transaction(&self, work: TransactionFn) -> DalResult<Value> {
        drop(work);
        Err(DalError::capability(self.backend_name(), "transaction"))
    }

    /// Drops any cached state for an entity. No-op for uncached backends.
    async fn invalidate(&self, entity: &str) {
        let _ = entity;
    }
}

/// Logical entity name → physical sheet/table name.
///
/// Names without an entry pass through unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NameMapping {
    names: BTreeMap<String, String>,
}

impl NameMapping {
    pub fn new(names: BTreeMap<String, String>) -> Self {
        Self { names }
    }

    /// Builder-style insert.
    pub fn with(mut self, logical: &str, physical: &str) -> Self {
        self.names.insert(logical.to_string(), physical.to_string());
        self
    }

    /// Resolves the physical name for a logical entity.
    pub fn physical<'a>(&'a self, entity: &'a str) -> &'a str {
        self.names.get(entity).map_or(entity, String::as_str)
    }
}
