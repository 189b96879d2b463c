//! Relational adapter backed by SQLite.
//!
//! Every entity maps to a table `(id TEXT PRIMARY KEY, data TEXT NOT NULL)`
//! holding the record as JSON. Tables are created on first write. Equality
//! filters are pushed into SQL through `json_extract`.

use crate::adapter::{Capabilities, DataAdapter, NameMapping, TransactionFn, TransactionScope};
use crate::error::{DalError, DalResult};
use async_trait::async_trait;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use switchyard_model::{record_id, value_as_text, Filter, Record, ID_FIELD};
use tracing::{debug, info};
use uuid::Uuid;

/// Relational backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationalConfig {
    /// Database file path, or `:memory:`.
    pub path: String,
    /// Logical entity → physical table overrides.
    pub table_names: NameMapping,
}

impl Default for RelationalConfig {
    fn default() -> Self {
        Self {
            path: "switchyard.db".to_string(),
            table_names: NameMapping::default(),
        }
    }
}

/// Direct CRUD against a SQLite database.
pub struct RelationalAdapter {
    conn: Arc<Mutex<Connection>>,
    names: NameMapping,
}

impl RelationalAdapter {
    /// Opens (or creates) the database described by `config`.
    pub fn open(config: &RelationalConfig) -> DalResult<Self> {
        if config.path.trim().is_empty() {
            return Err(DalError::Configuration(
                "relational database path is empty".to_string(),
            ));
        }
        let conn = if config.path == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(&config.path)
        }
        .map_err(|e| DalError::Configuration(format!("failed to open database: {e}")))?;
        info!(path = %config.path, "relational adapter ready");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            names: config.table_names.clone(),
        })
    }

    /// Opens an in-memory database (for testing).
    pub fn open_in_memory() -> DalResult<Self> {
        Self::open(&RelationalConfig {
            path: ":memory:".to_string(),
            ..Default::default()
        })
    }

    /// Runs blocking database work off the async executor.
    async fn run<T, F>(&self, work: F) -> DalResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> DalResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
            work(&mut guard)
        })
        .await
        .map_err(|e| DalError::ExternalService(format!("database task failed: {e}")))?
    }

    fn table(&self, entity: &str) -> String {
        self.names.physical(entity).to_string()
    }
}

#[async_trait]
impl DataAdapter for RelationalAdapter {
    fn backend_name(&self) -> &'static str {
        "relational"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            batch_create: true,
            delete_all: true,
            transactions: true,
        }
    }

    async fn create(&self, entity: &str, record: Record) -> DalResult<Record> {
        let table = self.table(entity);
        self.run(move |conn| insert_record(conn, &table, record)).await
    }

    async fn read(&self, entity: &str, filter: &Filter) -> DalResult<Vec<Record>> {
        let table = self.table(entity);
        let filter = filter.clone();
        self.run(move |conn| select_records(conn, &table, &filter)).await
    }

    async fn update(&self, entity: &str, id: &str, record: Record) -> DalResult<Record> {
        let table = self.table(entity);
        let id = id.to_string();
        self.run(move |conn| update_record(conn, &table, &id, record))
            .await
    }

    async fn delete(&self, entity: &str, id: &str) -> DalResult<()> {
        let table = self.table(entity);
        let id = id.to_string();
        self.run(move |conn| delete_record(conn, &table, &id)).await
    }

    async fn batch_create(&self, entity: &str, records: Vec<Record>) -> DalResult<Vec<Record>> {
        let table = self.table(entity);
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let mut created = Vec::with_capacity(records.len());
            for record in records {
                created.push(insert_record(&tx, &table, record)?);
            }
            tx.commit()?;
            debug!(table = %table, count = created.len(), "batch inserted");
            Ok(created)
        })
        .await
    }

    async fn delete_all(&self, entity: &str) -> DalResult<usize> {
        let table = self.table(entity);
        self.run(move |conn| {
            if !table_exists(conn, &table)? {
                return Ok(0);
            }
            let removed = conn.execute(&format!("DELETE FROM {}", quote_ident(&table)), [])?;
            Ok(removed)
        })
        .await
    }

    async fn transaction(&self, work: TransactionFn) -> DalResult<Value> {
        let names = self.names.clone();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let outcome = {
                let mut scope = SqlScope {
                    conn: &tx,
                    names: &names,
                };
                work(&mut scope)
            };
            match outcome {
                Ok(value) => {
                    tx.commit()?;
                    Ok(value)
                }
                Err(e) => {
                    tx.rollback()?;
                    debug!(error = %e, "transaction rolled back");
                    Err(e)
                }
            }
        })
        .await
    }
}

/// Transaction handle over an open SQLite transaction.
struct SqlScope<'a> {
    conn: &'a Connection,
    names: &'a NameMapping,
}

impl TransactionScope for SqlScope<'_> {
    fn create(&mut self, entity: &str, record: Record) -> DalResult<Record> {
        insert_record(self.conn, self.names.physical(entity), record)
    }

    fn read(&mut self, entity: &str, filter: &Filter) -> DalResult<Vec<Record>> {
        select_records(self.conn, self.names.physical(entity), filter)
    }

    fn update(&mut self, entity: &str, id: &str, record: Record) -> DalResult<Record> {
        update_record(self.conn, self.names.physical(entity), id, record)
    }

    fn delete(&mut self, entity: &str, id: &str) -> DalResult<()> {
        delete_record(self.conn, self.names.physical(entity), id)
    }
}

// ── SQL helpers ─────────────────────────────────────────────────

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn table_exists(conn: &Connection, table: &str) -> DalResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn ensure_table(conn: &Connection, table: &str) -> DalResult<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {} (id TEXT PRIMARY KEY, data TEXT NOT NULL)",
        quote_ident(table)
    ))?;
    Ok(())
}

fn parse_record(data: &str) -> DalResult<Record> {
    match serde_json::from_str::<Value>(data)? {
        Value::Object(map) => Ok(map),
        other => Err(DalError::Serialization(format!(
            "stored row is not an object: {other}"
        ))),
    }
}

fn insert_record(conn: &Connection, table: &str, mut record: Record) -> DalResult<Record> {
    ensure_table(conn, table)?;
    let id = match record_id(&record) {
        Some(id) => id,
        None => {
            let id = Uuid::now_v7().to_string();
            record.insert(ID_FIELD.to_string(), Value::String(id.clone()));
            id
        }
    };
    let data = serde_json::to_string(&record)?;
    conn.execute(
        &format!("INSERT INTO {} (id, data) VALUES (?1, ?2)", quote_ident(table)),
        params![id, data],
    )?;
    Ok(record)
}

fn select_records(conn: &Connection, table: &str, filter: &Filter) -> DalResult<Vec<Record>> {
    if !table_exists(conn, table)? {
        return Err(DalError::NotFound(format!("table {table}")));
    }
    let mut sql = format!("SELECT data FROM {}", quote_ident(table));
    let mut bind: Vec<SqlValue> = Vec::with_capacity(filter.len() * 2);
    for (idx, (field, expected)) in filter.iter().enumerate() {
        sql.push_str(if idx == 0 { " WHERE " } else { " AND " });
        let path_param = bind.len() + 1;
        let value_param = bind.len() + 2;
        bind.push(SqlValue::Text(json_path(field)));
        match expected {
            Value::Null => {
                sql.push_str(&format!("json_extract(data, ?{path_param}) IS ?{value_param}"));
                bind.push(SqlValue::Null);
            }
            Value::Bool(b) => {
                sql.push_str(&format!("json_extract(data, ?{path_param}) = ?{value_param}"));
                bind.push(SqlValue::Integer(i64::from(*b)));
            }
            other => {
                sql.push_str(&format!(
                    "CAST(json_extract(data, ?{path_param}) AS TEXT) = ?{value_param}"
                ));
                bind.push(SqlValue::Text(value_as_text(other)));
            }
        }
    }
    sql.push_str(" ORDER BY rowid");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(bind.iter()), |row| row.get::<_, String>(0))?;
    let mut records = Vec::new();
    for row in rows {
        records.push(parse_record(&row?)?);
    }
    Ok(records)
}

fn update_record(conn: &Connection, table: &str, id: &str, patch: Record) -> DalResult<Record> {
    if !table_exists(conn, table)? {
        return Err(DalError::NotFound(format!("table {table}")));
    }
    let existing: Option<String> = conn
        .query_row(
            &format!("SELECT data FROM {} WHERE id = ?1", quote_ident(table)),
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    let Some(existing) = existing else {
        return Err(DalError::NotFound(format!("{table} row {id}")));
    };
    let mut merged = parse_record(&existing)?;
    for (field, value) in patch {
        if field != ID_FIELD {
            merged.insert(field, value);
        }
    }
    conn.execute(
        &format!("UPDATE {} SET data = ?1 WHERE id = ?2", quote_ident(table)),
        params![serde_json::to_string(&merged)?, id],
    )?;
    Ok(merged)
}

fn delete_record(conn: &Connection, table: &str, id: &str) -> DalResult<()> {
    if !table_exists(conn, table)? {
        return Err(DalError::NotFound(format!("table {table}")));
    }
    let removed = conn.execute(
        &format!("DELETE FROM {} WHERE id = ?1", quote_ident(table)),
        params![id],
    )?;
    if removed == 0 {
        return Err(DalError::NotFound(format!("{table} row {id}")));
    }
    Ok(())
}

fn json_path(field: &str) -> String {
    format!("$.\"{}\"", field.replace('"', "\\\""))
}
