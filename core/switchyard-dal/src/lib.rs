//! Dual-backend data access layer for Switchyard.
//!
//! Callers talk to one [`DataAccess`] facade. Behind it sits either the
//! spreadsheet backend (the durable default) or the relational backend,
//! chosen per key by the flag store.
//!
//! # Architecture
//!
//! - **Adapters**: [`SpreadsheetAdapter`] and [`RelationalAdapter`] both
//!   implement [`DataAdapter`] and advertise optional operations through
//!   [`Capabilities`]
//! - **Snapshot cache**: spreadsheet reads are served from a TTL cache with
//!   single-flight fetches; writes invalidate the entity namespace
//! - **Serialized writer**: a FIFO queue with one worker for positional sheet
//!   writes that must not interleave ([`OwnedSheet`] uses it)
//! - **Factory**: [`DalFactory`] builds both adapters independently and
//!   resolves keys to a facade
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use switchyard_dal::{DalConfig, DalFactory};
//! use switchyard_flags::{FlagConfig, FlagStore};
//!
//! # async fn run() -> switchyard_dal::DalResult<()> {
//! let flags = Arc::new(FlagStore::open(FlagConfig::default())?);
//! let factory = DalFactory::from_config(flags, &DalConfig::default());
//!
//! let dal = factory.get_dal("policy:history")?;
//! let rows = dal.read("policy", serde_json::json!({ "status": "active" })).await?;
//! println!("{} rows from {}", rows.len(), dal.backend_name());
//! # Ok(())
//! # }
//! ```

mod adapter;
mod config;
mod error;
mod facade;
mod factory;
pub mod relational;
pub mod sheets;
mod writer;

pub use adapter::{Capabilities, DataAdapter, NameMapping, TransactionFn, TransactionScope};
pub use config::DalConfig;
pub use error::{DalError, DalResult};
pub use facade::DataAccess;
pub use factory::{DalFactory, DalStatus};
pub use relational::{RelationalAdapter, RelationalConfig};
pub use sheets::{
    GoogleSheetsClient, GoogleSheetsConfig, OwnedSheet, SheetData, SheetsClient,
    SpreadsheetAdapter, SpreadsheetConfig,
};
pub use writer::{SerializedWriter, WriterState};
