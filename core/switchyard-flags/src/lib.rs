//! Feature-flag routing table for Switchyard.
//!
//! A flag maps a key to a boolean. Keys are either a bare mode (`policy`) or a
//! hierarchical `mode:tab` pair (`policy:history`). Lookup falls back from the
//! exact key to the part before the first `:`, then to `false`.
//!
//! Flags start from one environment-derived default per configured mode, are
//! overlaid by the persisted JSON file, and change only through [`FlagStore::set_flag`]
//! / [`FlagStore::set_flags`], which rewrite the whole file immediately.
//!
//! # Example
//!
//! ```no_run
//! use switchyard_flags::{FlagConfig, FlagStore};
//!
//! let config = FlagConfig {
//!     path: "flags.json".into(),
//!     modes: vec!["policy".into(), "history".into()],
//!     ..Default::default()
//! };
//! let flags = FlagStore::open(config)?;
//! if flags.is_enabled("policy:history") {
//!     // route to the relational backend
//! }
//! # Ok::<(), switchyard_flags::FlagError>(())
//! ```

mod error;
mod store;

pub use error::{FlagError, FlagResult};
pub use store::{EnvSource, FlagConfig, FlagMap, FlagStore, DEFAULT_ENV_PREFIX};
