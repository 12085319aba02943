//! Sensor event log
//!
//! Ingests temperature/humidity readings and open/close events from remote
//! reporters, stores them keyed by timestamp, and reconstructs a chronological
//! view: two measurement series plus the paired open/close sessions.
//!
//! - **ingest**: key check, per-index validation, best-effort batch writes
//! - **query**: one ordered scan folded into chart series and sessions
//! - **database**: the storage collaborator (PostgreSQL or in-memory)

pub mod config;
pub mod context;
pub mod database;
pub mod error;
pub mod ingest;
pub mod models;
pub mod query;
pub mod simulate;
pub mod utils;

pub use config::AppConfig;
pub use context::AppContext;
pub use error::{Error, Result};
