/// Storage collaborator: ordered scan, keyed inserts, weak batch transactions
pub mod connection;
pub mod memory;
pub mod operations;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::error::Result;
use crate::models::{Event, Measurement, ScanRow};

pub use connection::{connect_with_retry, create_ssl_connector};
pub use memory::MemoryStore;
pub use operations::PgStore;

/// A single row to insert, tagged by its table.
#[derive(Debug, Clone, Copy)]
pub enum Record<'a> {
    Measurement(&'a Measurement),
    Event(&'a Event),
}

impl Record<'_> {
    pub fn table(&self) -> &'static str {
        match self {
            Record::Measurement(_) => "measurements",
            Record::Event(_) => "events",
        }
    }

    pub fn timestamp(&self) -> OffsetDateTime {
        match self {
            Record::Measurement(m) => m.timestamp,
            Record::Event(e) => e.timestamp,
        }
    }
}

/// Persistent store for measurements and events.
///
/// Implementations enforce timestamp uniqueness per table and serialize
/// conflicting writes themselves; callers hold no locks.
#[async_trait]
pub trait Store: Send + Sync {
    /// Create the tables if they do not exist yet.
    async fn ensure_schema(&self) -> Result<()>;

    /// Open a transaction for a batch of inserts.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>>;

    /// All rows of both tables at or after `since`, ascending by timestamp.
    async fn scan(&self, since: Option<OffsetDateTime>) -> Result<Vec<ScanRow>>;
}

/// A batch write in progress.
///
/// A failed `insert` only discards that row; the transaction stays usable.
/// Dropping without `commit` discards every row inserted through it.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn insert(&mut self, record: Record<'_>) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;
}
