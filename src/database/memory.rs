//! In-process store with the same key semantics as the PostgreSQL tables.
//!
//! Used for tests and for running without a database. Keys are reserved at
//! insert time, so of two concurrent transactions inserting the same
//! timestamp exactly one succeeds, as with a unique index.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use log::debug;
use time::OffsetDateTime;

use crate::database::{Record, Store, StoreTransaction};
use crate::error::{Error, Result};
use crate::models::{Event, EventKind, Measurement, ScanRow};

#[derive(Debug, Default)]
struct Tables {
    measurements: BTreeMap<OffsetDateTime, Measurement>,
    events: BTreeMap<OffsetDateTime, EventKind>,
    reserved_measurements: HashSet<OffsetDateTime>,
    reserved_events: HashSet<OffsetDateTime>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed (measurement, event) rows.
    pub fn len(&self) -> (usize, usize) {
        let tables = lock(&self.tables);
        (tables.measurements.len(), tables.events.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == (0, 0)
    }
}

fn lock(tables: &Mutex<Tables>) -> MutexGuard<'_, Tables> {
    tables.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl Store for MemoryStore {
    async fn ensure_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        Ok(Box::new(MemoryTransaction {
            tables: Arc::clone(&self.tables),
            measurements: Vec::new(),
            events: Vec::new(),
        }))
    }

    async fn scan(&self, since: Option<OffsetDateTime>) -> Result<Vec<ScanRow>> {
        let tables = lock(&self.tables);
        let from = since.unwrap_or(OffsetDateTime::UNIX_EPOCH);
        let in_range = |ts: &OffsetDateTime| since.is_none() || *ts >= from;

        let mut rows: Vec<ScanRow> = tables
            .measurements
            .values()
            .filter(|m| in_range(&m.timestamp))
            .map(|m| ScanRow::Measurement(*m))
            .chain(
                tables
                    .events
                    .iter()
                    .filter(|(ts, _)| in_range(ts))
                    .map(|(ts, kind)| {
                        ScanRow::Event(Event {
                            timestamp: *ts,
                            kind: *kind,
                        })
                    }),
            )
            .collect();
        // Stable sort keeps measurements ahead of events at equal timestamps.
        rows.sort_by_key(ScanRow::timestamp);
        Ok(rows)
    }
}

struct MemoryTransaction {
    tables: Arc<Mutex<Tables>>,
    measurements: Vec<Measurement>,
    events: Vec<Event>,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn insert(&mut self, record: Record<'_>) -> Result<()> {
        let mut tables = lock(&self.tables);
        let timestamp = record.timestamp();
        let fresh = match record {
            Record::Measurement(m) => {
                let fresh = !tables.measurements.contains_key(&timestamp)
                    && tables.reserved_measurements.insert(timestamp);
                if fresh {
                    self.measurements.push(*m);
                }
                fresh
            }
            Record::Event(e) => {
                let fresh = !tables.events.contains_key(&timestamp)
                    && tables.reserved_events.insert(timestamp);
                if fresh {
                    self.events.push(*e);
                }
                fresh
            }
        };

        if fresh {
            Ok(())
        } else {
            Err(Error::DuplicateKey {
                table: record.table(),
                timestamp: timestamp.unix_timestamp(),
            })
        }
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut this = self;
        let mut tables = lock(&this.tables);
        for m in this.measurements.drain(..) {
            tables.reserved_measurements.remove(&m.timestamp);
            tables.measurements.insert(m.timestamp, m);
        }
        for e in this.events.drain(..) {
            tables.reserved_events.remove(&e.timestamp);
            tables.events.insert(e.timestamp, e.kind);
        }
        debug!(
            "Committed; store holds {} measurements and {} events",
            tables.measurements.len(),
            tables.events.len()
        );
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if self.measurements.is_empty() && self.events.is_empty() {
            return;
        }
        let mut tables = lock(&self.tables);
        for m in &self.measurements {
            tables.reserved_measurements.remove(&m.timestamp);
        }
        for e in &self.events {
            tables.reserved_events.remove(&e.timestamp);
        }
    }
}
