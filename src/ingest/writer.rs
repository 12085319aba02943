//! Persists validated records as two best-effort transactions.

use std::fmt;

use log::{debug, info, warn};

use crate::database::{Record, Store};
use crate::error::{Error, Result};
use crate::models::{Event, Measurement};

/// Rows actually inserted, per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteCounts {
    pub measurements: usize,
    pub events: usize,
}

impl fmt::Display for WriteCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Added {} measurements and {} events.",
            self.measurements, self.events
        )
    }
}

/// Insert measurements and events, one transaction per type.
///
/// `None` means the caller never prepared that sequence and is rejected
/// with [`Error::Precondition`]; empty sequences are a logged no-op. Rows the
/// store refuses (duplicate timestamps) are logged, left out of the count,
/// and the transaction is committed anyway.
pub async fn write_batch(
    store: &dyn Store,
    measurements: Option<&[Measurement]>,
    events: Option<&[Event]>,
) -> Result<WriteCounts> {
    let (Some(measurements), Some(events)) = (measurements, events) else {
        return Err(Error::Precondition(
            "measurement and event sequences must both be provided",
        ));
    };

    if measurements.is_empty() && events.is_empty() {
        info!("No data to save.");
        return Ok(WriteCounts::default());
    }

    info!(
        "{} measurements and {} events to add",
        measurements.len(),
        events.len()
    );

    let counts = WriteCounts {
        measurements: write_records(store, measurements.iter().map(Record::Measurement)).await?,
        events: write_records(store, events.iter().map(Record::Event)).await?,
    };
    debug!("{}", counts);
    Ok(counts)
}

async fn write_records<'a, I>(store: &dyn Store, records: I) -> Result<usize>
where
    I: ExactSizeIterator<Item = Record<'a>>,
{
    if records.len() == 0 {
        return Ok(0);
    }

    let mut tx = store.begin().await?;
    let mut done = 0;
    for record in records {
        match tx.insert(record).await {
            Ok(()) => done += 1,
            Err(e @ Error::DuplicateKey { .. }) => warn!("{}", e),
            Err(e) => warn!("Failed to insert into {}: {}", record.table(), e),
        }
    }
    tx.commit().await?;
    Ok(done)
}
