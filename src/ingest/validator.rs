//! Turns a submitted batch of parallel text fields into typed records.

use log::{debug, warn};
use openssl::memcmp;
use time::OffsetDateTime;

use crate::error::{Error, Result};
use crate::ingest::IngestBatch;
use crate::models::{Event, EventKind, Measurement};
use crate::utils::{parse_epoch, parse_reading};

/// A per-index problem that was recovered from without aborting the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldIssue {
    /// Index skipped entirely.
    Timestamp { index: usize, raw: String },
    /// Temperature treated as absent.
    Temperature { index: usize, raw: String },
    /// Humidity treated as absent.
    Humidity { index: usize, raw: String },
    /// Event dropped; the measurement at the same index is unaffected.
    UnknownEvent { index: usize, raw: String },
}

/// Records that passed validation, in submission order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatedBatch {
    pub measurements: Vec<Measurement>,
    pub events: Vec<Event>,
    pub issues: Vec<FieldIssue>,
}

/// Check that the caller presented the provisioned key.
pub fn authenticate(presented: Option<&str>, expected: &str) -> Result<()> {
    match presented {
        Some(key)
            if key.len() == expected.len() && memcmp::eq(key.as_bytes(), expected.as_bytes()) =>
        {
            Ok(())
        }
        _ => Err(Error::Unauthorized),
    }
}

/// Field `i` of an optional parallel array, treating short arrays and empty
/// strings as omitted.
fn field_at(values: &[String], index: usize) -> Option<&str> {
    values
        .get(index)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
}

/// Validate a batch against the provisioned key and size bound.
///
/// Authentication and the size bound reject the whole batch. Everything
/// after that is best effort per index: a bad timestamp skips the index,
/// a bad reading counts as absent, an unknown event type drops the event.
pub fn validate(
    batch: &IngestBatch,
    api_key: &str,
    max_batch_size: usize,
) -> Result<ValidatedBatch> {
    authenticate(batch.api_key.as_deref(), api_key)?;

    if batch.timestamps.len() > max_batch_size {
        return Err(Error::BatchTooLarge {
            size: batch.timestamps.len(),
            limit: max_batch_size,
        });
    }

    let mut validated = ValidatedBatch::default();

    for (i, ts) in batch.timestamps.iter().enumerate() {
        let parsed = parse_epoch(ts).and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok());
        let Some(timestamp) = parsed else {
            warn!("Error parsing timestamp '{}' at index {}", ts, i);
            validated.issues.push(FieldIssue::Timestamp {
                index: i,
                raw: ts.clone(),
            });
            continue;
        };

        let temperature = match field_at(&batch.temperatures, i) {
            None => 0.0,
            Some(raw) => parse_reading(raw).unwrap_or_else(|| {
                warn!("Error parsing temperature '{}' for timestamp {}", raw, ts);
                validated.issues.push(FieldIssue::Temperature {
                    index: i,
                    raw: raw.to_string(),
                });
                0.0
            }),
        };

        let humidity = match field_at(&batch.humidities, i) {
            None => 0.0,
            Some(raw) => parse_reading(raw).unwrap_or_else(|| {
                warn!("Error parsing humidity '{}' for timestamp {}", raw, ts);
                validated.issues.push(FieldIssue::Humidity {
                    index: i,
                    raw: raw.to_string(),
                });
                0.0
            }),
        };

        let measurement = Measurement {
            timestamp,
            temperature,
            humidity,
        };
        if measurement.has_reading() {
            validated.measurements.push(measurement);
        } else {
            debug!("No reading at index {} for timestamp {}", i, ts);
        }

        if let Some(code) = field_at(&batch.event_types, i) {
            match EventKind::from_code(code) {
                Some(kind) => validated.events.push(Event { timestamp, kind }),
                None => {
                    warn!("Unknown event '{}' for timestamp {}", code, ts);
                    validated.issues.push(FieldIssue::UnknownEvent {
                        index: i,
                        raw: code.to_string(),
                    });
                }
            }
        }
    }

    Ok(validated)
}
