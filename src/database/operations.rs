/// PostgreSQL-backed store for measurements and events
use async_trait::async_trait;
use futures_util::{pin_mut, TryStreamExt};
use log::{debug, info, warn};
use time::OffsetDateTime;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, Row, Statement};

use crate::config::DatabaseSettings;
use crate::database::connection::connect_with_retry;
use crate::database::{Record, Store, StoreTransaction};
use crate::error::{Error, Result};
use crate::models::{Event, EventKind, Measurement, ScanRow};

const CREATE_TABLES: &str = "
    CREATE TABLE IF NOT EXISTS measurements (
        tstamp timestamptz NOT NULL PRIMARY KEY,
        temperature double precision,
        humidity double precision);
    CREATE TABLE IF NOT EXISTS events (
        tstamp timestamptz NOT NULL PRIMARY KEY,
        type text NOT NULL);
";

const INSERT_MEASUREMENT: &str =
    "INSERT INTO measurements(tstamp, temperature, humidity) VALUES ($1, $2, $3)";

const INSERT_EVENT: &str = "INSERT INTO events(tstamp, type) VALUES ($1, $2)";

// Both tables merged into one ascending stream; NULL bound means everything.
const SCAN: &str = "
    SELECT 'm' AS kind, tstamp, temperature, humidity, NULL::text AS type
        FROM measurements
        WHERE $1::timestamptz IS NULL OR tstamp >= $1
    UNION ALL
    SELECT 'e' AS kind, tstamp, NULL, NULL, type
        FROM events
        WHERE $1::timestamptz IS NULL OR tstamp >= $1
    ORDER BY tstamp ASC, kind DESC
";

/// Store that opens one connection per unit of work.
///
/// Concurrent requests never share a client, so PostgreSQL's primary key
/// enforcement is what decides racing inserts.
#[derive(Debug, Clone)]
pub struct PgStore {
    settings: DatabaseSettings,
}

impl PgStore {
    pub fn new(settings: DatabaseSettings) -> Self {
        PgStore { settings }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ensure_schema(&self) -> Result<()> {
        let client = connect_with_retry(&self.settings).await?;
        client.batch_execute(CREATE_TABLES).await?;
        info!("Database schema is ready");
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let client = connect_with_retry(&self.settings).await?;
        client.batch_execute("BEGIN").await?;
        let insert_measurement = client.prepare(INSERT_MEASUREMENT).await?;
        let insert_event = client.prepare(INSERT_EVENT).await?;
        Ok(Box::new(PgTransaction {
            client,
            insert_measurement,
            insert_event,
        }))
    }

    async fn scan(&self, since: Option<OffsetDateTime>) -> Result<Vec<ScanRow>> {
        let client = connect_with_retry(&self.settings).await?;
        let params: [&(dyn ToSql + Sync); 1] = [&since];
        let rows = client.query_raw(SCAN, params).await?;
        pin_mut!(rows);

        let mut scanned = Vec::new();
        while let Some(row) = rows.try_next().await? {
            if let Some(decoded) = decode_row(&row)? {
                scanned.push(decoded);
            }
        }
        debug!("Scanned {} rows", scanned.len());
        Ok(scanned)
    }
}

fn decode_row(row: &Row) -> Result<Option<ScanRow>> {
    let kind: &str = row.try_get("kind")?;
    let timestamp: OffsetDateTime = row.try_get("tstamp")?;

    if kind == "m" {
        let temperature: Option<f64> = row.try_get("temperature")?;
        let humidity: Option<f64> = row.try_get("humidity")?;
        return Ok(Some(ScanRow::Measurement(Measurement {
            timestamp,
            temperature: temperature.unwrap_or(0.0),
            humidity: humidity.unwrap_or(0.0),
        })));
    }

    let code: Option<&str> = row.try_get("type")?;
    match code.and_then(EventKind::from_code) {
        Some(kind) => Ok(Some(ScanRow::Event(Event { timestamp, kind }))),
        None => {
            warn!(
                "Skipping stored event with unknown type {:?} at {}",
                code, timestamp
            );
            Ok(None)
        }
    }
}

/// Transaction driven with plain SQL so it can own its client.
///
/// Every insert runs inside a savepoint; a failing row is rolled back to it
/// and the transaction continues.
struct PgTransaction {
    client: Client,
    insert_measurement: Statement,
    insert_event: Statement,
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn insert(&mut self, record: Record<'_>) -> Result<()> {
        self.client.batch_execute("SAVEPOINT record").await?;

        let result = match record {
            Record::Measurement(m) => {
                self.client
                    .execute(
                        &self.insert_measurement,
                        &[&m.timestamp, &m.temperature, &m.humidity],
                    )
                    .await
            }
            Record::Event(e) => {
                self.client
                    .execute(&self.insert_event, &[&e.timestamp, &e.kind.code()])
                    .await
            }
        };

        match result {
            Ok(_) => {
                self.client.batch_execute("RELEASE SAVEPOINT record").await?;
                Ok(())
            }
            Err(e) => {
                self.client
                    .batch_execute("ROLLBACK TO SAVEPOINT record")
                    .await?;
                if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
                    Err(Error::DuplicateKey {
                        table: record.table(),
                        timestamp: record.timestamp().unix_timestamp(),
                    })
                } else {
                    Err(Error::Database(e))
                }
            }
        }
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.client.batch_execute("COMMIT").await?;
        Ok(())
    }
}
