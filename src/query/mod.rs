//! Query path: one ordered scan split into chart series and sessions.

pub mod pairing;

use log::{debug, info};
use serde::Serialize;
use time::OffsetDateTime;
use tokio::time::timeout;

use crate::context::AppContext;
use crate::error::{Error, Result};
use crate::models::{ScanRow, Session};
use crate::utils::epoch_millis;

pub use pairing::EventPairer;

/// Series handed to the chart renderer, all in epoch milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChartData {
    pub temperature: Vec<(i64, f64)>,
    pub humidity: Vec<(i64, f64)>,
    pub sessions: Vec<(i64, i64)>,
}

/// Splits scanned rows into the temperature, humidity and session outputs.
///
/// Rows are consumed in the order given; nothing is re-sorted.
#[derive(Debug, Default)]
pub struct QueryAggregator {
    temperature: Vec<(i64, f64)>,
    humidity: Vec<(i64, f64)>,
    pairer: EventPairer,
}

impl QueryAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: &ScanRow) {
        match row {
            ScanRow::Measurement(m) => {
                let at = epoch_millis(&m.timestamp);
                self.temperature.push((at, m.temperature));
                self.humidity.push((at, m.humidity));
            }
            ScanRow::Event(e) => {
                self.pairer.push(e);
            }
        }
    }

    pub fn finish(self) -> ChartData {
        let anomalies = self.pairer.anomalies();
        let completed = self.pairer.finish();
        let open_for = completed
            .iter()
            .fold(time::Duration::ZERO, |total, s| total + s.duration());
        debug!(
            "{} sessions open for {}s in total, {} pairing anomalies",
            completed.len(),
            open_for.whole_seconds(),
            anomalies
        );

        let sessions = completed
            .into_iter()
            .map(|s: Session| (epoch_millis(&s.opened_at), epoch_millis(&s.closed_at)))
            .collect();
        ChartData {
            temperature: self.temperature,
            humidity: self.humidity,
            sessions,
        }
    }
}

/// Aggregate rows already in ascending timestamp order.
pub fn aggregate<'a, I>(rows: I) -> ChartData
where
    I: IntoIterator<Item = &'a ScanRow>,
{
    let mut aggregator = QueryAggregator::new();
    for row in rows {
        aggregator.push(row);
    }
    aggregator.finish()
}

/// Scan storage and build the chart data.
///
/// The scan is bounded by the configured timeout.
pub async fn load_chart_data(ctx: &AppContext, since: Option<OffsetDateTime>) -> Result<ChartData> {
    let limit = ctx.config.scan_timeout;
    let rows = timeout(limit, ctx.store.scan(since))
        .await
        .map_err(|_| Error::Timeout(limit))??;

    let data = aggregate(&rows);
    info!(
        "View over {} rows: {} measurements, {} sessions",
        rows.len(),
        data.temperature.len(),
        data.sessions.len()
    );
    Ok(data)
}
