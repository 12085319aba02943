//! Ingestion path: submitted batch, validation, batch write.

pub mod validator;
pub mod writer;

use log::info;
use url::form_urlencoded;

use crate::context::AppContext;
use crate::error::Result;

pub use validator::{authenticate, validate, FieldIssue, ValidatedBatch};
pub use writer::{write_batch, WriteCounts};

// Parameter names used by reporters.
const PARAM_API_KEY: &str = "apiKey";
const PARAM_TIMESTAMP: &str = "d";
const PARAM_TEMPERATURE: &str = "t";
const PARAM_HUMIDITY: &str = "h";
const PARAM_EVENT: &str = "e";

/// One submission: a key plus four index-aligned field arrays.
///
/// The reading and event arrays may be shorter than `timestamps`; missing
/// and empty entries mean the field was omitted at that index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestBatch {
    pub api_key: Option<String>,
    pub timestamps: Vec<String>,
    pub temperatures: Vec<String>,
    pub humidities: Vec<String>,
    pub event_types: Vec<String>,
}

impl IngestBatch {
    /// Decode a form-urlencoded submission such as
    /// `apiKey=...&d=1345678910&t=21.5&h=60&e=DO`.
    ///
    /// Repeated parameters append in order; the first `apiKey` wins and
    /// unknown parameters are ignored.
    pub fn from_query(query: &str) -> Self {
        let mut batch = IngestBatch::default();
        for (key, value) in form_urlencoded::parse(query.trim_start_matches('?').as_bytes()) {
            let value = value.into_owned();
            match &*key {
                PARAM_API_KEY => {
                    if batch.api_key.is_none() {
                        batch.api_key = Some(value);
                    }
                }
                PARAM_TIMESTAMP => batch.timestamps.push(value),
                PARAM_TEMPERATURE => batch.temperatures.push(value),
                PARAM_HUMIDITY => batch.humidities.push(value),
                PARAM_EVENT => batch.event_types.push(value),
                _ => {}
            }
        }
        batch
    }

    /// Encode back into the reporter's query string format.
    pub fn to_query(&self) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        if let Some(key) = &self.api_key {
            query.append_pair(PARAM_API_KEY, key);
        }
        for (param, values) in [
            (PARAM_TIMESTAMP, &self.timestamps),
            (PARAM_TEMPERATURE, &self.temperatures),
            (PARAM_HUMIDITY, &self.humidities),
            (PARAM_EVENT, &self.event_types),
        ] {
            for value in values {
                query.append_pair(param, value);
            }
        }
        query.finish()
    }
}

/// Validate a batch and persist what survives.
pub async fn ingest(ctx: &AppContext, batch: &IngestBatch) -> Result<WriteCounts> {
    info!(
        "Ingesting batch of {} timestamps",
        batch.timestamps.len()
    );

    let validated = validate(batch, &ctx.config.api_key, ctx.config.max_batch_size)?;
    if !validated.issues.is_empty() {
        info!("{} fields recovered during validation", validated.issues.len());
    }

    let counts = write_batch(
        ctx.store.as_ref(),
        Some(validated.measurements.as_slice()),
        Some(validated.events.as_slice()),
    )
    .await?;
    info!("{}", counts);
    Ok(counts)
}
