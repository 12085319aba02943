//! PgStore against a live server. Run with
//! `TEST_DATABASE_URL=postgres://... cargo test -- --ignored`.
//!
//! Each test works in its own schema, selected through the `options`
//! connection parameter.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;

use sensor_event_log::config::DatabaseSettings;
use sensor_event_log::database::{connect_with_retry, PgStore};
use sensor_event_log::ingest::{ingest, IngestBatch, WriteCounts};
use sensor_event_log::query::load_chart_data;
use sensor_event_log::{AppConfig, AppContext};

const KEY: &str = "3f786850e387550fdab836ed7e6dc881de23001b";

fn settings(url: String) -> DatabaseSettings {
    DatabaseSettings {
        url,
        connect_retries: 1,
        retry_wait: Duration::ZERO,
    }
}

/// Recreate `schema` and return a context whose connections use it.
async fn schema_context(schema: &str) -> Option<AppContext> {
    let Ok(base) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set, skipping");
        return None;
    };

    let admin = connect_with_retry(&settings(base.clone())).await.unwrap();
    admin
        .batch_execute(&format!(
            "DROP SCHEMA IF EXISTS {schema} CASCADE; CREATE SCHEMA {schema};"
        ))
        .await
        .unwrap();

    let separator = if base.contains('?') { '&' } else { '?' };
    let url = format!("{base}{separator}options=-c%20search_path%3D{schema}");
    let config = AppConfig {
        database: settings(url.clone()),
        api_key: KEY.into(),
        max_batch_size: 100,
        scan_timeout: Duration::from_secs(10),
    };
    Some(
        AppContext::open(config, Arc::new(PgStore::new(settings(url))))
            .await
            .unwrap(),
    )
}

#[tokio::test]
#[ignore]
async fn test_pg_duplicates_resubmission_and_since() {
    let Some(ctx) = schema_context("sensor_log_dupes").await else {
        return;
    };

    // Index 1 repeats timestamp 100 in both tables.
    let batch = IngestBatch::from_query(&format!(
        "apiKey={KEY}\
         &d=100&t=20&h=50&e=open\
         &d=100&t=21&h=51&e=close\
         &d=150&t=22&h=52&e=close\
         &d=200&t=23&h=&e=open"
    ));
    let first = ingest(&ctx, &batch).await.unwrap();
    assert_eq!(
        first,
        WriteCounts {
            measurements: 3,
            events: 3
        }
    );

    let again = ingest(&ctx, &batch).await.unwrap();
    assert_eq!(again, WriteCounts::default());

    let data = load_chart_data(&ctx, None).await.unwrap();
    assert_eq!(
        data.temperature,
        vec![(100_000, 20.0), (150_000, 22.0), (200_000, 23.0)]
    );
    assert_eq!(
        data.humidity,
        vec![(100_000, 50.0), (150_000, 52.0), (200_000, 0.0)]
    );
    assert_eq!(data.sessions, vec![(100_000, 150_000)]);

    let since = OffsetDateTime::from_unix_timestamp(150).unwrap();
    let later = load_chart_data(&ctx, Some(since)).await.unwrap();
    assert_eq!(later.temperature, vec![(150_000, 22.0), (200_000, 23.0)]);
    assert!(later.sessions.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn test_pg_concurrent_reporters_have_one_winner_per_timestamp() {
    let Some(ctx) = schema_context("sensor_log_race").await else {
        return;
    };

    let mut handles = Vec::new();
    for i in 0..6 {
        let ctx = ctx.clone();
        handles.push(tokio::spawn(async move {
            let batch = IngestBatch::from_query(&format!(
                "apiKey={KEY}&d=5000&t={}&h=50&e=open&d={}&t=20",
                20 + i,
                6000 + i
            ));
            ingest(&ctx, &batch).await
        }));
    }

    let mut measurements = 0;
    let mut events = 0;
    for handle in handles {
        let counts = handle.await.unwrap().unwrap();
        measurements += counts.measurements;
        events += counts.events;
    }
    assert_eq!(measurements, 7);
    assert_eq!(events, 1);

    let data = load_chart_data(&ctx, None).await.unwrap();
    assert_eq!(data.temperature.len(), 7);
    assert_eq!(data.temperature[0].0, 5_000_000);
}
