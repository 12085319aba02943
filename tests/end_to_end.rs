use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;

use sensor_event_log::config::DatabaseSettings;
use sensor_event_log::database::{MemoryStore, Store, StoreTransaction};
use sensor_event_log::ingest::{ingest, IngestBatch, WriteCounts};
use sensor_event_log::models::ScanRow;
use sensor_event_log::query::load_chart_data;
use sensor_event_log::{AppConfig, AppContext, Error, Result};

const KEY: &str = "3f786850e387550fdab836ed7e6dc881de23001b";

fn config(scan_timeout: Duration) -> AppConfig {
    AppConfig {
        database: DatabaseSettings {
            url: "postgres://localhost/unused".into(),
            connect_retries: 1,
            retry_wait: Duration::ZERO,
        },
        api_key: KEY.into(),
        max_batch_size: 100,
        scan_timeout,
    }
}

fn memory_context() -> (AppContext, MemoryStore) {
    let store = MemoryStore::new();
    let ctx = AppContext::new(config(Duration::from_secs(5)), Arc::new(store.clone()));
    (ctx, store)
}

#[tokio::test]
async fn test_ingest_then_view() {
    let (ctx, _) = memory_context();

    let first = IngestBatch::from_query(&format!(
        "apiKey={KEY}\
         &d=100&t=20.0&h=50&e=DO\
         &d=150&t=20.5&h=51&e=\
         &d=200&t=&h=&e=DC\
         &d=bogus&t=30"
    ));
    let counts = ingest(&ctx, &first).await.unwrap();
    assert_eq!(
        counts,
        WriteCounts {
            measurements: 2,
            events: 2
        }
    );

    let second = IngestBatch::from_query(&format!(
        "apiKey={KEY}\
         &d=300&t=0&h=0&e=open\
         &d=320&t=&h=&e=open\
         &d=400&t=21&h=&e=close\
         &d=450&t=&h=&e=close\
         &d=500&t=&h=40&e=XX"
    ));
    let counts = ingest(&ctx, &second).await.unwrap();
    assert_eq!(
        counts,
        WriteCounts {
            measurements: 2,
            events: 4
        }
    );

    let data = load_chart_data(&ctx, None).await.unwrap();
    assert_eq!(
        data.temperature,
        vec![(100_000, 20.0), (150_000, 20.5), (400_000, 21.0), (500_000, 0.0)]
    );
    assert_eq!(
        data.humidity,
        vec![(100_000, 50.0), (150_000, 51.0), (400_000, 0.0), (500_000, 40.0)]
    );
    assert_eq!(data.sessions, vec![(100_000, 200_000), (300_000, 400_000)]);

    let later = load_chart_data(&ctx, Some(OffsetDateTime::from_unix_timestamp(300).unwrap()))
        .await
        .unwrap();
    assert_eq!(later.temperature, vec![(400_000, 21.0), (500_000, 0.0)]);
    assert_eq!(later.sessions, vec![(300_000, 400_000)]);
}

#[tokio::test]
async fn test_wrong_key_stores_nothing() {
    let (ctx, store) = memory_context();
    let batch = IngestBatch::from_query("apiKey=nope&d=100&t=20.0&h=50&e=open");

    assert!(matches!(ingest(&ctx, &batch).await, Err(Error::Unauthorized)));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_resubmitted_batch_is_not_double_counted() {
    let (ctx, store) = memory_context();
    let batch = IngestBatch::from_query(&format!("apiKey={KEY}&d=1000&t=20.0&h=55.0&e=open"));

    let first = ingest(&ctx, &batch).await.unwrap();
    let second = ingest(&ctx, &batch).await.unwrap();
    assert_eq!(first, WriteCounts { measurements: 1, events: 1 });
    assert_eq!(second, WriteCounts::default());
    assert_eq!(store.len(), (1, 1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reporters_have_one_winner_per_timestamp() {
    let (ctx, store) = memory_context();

    let mut handles = Vec::new();
    for i in 0..8 {
        let ctx = ctx.clone();
        handles.push(tokio::spawn(async move {
            let batch = IngestBatch::from_query(&format!(
                "apiKey={KEY}&d=1000&t={}&h=50&d={}&t=20",
                20 + i,
                2000 + i
            ));
            ingest(&ctx, &batch).await
        }));
    }

    let mut accepted = 0;
    for handle in handles {
        accepted += handle.await.unwrap().unwrap().measurements;
    }
    // One shared timestamp plus one private timestamp per reporter.
    assert_eq!(accepted, 9);
    assert_eq!(store.len(), (9, 0));
}

struct SlowStore;

#[async_trait]
impl Store for SlowStore {
    async fn ensure_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        MemoryStore::new().begin().await
    }

    async fn scan(&self, _since: Option<OffsetDateTime>) -> Result<Vec<ScanRow>> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_slow_scan_times_out() {
    let ctx = AppContext::new(config(Duration::from_millis(50)), Arc::new(SlowStore));
    let result = load_chart_data(&ctx, None).await;
    assert!(matches!(result, Err(Error::Timeout(_))));
}

#[derive(Default)]
struct SchemaCountingStore {
    inner: MemoryStore,
    schema_calls: AtomicUsize,
}

#[async_trait]
impl Store for SchemaCountingStore {
    async fn ensure_schema(&self) -> Result<()> {
        self.schema_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.ensure_schema().await
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        self.inner.begin().await
    }

    async fn scan(&self, since: Option<OffsetDateTime>) -> Result<Vec<ScanRow>> {
        self.inner.scan(since).await
    }
}

#[tokio::test]
async fn test_open_prepares_schema_before_first_use() {
    let store = Arc::new(SchemaCountingStore::default());
    let ctx = AppContext::open(config(Duration::from_secs(5)), store.clone())
        .await
        .unwrap();
    assert_eq!(store.schema_calls.load(Ordering::SeqCst), 1);

    let batch = IngestBatch::from_query(&format!("apiKey={KEY}&d=10&t=20&h=50"));
    assert_eq!(ingest(&ctx, &batch).await.unwrap().measurements, 1);
    assert_eq!(store.inner.len(), (1, 0));
}
