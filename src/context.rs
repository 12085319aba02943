use std::sync::Arc;

use crate::config::AppConfig;
use crate::database::{PgStore, Store};
use crate::error::Result;

/// Configuration and storage handle shared by every request.
///
/// Built once at startup. Cloning is cheap; clones share the same store.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn Store>,
}

impl AppContext {
    pub fn new(config: AppConfig, store: Arc<dyn Store>) -> Self {
        AppContext {
            config: Arc::new(config),
            store,
        }
    }

    /// Context over `store` with its tables created if missing.
    pub async fn open(config: AppConfig, store: Arc<dyn Store>) -> Result<Self> {
        store.ensure_schema().await?;
        Ok(Self::new(config, store))
    }

    /// Context backed by the PostgreSQL database named in the configuration.
    pub async fn open_postgres(config: AppConfig) -> Result<Self> {
        let store = Arc::new(PgStore::new(config.database.clone()));
        Self::open(config, store).await
    }
}
