use std::env;
use std::fs;
use std::time::Duration;

use log::{info, warn};

use crate::error::{Error, Result};

const DEFAULT_API_KEY_FILE: &str = "apikey.txt";
const DEFAULT_MAX_BATCH_SIZE: usize = 1000;
const DEFAULT_SCAN_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CONNECT_RETRIES: usize = 5;
const DEFAULT_RETRY_WAIT_SECS: u64 = 5;

/// How to reach PostgreSQL.
#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub connect_retries: usize,
    pub retry_wait: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseSettings,
    /// Key reporters must present with every batch.
    pub api_key: String,
    pub max_batch_size: usize,
    pub scan_timeout: Duration,
}

impl AppConfig {
    /// Load configuration from the process environment and `.env`.
    pub fn from_env() -> Result<Self> {
        // Load environment variables
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup("DATABASE_URL")
            .ok_or_else(|| Error::Config("DATABASE_URL environment variable not set".into()))?;

        let api_key = match lookup("API_KEY") {
            Some(key) => key,
            None => {
                let path = lookup("API_KEY_FILE").unwrap_or_else(|| DEFAULT_API_KEY_FILE.into());
                info!("Reading api key from {}", path);
                fs::read_to_string(&path)
                    .map_err(|e| Error::Config(format!("Cannot read api key file {}: {}", path, e)))?
            }
        };
        let api_key = api_key.trim().to_string();
        if api_key.is_empty() {
            return Err(Error::Config("Api key is empty".into()));
        }
        if !looks_like_sha1_hex(&api_key) {
            warn!("Api key is not a 40 character lowercase hex string");
        }

        let max_batch_size = parse_or(&lookup, "MAX_BATCH_SIZE", DEFAULT_MAX_BATCH_SIZE)?;
        if max_batch_size == 0 {
            return Err(Error::Config("MAX_BATCH_SIZE must be greater than 0".into()));
        }
        let scan_timeout_secs = parse_or(&lookup, "SCAN_TIMEOUT_SECS", DEFAULT_SCAN_TIMEOUT_SECS)?;
        if scan_timeout_secs == 0 {
            return Err(Error::Config("SCAN_TIMEOUT_SECS must be greater than 0".into()));
        }
        let connect_retries = parse_or(&lookup, "DB_CONNECT_RETRIES", DEFAULT_CONNECT_RETRIES)?;
        if connect_retries == 0 {
            return Err(Error::Config("DB_CONNECT_RETRIES must be at least 1".into()));
        }
        let retry_wait_secs = parse_or(&lookup, "DB_RETRY_WAIT_SECS", DEFAULT_RETRY_WAIT_SECS)?;

        Ok(AppConfig {
            database: DatabaseSettings {
                url,
                connect_retries,
                retry_wait: Duration::from_secs(retry_wait_secs),
            },
            api_key,
            max_batch_size,
            scan_timeout: Duration::from_secs(scan_timeout_secs),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid {} '{}': {}", key, raw, e))),
    }
}

fn looks_like_sha1_hex(key: &str) -> bool {
    key.len() == 40 && key.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
