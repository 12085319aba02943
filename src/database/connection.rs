use log::{debug, error};
use openssl::ssl::{SslConnector, SslMethod};
use postgres_openssl::MakeTlsConnector;
use tokio::time::sleep;
use tokio_postgres::tls::MakeTlsConnect;
use tokio_postgres::{Client, NoTls, Socket};
use url::{form_urlencoded, Url};

use crate::config::DatabaseSettings;
use crate::error::{Error, Result};

pub fn create_ssl_connector(sslrootcert_path: &str) -> Result<MakeTlsConnector> {
    let mut builder = SslConnector::builder(SslMethod::tls())?;
    builder.set_ca_file(sslrootcert_path)?;
    Ok(MakeTlsConnector::new(builder.build()))
}

/// Split the libpq-style `sslrootcert` parameter off a connection URL.
///
/// tokio-postgres rejects the parameter, so it is removed from the URL and
/// returned separately for the OpenSSL connector. The remaining parameters
/// are kept exactly as written, still percent-encoded.
pub fn split_ssl_root_cert(database_url: &str) -> Result<(String, Option<String>)> {
    let url = Url::parse(database_url)?;

    let mut sslrootcert_path = None;
    let mut kept = Vec::new();
    for raw in url.query().unwrap_or_default().split('&') {
        match form_urlencoded::parse(raw.as_bytes()).next() {
            Some((key, value)) if key == "sslrootcert" => {
                sslrootcert_path = Some(value.into_owned());
            }
            Some(_) => kept.push(raw),
            None => {}
        }
    }

    let mut clean_url = url.clone();
    if kept.is_empty() {
        clean_url.set_query(None);
    } else {
        clean_url.set_query(Some(&kept.join("&")));
    }

    Ok((clean_url.to_string(), sslrootcert_path))
}

async fn open<T>(url: &str, tls: T) -> std::result::Result<Client, tokio_postgres::Error>
where
    T: MakeTlsConnect<Socket>,
    T::Stream: Send + 'static,
{
    let (client, connection) = tokio_postgres::connect(url, tls).await?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            error!("Connection error: {}", e);
        }
    });
    Ok(client)
}

/// Open a new client, retrying connection establishment.
///
/// URL and certificate problems fail immediately; only the connect itself is
/// retried, `settings.connect_retries` times with a fixed wait in between.
pub async fn connect_with_retry(settings: &DatabaseSettings) -> Result<Client> {
    let (clean_url, sslrootcert_path) = split_ssl_root_cert(&settings.url)?;
    let connector = sslrootcert_path
        .as_deref()
        .map(create_ssl_connector)
        .transpose()?;

    let mut last_error = None;
    for attempt in 0..settings.connect_retries {
        let result = match &connector {
            Some(tls) => open(&clean_url, tls.clone()).await,
            None => open(&clean_url, NoTls).await,
        };

        match result {
            Ok(client) => {
                debug!("Connected to database on attempt {}", attempt + 1);
                return Ok(client);
            }
            Err(e) => {
                error!(
                    "Attempt {}/{}: connection error: {}",
                    attempt + 1,
                    settings.connect_retries,
                    e
                );
                last_error = Some(e);
            }
        }

        if attempt + 1 < settings.connect_retries {
            sleep(settings.retry_wait).await;
        }
    }

    Err(match last_error {
        Some(e) => Error::Database(e),
        None => Error::Config("DB_CONNECT_RETRIES must be at least 1".into()),
    })
}
