// ABOUTME: Connection provider for source and destination databases
// ABOUTME: TLS policy, connection driver task, and retry-on-connect

use crate::error::{ReplicationError, Result};
use crate::utils::{retry_with_backoff, strip_password_from_url};
use postgres_native_tls::MakeTlsConnector;
use std::sync::OnceLock;
use std::time::Duration;
use tokio_postgres::Client;

/// Whether self-signed TLS certificates are accepted.
///
/// Set once at startup from the CLI flag; defaults to strict verification.
static ALLOW_SELF_SIGNED_CERTS: OnceLock<bool> = OnceLock::new();

/// Initialize the process-wide TLS policy.
///
/// Safe to call once; later calls are ignored.
pub fn init_tls_policy(allow_self_signed_certs: bool) {
    let _ = ALLOW_SELF_SIGNED_CERTS.set(allow_self_signed_certs);
}

fn tls_connector() -> Result<MakeTlsConnector> {
    let allow = *ALLOW_SELF_SIGNED_CERTS.get().unwrap_or(&false);
    let mut builder = native_tls::TlsConnector::builder();
    if allow {
        builder.danger_accept_invalid_certs(true);
    }
    let connector = builder
        .build()
        .map_err(|e| ReplicationError::connection(format!("failed to build TLS connector: {}", e)))?;
    Ok(MakeTlsConnector::new(connector))
}

/// Connect to a PostgreSQL database.
///
/// Spawns the connection driver task; its termination is logged, not fatal,
/// because the next query on the client surfaces the broken session anyway.
pub async fn connect(url: &str) -> Result<Client> {
    let tls = tls_connector()?;
    let (client, connection) = tokio_postgres::connect(url, tls).await.map_err(|e| {
        ReplicationError::connection(format!(
            "failed to connect to {}: {}",
            strip_password_from_url(url),
            e
        ))
    })?;

    let logged_url = strip_password_from_url(url);
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::warn!("Connection to {} ended with error: {}", logged_url, e);
        }
    });

    Ok(client)
}

/// Connect with exponential-backoff retry for transient failures.
pub async fn connect_with_retry(url: &str) -> Result<Client> {
    retry_with_backoff(|| connect(url), 3, Duration::from_secs(1)).await
}
