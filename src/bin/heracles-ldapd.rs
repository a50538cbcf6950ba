//! Process entry point: load configuration, run pending migrations, bind
//! the listener, and run until an interrupt or terminate signal arrives.

use std::sync::Arc;

use heracles_ldapd::config::ServerConfig;
use heracles_ldapd::errors::Result;
use heracles_ldapd::server::Listener;
use heracles_ldapd::store::{create_pool, migrations, DirectoryStore};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env()?;
    info!(suffix = %config.suffix, bind_address = %config.bind_address, bind_port = config.bind_port, "starting heracles-ldapd");

    run_migrations(&config)?;

    let pool = create_pool(&config.database_path, config.pool_size)?;
    let store = Arc::new(DirectoryStore::new(pool));
    let config = Arc::new(config);

    let (listener, shutdown) = Listener::bind(config, store).await?;

    tokio::spawn(async move {
        if let Err(e) = wait_for_signal().await {
            error!(error = %e, "failed to install signal handler");
        }
        info!("shutdown signal received");
        shutdown.trigger();
    });

    listener.run().await
}

/// Applies pending schema migrations against a one-off connection before
/// the pool (and any concurrent traffic) exists.
fn run_migrations(config: &ServerConfig) -> Result<()> {
    let mut conn = rusqlite::Connection::open(&config.database_path)?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    migrations::run(&mut conn)
}

async fn wait_for_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => Ok(()),
            _ = terminate.recv() => Ok(()),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}
