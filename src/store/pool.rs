//! Pool of `rusqlite::Connection`s, built on `deadpool::managed` the same
//! way the teacher pools outbound LDAP connections — retargeted at SQLite
//! connections instead of LDAP sessions (see `ldap::pool::LdapConnectionManager`
//! in the teacher for the shape this is adapted from).

use crate::errors::{HeraclesError, Result};
use async_trait::async_trait;
use deadpool::managed::{Manager, Metrics, Object, Pool, RecycleResult};
use rusqlite::Connection;
use std::path::PathBuf;
use tracing::{debug, instrument};

/// Pool of SQLite connections backing the directory store.
pub type SqlitePool = Pool<SqliteConnectionManager>;

/// A connection leased from the pool.
pub type PooledConnection = Object<SqliteConnectionManager>;

/// `deadpool::managed::Manager` that opens `rusqlite::Connection`s against
/// a single database file, with foreign keys enabled on every connection.
pub struct SqliteConnectionManager {
    database_path: PathBuf,
}

impl SqliteConnectionManager {
    /// Creates a new manager for the database file at `database_path`.
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
        }
    }
}

#[async_trait]
impl Manager for SqliteConnectionManager {
    type Type = Connection;
    type Error = HeraclesError;

    #[instrument(skip(self))]
    async fn create(&self) -> Result<Connection> {
        let path = self.database_path.clone();
        debug!("opening sqlite connection");
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&path)?;
            conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;")?;
            Ok::<_, HeraclesError>(conn)
        })
        .await
        .map_err(|e| HeraclesError::Pool(e.to_string()))?
    }

    #[instrument(skip(self, conn))]
    async fn recycle(&self, conn: &mut Connection, _metrics: &Metrics) -> RecycleResult<HeraclesError> {
        conn.execute_batch("SELECT 1;")
            .map_err(|e| deadpool::managed::RecycleError::Message(e.to_string().into()))
    }
}

/// Builds a `SqlitePool` of `max_size` connections against `database_path`.
pub fn create_pool(database_path: impl Into<PathBuf>, max_size: usize) -> Result<SqlitePool> {
    let manager = SqliteConnectionManager::new(database_path);
    Pool::builder(manager)
        .max_size(max_size)
        .build()
        .map_err(|e| HeraclesError::Pool(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pool_creates_and_returns_connections() {
        let pool = create_pool(":memory:", 2).unwrap();
        let conn = pool.get().await.unwrap();
        let value: i64 = conn.query_row("SELECT 1", [], |row| row.get(0)).unwrap();
        assert_eq!(value, 1);
    }
}
