//! Server configuration.

use crate::errors::{HeraclesError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Server-wide configuration, loaded from the environment (and an optional
/// `.env` file) with `HERACLES_`-prefixed variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the listener binds to (e.g. "0.0.0.0").
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Port the listener binds to.
    #[serde(default = "default_bind_port")]
    pub bind_port: u16,

    /// Path to the SQLite database file.
    pub database_path: String,

    /// Directory suffix (e.g. "dc=test,dc=com").
    pub suffix: String,

    /// Whether an empty-name/empty-password Bind succeeds.
    #[serde(default)]
    pub allow_anonymous_bind: bool,

    /// Connection pool size for the SQLite pool.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Optional per-connection read timeout, in seconds.
    #[serde(default)]
    pub read_timeout_seconds: Option<u64>,

    /// Optional per-connection write timeout, in seconds.
    #[serde(default)]
    pub write_timeout_seconds: Option<u64>,

    /// Argon2id memory cost, in KiB.
    #[serde(default = "default_argon2_memory")]
    pub argon2_memory_kib: u32,

    /// Argon2id iteration count.
    #[serde(default = "default_argon2_iterations")]
    pub argon2_iterations: u32,

    /// Argon2id parallelism.
    #[serde(default = "default_argon2_parallelism")]
    pub argon2_parallelism: u32,

    /// Argon2id salt length, in bytes.
    #[serde(default = "default_argon2_salt_len")]
    pub argon2_salt_len: usize,

    /// Argon2id output key length, in bytes.
    #[serde(default = "default_argon2_key_len")]
    pub argon2_key_len: usize,
}

fn default_bind_address() -> String {
    "0.0.0.0".into()
}

fn default_bind_port() -> u16 {
    389
}

fn default_pool_size() -> usize {
    10
}

fn default_argon2_memory() -> u32 {
    19456
}

fn default_argon2_iterations() -> u32 {
    2
}

fn default_argon2_parallelism() -> u32 {
    1
}

fn default_argon2_salt_len() -> usize {
    16
}

fn default_argon2_key_len() -> usize {
    32
}

impl ServerConfig {
    /// Loads configuration from `HERACLES_*` environment variables, reading
    /// an optional `.env` file first.
    ///
    /// Required:
    /// - `HERACLES_DATABASE_PATH`: path to the SQLite file.
    /// - `HERACLES_SUFFIX`: directory suffix DN.
    ///
    /// Optional (defaults shown above):
    /// - `HERACLES_BIND_ADDRESS`, `HERACLES_BIND_PORT`, `HERACLES_POOL_SIZE`,
    ///   `HERACLES_ALLOW_ANONYMOUS_BIND`, `HERACLES_READ_TIMEOUT_SECONDS`,
    ///   `HERACLES_WRITE_TIMEOUT_SECONDS`, `HERACLES_ARGON2_MEMORY_KIB`,
    ///   `HERACLES_ARGON2_ITERATIONS`, `HERACLES_ARGON2_PARALLELISM`,
    ///   `HERACLES_ARGON2_SALT_LEN`, `HERACLES_ARGON2_KEY_LEN`.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let settings = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("HERACLES")
                    .try_parsing(true)
                    .separator("_"),
            )
            .build()
            .map_err(|e| HeraclesError::Configuration(e.to_string()))?;

        let database_path = settings
            .get_string("database_path")
            .map_err(|_| HeraclesError::Configuration("HERACLES_DATABASE_PATH not set".into()))?;

        let suffix = settings
            .get_string("suffix")
            .map_err(|_| HeraclesError::Configuration("HERACLES_SUFFIX not set".into()))?;

        let bind_address = settings
            .get_string("bind_address")
            .unwrap_or_else(|_| default_bind_address());

        let bind_port = settings
            .get_int("bind_port")
            .map(|v| v as u16)
            .unwrap_or_else(|_| default_bind_port());

        let allow_anonymous_bind = settings.get_bool("allow_anonymous_bind").unwrap_or(false);

        let pool_size = settings
            .get_int("pool_size")
            .map(|v| v as usize)
            .unwrap_or_else(|_| default_pool_size());

        let read_timeout_seconds = settings.get_int("read_timeout_seconds").ok().map(|v| v as u64);
        let write_timeout_seconds = settings
            .get_int("write_timeout_seconds")
            .ok()
            .map(|v| v as u64);

        let argon2_memory_kib = settings
            .get_int("argon2_memory_kib")
            .map(|v| v as u32)
            .unwrap_or_else(|_| default_argon2_memory());

        let argon2_iterations = settings
            .get_int("argon2_iterations")
            .map(|v| v as u32)
            .unwrap_or_else(|_| default_argon2_iterations());

        let argon2_parallelism = settings
            .get_int("argon2_parallelism")
            .map(|v| v as u32)
            .unwrap_or_else(|_| default_argon2_parallelism());

        let argon2_salt_len = settings
            .get_int("argon2_salt_len")
            .map(|v| v as usize)
            .unwrap_or_else(|_| default_argon2_salt_len());

        let argon2_key_len = settings
            .get_int("argon2_key_len")
            .map(|v| v as usize)
            .unwrap_or_else(|_| default_argon2_key_len());

        let config = Self {
            bind_address,
            bind_port,
            database_path,
            suffix,
            allow_anonymous_bind,
            pool_size,
            read_timeout_seconds,
            write_timeout_seconds,
            argon2_memory_kib,
            argon2_iterations,
            argon2_parallelism,
            argon2_salt_len,
            argon2_key_len,
        };

        config.validate()?;
        Ok(config)
    }

    /// Returns the configured read timeout, if any.
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_seconds.map(Duration::from_secs)
    }

    /// Returns the configured write timeout, if any.
    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout_seconds.map(Duration::from_secs)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.database_path.is_empty() {
            return Err(HeraclesError::Configuration(
                "database path cannot be empty".into(),
            ));
        }

        if self.suffix.is_empty() {
            return Err(HeraclesError::Configuration(
                "suffix cannot be empty".into(),
            ));
        }

        if self.pool_size == 0 {
            return Err(HeraclesError::Configuration(
                "pool size must be greater than 0".into(),
            ));
        }

        if self.argon2_parallelism == 0 {
            return Err(HeraclesError::Configuration(
                "argon2 parallelism must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            bind_port: default_bind_port(),
            database_path: "heracles.sqlite3".into(),
            suffix: "dc=example,dc=com".into(),
            allow_anonymous_bind: false,
            pool_size: default_pool_size(),
            read_timeout_seconds: None,
            write_timeout_seconds: None,
            argon2_memory_kib: default_argon2_memory(),
            argon2_iterations: default_argon2_iterations(),
            argon2_parallelism: default_argon2_parallelism(),
            argon2_salt_len: default_argon2_salt_len(),
            argon2_key_len: default_argon2_key_len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn empty_database_path_rejected() {
        let mut config = ServerConfig::default();
        config.database_path = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_suffix_rejected() {
        let mut config = ServerConfig::default();
        config.suffix = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_pool_size_rejected() {
        let mut config = ServerConfig::default();
        config.pool_size = 0;
        assert!(config.validate().is_err());
    }
}
