//! # Heracles LDAP Daemon
//!
//! A lightweight LDAPv3 directory server backed by a single SQLite file.
//!
//! This crate provides:
//! - A hand-rolled BER/LDAPv3 wire codec (`codec`)
//! - An EAV-style directory store over `rusqlite` (`store`)
//! - A search filter parser, matcher, and SQL compiler (`filter`)
//! - DN parsing and escaping per RFC 4514 (`dn`)
//! - Argon2id password hashing (`crypto`)
//! - The connection listener and operation dispatcher (`server`, `operations`)
//!
//! ## Example
//!
//! ```rust,no_run
//! use heracles_ldapd::config::ServerConfig;
//! use heracles_ldapd::server::Listener;
//! use heracles_ldapd::store::{create_pool, DirectoryStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::from_env()?;
//!     let pool = create_pool(&config.database_path, config.pool_size)?;
//!     let store = Arc::new(DirectoryStore::new(pool));
//!
//!     let (listener, shutdown) = Listener::bind(Arc::new(config), store).await?;
//!     tokio::spawn(async move {
//!         tokio::signal::ctrl_c().await.ok();
//!         shutdown.trigger();
//!     });
//!     listener.run().await?;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod crypto;
pub mod dn;
pub mod errors;
pub mod filter;
pub mod operations;
pub mod rootdse;
pub mod server;
pub mod store;

pub use errors::{HeraclesError, Result};

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
