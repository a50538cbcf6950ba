//! The directory store: schema, connection pool, and the `DirectoryStore`
//! operations the dispatcher's handlers call into.

pub mod attributes;
pub mod directory;
pub mod migrations;
pub mod models;
pub mod pool;

pub use directory::{DirectoryStore, EntryUpdate};
pub use models::{Entry, NewEntry, ObjectKind};
pub use pool::{create_pool, SqlitePool};
