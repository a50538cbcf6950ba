//! Error types for the directory server.
//!
//! This module defines the closed error taxonomy used throughout the
//! library. Every variant maps to exactly one LDAP result code at the
//! handler boundary (see `operations::result_code_for`).

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, HeraclesError>;

/// Main error type for directory server operations.
#[derive(Error, Debug)]
pub enum HeraclesError {
    /// Malformed PDU or filter string.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Entry absent for a lookup-style operation.
    #[error("no such object: {0}")]
    NotFound(String),

    /// DN already present on Add.
    #[error("entry already exists: {0}")]
    AlreadyExists(String),

    /// Unknown uid, password mismatch, or malformed bound-DN shape.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Attempt to modify a protected/operational attribute.
    #[error("unwilling to perform: {0}")]
    UnwillingToPerform(String),

    /// Unsupported password scheme or other constraint failure.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// Missing required `objectClass` on Add.
    #[error("object class violation: {0}")]
    ObjectClassViolation(String),

    /// Delete attempted on an entry that still has children.
    #[error("operation not allowed on non-leaf entry: {0}")]
    NotAllowedOnNonLeaf(String),

    /// Unexpected database fault.
    #[error("storage error: {0}")]
    Storage(String),

    /// Password hashing failed.
    #[error("password hashing failed: {0}")]
    PasswordHash(String),

    /// Password verification failed (malformed stored hash, not a mismatch).
    #[error("password verification failed: {0}")]
    PasswordVerify(String),

    /// Unknown/unsupported password hash scheme.
    #[error("unsupported hash method: {0}")]
    UnsupportedHashMethod(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Connection/DB pool error.
    #[error("pool error: {0}")]
    Pool(String),

    /// Operation timed out.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Internal error not covered by a more specific variant.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for HeraclesError {
    fn from(err: std::io::Error) -> Self {
        HeraclesError::Internal(err.to_string())
    }
}

impl From<rusqlite::Error> for HeraclesError {
    fn from(err: rusqlite::Error) -> Self {
        HeraclesError::Storage(err.to_string())
    }
}

impl From<rusqlite_migration::Error> for HeraclesError {
    fn from(err: rusqlite_migration::Error) -> Self {
        HeraclesError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for HeraclesError {
    fn from(err: serde_json::Error) -> Self {
        HeraclesError::Storage(err.to_string())
    }
}

impl From<std::env::VarError> for HeraclesError {
    fn from(err: std::env::VarError) -> Self {
        HeraclesError::Configuration(err.to_string())
    }
}
