//! Cryptographic module.
//!
//! This module provides password hashing and verification for the single
//! wire format this server accepts: an Argon2id hash carrying the LDAP
//! scheme prefix required by RFC 3112 (see `password` for the exact
//! format string).

pub mod password;

pub use password::{hash, process, verify, Argon2Params};
