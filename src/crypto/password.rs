//! Argon2id password hashing and verification.
//!
//! Storage format, including the LDAP scheme prefix required by RFC 3112:
//!
//! ```text
//! {ARGON2ID}$argon2id$v=19$m=<mem>,t=<iter>,p=<par>$<b64-salt>$<b64-hash>
//! ```
//!
//! where salt and hash are base64 without padding.

use crate::errors::{HeraclesError, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher as Argon2Hasher, SaltString},
    Argon2, Params, PasswordVerifier as Argon2Verifier, Version,
};

/// The LDAP scheme prefix this server accepts and emits.
pub const SCHEME_PREFIX: &str = "{ARGON2ID}";

/// Argon2id cost parameters, taken from `ServerConfig`.
#[derive(Debug, Clone, Copy)]
pub struct Argon2Params {
    /// Memory cost, in KiB.
    pub memory_kib: u32,
    /// Iteration count.
    pub iterations: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
    /// Output key length, in bytes.
    pub key_len: usize,
}

impl Argon2Params {
    fn to_argon2(self) -> Result<Argon2<'static>> {
        let params = Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(self.key_len),
        )
        .map_err(|e| HeraclesError::PasswordHash(format!("invalid argon2 parameters: {e}")))?;
        Ok(Argon2::new(
            argon2::Algorithm::Argon2id,
            Version::V0x13,
            params,
        ))
    }
}

/// Generates a cryptographically random salt, runs Argon2id, and emits the
/// `{ARGON2ID}...` formatted string.
pub fn hash(plain: &str, params: Argon2Params) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = params.to_argon2()?;

    let phc = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| HeraclesError::PasswordHash(format!("argon2 hash failed: {e}")))?
        .to_string();

    Ok(format!("{SCHEME_PREFIX}{phc}"))
}

/// Requires the `{ARGON2ID}` scheme prefix; parses the parameters;
/// recomputes and compares in constant time.
pub fn verify(plain: &str, stored: &str) -> Result<bool> {
    let phc = stored
        .strip_prefix(SCHEME_PREFIX)
        .ok_or_else(|| HeraclesError::PasswordVerify("missing {ARGON2ID} prefix".into()))?;

    let parsed = argon2::PasswordHash::new(phc)
        .map_err(|e| HeraclesError::PasswordVerify(format!("invalid argon2 hash: {e}")))?;

    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

/// If `input` begins with `{`, the scheme must be exactly `ARGON2ID` and the
/// structure must validate (6 `$`-separated parts after the prefix,
/// algorithm literal `argon2id`); then `input` is returned unchanged.
/// Otherwise `input` is treated as plaintext and hashed.
pub fn process(input: &str, params: Argon2Params) -> Result<String> {
    if input.starts_with('{') {
        if !input.starts_with(SCHEME_PREFIX) {
            return Err(HeraclesError::ConstraintViolation(format!(
                "unsupported password scheme in {input:?}"
            )));
        }
        validate_structure(input)?;
        return Ok(input.to_string());
    }

    hash(input, params)
}

/// Validates the 6 `$`-separated parts after the scheme prefix:
/// `$argon2id$v=19$m=...,t=...,p=...$salt$hash`.
fn validate_structure(stored: &str) -> Result<()> {
    let phc = stored
        .strip_prefix(SCHEME_PREFIX)
        .expect("caller already checked the prefix");

    let parts: Vec<&str> = phc.split('$').collect();
    // split("$argon2id$v=19$m=...$salt$hash") => ["", "argon2id", "v=19", "m=...", "salt", "hash"]
    if parts.len() != 6 {
        return Err(HeraclesError::ConstraintViolation(format!(
            "malformed argon2id hash: expected 6 '$'-separated parts, found {}",
            parts.len()
        )));
    }

    if parts[1] != "argon2id" {
        return Err(HeraclesError::ConstraintViolation(format!(
            "unsupported algorithm literal: {}",
            parts[1]
        )));
    }

    argon2::PasswordHash::new(phc)
        .map_err(|e| HeraclesError::ConstraintViolation(format!("invalid argon2 hash: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_params() -> Argon2Params {
        // Minimum viable cost for fast tests; production uses config values.
        Argon2Params {
            memory_kib: 19,
            iterations: 2,
            parallelism: 1,
            key_len: 32,
        }
    }

    #[test]
    fn hash_carries_scheme_prefix() {
        let hashed = hash("Secret1!", test_params()).unwrap();
        assert!(hashed.starts_with("{ARGON2ID}$argon2id$v=19$"));
    }

    #[test]
    fn verify_roundtrip() {
        let hashed = hash("Secret1!", test_params()).unwrap();
        assert!(verify("Secret1!", &hashed).unwrap());
        assert!(!verify("wrong", &hashed).unwrap());
    }

    #[test]
    fn verify_rejects_missing_prefix() {
        let err = verify("x", "$argon2id$v=19$m=19,t=2,p=1$salt$hash").unwrap_err();
        assert!(matches!(err, HeraclesError::PasswordVerify(_)));
    }

    #[test]
    fn process_hashes_plaintext() {
        let processed = process("MyP@ss", test_params()).unwrap();
        assert!(processed.starts_with("{ARGON2ID}"));
        assert!(verify("MyP@ss", &processed).unwrap());
    }

    #[test]
    fn process_passes_through_valid_prehashed_value() {
        let hashed = hash("MyP@ss", test_params()).unwrap();
        let processed = process(&hashed, test_params()).unwrap();
        assert_eq!(processed, hashed);
    }

    #[test]
    fn process_rejects_unknown_scheme() {
        let err = process("{SSHA}abc123", test_params()).unwrap_err();
        assert!(matches!(err, HeraclesError::ConstraintViolation(_)));
    }

    #[test]
    fn process_rejects_malformed_prehashed_structure() {
        let err = process("{ARGON2ID}not-a-valid-hash", test_params()).unwrap_err();
        assert!(matches!(err, HeraclesError::ConstraintViolation(_)));
    }
}
