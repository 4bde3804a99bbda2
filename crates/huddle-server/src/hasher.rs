//! Credential hashing for stored account passwords.
//!
//! Digests are PHC strings (`$argon2id$v=19$m=..,t=..,p=..$salt$hash`), so
//! the parameters travel with each digest and can be raised later without
//! invalidating existing accounts.

use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::SaltString,
};
use thiserror::Error;

/// Salt length in bytes.
const SALT_LEN: usize = 16;

/// Errors from producing a digest.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HashError {
    /// Cost parameters rejected by Argon2
    #[error("invalid hash parameters: {0}")]
    Params(String),

    /// OS random source unavailable
    #[error("salt generation failed: {0}")]
    Salt(String),

    /// Hash computation failed
    #[error("hashing failed: {0}")]
    Hash(String),
}

/// One-way password hashing.
pub trait CredentialHasher: Send + Sync + 'static {
    /// Produce a salted digest of `plaintext`.
    fn hash(&self, plaintext: &str) -> Result<String, HashError>;

    /// Whether `plaintext` matches `digest`. A malformed digest never
    /// matches.
    fn verify(&self, digest: &str, plaintext: &str) -> bool;
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashConfig {
    /// Memory cost in KiB
    pub m_cost: u32,
    /// Number of passes
    pub t_cost: u32,
    /// Degree of parallelism
    pub p_cost: u32,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self { m_cost: 19_456, t_cost: 2, p_cost: 1 }
    }
}

impl HashConfig {
    /// Minimal costs for tests and fuzzing. Not for production accounts.
    pub fn fast() -> Self {
        Self { m_cost: 256, t_cost: 1, p_cost: 1 }
    }
}

/// [`CredentialHasher`] using Argon2id v0x13.
#[derive(Clone)]
pub struct Argon2Hasher {
    argon2: Argon2<'static>,
}

impl Argon2Hasher {
    /// Build a hasher with the given costs.
    ///
    /// # Errors
    ///
    /// Returns `HashError::Params` if Argon2 rejects the costs (for example
    /// `t_cost = 0`).
    pub fn new(config: HashConfig) -> Result<Self, HashError> {
        let params = Params::new(config.m_cost, config.t_cost, config.p_cost, None)
            .map_err(|e| HashError::Params(e.to_string()))?;

        Ok(Self { argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params) })
    }
}

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, plaintext: &str) -> Result<String, HashError> {
        let mut bytes = [0u8; SALT_LEN];
        getrandom::fill(&mut bytes).map_err(|e| HashError::Salt(e.to_string()))?;
        let salt = SaltString::encode_b64(&bytes).map_err(|e| HashError::Salt(e.to_string()))?;

        let digest = self
            .argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| HashError::Hash(e.to_string()))?;

        Ok(digest.to_string())
    }

    fn verify(&self, digest: &str, plaintext: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(digest) else {
            tracing::warn!("stored credential digest is malformed");
            return false;
        };

        self.argon2.verify_password(plaintext.as_bytes(), &parsed).is_ok()
    }
}
