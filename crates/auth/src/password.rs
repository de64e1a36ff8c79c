//! Password hashing (Argon2id, PHC strings).

use argon2::{
    Algorithm, Argon2, Params, ParamsBuilder, Version,
    password_hash::{self, PasswordHash as PhcHash, PasswordHasher as _, PasswordVerifier, SaltString},
};
use rand::{TryRngCore, rngs::OsRng};
use thiserror::Error;

/// Shortest password accepted at registration, reset and change.
pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PasswordError {
    #[error("password must be at least {MIN_PASSWORD_LEN} characters")]
    TooShort,

    #[error("invalid Argon2 parameters: {0}")]
    InvalidParams(String),

    #[error("password hashing error: {0}")]
    Hash(String),
}

impl From<password_hash::Error> for PasswordError {
    fn from(err: password_hash::Error) -> Self {
        PasswordError::Hash(err.to_string())
    }
}

/// Argon2 cost factors. `Default` matches the OWASP baseline for Argon2id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashCost {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashCost {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl HashCost {
    /// Cheapest parameters Argon2 accepts. Only meant for tests.
    pub fn minimal() -> Self {
        Self {
            memory_kib: Params::MIN_M_COST,
            iterations: Params::MIN_T_COST,
            parallelism: Params::MIN_P_COST,
        }
    }
}

/// Stored password hash (PHC string). Write-only outward: no `Serialize`,
/// and `Debug` never prints the digest.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordHash(String);

impl PasswordHash {
    /// Wrap a PHC string loaded from storage.
    pub fn from_phc(phc: impl Into<String>) -> Self {
        Self(phc.into())
    }

    pub fn as_phc(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("PasswordHash(<redacted>)")
    }
}

pub fn check_password_policy(plaintext: &str) -> Result<(), PasswordError> {
    if plaintext.chars().count() < MIN_PASSWORD_LEN {
        return Err(PasswordError::TooShort);
    }
    Ok(())
}

/// Salted, adaptive one-way hashing for user passwords.
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    argon2: Argon2<'static>,
}

impl PasswordHasher {
    const SALT_LENGTH: usize = password_hash::Salt::RECOMMENDED_LENGTH;

    pub fn new(cost: HashCost) -> Result<Self, PasswordError> {
        let params = ParamsBuilder::new()
            .m_cost(cost.memory_kib)
            .t_cost(cost.iterations)
            .p_cost(cost.parallelism)
            .build()
            .map_err(|err| PasswordError::InvalidParams(err.to_string()))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::default(), params),
        })
    }

    pub fn hash(&self, plaintext: &str) -> Result<PasswordHash, PasswordError> {
        let mut salt_bytes = [0u8; Self::SALT_LENGTH];
        OsRng
            .try_fill_bytes(&mut salt_bytes)
            .map_err(|err| PasswordError::Hash(err.to_string()))?;
        let salt = SaltString::encode_b64(&salt_bytes)?;
        let phc = self.argon2.hash_password(plaintext.as_bytes(), &salt)?.to_string();
        Ok(PasswordHash(phc))
    }

    /// `false` on mismatch and on a malformed stored hash alike.
    pub fn verify(&self, plaintext: &str, hash: &PasswordHash) -> bool {
        match PhcHash::new(hash.as_phc()) {
            Ok(parsed) => self.argon2.verify_password(plaintext.as_bytes(), &parsed).is_ok(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> PasswordHasher {
        PasswordHasher::new(HashCost::minimal()).unwrap()
    }

    #[test]
    fn hash_then_verify() {
        let h = hasher();
        let hash = h.hash("correct horse").unwrap();
        assert!(hash.as_phc().starts_with("$argon2id$"));
        assert!(h.verify("correct horse", &hash));
        assert!(!h.verify("wrong horse", &hash));
    }

    #[test]
    fn salts_differ_between_hashes() {
        let h = hasher();
        assert_ne!(h.hash("secret1").unwrap(), h.hash("secret1").unwrap());
    }

    #[test]
    fn garbage_hash_never_verifies() {
        assert!(!hasher().verify("anything", &PasswordHash::from_phc("not-a-phc")));
    }

    #[test]
    fn debug_is_redacted() {
        let hash = hasher().hash("secret1").unwrap();
        assert_eq!(format!("{hash:?}"), "PasswordHash(<redacted>)");
    }

    #[test]
    fn policy_enforces_minimum_length() {
        assert_eq!(check_password_policy("12345"), Err(PasswordError::TooShort));
        assert!(check_password_policy("123456").is_ok());
    }
}
