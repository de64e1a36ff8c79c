//! Verification-secret primitives.
//!
//! A secret is generated as plaintext, handed to the caller for out-of-band
//! delivery, and persisted only as a SHA-256 hex digest together with its
//! expiry. Storage, consumption and rollback live in the infra layer; this
//! module owns the shapes, TTLs and the per-entity slot mapping.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use churchos_core::{DomainError, Entity};

/// What a secret proves control of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretPurpose {
    EmailVerification,
    /// One-time code sent to the account email.
    Otp,
    PhoneOtp,
    PasswordReset,
}

/// Plaintext format of a secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretShape {
    /// Random bytes rendered as lowercase hex.
    HexBytes(usize),
    /// Zero-padded decimal code.
    Digits(u32),
}

impl SecretPurpose {
    pub const ALL: [SecretPurpose; 4] = [
        SecretPurpose::EmailVerification,
        SecretPurpose::Otp,
        SecretPurpose::PhoneOtp,
        SecretPurpose::PasswordReset,
    ];

    pub fn ttl(self) -> Duration {
        match self {
            SecretPurpose::EmailVerification => Duration::hours(24),
            SecretPurpose::Otp | SecretPurpose::PhoneOtp => Duration::minutes(10),
            SecretPurpose::PasswordReset => Duration::minutes(10),
        }
    }

    pub fn shape(self) -> SecretShape {
        match self {
            SecretPurpose::EmailVerification | SecretPurpose::PasswordReset => SecretShape::HexBytes(20),
            SecretPurpose::Otp | SecretPurpose::PhoneOtp => SecretShape::Digits(6),
        }
    }

    /// Stable column/field prefix, also used in log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            SecretPurpose::EmailVerification => "email_verification",
            SecretPurpose::Otp => "otp",
            SecretPurpose::PhoneOtp => "phone_otp",
            SecretPurpose::PasswordReset => "password_reset",
        }
    }
}

impl core::fmt::Display for SecretPurpose {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generate a fresh plaintext secret for `purpose`.
pub fn generate_plaintext(purpose: SecretPurpose) -> String {
    let mut rng = rand::rng();
    match purpose.shape() {
        SecretShape::HexBytes(len) => {
            let mut bytes = vec![0u8; len];
            rng.fill(bytes.as_mut_slice());
            hex::encode(bytes)
        }
        SecretShape::Digits(n) => {
            let upper = 10u64.pow(n);
            let code = rng.random_range(0..upper);
            format!("{code:0width$}", width = n as usize)
        }
    }
}

/// One-way digest of a plaintext secret. Only this value is ever stored.
pub fn hash_secret(plaintext: &str) -> String {
    hex::encode(Sha256::digest(plaintext.as_bytes()))
}

/// Stored half of a secret: hash and expiry are always written and cleared
/// together, so the pair lives in one value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretSlot {
    pub hash: String,
    pub expires_at: DateTime<Utc>,
}

impl SecretSlot {
    pub fn issue(purpose: SecretPurpose, plaintext: &str, now: DateTime<Utc>) -> Self {
        Self {
            hash: hash_secret(plaintext),
            expires_at: now + purpose.ttl(),
        }
    }

    /// Expiry is evaluated lazily: a slot past its deadline is dead even if
    /// it is still stored.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    pub fn matches(&self, hash: &str, now: DateTime<Utc>) -> bool {
        self.is_live(now) && self.hash == hash
    }
}

/// Entity kinds that can hold verification secrets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Organization,
}

/// How a consume call narrows candidate entities before the hash match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretLookup<Id> {
    /// Match on the hash alone (link-style tokens).
    HashOnly,
    Id(Id),
    Email(String),
    Phone(String),
}

/// An entity with per-purpose secret slots.
pub trait SecretHolder: Entity + Clone + Send + Sync + 'static {
    const KIND: EntityKind;

    fn slot(&self, purpose: SecretPurpose) -> Result<&Option<SecretSlot>, DomainError>;

    fn slot_mut(&mut self, purpose: SecretPurpose) -> Result<&mut Option<SecretSlot>, DomainError>;

    /// Whether the entity satisfies a lookup key. `HashOnly` matches all.
    fn matches_lookup(&self, lookup: &SecretLookup<Self::Id>) -> bool;

    /// Side effect of a successful consume (e.g. mark the email verified).
    fn apply_consumed(&mut self, purpose: SecretPurpose, now: DateTime<Utc>);

    fn supports(purpose: SecretPurpose) -> bool;

    /// Clear the slot and apply the purpose's effect if `hash` matches a live
    /// secret. Returns whether it did.
    fn try_consume(&mut self, purpose: SecretPurpose, hash: &str, now: DateTime<Utc>) -> bool {
        let Ok(slot) = self.slot_mut(purpose) else {
            return false;
        };
        if !slot.as_ref().is_some_and(|s| s.matches(hash, now)) {
            return false;
        }
        *slot = None;
        self.apply_consumed(purpose, now);
        true
    }
}

pub(crate) fn unsupported(kind: EntityKind, purpose: SecretPurpose) -> DomainError {
    DomainError::validation(format!("{kind:?} does not hold {purpose} secrets"))
}
