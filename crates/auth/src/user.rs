//! User identity entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use churchos_core::{DomainError, Entity, OrganizationId, RoleId, UserId, ValueObject};

use crate::password::PasswordHash;
use crate::secret::{EntityKind, SecretHolder, SecretLookup, SecretPurpose, SecretSlot};

/// Case-normalized email address (trimmed, lowercased).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let email = raw.trim().to_lowercase();
        let valid = match email.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty() && !domain.is_empty() && !domain.contains('@') && !email.contains(char::is_whitespace)
            }
            None => false,
        };
        if !valid {
            return Err(DomainError::validation("a valid email is required"));
        }
        Ok(Self(email))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ValueObject for Email {}

impl TryFrom<String> for Email {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Email> for String {
    fn from(value: Email) -> Self {
        value.0
    }
}

impl core::fmt::Display for Email {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Phone number with formatting characters stripped.
///
/// Keeps a leading `+` and digits; spaces, dashes and parentheses are
/// dropped so the same number always compares equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let raw = raw.trim();
        let mut out = String::with_capacity(raw.len());
        for (i, c) in raw.chars().enumerate() {
            match c {
                '+' if i == 0 => out.push(c),
                '0'..='9' => out.push(c),
                ' ' | '-' | '(' | ')' | '.' => {}
                _ => return Err(DomainError::validation("phone number contains invalid characters")),
            }
        }
        let digits = out.chars().filter(char::is_ascii_digit).count();
        if !(7..=15).contains(&digits) {
            return Err(DomainError::validation("phone number must have 7 to 15 digits"));
        }
        Ok(Self(out))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ValueObject for PhoneNumber {}

impl TryFrom<String> for PhoneNumber {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PhoneNumber> for String {
    fn from(value: PhoneNumber) -> Self {
        value.0
    }
}

impl core::fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A registered identity.
///
/// Holds credential material and secret slots, so it is deliberately not
/// `Serialize`; use [`UserProfile`] for anything that leaves the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: Email,
    pub phone_number: Option<PhoneNumber>,
    pub password_hash: PasswordHash,
    pub role_id: RoleId,
    pub organization_id: Option<OrganizationId>,
    pub is_email_verified: bool,
    pub is_phone_verified: bool,
    pub email_verification: Option<SecretSlot>,
    pub otp: Option<SecretSlot>,
    pub phone_otp: Option<SecretSlot>,
    pub password_reset: Option<SecretSlot>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to create a [`User`].
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: Email,
    pub phone_number: Option<PhoneNumber>,
    pub password_hash: PasswordHash,
    pub role_id: RoleId,
    pub organization_id: Option<OrganizationId>,
}

impl User {
    pub fn create(new: NewUser, now: DateTime<Utc>) -> Result<Self, DomainError> {
        let name = new.name.trim().to_string();
        if name.is_empty() {
            return Err(DomainError::validation("name is required"));
        }
        Ok(Self {
            id: UserId::new(),
            name,
            email: new.email,
            phone_number: new.phone_number,
            password_hash: new.password_hash,
            role_id: new.role_id,
            organization_id: new.organization_id,
            is_email_verified: false,
            is_phone_verified: false,
            email_verification: None,
            otp: None,
            phone_otp: None,
            password_reset: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn rename(&mut self, name: &str, now: DateTime<Utc>) -> Result<(), DomainError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("name is required"));
        }
        self.name = name.to_string();
        self.updated_at = now;
        Ok(())
    }

    /// A changed phone number must be verified again.
    pub fn set_phone_number(&mut self, phone: Option<PhoneNumber>, now: DateTime<Utc>) {
        if self.phone_number != phone {
            self.phone_number = phone;
            self.is_phone_verified = false;
            self.phone_otp = None;
        }
        self.updated_at = now;
    }

    pub fn set_password(&mut self, hash: PasswordHash, now: DateTime<Utc>) {
        self.password_hash = hash;
        self.updated_at = now;
    }

    pub fn assign_role(&mut self, role_id: RoleId, now: DateTime<Utc>) {
        self.role_id = role_id;
        self.updated_at = now;
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            phone_number: self.phone_number.clone(),
            role_id: self.role_id,
            organization_id: self.organization_id,
            is_email_verified: self.is_email_verified,
            is_phone_verified: self.is_phone_verified,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl Entity for User {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl SecretHolder for User {
    const KIND: EntityKind = EntityKind::User;

    fn slot(&self, purpose: SecretPurpose) -> Result<&Option<SecretSlot>, DomainError> {
        Ok(match purpose {
            SecretPurpose::EmailVerification => &self.email_verification,
            SecretPurpose::Otp => &self.otp,
            SecretPurpose::PhoneOtp => &self.phone_otp,
            SecretPurpose::PasswordReset => &self.password_reset,
        })
    }

    fn slot_mut(&mut self, purpose: SecretPurpose) -> Result<&mut Option<SecretSlot>, DomainError> {
        Ok(match purpose {
            SecretPurpose::EmailVerification => &mut self.email_verification,
            SecretPurpose::Otp => &mut self.otp,
            SecretPurpose::PhoneOtp => &mut self.phone_otp,
            SecretPurpose::PasswordReset => &mut self.password_reset,
        })
    }

    fn matches_lookup(&self, lookup: &SecretLookup<UserId>) -> bool {
        match lookup {
            SecretLookup::HashOnly => true,
            SecretLookup::Id(id) => self.id == *id,
            SecretLookup::Email(email) => self.email.as_str() == email,
            SecretLookup::Phone(phone) => self.phone_number.as_ref().is_some_and(|p| p.as_str() == phone),
        }
    }

    fn apply_consumed(&mut self, purpose: SecretPurpose, now: DateTime<Utc>) {
        match purpose {
            SecretPurpose::EmailVerification => self.is_email_verified = true,
            SecretPurpose::PhoneOtp => self.is_phone_verified = true,
            SecretPurpose::Otp | SecretPurpose::PasswordReset => {}
        }
        self.updated_at = now;
    }

    fn supports(_purpose: SecretPurpose) -> bool {
        true
    }
}

/// Outward-facing view of a [`User`]: no password hash, no secret slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    pub name: String,
    pub email: Email,
    pub phone_number: Option<PhoneNumber>,
    pub role_id: RoleId,
    pub organization_id: Option<OrganizationId>,
    pub is_email_verified: bool,
    pub is_phone_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
