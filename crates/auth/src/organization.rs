use chrono::{DateTime, Utc};
use serde::Serialize;

use churchos_core::{DomainError, Entity, OrganizationId, UserId};

use crate::secret::{EntityKind, SecretHolder, SecretLookup, SecretPurpose, SecretSlot, unsupported};
use crate::user::{Email, PhoneNumber};

/// Tenant organization. Only the verification state matters here; the rest
/// of its profile is owned elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
    pub contact_email: Email,
    pub contact_phone: Option<PhoneNumber>,
    pub created_by: Option<UserId>,
    pub is_email_verified: bool,
    pub is_phone_verified: bool,
    pub email_verification: Option<SecretSlot>,
    pub phone_otp: Option<SecretSlot>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Organization {
    pub fn new(
        name: impl Into<String>,
        contact_email: Email,
        contact_phone: Option<PhoneNumber>,
        created_by: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(DomainError::validation("organization name is required"));
        }
        Ok(Self {
            id: OrganizationId::new(),
            name,
            contact_email,
            contact_phone,
            created_by,
            is_email_verified: false,
            is_phone_verified: false,
            email_verification: None,
            phone_otp: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn summary(&self) -> OrganizationSummary {
        OrganizationSummary {
            id: self.id,
            name: self.name.clone(),
            contact_email: self.contact_email.clone(),
            contact_phone: self.contact_phone.clone(),
            is_email_verified: self.is_email_verified,
            is_phone_verified: self.is_phone_verified,
        }
    }
}

impl Entity for Organization {
    type Id = OrganizationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl SecretHolder for Organization {
    const KIND: EntityKind = EntityKind::Organization;

    fn slot(&self, purpose: SecretPurpose) -> Result<&Option<SecretSlot>, DomainError> {
        match purpose {
            SecretPurpose::EmailVerification => Ok(&self.email_verification),
            SecretPurpose::PhoneOtp => Ok(&self.phone_otp),
            other => Err(unsupported(Self::KIND, other)),
        }
    }

    fn slot_mut(&mut self, purpose: SecretPurpose) -> Result<&mut Option<SecretSlot>, DomainError> {
        match purpose {
            SecretPurpose::EmailVerification => Ok(&mut self.email_verification),
            SecretPurpose::PhoneOtp => Ok(&mut self.phone_otp),
            other => Err(unsupported(Self::KIND, other)),
        }
    }

    fn matches_lookup(&self, lookup: &SecretLookup<OrganizationId>) -> bool {
        match lookup {
            SecretLookup::HashOnly => true,
            SecretLookup::Id(id) => self.id == *id,
            SecretLookup::Email(email) => self.contact_email.as_str() == email,
            SecretLookup::Phone(phone) => self.contact_phone.as_ref().is_some_and(|p| p.as_str() == phone),
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

    fn supports(purpose: SecretPurpose) -> bool {
        matches!(purpose, SecretPurpose::EmailVerification | SecretPurpose::PhoneOtp)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationSummary {
    pub id: OrganizationId,
    pub name: String,
    pub contact_email: Email,
    pub contact_phone: Option<PhoneNumber>,
    pub is_email_verified: bool,
    pub is_phone_verified: bool,
}
