//! Contact verification for organizations. Secrets are always consumed
//! scoped to the organization id from the route.

use std::sync::Arc;

use tracing::{info, instrument};

use churchos_auth::{Email, Organization, OrganizationSummary, PhoneNumber, SecretLookup, SecretPurpose};
use churchos_core::{Clock, OrganizationId, UserId};

use super::{Message, VerificationManager};
use crate::error::IdentityError;
use crate::store::IdentityStore;

#[derive(Clone)]
pub struct OrganizationVerificationService {
    store: Arc<dyn IdentityStore>,
    secrets: VerificationManager<Organization>,
    clock: Arc<dyn Clock>,
    public_base_url: String,
}

impl OrganizationVerificationService {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        secrets: VerificationManager<Organization>,
        clock: Arc<dyn Clock>,
        public_base_url: String,
    ) -> Self {
        Self {
            store,
            secrets,
            clock,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Registers an organization record. Used by provisioning and tests;
    /// there is no HTTP surface for it.
    pub async fn create(
        &self,
        name: &str,
        contact_email: &str,
        contact_phone: Option<&str>,
        created_by: Option<UserId>,
    ) -> Result<OrganizationSummary, IdentityError> {
        let email = Email::parse(contact_email)?;
        let phone = contact_phone.map(PhoneNumber::parse).transpose()?;
        let organization = Organization::new(name, email, phone, created_by, self.clock.now())?;
        let organization = self.store.insert_organization(organization).await?;
        info!(organization_id = %organization.id, "organization created");
        Ok(organization.summary())
    }

    #[instrument(skip(self), err)]
    pub async fn send_email_verification(&self, id: OrganizationId) -> Result<(), IdentityError> {
        let organization = self.load(id).await?;
        if organization.is_email_verified {
            return Err(IdentityError::validation("Organization email is already verified"));
        }
        let base = &self.public_base_url;
        self.secrets
            .issue_and_deliver(
                id,
                SecretPurpose::EmailVerification,
                organization.contact_email.as_str(),
                |token| Message {
                    subject: format!("Verify the contact email for {}", organization.name),
                    body: format!("Confirmation token: {token}\nOr open {base}/organizations/{id}/verify-email?token={token}"),
                },
            )
            .await
    }

    #[instrument(skip(self, token), err)]
    pub async fn confirm_email(&self, id: OrganizationId, token: &str) -> Result<OrganizationSummary, IdentityError> {
        let organization = self
            .secrets
            .consume(&SecretLookup::Id(id), SecretPurpose::EmailVerification, token)
            .await?;
        info!(organization_id = %id, "organization email verified");
        Ok(organization.summary())
    }

    #[instrument(skip(self), err)]
    pub async fn send_phone_otp(&self, id: OrganizationId) -> Result<(), IdentityError> {
        let organization = self.load(id).await?;
        let phone = organization
            .contact_phone
            .as_ref()
            .ok_or_else(|| IdentityError::validation("Organization has no contact phone"))?;
        self.secrets
            .issue_and_deliver(id, SecretPurpose::PhoneOtp, phone.as_str(), |code| Message {
                subject: "Verification code".to_string(),
                body: format!("Your ChurchOS organization code is {code}"),
            })
            .await
    }

    #[instrument(skip(self, otp), err)]
    pub async fn confirm_phone(&self, id: OrganizationId, otp: &str) -> Result<OrganizationSummary, IdentityError> {
        let organization = self
            .secrets
            .consume(&SecretLookup::Id(id), SecretPurpose::PhoneOtp, otp)
            .await?;
        info!(organization_id = %id, "organization phone verified");
        Ok(organization.summary())
    }

    async fn load(&self, id: OrganizationId) -> Result<Organization, IdentityError> {
        self.store
            .get_organization(id)
            .await?
            .ok_or_else(|| IdentityError::not_found("Organization not found"))
    }
}
