//! Verification Secret Manager.
//!
//! Generic over the holder kind (User, Organization). Issue writes
//! `{hash, expiry}` and hands the plaintext back exactly once; consume is a
//! single store step that matches hash + live expiry, clears the slot and
//! applies the purpose's effect.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use churchos_auth::{SecretHolder, SecretLookup, SecretPurpose, SecretSlot, generate_plaintext, hash_secret};
use churchos_core::Clock;

use crate::error::IdentityError;
use crate::notifier::Notifier;
use crate::store::SecretStore;

/// Freshly issued secret. The plaintext is only ever held here.
pub struct IssuedSecret {
    pub plaintext: String,
    pub hash: String,
    pub expires_at: DateTime<Utc>,
}

impl core::fmt::Debug for IssuedSecret {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IssuedSecret")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Rendered notification for one secret.
#[derive(Debug, Clone)]
pub struct Message {
    pub subject: String,
    pub body: String,
}

pub struct VerificationManager<E: SecretHolder> {
    secrets: Arc<dyn SecretStore<E>>,
    email: Arc<dyn Notifier>,
    sms: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    expose_debug_secrets: bool,
}

impl<E: SecretHolder> Clone for VerificationManager<E> {
    fn clone(&self) -> Self {
        Self {
            secrets: self.secrets.clone(),
            email: self.email.clone(),
            sms: self.sms.clone(),
            clock: self.clock.clone(),
            expose_debug_secrets: self.expose_debug_secrets,
        }
    }
}

impl<E: SecretHolder> VerificationManager<E> {
    pub fn new(
        secrets: Arc<dyn SecretStore<E>>,
        email: Arc<dyn Notifier>,
        sms: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        expose_debug_secrets: bool,
    ) -> Self {
        Self {
            secrets,
            email,
            sms,
            clock,
            expose_debug_secrets,
        }
    }

    /// Generate, hash and persist a secret for `(id, purpose)`, replacing any
    /// outstanding one.
    pub async fn issue(&self, id: E::Id, purpose: SecretPurpose) -> Result<IssuedSecret, IdentityError> {
        if !E::supports(purpose) {
            return Err(IdentityError::validation(format!(
                "{:?} does not support {purpose} secrets",
                E::KIND
            )));
        }
        let plaintext = generate_plaintext(purpose);
        let slot = SecretSlot::issue(purpose, &plaintext, self.clock.now());
        let issued = IssuedSecret {
            hash: slot.hash.clone(),
            expires_at: slot.expires_at,
            plaintext,
        };
        self.secrets.put_secret(id, purpose, slot).await?;
        info!(kind = ?E::KIND, entity_id = %id, purpose = %purpose, expires_at = %issued.expires_at, "secret issued");
        Ok(issued)
    }

    /// Single-use check of `plaintext`. Wrong value, expiry and unknown entity
    /// all produce [`IdentityError::SecretInvalidOrExpired`].
    pub async fn consume(
        &self,
        lookup: &SecretLookup<E::Id>,
        purpose: SecretPurpose,
        plaintext: &str,
    ) -> Result<E, IdentityError> {
        let hash = hash_secret(plaintext.trim());
        match self
            .secrets
            .consume_secret(lookup, purpose, &hash, self.clock.now())
            .await?
        {
            Some(entity) => {
                info!(kind = ?E::KIND, entity_id = %entity.id(), purpose = %purpose, "secret consumed");
                Ok(entity)
            }
            None => {
                info!(kind = ?E::KIND, purpose = %purpose, "secret rejected");
                Err(IdentityError::SecretInvalidOrExpired)
            }
        }
    }

    /// Issue, then deliver through the purpose's channel. On delivery
    /// failure the just-written secret is cleared (only if it is still the
    /// stored one) and the error carries the plaintext outside production.
    pub async fn issue_and_deliver<F>(
        &self,
        id: E::Id,
        purpose: SecretPurpose,
        destination: &str,
        compose: F,
    ) -> Result<(), IdentityError>
    where
        F: FnOnce(&str) -> Message + Send,
    {
        let issued = self.issue(id, purpose).await?;
        let message = compose(&issued.plaintext);
        let notifier = match purpose {
            SecretPurpose::PhoneOtp => &self.sms,
            SecretPurpose::EmailVerification | SecretPurpose::Otp | SecretPurpose::PasswordReset => &self.email,
        };

        let Err(err) = notifier.send(destination, &message.subject, &message.body).await else {
            return Ok(());
        };

        warn!(kind = ?E::KIND, entity_id = %id, purpose = %purpose, error = %err, "delivery failed; rolling back secret");
        match self.secrets.clear_secret_if(id, purpose, &issued.hash).await {
            Ok(true) => {}
            Ok(false) => info!(entity_id = %id, purpose = %purpose, "secret already replaced; rollback skipped"),
            Err(rollback) => error!(entity_id = %id, purpose = %purpose, error = %rollback, "secret rollback failed"),
        }

        Err(IdentityError::DeliveryFailed {
            message: format!("{} could not be sent", channel_noun(purpose)),
            debug_secret: self.expose_debug_secrets.then_some(issued.plaintext),
        })
    }
}

fn channel_noun(purpose: SecretPurpose) -> &'static str {
    match purpose {
        SecretPurpose::EmailVerification => "Verification email",
        SecretPurpose::Otp => "OTP email",
        SecretPurpose::PhoneOtp => "OTP SMS",
        SecretPurpose::PasswordReset => "Password reset email",
    }
}
