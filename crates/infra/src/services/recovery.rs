//! User-facing secret flows: email verification, email and phone OTP,
//! password reset.

use std::sync::Arc;

use tracing::{info, instrument};

use churchos_auth::{
    Email, PasswordHasher, PhoneNumber, SecretLookup, SecretPurpose, TokenService, User, UserProfile,
    check_password_policy,
};
use churchos_core::Clock;

use super::{AuthSession, Message, VerificationManager, hash_password};
use crate::error::IdentityError;
use crate::store::IdentityStore;

#[derive(Clone)]
pub struct RecoveryService {
    store: Arc<dyn IdentityStore>,
    secrets: VerificationManager<User>,
    hasher: PasswordHasher,
    tokens: TokenService,
    clock: Arc<dyn Clock>,
    public_base_url: String,
    client_url: String,
}

impl RecoveryService {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        secrets: VerificationManager<User>,
        hasher: PasswordHasher,
        tokens: TokenService,
        clock: Arc<dyn Clock>,
        public_base_url: String,
        client_url: String,
    ) -> Self {
        Self {
            store,
            secrets,
            hasher,
            tokens,
            clock,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            client_url: client_url.trim_end_matches('/').to_string(),
        }
    }

    #[instrument(skip(self), err)]
    pub async fn send_email_verification(&self, email: &str) -> Result<(), IdentityError> {
        let user = self.user_by_email(email).await?;
        if user.is_email_verified {
            return Err(IdentityError::validation("Email is already verified"));
        }
        let base = &self.public_base_url;
        self.secrets
            .issue_and_deliver(user.id, SecretPurpose::EmailVerification, user.email.as_str(), |token| Message {
                subject: "Verify your email".to_string(),
                body: format!("Confirm your email address: {base}/auth/verify-email?token={token}"),
            })
            .await
    }

    /// The link token alone identifies the user.
    #[instrument(skip_all, err)]
    pub async fn verify_email(&self, token: &str) -> Result<UserProfile, IdentityError> {
        let user = self
            .secrets
            .consume(&SecretLookup::HashOnly, SecretPurpose::EmailVerification, token)
            .await?;
        info!(user_id = %user.id, "email verified");
        Ok(user.profile())
    }

    #[instrument(skip(self), err)]
    pub async fn send_otp(&self, email: &str) -> Result<(), IdentityError> {
        let user = self.user_by_email(email).await?;
        self.secrets
            .issue_and_deliver(user.id, SecretPurpose::Otp, user.email.as_str(), |code| Message {
                subject: "Your one-time code".to_string(),
                body: format!("Your verification code is {code}. It expires in 10 minutes."),
            })
            .await
    }

    #[instrument(skip(self, otp), err)]
    pub async fn verify_otp(&self, email: &str, otp: &str) -> Result<UserProfile, IdentityError> {
        let email = Email::parse(email)?;
        let user = self
            .secrets
            .consume(&SecretLookup::Email(email.as_str().to_string()), SecretPurpose::Otp, otp)
            .await?;
        Ok(user.profile())
    }

    #[instrument(skip(self), err)]
    pub async fn send_phone_otp(&self, phone_number: &str) -> Result<(), IdentityError> {
        let phone = PhoneNumber::parse(phone_number)?;
        let user = self
            .store
            .find_user_by_phone(&phone)
            .await?
            .ok_or_else(|| IdentityError::not_found("User not found"))?;
        self.secrets
            .issue_and_deliver(user.id, SecretPurpose::PhoneOtp, phone.as_str(), |code| Message {
                subject: "Verification code".to_string(),
                body: format!("Your ChurchOS code is {code}"),
            })
            .await
    }

    #[instrument(skip(self, otp), err)]
    pub async fn verify_phone_otp(&self, phone_number: &str, otp: &str) -> Result<UserProfile, IdentityError> {
        let phone = PhoneNumber::parse(phone_number)?;
        let user = self
            .secrets
            .consume(&SecretLookup::Phone(phone.as_str().to_string()), SecretPurpose::PhoneOtp, otp)
            .await?;
        info!(user_id = %user.id, "phone verified");
        Ok(user.profile())
    }

    #[instrument(skip(self), err)]
    pub async fn forgot_password(&self, email: &str) -> Result<(), IdentityError> {
        let user = self.user_by_email(email).await?;
        let base = &self.client_url;
        self.secrets
            .issue_and_deliver(user.id, SecretPurpose::PasswordReset, user.email.as_str(), |token| Message {
                subject: "Reset your password".to_string(),
                body: format!("Reset your password within 10 minutes: {base}/reset-password/{token}"),
            })
            .await
    }

    /// Consumes the reset secret, stores the new password and signs the user
    /// in. The password is hashed before the secret is spent.
    #[instrument(skip_all, err)]
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<AuthSession, IdentityError> {
        check_password_policy(new_password)?;
        let hash = hash_password(&self.hasher, new_password).await?;
        let mut user = self
            .secrets
            .consume(&SecretLookup::HashOnly, SecretPurpose::PasswordReset, token)
            .await?;
        user.set_password(hash, self.clock.now());
        self.store.save_user(&user).await?;
        let tokens = self.tokens.issue_pair(user.id)?;
        info!(user_id = %user.id, "password reset");
        Ok(AuthSession {
            user: user.profile(),
            tokens,
        })
    }

    async fn user_by_email(&self, email: &str) -> Result<User, IdentityError> {
        let email = Email::parse(email)?;
        self.store
            .find_user_by_email(&email)
            .await?
            .ok_or_else(|| IdentityError::not_found("User not found"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::services::RegisterInput;
    use crate::services::testing::{Harness, harness};
    use crate::store::UserStore;

    async fn registered(h: &Harness, email: &str, phone: Option<&str>) -> UserProfile {
        h.services
            .accounts
            .register(RegisterInput {
                name: "Ada".into(),
                email: email.into(),
                password: "secret123".into(),
                phone_number: phone.map(str::to_string),
            })
            .await
            .unwrap()
            .user
    }

    fn link_token(body: &str, marker: &str) -> String {
        let start = body.find(marker).unwrap() + marker.len();
        body[start..].split_whitespace().next().unwrap().to_string()
    }

    fn six_digits(body: &str) -> String {
        body.split(|c: char| !c.is_ascii_digit())
            .find(|chunk| chunk.len() == 6)
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn email_verification_flow_marks_user_verified() {
        let h = harness().await;
        let user = registered(&h, "a@b.com", None).await;
        h.services.recovery.send_email_verification("a@b.com").await.unwrap();

        let message = h.email.last().unwrap();
        assert_eq!(message.destination, "a@b.com");
        assert!(message.body.contains("http://api.test/auth/verify-email?token="));
        let token = link_token(&message.body, "token=");
        assert_eq!(token.len(), 40);

        let profile = h.services.recovery.verify_email(&token).await.unwrap();
        assert_eq!(profile.id, user.id);
        assert!(profile.is_email_verified);

        let again = h.services.recovery.send_email_verification("a@b.com").await.unwrap_err();
        assert!(matches!(again, IdentityError::Validation(_)));
        assert_eq!(
            h.services.recovery.verify_email(&token).await.unwrap_err(),
            IdentityError::SecretInvalidOrExpired
        );
    }

    #[tokio::test]
    async fn unknown_email_is_not_found() {
        let h = harness().await;
        let err = h.services.recovery.send_email_verification("nobody@b.com").await.unwrap_err();
        assert!(matches!(err, IdentityError::NotFound(_)));
        let err = h.services.recovery.forgot_password("nobody@b.com").await.unwrap_err();
        assert!(matches!(err, IdentityError::NotFound(_)));
    }

    #[tokio::test]
    async fn saving_a_stale_copy_keeps_verification() {
        let h = harness().await;
        let user = registered(&h, "a@b.com", Some("+15550001111")).await;
        let mut stale = h.store.get_user(user.id).await.unwrap().unwrap();

        h.services.recovery.send_email_verification("a@b.com").await.unwrap();
        let token = link_token(&h.email.last().unwrap().body, "token=");
        h.services.recovery.verify_email(&token).await.unwrap();
        h.services.recovery.send_phone_otp("+15550001111").await.unwrap();
        let code = six_digits(&h.sms.last().unwrap().body);
        h.services.recovery.verify_phone_otp("+15550001111", &code).await.unwrap();

        stale.rename("Ada L.", stale.updated_at).unwrap();
        h.store.save_user(&stale).await.unwrap();

        let stored = h.store.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "Ada L.");
        assert!(stored.is_email_verified);
        assert!(stored.is_phone_verified);
    }

    #[tokio::test]
    async fn email_otp_is_bound_to_the_email() {
        let h = harness().await;
        registered(&h, "a@b.com", None).await;
        registered(&h, "c@d.com", None).await;
        h.services.recovery.send_otp("a@b.com").await.unwrap();
        let code = six_digits(&h.email.last().unwrap().body);

        assert_eq!(
            h.services.recovery.verify_otp("c@d.com", &code).await.unwrap_err(),
            IdentityError::SecretInvalidOrExpired
        );
        let profile = h.services.recovery.verify_otp("A@B.com", &code).await.unwrap();
        assert_eq!(profile.email.as_str(), "a@b.com");
        assert!(!profile.is_email_verified);
    }

    #[tokio::test]
    async fn phone_otp_goes_by_sms_and_verifies_phone() {
        let h = harness().await;
        registered(&h, "a@b.com", Some("+1 (555) 000-1111")).await;
        h.services.recovery.send_phone_otp("+15550001111").await.unwrap();

        assert!(h.email.last().is_none());
        let sms = h.sms.last().unwrap();
        assert_eq!(sms.destination, "+15550001111");
        let code = six_digits(&sms.body);

        let profile = h.services.recovery.verify_phone_otp("+1 555 000 1111", &code).await.unwrap();
        assert!(profile.is_phone_verified);
    }

    #[tokio::test]
    async fn expired_otp_is_rejected() {
        let h = harness().await;
        registered(&h, "a@b.com", None).await;
        h.services.recovery.send_otp("a@b.com").await.unwrap();
        let code = six_digits(&h.email.last().unwrap().body);

        h.clock.advance(Duration::minutes(11));
        assert_eq!(
            h.services.recovery.verify_otp("a@b.com", &code).await.unwrap_err(),
            IdentityError::SecretInvalidOrExpired
        );
    }

    #[tokio::test]
    async fn password_reset_signs_user_in_with_new_password() {
        let h = harness().await;
        let user = registered(&h, "a@b.com", None).await;
        h.services.recovery.forgot_password("a@b.com").await.unwrap();
        let body = h.email.last().unwrap().body;
        assert!(body.contains("http://app.test/reset-password/"));
        let token = link_token(&body, "/reset-password/");

        let session = h.services.recovery.reset_password(&token, "brandnew1").await.unwrap();
        assert_eq!(session.user.id, user.id);
        h.services.accounts.login("a@b.com", "brandnew1").await.unwrap();
        assert_eq!(
            h.services.accounts.login("a@b.com", "secret123").await.unwrap_err(),
            IdentityError::InvalidCredentials
        );
        assert_eq!(
            h.services.recovery.reset_password(&token, "another1").await.unwrap_err(),
            IdentityError::SecretInvalidOrExpired
        );
    }

    #[tokio::test]
    async fn password_reset_expires_after_ttl() {
        let h = harness().await;
        registered(&h, "a@b.com", None).await;
        h.services.recovery.forgot_password("a@b.com").await.unwrap();
        let token = link_token(&h.email.last().unwrap().body, "/reset-password/");

        h.clock.advance(Duration::minutes(10) + Duration::seconds(1));
        assert_eq!(
            h.services.recovery.reset_password(&token, "brandnew1").await.unwrap_err(),
            IdentityError::SecretInvalidOrExpired
        );
    }

    #[tokio::test]
    async fn weak_reset_password_keeps_secret_usable() {
        let h = harness().await;
        registered(&h, "a@b.com", None).await;
        h.services.recovery.forgot_password("a@b.com").await.unwrap();
        let token = link_token(&h.email.last().unwrap().body, "/reset-password/");

        let err = h.services.recovery.reset_password(&token, "123").await.unwrap_err();
        assert!(matches!(err, IdentityError::Validation(_)));
        h.services.recovery.reset_password(&token, "brandnew1").await.unwrap();
    }

    #[tokio::test]
    async fn failed_delivery_leaves_no_secret_behind() {
        let h = harness().await;
        let user = registered(&h, "a@b.com", None).await;
        h.email.set_failing(true);

        let err = h.services.recovery.forgot_password("a@b.com").await.unwrap_err();
        let IdentityError::DeliveryFailed { debug_secret, message } = err else {
            panic!("expected DeliveryFailed");
        };
        assert_eq!(message, "Password reset email could not be sent");
        let leaked = debug_secret.unwrap();

        let stored = h.store.get_user(user.id).await.unwrap().unwrap();
        assert!(stored.password_reset.is_none());
        assert_eq!(
            h.services.recovery.reset_password(&leaked, "brandnew1").await.unwrap_err(),
            IdentityError::SecretInvalidOrExpired
        );
    }
}
