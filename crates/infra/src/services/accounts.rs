//! Credential Service: registration, login, token refresh, bearer
//! authentication and account administration.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, instrument, warn};

use churchos_auth::{
    Email, NewUser, PasswordHash, PasswordHasher, PhoneNumber, Principal, Role, TokenService, User, UserProfile,
    authorize, check_password_policy,
};
use churchos_core::{Clock, RoleId, UserId};

use super::{AuthSession, hash_password, verify_password};
use crate::error::IdentityError;
use crate::store::IdentityStore;

const DUMMY_PASSWORD: &str = "churchos-login-timing-guard";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterInput {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub phone_number: Option<String>,
}

/// `phone_number: Some("")` removes the stored number.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserInput {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn IdentityStore>,
    hasher: PasswordHasher,
    tokens: TokenService,
    clock: Arc<dyn Clock>,
    registration_role: String,
    default_staff_role: String,
    dummy_hash: PasswordHash,
}

impl AccountService {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        hasher: PasswordHasher,
        tokens: TokenService,
        clock: Arc<dyn Clock>,
        registration_role: String,
        default_staff_role: String,
    ) -> Result<Self, IdentityError> {
        let dummy_hash = hasher.hash(DUMMY_PASSWORD)?;
        Ok(Self {
            store,
            hasher,
            tokens,
            clock,
            registration_role,
            default_staff_role,
            dummy_hash,
        })
    }

    #[instrument(skip(self, input), fields(email = %input.email), err)]
    pub async fn register(&self, input: RegisterInput) -> Result<AuthSession, IdentityError> {
        let email = Email::parse(&input.email)?;
        check_password_policy(&input.password)?;
        let phone_number = parse_optional_phone(input.phone_number.as_deref())?;

        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(IdentityError::DuplicateEntity("User already exists".to_string()));
        }
        if let Some(phone) = &phone_number {
            self.ensure_phone_free(phone).await?;
        }

        let role = self.registration_role().await?;
        let password_hash = hash_password(&self.hasher, &input.password).await?;
        let user = User::create(
            NewUser {
                name: input.name,
                email,
                phone_number,
                password_hash,
                role_id: role.id,
                organization_id: None,
            },
            self.clock.now(),
        )?;
        // The existence checks above race with concurrent registrations; the
        // store's unique constraints are the final word.
        let user = self.store.insert_user(user).await?;
        let tokens = self.tokens.issue_pair(user.id)?;
        info!(user_id = %user.id, role = %role.name, "user registered");
        Ok(AuthSession {
            user: user.profile(),
            tokens,
        })
    }

    /// Unknown email and wrong password are the same failure.
    #[instrument(skip(self, password), err)]
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthSession, IdentityError> {
        let user = match Email::parse(email) {
            Ok(email) => self.store.find_user_by_email(&email).await?,
            Err(_) => None,
        };

        let Some(user) = user else {
            verify_password(&self.hasher, password, &self.dummy_hash).await?;
            return Err(IdentityError::InvalidCredentials);
        };
        if !verify_password(&self.hasher, password, &user.password_hash).await? {
            return Err(IdentityError::InvalidCredentials);
        }

        let tokens = self.tokens.issue_pair(user.id)?;
        info!(user_id = %user.id, "user logged in");
        Ok(AuthSession {
            user: user.profile(),
            tokens,
        })
    }

    /// Mint a new access token. The refresh token itself is not rotated.
    #[instrument(skip_all, err)]
    pub async fn refresh(&self, refresh_token: &str) -> Result<String, IdentityError> {
        let user_id = self.tokens.verify_refresh(refresh_token)?;
        if self.store.get_user(user_id).await?.is_none() {
            return Err(IdentityError::InvalidRefreshToken);
        }
        Ok(self.tokens.issue_access(user_id)?)
    }

    /// Bearer token to authorizable principal: verify, then resolve the
    /// user's role and permission names in one store lookup.
    pub async fn authenticate(&self, access_token: &str) -> Result<Principal, IdentityError> {
        let user_id = self.tokens.verify_access(access_token)?;
        let identity = self
            .store
            .resolve_identity(user_id)
            .await?
            .ok_or(IdentityError::InvalidToken)?;
        Ok(identity.into_principal()?)
    }

    pub async fn me(&self, user_id: UserId) -> Result<UserProfile, IdentityError> {
        Ok(self.load_user(user_id).await?.profile())
    }

    #[instrument(skip(self, input), err)]
    pub async fn update_profile(
        &self,
        user_id: UserId,
        input: UpdateProfileInput,
    ) -> Result<UserProfile, IdentityError> {
        let mut user = self.load_user(user_id).await?;
        let now = self.clock.now();
        if let Some(name) = &input.name {
            user.rename(name, now)?;
        }
        if let Some(raw) = input.phone_number.as_deref() {
            let phone = parse_optional_phone(Some(raw))?;
            if let Some(phone) = phone.as_ref().filter(|p| user.phone_number.as_ref() != Some(*p)) {
                self.ensure_phone_free(phone).await?;
            }
            user.set_phone_number(phone, now);
        }
        self.store.save_user(&user).await?;
        Ok(user.profile())
    }

    #[instrument(skip(self, current, new), err)]
    pub async fn change_password(&self, user_id: UserId, current: &str, new: &str) -> Result<(), IdentityError> {
        check_password_policy(new)?;
        let mut user = self.load_user(user_id).await?;
        if !verify_password(&self.hasher, current, &user.password_hash).await? {
            return Err(IdentityError::InvalidCredentials);
        }
        let hash = hash_password(&self.hasher, new).await?;
        user.set_password(hash, self.clock.now());
        self.store.save_user(&user).await?;
        info!(user_id = %user_id, "password changed");
        Ok(())
    }

    /// Users may delete themselves; deleting anyone else needs `user.delete`.
    #[instrument(skip(self, actor), fields(actor = %actor.user_id), err)]
    pub async fn delete_user(&self, actor: &Principal, target: UserId) -> Result<(), IdentityError> {
        if actor.user_id != target {
            authorize(actor, &["user.delete"])?;
        }
        if !self.store.delete_user(target).await? {
            return Err(IdentityError::not_found("User not found"));
        }
        info!(target = %target, "user deleted");
        Ok(())
    }

    #[instrument(skip(self, input), fields(email = %input.email), err)]
    pub async fn create_user(&self, input: CreateUserInput) -> Result<UserProfile, IdentityError> {
        let email = Email::parse(&input.email)?;
        check_password_policy(&input.password)?;
        let role_name = input.role.as_deref().unwrap_or(&self.default_staff_role);
        let role_id = self.role_id_by_name(role_name).await?;

        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(IdentityError::DuplicateEntity("User already exists".to_string()));
        }
        let password_hash = hash_password(&self.hasher, &input.password).await?;
        let user = User::create(
            NewUser {
                name: input.name,
                email,
                phone_number: None,
                password_hash,
                role_id,
                organization_id: None,
            },
            self.clock.now(),
        )?;
        let user = self.store.insert_user(user).await?;
        info!(user_id = %user.id, role = %role_name, "user created");
        Ok(user.profile())
    }

    #[instrument(skip(self), err)]
    pub async fn assign_role(&self, user_id: UserId, role_name: &str) -> Result<UserProfile, IdentityError> {
        let role_id = self.role_id_by_name(role_name).await?;
        let mut user = self.load_user(user_id).await?;
        user.assign_role(role_id, self.clock.now());
        self.store.save_user(&user).await?;
        Ok(user.profile())
    }

    pub async fn list_users(&self) -> Result<Vec<UserProfile>, IdentityError> {
        Ok(self.store.list_users().await?.iter().map(User::profile).collect())
    }

    async fn load_user(&self, user_id: UserId) -> Result<User, IdentityError> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or_else(|| IdentityError::not_found("User not found"))
    }

    async fn ensure_phone_free(&self, phone: &PhoneNumber) -> Result<(), IdentityError> {
        match self.store.find_user_by_phone(phone).await? {
            Some(_) => Err(IdentityError::DuplicateEntity("Phone number is already in use".to_string())),
            None => Ok(()),
        }
    }

    async fn role_id_by_name(&self, name: &str) -> Result<RoleId, IdentityError> {
        match self.store.find_role_by_name(name).await? {
            Some(role) => Ok(role.id),
            None => Err(IdentityError::validation(format!("Role '{name}' does not exist"))),
        }
    }

    async fn registration_role(&self) -> Result<Role, IdentityError> {
        if let Some(role) = self.store.find_role_by_name(&self.registration_role).await? {
            return Ok(role);
        }
        warn!(role = %self.registration_role, "registration role missing; creating it with no permissions");
        let role = Role::new(
            self.registration_role.clone(),
            Some(format!("Rigid Role: {}", self.registration_role)),
            std::iter::empty(),
        )?;
        Ok(self.store.ensure_role(role).await?)
    }
}

fn parse_optional_phone(raw: Option<&str>) -> Result<Option<PhoneNumber>, IdentityError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => Ok(Some(PhoneNumber::parse(raw)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::services::testing::{config, harness, harness_with};
    use crate::store::{RoleStore, UserStore};

    fn register_input(email: &str) -> RegisterInput {
        RegisterInput {
            name: "Ada".into(),
            email: email.into(),
            password: "secret123".into(),
            phone_number: None,
        }
    }

    #[tokio::test]
    async fn register_then_login_yields_same_subject() {
        let h = harness().await;
        let accounts = &h.services.accounts;
        let session = accounts.register(register_input("Ada@Example.com")).await.unwrap();
        assert_eq!(session.user.email.as_str(), "ada@example.com");

        let login = accounts.login("ada@example.com", "secret123").await.unwrap();
        let principal = accounts.authenticate(&login.tokens.access_token).await.unwrap();
        assert_eq!(principal.user_id, session.user.id);
        assert_eq!(principal.role_name, "Super Admin");
        assert_eq!(principal.permissions.len(), 8);
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let h = harness().await;
        h.services.accounts.register(register_input("a@b.com")).await.unwrap();
        let err = h.services.accounts.register(register_input("A@B.com")).await.unwrap_err();
        assert!(matches!(err, IdentityError::DuplicateEntity(_)));
    }

    #[tokio::test]
    async fn duplicate_phone_is_rejected() {
        let h = harness().await;
        let mut first = register_input("a@b.com");
        first.phone_number = Some("+1 555 000 1111".into());
        h.services.accounts.register(first).await.unwrap();

        let mut second = register_input("c@d.com");
        second.phone_number = Some("+1-555-000-1111".into());
        let err = h.services.accounts.register(second).await.unwrap_err();
        assert!(matches!(err, IdentityError::DuplicateEntity(_)));
    }

    #[tokio::test]
    async fn short_password_is_a_validation_error() {
        let h = harness().await;
        let mut input = register_input("a@b.com");
        input.password = "12345".into();
        let err = h.services.accounts.register(input).await.unwrap_err();
        assert!(matches!(err, IdentityError::Validation(_)));
    }

    #[tokio::test]
    async fn login_failures_are_indistinguishable() {
        let h = harness().await;
        h.services.accounts.register(register_input("a@b.com")).await.unwrap();

        let unknown = h.services.accounts.login("nobody@b.com", "secret123").await.unwrap_err();
        let wrong = h.services.accounts.login("a@b.com", "wrong-pass").await.unwrap_err();
        let garbage = h.services.accounts.login("not-an-email", "secret123").await.unwrap_err();
        assert_eq!(unknown, IdentityError::InvalidCredentials);
        assert_eq!(wrong, unknown);
        assert_eq!(garbage, unknown);
        assert_eq!(unknown.to_string(), wrong.to_string());
    }

    #[tokio::test]
    async fn refresh_mints_access_for_existing_user_only() {
        let h = harness().await;
        let accounts = &h.services.accounts;
        let session = accounts.register(register_input("a@b.com")).await.unwrap();

        let access = accounts.refresh(&session.tokens.refresh_token).await.unwrap();
        assert_eq!(accounts.authenticate(&access).await.unwrap().user_id, session.user.id);

        assert_eq!(
            accounts.refresh(&session.tokens.access_token).await.unwrap_err(),
            IdentityError::InvalidRefreshToken
        );

        h.store.delete_user(session.user.id).await.unwrap();
        assert_eq!(
            accounts.refresh(&session.tokens.refresh_token).await.unwrap_err(),
            IdentityError::InvalidRefreshToken
        );
    }

    #[tokio::test]
    async fn access_token_expires_with_the_clock() {
        let h = harness().await;
        let session = h.services.accounts.register(register_input("a@b.com")).await.unwrap();
        h.clock.advance(Duration::minutes(16));
        assert_eq!(
            h.services.accounts.authenticate(&session.tokens.access_token).await.unwrap_err(),
            IdentityError::TokenExpired
        );
    }

    #[tokio::test]
    async fn deleted_user_token_is_invalid() {
        let h = harness().await;
        let session = h.services.accounts.register(register_input("a@b.com")).await.unwrap();
        h.store.delete_user(session.user.id).await.unwrap();
        assert_eq!(
            h.services.accounts.authenticate(&session.tokens.access_token).await.unwrap_err(),
            IdentityError::InvalidToken
        );
    }

    #[tokio::test]
    async fn user_without_role_is_forbidden() {
        let h = harness().await;
        let session = h.services.accounts.register(register_input("a@b.com")).await.unwrap();
        let mut user = h.store.get_user(session.user.id).await.unwrap().unwrap();
        user.assign_role(RoleId::new(), user.updated_at);
        h.store.save_user(&user).await.unwrap();

        let err = h.services.accounts.authenticate(&session.tokens.access_token).await.unwrap_err();
        assert_eq!(err, IdentityError::Forbidden("role not found/assigned".into()));
    }

    #[tokio::test]
    async fn missing_registration_role_is_created_empty() {
        let mut cfg = config();
        cfg.registration_role = "Member".into();
        let h = harness_with(cfg).await;
        let session = h.services.accounts.register(register_input("a@b.com")).await.unwrap();

        let role = h.store.find_role_by_name("Member").await.unwrap().unwrap();
        assert!(role.permissions.is_empty());
        assert_eq!(role.description.as_deref(), Some("Rigid Role: Member"));
        assert_eq!(session.user.role_id, role.id);

        h.services.accounts.register(register_input("c@d.com")).await.unwrap();
        let members = h.store.list_roles().await.unwrap();
        assert_eq!(members.iter().filter(|r| r.name == "Member").count(), 1);
    }

    #[tokio::test]
    async fn change_password_requires_current_password() {
        let h = harness().await;
        let accounts = &h.services.accounts;
        let session = accounts.register(register_input("a@b.com")).await.unwrap();

        assert_eq!(
            accounts
                .change_password(session.user.id, "wrong-pass", "newpass1")
                .await
                .unwrap_err(),
            IdentityError::InvalidCredentials
        );
        accounts
            .change_password(session.user.id, "secret123", "newpass1")
            .await
            .unwrap();
        assert!(accounts.login("a@b.com", "secret123").await.is_err());
        accounts.login("a@b.com", "newpass1").await.unwrap();
    }

    #[tokio::test]
    async fn profile_update_resets_phone_verification() {
        let h = harness().await;
        let session = h
            .services
            .accounts
            .register(RegisterInput {
                phone_number: Some("+15550001111".into()),
                ..register_input("a@b.com")
            })
            .await
            .unwrap();
        h.services.recovery.send_phone_otp("+15550001111").await.unwrap();
        let code: String = h.sms.last().unwrap().body.chars().filter(char::is_ascii_digit).collect();
        let verified = h.services.recovery.verify_phone_otp("+15550001111", &code).await.unwrap();
        assert!(verified.is_phone_verified);

        let profile = h
            .services
            .accounts
            .update_profile(
                session.user.id,
                UpdateProfileInput {
                    name: Some("Ada L.".into()),
                    phone_number: Some("+15550002222".into()),
                },
            )
            .await
            .unwrap();
        assert_eq!(profile.name, "Ada L.");
        assert_eq!(profile.phone_number.unwrap().as_str(), "+15550002222");
        assert!(!profile.is_phone_verified);
    }

    #[tokio::test]
    async fn staff_cannot_delete_others_but_can_delete_self() {
        let h = harness().await;
        let accounts = &h.services.accounts;
        let admin = accounts.register(register_input("admin@b.com")).await.unwrap();
        let staff = accounts
            .create_user(CreateUserInput {
                name: "Sam".into(),
                email: "sam@b.com".into(),
                password: "secret123".into(),
                role: None,
            })
            .await
            .unwrap();
        let staff_session = accounts.login("sam@b.com", "secret123").await.unwrap();
        let staff_principal = accounts.authenticate(&staff_session.tokens.access_token).await.unwrap();
        assert_eq!(staff_principal.role_name, "Staff");

        let err = accounts.delete_user(&staff_principal, admin.user.id).await.unwrap_err();
        assert!(matches!(err, IdentityError::Forbidden(_)));

        accounts.delete_user(&staff_principal, staff.id).await.unwrap();
        assert!(h.store.get_user(staff.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn create_user_with_unknown_role_is_rejected() {
        let h = harness().await;
        let err = h
            .services
            .accounts
            .create_user(CreateUserInput {
                name: "Sam".into(),
                email: "sam@b.com".into(),
                password: "secret123".into(),
                role: Some("Janitor".into()),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::Validation(_)));
    }

    #[tokio::test]
    async fn assign_role_changes_resolved_permissions() {
        let h = harness().await;
        let accounts = &h.services.accounts;
        let session = accounts.register(register_input("a@b.com")).await.unwrap();
        accounts.assign_role(session.user.id, "Staff").await.unwrap();

        let principal = accounts.authenticate(&session.tokens.access_token).await.unwrap();
        assert_eq!(principal.role_name, "Staff");
        assert!(principal.permissions.contains("user.read"));
        assert!(!principal.permissions.contains("user.create"));
    }
}
