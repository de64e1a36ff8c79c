//! Application services over the identity store.
//!
//! Services hold trait objects only; [`IdentityServices::new`] is the one
//! place that knows the concrete store type.

use std::sync::Arc;

use serde::Serialize;

use churchos_auth::{PasswordHash, PasswordHasher, TokenPair, TokenService, UserProfile};
use churchos_core::Clock;

use crate::config::AppConfig;
use crate::error::IdentityError;
use crate::notifier::Notifier;
use crate::store::IdentityStore;

pub mod accounts;
pub mod organizations;
pub mod rbac;
pub mod recovery;
pub mod verification;

pub use accounts::{AccountService, CreateUserInput, RegisterInput, UpdateProfileInput};
pub use organizations::OrganizationVerificationService;
pub use rbac::{RbacService, RoleView, SeedReport};
pub use recovery::RecoveryService;
pub use verification::{IssuedSecret, Message, VerificationManager};

/// Result of register / login / password reset.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    pub user: UserProfile,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

/// Collaborators that are not derived from configuration.
#[derive(Clone)]
pub struct ServiceDeps {
    pub clock: Arc<dyn Clock>,
    pub email: Arc<dyn Notifier>,
    pub sms: Arc<dyn Notifier>,
}

/// All identity services wired to one store.
#[derive(Clone)]
pub struct IdentityServices {
    pub accounts: AccountService,
    pub recovery: RecoveryService,
    pub organizations: OrganizationVerificationService,
    pub rbac: RbacService,
}

impl IdentityServices {
    pub fn new<S>(store: Arc<S>, config: &AppConfig, deps: ServiceDeps) -> Result<Self, IdentityError>
    where
        S: IdentityStore + 'static,
    {
        let hasher = PasswordHasher::new(config.password_cost)?;
        let tokens = TokenService::new(
            config.jwt.access_secret.as_bytes(),
            config.jwt.refresh_secret.as_bytes(),
            config.jwt.access_ttl,
            config.jwt.refresh_ttl,
            deps.clock.clone(),
        );
        let expose = !config.environment.is_production();
        let dyn_store: Arc<dyn IdentityStore> = store.clone();

        let accounts = AccountService::new(
            dyn_store.clone(),
            hasher.clone(),
            tokens.clone(),
            deps.clock.clone(),
            config.registration_role.clone(),
            config.default_staff_role.clone(),
        )?;
        let recovery = RecoveryService::new(
            dyn_store.clone(),
            VerificationManager::new(store.clone(), deps.email.clone(), deps.sms.clone(), deps.clock.clone(), expose),
            hasher,
            tokens,
            deps.clock.clone(),
            config.public_base_url.clone(),
            config.client_url.clone(),
        );
        let organizations = OrganizationVerificationService::new(
            dyn_store.clone(),
            VerificationManager::new(store, deps.email, deps.sms, deps.clock.clone(), expose),
            deps.clock,
            config.public_base_url.clone(),
        );
        let rbac = RbacService::new(dyn_store);

        Ok(Self {
            accounts,
            recovery,
            organizations,
            rbac,
        })
    }
}

/// Argon2 is CPU-bound; keep it off the async workers.
pub(crate) async fn hash_password(hasher: &PasswordHasher, plaintext: &str) -> Result<PasswordHash, IdentityError> {
    let hasher = hasher.clone();
    let plaintext = plaintext.to_string();
    tokio::task::spawn_blocking(move || hasher.hash(&plaintext))
        .await
        .map_err(|e| IdentityError::internal(format!("hashing task failed: {e}")))?
        .map_err(IdentityError::from)
}

pub(crate) async fn verify_password(
    hasher: &PasswordHasher,
    plaintext: &str,
    hash: &PasswordHash,
) -> Result<bool, IdentityError> {
    let hasher = hasher.clone();
    let plaintext = plaintext.to_string();
    let hash = hash.clone();
    tokio::task::spawn_blocking(move || hasher.verify(&plaintext, &hash))
        .await
        .map_err(|e| IdentityError::internal(format!("verification task failed: {e}")))
}
