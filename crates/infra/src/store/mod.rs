//! Persistence boundary for identity and access-control entities.
//!
//! Four entity kinds (User, Role, Permission, Organization) are stored
//! independently and related by id only. Every mutation is a single-entity
//! operation; atomicity of secret overwrite/clear/consume relies on the
//! backend's single-row update guarantee, not on application locking.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use thiserror::Error;

use churchos_auth::{
    Email, Organization, Permission, PhoneNumber, ResolvedIdentity, Role, SecretHolder, SecretLookup,
    SecretPurpose, SecretSlot, User,
};
use churchos_core::{OrganizationId, PermissionId, RoleId, UserId};

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryIdentityStore;
pub use postgres::PostgresIdentityStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write (email, phone, name).
    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("not found")]
    NotFound,

    #[error("store backend error: {0}")]
    Backend(String),
}

#[async_trait::async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new user. Email and phone uniqueness are enforced here.
    async fn insert_user(&self, user: User) -> Result<User, StoreError>;

    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError>;

    async fn find_user_by_email(&self, email: &Email) -> Result<Option<User>, StoreError>;

    async fn find_user_by_phone(&self, phone: &PhoneNumber) -> Result<Option<User>, StoreError>;

    async fn list_users(&self) -> Result<Vec<User>, StoreError>;

    /// Persist profile, credential and role fields. Secret slots and
    /// verification flags are owned by [`SecretStore`] and are left untouched,
    /// except that a changed phone number drops phone verification.
    async fn save_user(&self, user: &User) -> Result<(), StoreError>;

    /// Hard delete. Returns whether a user was removed.
    async fn delete_user(&self, id: UserId) -> Result<bool, StoreError>;
}

#[async_trait::async_trait]
pub trait RoleStore: Send + Sync {
    /// Insert or replace by name; an existing role keeps its id.
    async fn upsert_role(&self, role: Role) -> Result<Role, StoreError>;

    /// Insert only if no role with this name exists; returns the stored role.
    async fn ensure_role(&self, role: Role) -> Result<Role, StoreError>;

    async fn get_role(&self, id: RoleId) -> Result<Option<Role>, StoreError>;

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, StoreError>;

    async fn list_roles(&self) -> Result<Vec<Role>, StoreError>;
}

#[async_trait::async_trait]
pub trait PermissionStore: Send + Sync {
    /// Insert or update by name; an existing permission keeps its id.
    async fn upsert_permission(&self, permission: Permission) -> Result<Permission, StoreError>;

    async fn list_permissions(&self) -> Result<Vec<Permission>, StoreError>;
}

#[async_trait::async_trait]
pub trait OrganizationStore: Send + Sync {
    async fn insert_organization(&self, organization: Organization) -> Result<Organization, StoreError>;

    async fn get_organization(&self, id: OrganizationId) -> Result<Option<Organization>, StoreError>;
}

/// Secret slot operations for one holder kind.
#[async_trait::async_trait]
pub trait SecretStore<E: SecretHolder>: Send + Sync {
    /// Overwrite the `(entity, purpose)` slot. Any prior secret is gone.
    async fn put_secret(&self, id: E::Id, purpose: SecretPurpose, slot: SecretSlot) -> Result<(), StoreError>;

    /// Clear the slot only if it still holds `hash`. Returns whether it did.
    async fn clear_secret_if(&self, id: E::Id, purpose: SecretPurpose, hash: &str) -> Result<bool, StoreError>;

    /// Find an entity matching `lookup` whose `purpose` slot holds `hash` and
    /// has not expired at `now`; clear that slot, apply the purpose's effect
    /// and return the updated entity. One atomic step per backend.
    async fn consume_secret(
        &self,
        lookup: &SecretLookup<E::Id>,
        purpose: SecretPurpose,
        hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<E>, StoreError>;
}

#[async_trait::async_trait]
pub trait AccessStore: Send + Sync {
    /// Load a user together with its role and the role's permission names.
    async fn resolve_identity(&self, user_id: UserId) -> Result<Option<ResolvedIdentity>, StoreError>;
}

/// Everything the services need from one backend.
pub trait IdentityStore:
    UserStore
    + RoleStore
    + PermissionStore
    + OrganizationStore
    + SecretStore<User>
    + SecretStore<Organization>
    + AccessStore
{
}

impl<T> IdentityStore for T where
    T: UserStore
        + RoleStore
        + PermissionStore
        + OrganizationStore
        + SecretStore<User>
        + SecretStore<Organization>
        + AccessStore
{
}

/// Permission ids of a role that do not resolve to a stored permission are
/// silently dropped from the resolved set.
pub(crate) fn permission_names<'a>(
    ids: &BTreeSet<PermissionId>,
    catalog: impl IntoIterator<Item = &'a Permission>,
) -> Vec<String> {
    catalog
        .into_iter()
        .filter(|p| ids.contains(&p.id))
        .map(|p| p.name.as_str().to_string())
        .collect()
}
