use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use churchos_auth::{
    Email, Organization, Permission, PermissionSet, PhoneNumber, ResolvedIdentity, ResolvedRole, Role,
    SecretHolder, SecretLookup, SecretPurpose, SecretSlot, User,
};
use churchos_core::{OrganizationId, PermissionId, RoleId, UserId};

use super::{
    AccessStore, OrganizationStore, PermissionStore, RoleStore, SecretStore, StoreError, UserStore,
    permission_names,
};

/// In-memory identity store for tests/dev.
///
/// Each entity kind lives behind its own lock. When more than one lock is
/// needed they are taken in field order (users, roles, permissions,
/// organizations).
#[derive(Debug, Default)]
pub struct InMemoryIdentityStore {
    users: RwLock<HashMap<UserId, User>>,
    roles: RwLock<HashMap<RoleId, Role>>,
    permissions: RwLock<HashMap<PermissionId, Permission>>,
    organizations: RwLock<HashMap<OrganizationId, Organization>>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>, StoreError> {
    lock.read().map_err(|_| StoreError::Backend("lock poisoned".to_string()))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>, StoreError> {
    lock.write().map_err(|_| StoreError::Backend("lock poisoned".to_string()))
}

/// Uniqueness check for a user's email and phone against everyone but `except`.
fn ensure_unique_contact(map: &HashMap<UserId, User>, user: &User, except: Option<UserId>) -> Result<(), StoreError> {
    for other in map.values().filter(|u| Some(u.id) != except) {
        if other.email == user.email {
            return Err(StoreError::Duplicate(format!("email '{}' is already registered", user.email)));
        }
        if user.phone_number.is_some() && other.phone_number == user.phone_number {
            return Err(StoreError::Duplicate("phone number is already registered".to_string()));
        }
    }
    Ok(())
}

fn put_slot<E: SecretHolder>(
    map: &mut HashMap<E::Id, E>,
    id: E::Id,
    purpose: SecretPurpose,
    slot: SecretSlot,
) -> Result<(), StoreError>
where
    E::Id: Hash + Eq,
{
    let entity = map.get_mut(&id).ok_or(StoreError::NotFound)?;
    let target = entity
        .slot_mut(purpose)
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    *target = Some(slot);
    Ok(())
}

fn clear_slot_if<E: SecretHolder>(map: &mut HashMap<E::Id, E>, id: E::Id, purpose: SecretPurpose, hash: &str) -> bool
where
    E::Id: Hash + Eq,
{
    let Some(entity) = map.get_mut(&id) else {
        return false;
    };
    let Ok(slot) = entity.slot_mut(purpose) else {
        return false;
    };
    if slot.as_ref().is_some_and(|s| s.hash == hash) {
        *slot = None;
        true
    } else {
        false
    }
}

fn consume_slot<E: SecretHolder>(
    map: &mut HashMap<E::Id, E>,
    lookup: &SecretLookup<E::Id>,
    purpose: SecretPurpose,
    hash: &str,
    now: DateTime<Utc>,
) -> Option<E> {
    for entity in map.values_mut() {
        if entity.matches_lookup(lookup) && entity.try_consume(purpose, hash, now) {
            return Some(entity.clone());
        }
    }
    None
}

#[async_trait::async_trait]
impl UserStore for InMemoryIdentityStore {
    async fn insert_user(&self, user: User) -> Result<User, StoreError> {
        let mut map = write(&self.users)?;
        ensure_unique_contact(&map, &user, None)?;
        map.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(read(&self.users)?.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &Email) -> Result<Option<User>, StoreError> {
        Ok(read(&self.users)?.values().find(|u| &u.email == email).cloned())
    }

    async fn find_user_by_phone(&self, phone: &PhoneNumber) -> Result<Option<User>, StoreError> {
        Ok(read(&self.users)?
            .values()
            .find(|u| u.phone_number.as_ref() == Some(phone))
            .cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let mut users: Vec<User> = read(&self.users)?.values().cloned().collect();
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }

    async fn save_user(&self, user: &User) -> Result<(), StoreError> {
        let mut map = write(&self.users)?;
        ensure_unique_contact(&map, user, Some(user.id))?;
        let stored = map.get_mut(&user.id).ok_or(StoreError::NotFound)?;
        if stored.phone_number != user.phone_number {
            // An OTP sent to the old number must not verify the new one.
            stored.phone_otp = None;
            stored.is_phone_verified = false;
        }
        stored.name = user.name.clone();
        stored.email = user.email.clone();
        stored.phone_number = user.phone_number.clone();
        stored.password_hash = user.password_hash.clone();
        stored.role_id = user.role_id;
        stored.organization_id = user.organization_id;
        stored.updated_at = user.updated_at;
        Ok(())
    }

    async fn delete_user(&self, id: UserId) -> Result<bool, StoreError> {
        Ok(write(&self.users)?.remove(&id).is_some())
    }
}

#[async_trait::async_trait]
impl RoleStore for InMemoryIdentityStore {
    async fn upsert_role(&self, role: Role) -> Result<Role, StoreError> {
        let mut map = write(&self.roles)?;
        let stored = match map.values_mut().find(|r| r.name == role.name) {
            Some(existing) => {
                existing.description = role.description;
                existing.permissions = role.permissions;
                existing.clone()
            }
            None => {
                map.insert(role.id, role.clone());
                role
            }
        };
        Ok(stored)
    }

    async fn ensure_role(&self, role: Role) -> Result<Role, StoreError> {
        let mut map = write(&self.roles)?;
        if let Some(existing) = map.values().find(|r| r.name == role.name) {
            return Ok(existing.clone());
        }
        map.insert(role.id, role.clone());
        Ok(role)
    }

    async fn get_role(&self, id: RoleId) -> Result<Option<Role>, StoreError> {
        Ok(read(&self.roles)?.get(&id).cloned())
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, StoreError> {
        Ok(read(&self.roles)?.values().find(|r| r.name == name).cloned())
    }

    async fn list_roles(&self) -> Result<Vec<Role>, StoreError> {
        let mut roles: Vec<Role> = read(&self.roles)?.values().cloned().collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }
}

#[async_trait::async_trait]
impl PermissionStore for InMemoryIdentityStore {
    async fn upsert_permission(&self, permission: Permission) -> Result<Permission, StoreError> {
        let mut map = write(&self.permissions)?;
        let stored = match map.values_mut().find(|p| p.name == permission.name) {
            Some(existing) => {
                existing.description = permission.description;
                existing.module = permission.module;
                existing.clone()
            }
            None => {
                map.insert(permission.id, permission.clone());
                permission
            }
        };
        Ok(stored)
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>, StoreError> {
        let mut perms: Vec<Permission> = read(&self.permissions)?.values().cloned().collect();
        perms.sort_by(|a, b| (&a.module, &a.name).cmp(&(&b.module, &b.name)));
        Ok(perms)
    }
}

#[async_trait::async_trait]
impl OrganizationStore for InMemoryIdentityStore {
    async fn insert_organization(&self, organization: Organization) -> Result<Organization, StoreError> {
        let mut map = write(&self.organizations)?;
        if map.values().any(|o| o.contact_email == organization.contact_email) {
            return Err(StoreError::Duplicate(format!(
                "organization email '{}' is already registered",
                organization.contact_email
            )));
        }
        map.insert(organization.id, organization.clone());
        Ok(organization)
    }

    async fn get_organization(&self, id: OrganizationId) -> Result<Option<Organization>, StoreError> {
        Ok(read(&self.organizations)?.get(&id).cloned())
    }
}

#[async_trait::async_trait]
impl SecretStore<User> for InMemoryIdentityStore {
    async fn put_secret(&self, id: UserId, purpose: SecretPurpose, slot: SecretSlot) -> Result<(), StoreError> {
        put_slot(&mut *write(&self.users)?, id, purpose, slot)
    }

    async fn clear_secret_if(&self, id: UserId, purpose: SecretPurpose, hash: &str) -> Result<bool, StoreError> {
        Ok(clear_slot_if(&mut *write(&self.users)?, id, purpose, hash))
    }

    async fn consume_secret(
        &self,
        lookup: &SecretLookup<UserId>,
        purpose: SecretPurpose,
        hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError> {
        Ok(consume_slot(&mut *write(&self.users)?, lookup, purpose, hash, now))
    }
}

#[async_trait::async_trait]
impl SecretStore<Organization> for InMemoryIdentityStore {
    async fn put_secret(
        &self,
        id: OrganizationId,
        purpose: SecretPurpose,
        slot: SecretSlot,
    ) -> Result<(), StoreError> {
        put_slot(&mut *write(&self.organizations)?, id, purpose, slot)
    }

    async fn clear_secret_if(
        &self,
        id: OrganizationId,
        purpose: SecretPurpose,
        hash: &str,
    ) -> Result<bool, StoreError> {
        Ok(clear_slot_if(&mut *write(&self.organizations)?, id, purpose, hash))
    }

    async fn consume_secret(
        &self,
        lookup: &SecretLookup<OrganizationId>,
        purpose: SecretPurpose,
        hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Organization>, StoreError> {
        Ok(consume_slot(&mut *write(&self.organizations)?, lookup, purpose, hash, now))
    }
}

#[async_trait::async_trait]
impl AccessStore for InMemoryIdentityStore {
    async fn resolve_identity(&self, user_id: UserId) -> Result<Option<ResolvedIdentity>, StoreError> {
        let users = read(&self.users)?;
        let Some(user) = users.get(&user_id) else {
            return Ok(None);
        };
        let roles = read(&self.roles)?;
        let permissions = read(&self.permissions)?;
        let role = roles.get(&user.role_id).map(|role| ResolvedRole {
            id: role.id,
            name: role.name.clone(),
            permissions: permission_names(&role.permissions, permissions.values())
                .into_iter()
                .collect::<PermissionSet>(),
        });
        Ok(Some(ResolvedIdentity {
            user_id: user.id,
            email: user.email.clone(),
            role,
        }))
    }
}
