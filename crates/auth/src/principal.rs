use serde::Serialize;

use churchos_core::{RoleId, UserId};

use crate::{AuthzError, Email, PermissionSet};

/// Identity as loaded for one request: the user plus its role and the
/// role's permission names, resolved together in one store lookup.
///
/// `role` is `None` when the user's role reference is dangling (e.g. the
/// role document was removed out of band).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub user_id: UserId,
    pub email: Email,
    pub role: Option<ResolvedRole>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRole {
    pub id: RoleId,
    pub name: String,
    pub permissions: PermissionSet,
}

impl ResolvedIdentity {
    /// Promote to an authorizable principal; fails with [`AuthzError::NoRole`]
    /// when no role is attached.
    pub fn into_principal(self) -> Result<Principal, AuthzError> {
        let role = self.role.ok_or(AuthzError::NoRole)?;
        Ok(Principal {
            user_id: self.user_id,
            email: self.email,
            role_id: role.id,
            role_name: role.name,
            permissions: role.permissions,
        })
    }
}

/// A fully resolved principal for authorization decisions.
///
/// Construction is decoupled from storage and transport: the API derives it
/// from a verified token subject and a store lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub user_id: UserId,
    pub email: Email,
    pub role_id: RoleId,
    pub role_name: String,
    pub permissions: PermissionSet,
}
