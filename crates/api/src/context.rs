use churchos_auth::{PermissionSet, Principal};
use churchos_core::{RoleId, UserId};

/// Authenticated principal for a request: user, role and the role's
/// resolved permission names.
///
/// Built once by the auth middleware; handlers only read it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal: Principal,
}

impl PrincipalContext {
    pub fn new(principal: Principal) -> Self {
        Self { principal }
    }

    pub fn user_id(&self) -> UserId {
        self.principal.user_id
    }

    pub fn role_id(&self) -> RoleId {
        self.principal.role_id
    }

    pub fn role_name(&self) -> &str {
        &self.principal.role_name
    }

    pub fn permissions(&self) -> &PermissionSet {
        &self.principal.permissions
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }
}
