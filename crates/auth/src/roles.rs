use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use churchos_core::{DomainError, Entity, PermissionId, RoleId};

/// Name of the full-access role.
///
/// There is no runtime wildcard: the seeder enumerates every catalog
/// permission into this role's membership.
pub const SUPER_ADMIN: &str = "Super Admin";

/// A named group of permissions assigned to users.
///
/// `permissions` is a set of references; membership is unordered and a
/// permission appears at most once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub description: Option<String>,
    pub permissions: BTreeSet<PermissionId>,
}

impl Role {
    pub fn new(
        name: impl Into<String>,
        description: Option<String>,
        permissions: impl IntoIterator<Item = PermissionId>,
    ) -> Result<Self, DomainError> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(DomainError::validation("role name cannot be empty"));
        }
        Ok(Self {
            id: RoleId::new(),
            name,
            description,
            permissions: permissions.into_iter().collect(),
        })
    }

    pub fn grants(&self, permission: &PermissionId) -> bool {
        self.permissions.contains(permission)
    }
}

impl Entity for Role {
    type Id = RoleId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
