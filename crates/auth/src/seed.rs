//! Developer-controlled RBAC catalog.
//!
//! A [`SeedPlan`] is pure data: the infra layer upserts its permissions by
//! name, then resolves each role's grant against the ids it just wrote.

use std::collections::{BTreeSet, HashMap};

use churchos_core::{DomainError, PermissionId};

use crate::permissions::PermissionName;
use crate::roles::SUPER_ADMIN;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionSpec {
    pub name: PermissionName,
    pub description: String,
    pub module: String,
}

/// Which permissions a seeded role receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grant {
    /// Every permission seeded in the same run, enumerated at seed time.
    All,
    Named(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSpec {
    pub name: String,
    pub description: String,
    pub grant: Grant,
}

/// Outcome of resolving a [`Grant`]: known ids plus names that were not in
/// the seeded catalog (reported, then skipped).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedGrant {
    pub permissions: BTreeSet<PermissionId>,
    pub unknown: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedPlan {
    pub permissions: Vec<PermissionSpec>,
    pub roles: Vec<RoleSpec>,
}

impl SeedPlan {
    pub fn new() -> Self {
        Self {
            permissions: Vec::new(),
            roles: Vec::new(),
        }
    }

    pub fn permission(mut self, name: &str, description: &str, module: &str) -> Result<Self, DomainError> {
        self.permissions.push(PermissionSpec {
            name: PermissionName::parse(name)?,
            description: description.to_string(),
            module: module.to_string(),
        });
        Ok(self)
    }

    pub fn role(mut self, name: &str, grant: Grant) -> Self {
        self.roles.push(RoleSpec {
            name: name.to_string(),
            description: format!("Rigid Role: {name}"),
            grant,
        });
        self
    }

    /// `seeded` maps permission names to the ids written in this run.
    pub fn resolve(grant: &Grant, seeded: &HashMap<String, PermissionId>) -> ResolvedGrant {
        match grant {
            Grant::All => ResolvedGrant {
                permissions: seeded.values().copied().collect(),
                unknown: Vec::new(),
            },
            Grant::Named(names) => {
                let mut out = ResolvedGrant::default();
                for name in names {
                    match seeded.get(name) {
                        Some(id) => {
                            out.permissions.insert(*id);
                        }
                        None => out.unknown.push(name.clone()),
                    }
                }
                out
            }
        }
    }
}

impl Default for SeedPlan {
    fn default() -> Self {
        Self::new()
    }
}

fn named(names: &[&str]) -> Grant {
    Grant::Named(names.iter().map(|n| n.to_string()).collect())
}

/// Built-in catalog: user management, RBAC visibility, finance.
pub fn default_plan() -> Result<SeedPlan, DomainError> {
    Ok(SeedPlan::new()
        .permission("user.create", "Can create new users", "users")?
        .permission("user.read", "Can view user details", "users")?
        .permission("user.update", "Can update user details", "users")?
        .permission("user.delete", "Can delete users", "users")?
        .permission("role.read", "Can view roles and permissions", "rbac")?
        .permission("system.view", "Can view system configuration", "system")?
        .permission("finance.view", "Can view financial records", "finance")?
        .permission("finance.manage", "Can manage finances", "finance")?
        .role(SUPER_ADMIN, Grant::All)
        .role(
            "Admin",
            named(&[
                "user.create",
                "user.read",
                "user.update",
                "role.read",
                "system.view",
                "finance.view",
                "finance.manage",
            ]),
        )
        .role("Staff", named(&["user.read", "finance.view"])))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(names: &[&str]) -> HashMap<String, PermissionId> {
        names.iter().map(|n| (n.to_string(), PermissionId::new())).collect()
    }

    #[test]
    fn all_grant_enumerates_seeded_catalog() {
        let ids = seeded(&["a.b", "c.d"]);
        let r = SeedPlan::resolve(&Grant::All, &ids);
        let expected: BTreeSet<PermissionId> = ids.values().copied().collect();
        assert_eq!(r.permissions, expected);
        assert!(r.unknown.is_empty());
    }

    #[test]
    fn unknown_names_are_reported_not_granted() {
        let ids = seeded(&["user.read"]);
        let r = SeedPlan::resolve(&named(&["user.read", "ghost.perm"]), &ids);
        assert_eq!(r.permissions.len(), 1);
        assert_eq!(r.unknown, vec!["ghost.perm".to_string()]);
    }

    #[test]
    fn default_plan_is_consistent() {
        let plan = default_plan().unwrap();
        let ids: HashMap<_, _> = plan
            .permissions
            .iter()
            .map(|p| (p.name.as_str().to_string(), PermissionId::new()))
            .collect();
        assert_eq!(ids.len(), plan.permissions.len());
        for role in &plan.roles {
            assert!(SeedPlan::resolve(&role.grant, &ids).unknown.is_empty(), "{}", role.name);
        }
        assert!(plan.roles.iter().any(|r| r.name == SUPER_ADMIN && r.grant == Grant::All));
    }
}
