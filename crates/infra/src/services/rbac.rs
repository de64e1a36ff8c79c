//! RBAC seeding and read-only role/permission views.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};

use churchos_auth::{Permission, Role, SeedPlan};
use churchos_core::{PermissionId, RoleId};

use crate::error::IdentityError;
use crate::store::{IdentityStore, permission_names};

/// Counts from one [`RbacService::seed`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedReport {
    pub permissions: usize,
    pub roles: usize,
    pub skipped_grants: Vec<String>,
}

/// A role with its permission names resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleView {
    pub id: RoleId,
    pub name: String,
    pub description: Option<String>,
    pub permissions: Vec<String>,
}

#[derive(Clone)]
pub struct RbacService {
    store: Arc<dyn IdentityStore>,
}

impl RbacService {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self { store }
    }

    /// Apply `plan` idempotently: permissions and roles are upserted by name.
    ///
    /// `Grant::All` expands to the permissions written in this run, so the
    /// full-access role only learns about a new permission on the next seed.
    #[instrument(skip_all, err)]
    pub async fn seed(&self, plan: &SeedPlan) -> Result<SeedReport, IdentityError> {
        let mut seeded: HashMap<String, PermissionId> = HashMap::with_capacity(plan.permissions.len());
        for spec in &plan.permissions {
            let permission = Permission::new(spec.name.clone(), Some(spec.description.clone()), spec.module.clone());
            let stored = self.store.upsert_permission(permission).await?;
            seeded.insert(stored.name.as_str().to_string(), stored.id);
        }

        let mut report = SeedReport {
            permissions: seeded.len(),
            ..SeedReport::default()
        };
        for spec in &plan.roles {
            let resolved = SeedPlan::resolve(&spec.grant, &seeded);
            for name in &resolved.unknown {
                warn!(role = %spec.name, permission = %name, "seed grant names an unknown permission; skipped");
            }
            report.skipped_grants.extend(resolved.unknown);
            let role = Role::new(spec.name.clone(), Some(spec.description.clone()), resolved.permissions)?;
            self.store.upsert_role(role).await?;
            report.roles += 1;
        }

        info!(
            permissions = report.permissions,
            roles = report.roles,
            skipped = report.skipped_grants.len(),
            "rbac seeded"
        );
        Ok(report)
    }

    pub async fn list_roles(&self) -> Result<Vec<RoleView>, IdentityError> {
        let catalog = self.store.list_permissions().await?;
        let mut roles: Vec<RoleView> = self
            .store
            .list_roles()
            .await?
            .into_iter()
            .map(|role| RoleView {
                permissions: permission_names(&role.permissions, &catalog),
                id: role.id,
                name: role.name,
                description: role.description,
            })
            .collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    pub async fn list_permissions(&self) -> Result<Vec<Permission>, IdentityError> {
        let mut permissions = self.store.list_permissions().await?;
        permissions.sort_by(|a, b| a.name.as_str().cmp(b.name.as_str()));
        Ok(permissions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    use churchos_auth::{Grant, PermissionSet, Principal, SUPER_ADMIN, authorize, default_plan};

    use crate::services::testing::harness;
    use crate::store::{PermissionStore, RoleStore};

    fn names(view: &RoleView) -> BTreeSet<String> {
        view.permissions.iter().cloned().collect()
    }

    fn role<'a>(roles: &'a [RoleView], name: &str) -> &'a RoleView {
        roles.iter().find(|r| r.name == name).unwrap()
    }

    #[tokio::test]
    async fn super_admin_holds_exactly_the_seeded_catalog() {
        let h = harness().await;
        let roles = h.services.rbac.list_roles().await.unwrap();
        let catalog: BTreeSet<String> = h
            .services
            .rbac
            .list_permissions()
            .await
            .unwrap()
            .iter()
            .map(|p| p.name.as_str().to_string())
            .collect();
        assert_eq!(catalog.len(), 8);
        assert_eq!(names(role(&roles, SUPER_ADMIN)), catalog);
        assert!(!names(role(&roles, "Admin")).contains("user.delete"));
        assert_eq!(
            names(role(&roles, "Staff")),
            BTreeSet::from(["finance.view".to_string(), "user.read".to_string()])
        );
    }

    #[tokio::test]
    async fn permission_added_later_needs_reseed() {
        let h = harness().await;
        let late = Permission::new(
            churchos_auth::PermissionName::parse("report.export").unwrap(),
            None,
            "reports",
        );
        h.store.upsert_permission(late).await.unwrap();

        let roles = h.services.rbac.list_roles().await.unwrap();
        assert!(!names(role(&roles, SUPER_ADMIN)).contains("report.export"));

        let plan = default_plan()
            .unwrap()
            .permission("report.export", "Can export reports", "reports")
            .unwrap();
        h.services.rbac.seed(&plan).await.unwrap();
        let roles = h.services.rbac.list_roles().await.unwrap();
        assert!(names(role(&roles, SUPER_ADMIN)).contains("report.export"));
    }

    #[tokio::test]
    async fn reseeding_is_idempotent() {
        let h = harness().await;
        let before = h.store.list_roles().await.unwrap();
        let report = h.services.rbac.seed(&default_plan().unwrap()).await.unwrap();
        assert_eq!(report.permissions, 8);
        assert_eq!(report.roles, 3);

        let after = h.store.list_roles().await.unwrap();
        assert_eq!(after.len(), before.len());
        for role in &before {
            assert!(after.iter().any(|r| r.id == role.id && r.name == role.name));
        }
        assert_eq!(h.store.list_permissions().await.unwrap().len(), 8);
    }

    #[tokio::test]
    async fn unknown_grant_names_are_skipped() {
        let h = harness().await;
        let plan = SeedPlan::new()
            .permission("user.read", "Can view user details", "users")
            .unwrap()
            .role("Auditor", Grant::Named(vec!["user.read".into(), "audit.view".into()]));
        let report = h.services.rbac.seed(&plan).await.unwrap();
        assert_eq!(report.skipped_grants, vec!["audit.view".to_string()]);

        let roles = h.services.rbac.list_roles().await.unwrap();
        assert_eq!(names(role(&roles, "Auditor")), BTreeSet::from(["user.read".to_string()]));
    }

    #[tokio::test]
    async fn staff_scenario_is_match_any() {
        let h = harness().await;
        let plan = SeedPlan::new()
            .permission("user.create", "Can create new users", "users")
            .unwrap()
            .permission("user.read", "Can view user details", "users")
            .unwrap()
            .role("Staff", Grant::Named(vec!["user.read".into()]));
        h.services.rbac.seed(&plan).await.unwrap();

        let roles = h.services.rbac.list_roles().await.unwrap();
        let staff = role(&roles, "Staff");
        let principal = Principal {
            user_id: churchos_core::UserId::new(),
            email: churchos_auth::Email::parse("u@b.com").unwrap(),
            role_id: staff.id,
            role_name: staff.name.clone(),
            permissions: staff.permissions.iter().cloned().collect::<PermissionSet>(),
        };
        assert!(authorize(&principal, &["user.create"]).is_err());
        assert!(authorize(&principal, &["user.read", "user.create"]).is_ok());
    }
}
