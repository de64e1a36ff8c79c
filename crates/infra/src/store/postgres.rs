//! Postgres-backed identity store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `Duplicate` | email, phone, role or permission name already taken |
//! | Database (other) | Any other | `Backend` | constraint or query failure |
//! | Other | N/A | `Backend` | pool closed, network errors, decode failures |
//!
//! ## Secrets
//!
//! Each purpose owns a `<purpose>_hash` / `<purpose>_expires_at` column pair
//! (see `migrations/0001_identity.sql`). Overwrite, conditional clear and
//! consume are each a single `UPDATE`, so they inherit Postgres row-level
//! atomicity. Consume re-checks hash and expiry after taking the row lock.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{FromRow, PgPool, Postgres, Row};
use tracing::instrument;
use uuid::Uuid;

use churchos_auth::{
    Email, Organization, Permission, PermissionName, PermissionSet, PhoneNumber, PasswordHash, ResolvedIdentity,
    ResolvedRole, Role, SecretHolder, SecretLookup, SecretPurpose, SecretSlot, User,
};
use churchos_core::{OrganizationId, PermissionId, RoleId, UserId};

use super::{AccessStore, OrganizationStore, PermissionStore, RoleStore, SecretStore, StoreError, UserStore};

const SCHEMA: &str = include_str!("../../migrations/0001_identity.sql");

const USER_COLUMNS: &str = "id, name, email, phone_number, password_hash, role_id, organization_id, \
     is_email_verified, is_phone_verified, \
     email_verification_hash, email_verification_expires_at, otp_hash, otp_expires_at, \
     phone_otp_hash, phone_otp_expires_at, password_reset_hash, password_reset_expires_at, \
     created_at, updated_at";

const ORGANIZATION_COLUMNS: &str = "id, name, contact_email, contact_phone, created_by, \
     is_email_verified, is_phone_verified, \
     email_verification_hash, email_verification_expires_at, phone_otp_hash, phone_otp_expires_at, \
     created_at, updated_at";

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

/// Postgres-backed identity store.
///
/// `Send + Sync`; the SQLx pool handles connection sharing.
#[derive(Debug, Clone)]
pub struct PostgresIdentityStore {
    pool: Arc<PgPool>,
}

impl PostgresIdentityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if missing.
    #[instrument(skip(self), err)]
    pub async fn apply_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("apply_schema", e))?;
        Ok(())
    }

    async fn put_slot(&self, table: &str, id: Uuid, purpose: SecretPurpose, slot: SecretSlot) -> Result<(), StoreError> {
        let col = purpose.as_str();
        let sql = format!("UPDATE {table} SET {col}_hash = $2, {col}_expires_at = $3 WHERE id = $1");
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(slot.hash)
            .bind(slot.expires_at)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("put_secret", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn clear_slot_if(&self, table: &str, id: Uuid, purpose: SecretPurpose, hash: &str) -> Result<bool, StoreError> {
        let col = purpose.as_str();
        let sql = format!(
            "UPDATE {table} SET {col}_hash = NULL, {col}_expires_at = NULL WHERE id = $1 AND {col}_hash = $2"
        );
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(hash)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("clear_secret_if", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn consume_slot<Id>(
        &self,
        table: &str,
        columns: (&str, &str),
        lookup: &SecretLookup<Id>,
        purpose: SecretPurpose,
        hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<PgRow>, StoreError>
    where
        Id: Copy + Into<Uuid> + Send + Sync,
    {
        let col = purpose.as_str();
        let (email_col, phone_col) = columns;
        let filter = match lookup {
            SecretLookup::HashOnly => "TRUE".to_string(),
            SecretLookup::Id(_) => "id = $3".to_string(),
            SecretLookup::Email(_) => format!("{email_col} = $3"),
            SecretLookup::Phone(_) => format!("{phone_col} = $3"),
        };
        let effect = match purpose {
            SecretPurpose::EmailVerification => ", is_email_verified = TRUE",
            SecretPurpose::PhoneOtp => ", is_phone_verified = TRUE",
            SecretPurpose::Otp | SecretPurpose::PasswordReset => "",
        };
        let sql = format!(
            r#"
            WITH target AS (
                SELECT id FROM {table}
                WHERE {col}_hash = $1 AND {col}_expires_at > $2 AND {filter}
                LIMIT 1
                FOR UPDATE
            )
            UPDATE {table} t
            SET {col}_hash = NULL, {col}_expires_at = NULL, updated_at = $2{effect}
            FROM target
            WHERE t.id = target.id AND t.{col}_hash = $1 AND t.{col}_expires_at > $2
            RETURNING t.*
            "#
        );
        let query = sqlx::query(&sql).bind(hash).bind(now);
        bind_lookup(query, lookup)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("consume_secret", e))
    }
}

fn bind_lookup<'q, Id: Copy + Into<Uuid>>(query: PgQuery<'q>, lookup: &SecretLookup<Id>) -> PgQuery<'q> {
    match lookup {
        SecretLookup::HashOnly => query,
        SecretLookup::Id(id) => {
            let id: Uuid = (*id).into();
            query.bind(id)
        }
        SecretLookup::Email(email) => query.bind(email.clone()),
        SecretLookup::Phone(phone) => query.bind(phone.clone()),
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            if db_err.code().as_deref() == Some("23505") {
                let what = match db_err.constraint() {
                    Some(c) if c.contains("email") => "email is already registered",
                    Some(c) if c.contains("phone") => "phone number is already registered",
                    Some(c) if c.contains("name") => "name is already taken",
                    _ => "entity already exists",
                };
                StoreError::Duplicate(what.to_string())
            } else {
                StoreError::Backend(format!("database error in {operation}: {}", db_err.message()))
            }
        }
        sqlx::Error::PoolClosed => StoreError::Backend(format!("connection pool closed in {operation}")),
        other => StoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}

fn corrupt(what: &str, err: impl core::fmt::Display) -> StoreError {
    StoreError::Backend(format!("corrupt {what} row: {err}"))
}

// SQLx row types

fn read_slot(row: &PgRow, purpose: SecretPurpose) -> Result<Option<SecretSlot>, sqlx::Error> {
    let prefix = purpose.as_str();
    let hash: Option<String> = row.try_get(format!("{prefix}_hash").as_str())?;
    let expires_at: Option<DateTime<Utc>> = row.try_get(format!("{prefix}_expires_at").as_str())?;
    Ok(match (hash, expires_at) {
        (Some(hash), Some(expires_at)) => Some(SecretSlot { hash, expires_at }),
        _ => None,
    })
}

#[derive(Debug)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    phone_number: Option<String>,
    password_hash: String,
    role_id: Uuid,
    organization_id: Option<Uuid>,
    is_email_verified: bool,
    is_phone_verified: bool,
    email_verification: Option<SecretSlot>,
    otp: Option<SecretSlot>,
    phone_otp: Option<SecretSlot>,
    password_reset: Option<SecretSlot>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for UserRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(UserRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            phone_number: row.try_get("phone_number")?,
            password_hash: row.try_get("password_hash")?,
            role_id: row.try_get("role_id")?,
            organization_id: row.try_get("organization_id")?,
            is_email_verified: row.try_get("is_email_verified")?,
            is_phone_verified: row.try_get("is_phone_verified")?,
            email_verification: read_slot(row, SecretPurpose::EmailVerification)?,
            otp: read_slot(row, SecretPurpose::Otp)?,
            phone_otp: read_slot(row, SecretPurpose::PhoneOtp)?,
            password_reset: read_slot(row, SecretPurpose::PasswordReset)?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: UserId::from_uuid(row.id),
            name: row.name,
            email: Email::parse(&row.email).map_err(|e| corrupt("user", e))?,
            phone_number: row
                .phone_number
                .as_deref()
                .map(PhoneNumber::parse)
                .transpose()
                .map_err(|e| corrupt("user", e))?,
            password_hash: PasswordHash::from_phc(row.password_hash),
            role_id: RoleId::from_uuid(row.role_id),
            organization_id: row.organization_id.map(OrganizationId::from_uuid),
            is_email_verified: row.is_email_verified,
            is_phone_verified: row.is_phone_verified,
            email_verification: row.email_verification,
            otp: row.otp,
            phone_otp: row.phone_otp,
            password_reset: row.password_reset,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn user_from_row(row: &PgRow) -> Result<User, StoreError> {
    UserRow::from_row(row).map_err(|e| corrupt("user", e))?.try_into()
}

#[derive(Debug)]
struct OrganizationRow {
    id: Uuid,
    name: String,
    contact_email: String,
    contact_phone: Option<String>,
    created_by: Option<Uuid>,
    is_email_verified: bool,
    is_phone_verified: bool,
    email_verification: Option<SecretSlot>,
    phone_otp: Option<SecretSlot>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for OrganizationRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(OrganizationRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            contact_email: row.try_get("contact_email")?,
            contact_phone: row.try_get("contact_phone")?,
            created_by: row.try_get("created_by")?,
            is_email_verified: row.try_get("is_email_verified")?,
            is_phone_verified: row.try_get("is_phone_verified")?,
            email_verification: read_slot(row, SecretPurpose::EmailVerification)?,
            phone_otp: read_slot(row, SecretPurpose::PhoneOtp)?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

fn organization_from_row(row: &PgRow) -> Result<Organization, StoreError> {
    let row = OrganizationRow::from_row(row).map_err(|e| corrupt("organization", e))?;
    Ok(Organization {
        id: OrganizationId::from_uuid(row.id),
        name: row.name,
        contact_email: Email::parse(&row.contact_email).map_err(|e| corrupt("organization", e))?,
        contact_phone: row
            .contact_phone
            .as_deref()
            .map(PhoneNumber::parse)
            .transpose()
            .map_err(|e| corrupt("organization", e))?,
        created_by: row.created_by.map(UserId::from_uuid),
        is_email_verified: row.is_email_verified,
        is_phone_verified: row.is_phone_verified,
        email_verification: row.email_verification,
        phone_otp: row.phone_otp,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn role_from_row(row: &PgRow) -> Result<Role, StoreError> {
    let ids: Vec<Uuid> = row.try_get("permission_ids").map_err(|e| corrupt("role", e))?;
    Ok(Role {
        id: RoleId::from_uuid(row.try_get("id").map_err(|e| corrupt("role", e))?),
        name: row.try_get("name").map_err(|e| corrupt("role", e))?,
        description: row.try_get("description").map_err(|e| corrupt("role", e))?,
        permissions: ids.into_iter().map(PermissionId::from_uuid).collect(),
    })
}

fn permission_from_row(row: &PgRow) -> Result<Permission, StoreError> {
    let name: String = row.try_get("name").map_err(|e| corrupt("permission", e))?;
    Ok(Permission {
        id: PermissionId::from_uuid(row.try_get("id").map_err(|e| corrupt("permission", e))?),
        name: PermissionName::parse(&name).map_err(|e| corrupt("permission", e))?,
        description: row.try_get("description").map_err(|e| corrupt("permission", e))?,
        module: row.try_get("module").map_err(|e| corrupt("permission", e))?,
    })
}

fn slot_parts(slot: &Option<SecretSlot>) -> (Option<String>, Option<DateTime<Utc>>) {
    match slot {
        Some(s) => (Some(s.hash.clone()), Some(s.expires_at)),
        None => (None, None),
    }
}

#[async_trait::async_trait]
impl UserStore for PostgresIdentityStore {
    #[instrument(skip(self, user), fields(user_id = %user.id), err)]
    async fn insert_user(&self, user: User) -> Result<User, StoreError> {
        let (ev_hash, ev_exp) = slot_parts(&user.email_verification);
        let (otp_hash, otp_exp) = slot_parts(&user.otp);
        let (potp_hash, potp_exp) = slot_parts(&user.phone_otp);
        let (pr_hash, pr_exp) = slot_parts(&user.password_reset);
        sqlx::query(&format!(
            "INSERT INTO users ({USER_COLUMNS}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)"
        ))
        .bind(user.id.as_uuid())
        .bind(&user.name)
        .bind(user.email.as_str())
        .bind(user.phone_number.as_ref().map(|p| p.as_str().to_string()))
        .bind(user.password_hash.as_phc())
        .bind(user.role_id.as_uuid())
        .bind(user.organization_id.map(Uuid::from))
        .bind(user.is_email_verified)
        .bind(user.is_phone_verified)
        .bind(ev_hash)
        .bind(ev_exp)
        .bind(otp_hash)
        .bind(otp_exp)
        .bind(potp_hash)
        .bind(potp_exp)
        .bind(pr_hash)
        .bind(pr_exp)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_user", e))?;
        Ok(user)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_user", e))?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_user_by_email(&self, email: &Email) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_user_by_email", e))?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_user_by_phone(&self, phone: &PhoneNumber) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE phone_number = $1"))
            .bind(phone.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_user_by_phone", e))?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC"))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_users", e))?;
        rows.iter().map(user_from_row).collect()
    }

    #[instrument(skip(self, user), fields(user_id = %user.id), err)]
    async fn save_user(&self, user: &User) -> Result<(), StoreError> {
        // Right-hand sides see the old row, so phone verification and the
        // phone OTP are dropped only when the number actually changes.
        let result = sqlx::query(
            r#"
            UPDATE users SET
                name = $2,
                email = $3,
                phone_number = $4,
                password_hash = $5,
                role_id = $6,
                organization_id = $7,
                updated_at = $8,
                is_phone_verified = CASE WHEN phone_number IS DISTINCT FROM $4 THEN FALSE ELSE is_phone_verified END,
                phone_otp_hash = CASE WHEN phone_number IS DISTINCT FROM $4 THEN NULL ELSE phone_otp_hash END,
                phone_otp_expires_at = CASE WHEN phone_number IS DISTINCT FROM $4 THEN NULL ELSE phone_otp_expires_at END
            WHERE id = $1
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.name)
        .bind(user.email.as_str())
        .bind(user.phone_number.as_ref().map(|p| p.as_str().to_string()))
        .bind(user.password_hash.as_phc())
        .bind(user.role_id.as_uuid())
        .bind(user.organization_id.map(Uuid::from))
        .bind(user.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("save_user", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete_user(&self, id: UserId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_user", e))?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait::async_trait]
impl RoleStore for PostgresIdentityStore {
    async fn upsert_role(&self, role: Role) -> Result<Role, StoreError> {
        let ids: Vec<Uuid> = role.permissions.iter().map(|p| *p.as_uuid()).collect();
        let row = sqlx::query(
            r#"
            INSERT INTO roles (id, name, description, permission_ids)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (name) DO UPDATE
                SET description = EXCLUDED.description, permission_ids = EXCLUDED.permission_ids
            RETURNING id, name, description, permission_ids
            "#,
        )
        .bind(role.id.as_uuid())
        .bind(&role.name)
        .bind(&role.description)
        .bind(ids)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert_role", e))?;
        role_from_row(&row)
    }

    async fn ensure_role(&self, role: Role) -> Result<Role, StoreError> {
        let ids: Vec<Uuid> = role.permissions.iter().map(|p| *p.as_uuid()).collect();
        sqlx::query(
            r#"
            INSERT INTO roles (id, name, description, permission_ids)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(role.id.as_uuid())
        .bind(&role.name)
        .bind(&role.description)
        .bind(ids)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_role", e))?;
        self.find_role_by_name(&role.name).await?.ok_or(StoreError::NotFound)
    }

    async fn get_role(&self, id: RoleId) -> Result<Option<Role>, StoreError> {
        let row = sqlx::query("SELECT id, name, description, permission_ids FROM roles WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_role", e))?;
        row.as_ref().map(role_from_row).transpose()
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, StoreError> {
        let row = sqlx::query("SELECT id, name, description, permission_ids FROM roles WHERE name = $1")
            .bind(name)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_role_by_name", e))?;
        row.as_ref().map(role_from_row).transpose()
    }

    async fn list_roles(&self) -> Result<Vec<Role>, StoreError> {
        let rows = sqlx::query("SELECT id, name, description, permission_ids FROM roles ORDER BY name")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_roles", e))?;
        rows.iter().map(role_from_row).collect()
    }
}

#[async_trait::async_trait]
impl PermissionStore for PostgresIdentityStore {
    async fn upsert_permission(&self, permission: Permission) -> Result<Permission, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO permissions (id, name, description, module)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (name) DO UPDATE
                SET description = EXCLUDED.description, module = EXCLUDED.module
            RETURNING id, name, description, module
            "#,
        )
        .bind(permission.id.as_uuid())
        .bind(permission.name.as_str())
        .bind(&permission.description)
        .bind(&permission.module)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert_permission", e))?;
        permission_from_row(&row)
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>, StoreError> {
        let rows = sqlx::query("SELECT id, name, description, module FROM permissions ORDER BY module, name")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_permissions", e))?;
        rows.iter().map(permission_from_row).collect()
    }
}

#[async_trait::async_trait]
impl OrganizationStore for PostgresIdentityStore {
    async fn insert_organization(&self, organization: Organization) -> Result<Organization, StoreError> {
        let (ev_hash, ev_exp) = slot_parts(&organization.email_verification);
        let (potp_hash, potp_exp) = slot_parts(&organization.phone_otp);
        sqlx::query(&format!(
            "INSERT INTO organizations ({ORGANIZATION_COLUMNS}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"
        ))
        .bind(organization.id.as_uuid())
        .bind(&organization.name)
        .bind(organization.contact_email.as_str())
        .bind(organization.contact_phone.as_ref().map(|p| p.as_str().to_string()))
        .bind(organization.created_by.map(Uuid::from))
        .bind(organization.is_email_verified)
        .bind(organization.is_phone_verified)
        .bind(ev_hash)
        .bind(ev_exp)
        .bind(potp_hash)
        .bind(potp_exp)
        .bind(organization.created_at)
        .bind(organization.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_organization", e))?;
        Ok(organization)
    }

    async fn get_organization(&self, id: OrganizationId) -> Result<Option<Organization>, StoreError> {
        let row = sqlx::query(&format!("SELECT {ORGANIZATION_COLUMNS} FROM organizations WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_organization", e))?;
        row.as_ref().map(organization_from_row).transpose()
    }
}

#[async_trait::async_trait]
impl SecretStore<User> for PostgresIdentityStore {
    #[instrument(skip(self, slot), fields(user_id = %id, purpose = %purpose), err)]
    async fn put_secret(&self, id: UserId, purpose: SecretPurpose, slot: SecretSlot) -> Result<(), StoreError> {
        self.put_slot("users", id.into(), purpose, slot).await
    }

    async fn clear_secret_if(&self, id: UserId, purpose: SecretPurpose, hash: &str) -> Result<bool, StoreError> {
        self.clear_slot_if("users", id.into(), purpose, hash).await
    }

    #[instrument(skip(self, lookup, hash), fields(purpose = %purpose), err)]
    async fn consume_secret(
        &self,
        lookup: &SecretLookup<UserId>,
        purpose: SecretPurpose,
        hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError> {
        let row = self
            .consume_slot("users", ("email", "phone_number"), lookup, purpose, hash, now)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }
}

#[async_trait::async_trait]
impl SecretStore<Organization> for PostgresIdentityStore {
    async fn put_secret(
        &self,
        id: OrganizationId,
        purpose: SecretPurpose,
        slot: SecretSlot,
    ) -> Result<(), StoreError> {
        if !Organization::supports(purpose) {
            return Err(StoreError::Backend(format!("organizations do not hold {purpose} secrets")));
        }
        self.put_slot("organizations", id.into(), purpose, slot).await
    }

    async fn clear_secret_if(
        &self,
        id: OrganizationId,
        purpose: SecretPurpose,
        hash: &str,
    ) -> Result<bool, StoreError> {
        if !Organization::supports(purpose) {
            return Ok(false);
        }
        self.clear_slot_if("organizations", id.into(), purpose, hash).await
    }

    async fn consume_secret(
        &self,
        lookup: &SecretLookup<OrganizationId>,
        purpose: SecretPurpose,
        hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Organization>, StoreError> {
        if !Organization::supports(purpose) {
            return Ok(None);
        }
        let row = self
            .consume_slot("organizations", ("contact_email", "contact_phone"), lookup, purpose, hash, now)
            .await?;
        row.as_ref().map(organization_from_row).transpose()
    }
}

#[async_trait::async_trait]
impl AccessStore for PostgresIdentityStore {
    /// One round-trip: user, role and permission names via joins.
    async fn resolve_identity(&self, user_id: UserId) -> Result<Option<ResolvedIdentity>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                u.id AS user_id,
                u.email,
                r.id AS role_id,
                r.name AS role_name,
                COALESCE(array_agg(p.name) FILTER (WHERE p.name IS NOT NULL), '{}') AS permission_names
            FROM users u
            LEFT JOIN roles r ON r.id = u.role_id
            LEFT JOIN permissions p ON p.id = ANY(r.permission_ids)
            WHERE u.id = $1
            GROUP BY u.id, u.email, r.id, r.name
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("resolve_identity", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let email: String = row.try_get("email").map_err(|e| corrupt("identity", e))?;
        let role_id: Option<Uuid> = row.try_get("role_id").map_err(|e| corrupt("identity", e))?;
        let role_name: Option<String> = row.try_get("role_name").map_err(|e| corrupt("identity", e))?;
        let names: Vec<String> = row.try_get("permission_names").map_err(|e| corrupt("identity", e))?;

        let role = match (role_id, role_name) {
            (Some(id), Some(name)) => Some(ResolvedRole {
                id: RoleId::from_uuid(id),
                name,
                permissions: names.into_iter().collect::<PermissionSet>(),
            }),
            _ => None,
        };
        Ok(Some(ResolvedIdentity {
            user_id,
            email: Email::parse(&email).map_err(|e| corrupt("identity", e))?,
            role,
        }))
    }
}
