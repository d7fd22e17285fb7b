//! Transactional repositories for iam-access
//!
//! These repositories use a shared transaction instead of a connection pool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rbac_common::{AuditInfo, DomainId, UserId};
use rbac_errors::{AppError, AppResult};
use sqlx::{Postgres, Transaction};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::error_mapper::map_sqlx_error;
use crate::domain::role::{
    NewPermission, NewRole, Permission, PermissionId, PermissionRepository, PermissionType, Role,
    RoleId, RoleRepository, UserRole, UserRoleRepository,
};
use crate::domain::tenant::{
    Domain, DomainRepository, NewDomain, UserDomain, UserDomainRepository,
};

/// Shared transaction type
pub type SharedTx = Arc<Mutex<Option<Transaction<'static, Postgres>>>>;

/// Macro to define a TxRepository structure
macro_rules! define_tx_repo {
    ($name:ident) => {
        pub struct $name {
            tx: SharedTx,
        }

        impl $name {
            pub fn new(tx: SharedTx) -> Self {
                Self { tx }
            }
        }
    };
}

define_tx_repo!(TxDomainRepository);
define_tx_repo!(TxUserDomainRepository);
define_tx_repo!(TxRoleRepository);
define_tx_repo!(TxPermissionRepository);
define_tx_repo!(TxUserRoleRepository);

const ROLE_COLUMNS: &str = "id, domain_id, name, description, is_active, \
                            created_at, created_by, updated_at, updated_by";

const PERMISSION_COLUMNS: &str = "id, name, object, action, type AS permission_type, domain_id";

// ============ 租户 ============

#[async_trait]
impl DomainRepository for TxDomainRepository {
    async fn create(&self, domain: &NewDomain) -> AppResult<Domain> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let row = sqlx::query_as::<_, DomainRow>(
            r#"
            INSERT INTO domains (code, name)
            VALUES ($1, $2)
            RETURNING id, code, name, created_at
            "#,
        )
        .bind(&domain.code)
        .bind(&domain.name)
        .fetch_one(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn find_by_id(&self, id: DomainId) -> AppResult<Option<Domain>> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let row = sqlx::query_as::<_, DomainRow>(
            "SELECT id, code, name, created_at FROM domains WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(Into::into))
    }

    async fn find_by_code(&self, code: &str) -> AppResult<Option<Domain>> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let row = sqlx::query_as::<_, DomainRow>(
            "SELECT id, code, name, created_at FROM domains WHERE code = $1",
        )
        .bind(code)
        .fetch_optional(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(Into::into))
    }

    async fn list_all(&self) -> AppResult<Vec<Domain>> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let rows = sqlx::query_as::<_, DomainRow>(
            "SELECT id, code, name, created_at FROM domains ORDER BY id",
        )
        .fetch_all(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl UserDomainRepository for TxUserDomainRepository {
    async fn insert(&self, user_domain: &UserDomain) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        sqlx::query(
            "INSERT INTO user_domains (user_id, domain_id, created_at) VALUES ($1, $2, $3)",
        )
        .bind(user_domain.user_id.0)
        .bind(user_domain.domain_id.0)
        .bind(user_domain.created_at)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn delete(&self, user_id: UserId, domain_id: DomainId) -> AppResult<bool> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let result = sqlx::query("DELETE FROM user_domains WHERE user_id = $1 AND domain_id = $2")
            .bind(user_id.0)
            .bind(domain_id.0)
            .execute(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn exists(&self, user_id: UserId, domain_id: DomainId) -> AppResult<bool> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM user_domains WHERE user_id = $1 AND domain_id = $2)",
        )
        .bind(user_id.0)
        .bind(domain_id.0)
        .fetch_one(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(exists)
    }

    async fn list_by_user(&self, user_id: UserId) -> AppResult<Vec<UserDomain>> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let rows = sqlx::query_as::<_, UserDomainRow>(
            "SELECT user_id, domain_id, created_at FROM user_domains WHERE user_id = $1 ORDER BY domain_id",
        )
        .bind(user_id.0)
        .fetch_all(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

// ============ 角色 ============

#[async_trait]
impl RoleRepository for TxRoleRepository {
    async fn create(&self, role: &NewRole) -> AppResult<Role> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let audit = AuditInfo::new(role.created_by);
        let row = sqlx::query_as::<_, RoleRow>(&format!(
            r#"
            INSERT INTO roles (domain_id, name, description, is_active, created_at, created_by, updated_at, updated_by)
            VALUES ($1, $2, $3, TRUE, $4, $5, $6, $7)
            RETURNING {}
            "#,
            ROLE_COLUMNS
        ))
        .bind(role.domain_id.0)
        .bind(&role.name)
        .bind(&role.description)
        .bind(audit.created_at)
        .bind(audit.created_by.map(|u| u.0))
        .bind(audit.updated_at)
        .bind(audit.updated_by.map(|u| u.0))
        .fetch_one(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into_role())
    }

    async fn update(&self, role: &Role) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let result = sqlx::query(
            r#"
            UPDATE roles
            SET name = $2, description = $3, is_active = $4, updated_at = $5, updated_by = $6
            WHERE id = $1
            "#,
        )
        .bind(role.id.0)
        .bind(&role.name)
        .bind(&role.description)
        .bind(role.is_active)
        .bind(role.audit_info.updated_at)
        .bind(role.audit_info.updated_by.map(|u| u.0))
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("Role {} not found", role.id)));
        }
        Ok(())
    }

    async fn find_by_id(&self, id: RoleId) -> AppResult<Option<Role>> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let row = sqlx::query_as::<_, RoleRow>(&format!(
            "SELECT {} FROM roles WHERE id = $1",
            ROLE_COLUMNS
        ))
        .bind(id.0)
        .fetch_optional(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(RoleRow::into_role))
    }

    async fn find_by_id_for_update(&self, id: RoleId) -> AppResult<Option<Role>> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let row = sqlx::query_as::<_, RoleRow>(&format!(
            "SELECT {} FROM roles WHERE id = $1 FOR UPDATE",
            ROLE_COLUMNS
        ))
        .bind(id.0)
        .fetch_optional(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(RoleRow::into_role))
    }

    async fn find_by_name(&self, domain_id: DomainId, name: &str) -> AppResult<Option<Role>> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let row = sqlx::query_as::<_, RoleRow>(&format!(
            "SELECT {} FROM roles WHERE domain_id = $1 AND name = $2",
            ROLE_COLUMNS
        ))
        .bind(domain_id.0)
        .bind(name)
        .fetch_optional(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(RoleRow::into_role))
    }

    async fn list_by_domain(&self, domain_id: DomainId) -> AppResult<Vec<Role>> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let rows = sqlx::query_as::<_, RoleRow>(&format!(
            "SELECT {} FROM roles WHERE domain_id = $1 ORDER BY name",
            ROLE_COLUMNS
        ))
        .bind(domain_id.0)
        .fetch_all(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(RoleRow::into_role).collect())
    }
}

// ============ 权限 ============

#[async_trait]
impl PermissionRepository for TxPermissionRepository {
    async fn create(&self, permission: &NewPermission) -> AppResult<Permission> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let row = sqlx::query_as::<_, PermissionRow>(&format!(
            r#"
            INSERT INTO permissions (name, object, action, type, is_domain_specific, domain_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            PERMISSION_COLUMNS
        ))
        .bind(&permission.name)
        .bind(&permission.object)
        .bind(&permission.action)
        .bind(permission.permission_type.as_str())
        .bind(permission.domain_id.is_some())
        .bind(permission.domain_id.map(|d| d.0))
        .fetch_one(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        row.try_into()
    }

    async fn find_by_id(&self, id: PermissionId) -> AppResult<Option<Permission>> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let row = sqlx::query_as::<_, PermissionRow>(&format!(
            "SELECT {} FROM permissions WHERE id = $1",
            PERMISSION_COLUMNS
        ))
        .bind(id.0)
        .fetch_optional(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        row.map(TryInto::try_into).transpose()
    }

    async fn find_by_ids(&self, ids: &[PermissionId]) -> AppResult<Vec<Permission>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let raw_ids: Vec<i64> = ids.iter().map(|id| id.0).collect();
        let rows = sqlx::query_as::<_, PermissionRow>(&format!(
            "SELECT {} FROM permissions WHERE id = ANY($1) ORDER BY id",
            PERMISSION_COLUMNS
        ))
        .bind(raw_ids)
        .fetch_all(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn find_by_object_action(
        &self,
        object: &str,
        action: &str,
        domain_id: Option<DomainId>,
    ) -> AppResult<Option<Permission>> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let row = sqlx::query_as::<_, PermissionRow>(&format!(
            r#"
            SELECT {} FROM permissions
            WHERE object = $1 AND action = $2 AND domain_id IS NOT DISTINCT FROM $3
            "#,
            PERMISSION_COLUMNS
        ))
        .bind(object)
        .bind(action)
        .bind(domain_id.map(|d| d.0))
        .fetch_optional(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list_all(&self) -> AppResult<Vec<Permission>> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let rows = sqlx::query_as::<_, PermissionRow>(&format!(
            "SELECT {} FROM permissions ORDER BY id",
            PERMISSION_COLUMNS
        ))
        .fetch_all(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

// ============ 用户角色 ============

#[async_trait]
impl UserRoleRepository for TxUserRoleRepository {
    async fn insert(&self, user_role: &UserRole) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        sqlx::query(
            r#"
            INSERT INTO user_roles (user_id, domain_id, role_id, assigned_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(user_role.user_id.0)
        .bind(user_role.domain_id.0)
        .bind(user_role.role_id.0)
        .bind(user_role.assigned_at)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn delete(
        &self,
        user_id: UserId,
        domain_id: DomainId,
        role_id: RoleId,
    ) -> AppResult<bool> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let result = sqlx::query(
            "DELETE FROM user_roles WHERE user_id = $1 AND domain_id = $2 AND role_id = $3",
        )
        .bind(user_id.0)
        .bind(domain_id.0)
        .bind(role_id.0)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn exists(
        &self,
        user_id: UserId,
        domain_id: DomainId,
        role_id: RoleId,
    ) -> AppResult<bool> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM user_roles WHERE user_id = $1 AND domain_id = $2 AND role_id = $3
            )
            "#,
        )
        .bind(user_id.0)
        .bind(domain_id.0)
        .bind(role_id.0)
        .fetch_one(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(exists)
    }

    async fn list_by_user_domain(
        &self,
        user_id: UserId,
        domain_id: DomainId,
    ) -> AppResult<Vec<UserRole>> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let rows = sqlx::query_as::<_, UserRoleRow>(
            r#"
            SELECT user_id, domain_id, role_id, assigned_at FROM user_roles
            WHERE user_id = $1 AND domain_id = $2
            ORDER BY role_id
            "#,
        )
        .bind(user_id.0)
        .bind(domain_id.0)
        .fetch_all(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn delete_by_user_domain(
        &self,
        user_id: UserId,
        domain_id: DomainId,
    ) -> AppResult<Vec<RoleId>> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let role_ids: Vec<i64> = sqlx::query_scalar(
            "DELETE FROM user_roles WHERE user_id = $1 AND domain_id = $2 RETURNING role_id",
        )
        .bind(user_id.0)
        .bind(domain_id.0)
        .fetch_all(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(role_ids.into_iter().map(RoleId::new).collect())
    }

    async fn list_by_role(&self, role_id: RoleId) -> AppResult<Vec<UserRole>> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let rows = sqlx::query_as::<_, UserRoleRow>(
            r#"
            SELECT user_id, domain_id, role_id, assigned_at FROM user_roles
            WHERE role_id = $1
            ORDER BY user_id
            "#,
        )
        .bind(role_id.0)
        .fetch_all(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_active(&self) -> AppResult<Vec<UserRole>> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let rows = sqlx::query_as::<_, UserRoleRow>(
            r#"
            SELECT ur.user_id, ur.domain_id, ur.role_id, ur.assigned_at
            FROM user_roles ur
            JOIN roles r ON r.id = ur.role_id
            WHERE r.is_active
            "#,
        )
        .fetch_all(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

// ============ 数据行映射 ============

#[derive(sqlx::FromRow)]
struct DomainRow {
    id: i64,
    code: String,
    name: String,
    created_at: DateTime<Utc>,
}

impl From<DomainRow> for Domain {
    fn from(row: DomainRow) -> Self {
        Domain {
            id: DomainId::new(row.id),
            code: row.code,
            name: row.name,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct UserDomainRow {
    user_id: i64,
    domain_id: i64,
    created_at: DateTime<Utc>,
}

impl From<UserDomainRow> for UserDomain {
    fn from(row: UserDomainRow) -> Self {
        UserDomain {
            user_id: UserId::new(row.user_id),
            domain_id: DomainId::new(row.domain_id),
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct RoleRow {
    id: i64,
    domain_id: i64,
    name: String,
    description: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    created_by: Option<i64>,
    updated_at: DateTime<Utc>,
    updated_by: Option<i64>,
}

impl RoleRow {
    fn into_role(self) -> Role {
        Role {
            id: RoleId::new(self.id),
            domain_id: DomainId::new(self.domain_id),
            name: self.name,
            description: self.description,
            is_active: self.is_active,
            audit_info: AuditInfo {
                created_at: self.created_at,
                created_by: self.created_by.map(UserId::new),
                updated_at: self.updated_at,
                updated_by: self.updated_by.map(UserId::new),
            },
        }
    }
}

#[derive(sqlx::FromRow)]
struct PermissionRow {
    id: i64,
    name: String,
    object: String,
    action: String,
    permission_type: String,
    domain_id: Option<i64>,
}

impl TryFrom<PermissionRow> for Permission {
    type Error = AppError;

    fn try_from(row: PermissionRow) -> Result<Self, Self::Error> {
        let permission_type: PermissionType = row
            .permission_type
            .parse()
            .map_err(|e: String| AppError::internal(format!("Permission {}: {}", row.id, e)))?;

        Ok(Permission {
            id: PermissionId::new(row.id),
            name: row.name,
            object: row.object,
            action: row.action,
            permission_type,
            domain_id: row.domain_id.map(DomainId::new),
        })
    }
}

#[derive(sqlx::FromRow)]
struct UserRoleRow {
    user_id: i64,
    domain_id: i64,
    role_id: i64,
    assigned_at: DateTime<Utc>,
}

impl From<UserRoleRow> for UserRole {
    fn from(row: UserRoleRow) -> Self {
        UserRole {
            user_id: UserId::new(row.user_id),
            domain_id: DomainId::new(row.domain_id),
            role_id: RoleId::new(row.role_id),
            assigned_at: row.assigned_at,
        }
    }
}
