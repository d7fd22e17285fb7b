//! 角色相关仓储接口

use async_trait::async_trait;
use rbac_common::{DomainId, UserId};
use rbac_errors::AppResult;

use super::assignment::UserRole;
use super::permission::{NewPermission, Permission, PermissionId};
use super::role::{NewRole, Role, RoleId};

/// 角色仓储接口
#[async_trait]
pub trait RoleRepository: Send + Sync {
    /// 创建角色，返回带持久化 ID 的实体
    async fn create(&self, role: &NewRole) -> AppResult<Role>;

    /// 更新角色
    async fn update(&self, role: &Role) -> AppResult<()>;

    /// 根据 ID 查找角色
    async fn find_by_id(&self, id: RoleId) -> AppResult<Option<Role>>;

    /// 根据 ID 查找角色并锁定该行直至事务结束
    async fn find_by_id_for_update(&self, id: RoleId) -> AppResult<Option<Role>>;

    /// 根据租户和名称查找角色
    async fn find_by_name(&self, domain_id: DomainId, name: &str) -> AppResult<Option<Role>>;

    /// 列出租户下的所有角色
    async fn list_by_domain(&self, domain_id: DomainId) -> AppResult<Vec<Role>>;
}

/// 权限仓储接口
#[async_trait]
pub trait PermissionRepository: Send + Sync {
    /// 创建权限
    async fn create(&self, permission: &NewPermission) -> AppResult<Permission>;

    /// 根据 ID 查找权限
    async fn find_by_id(&self, id: PermissionId) -> AppResult<Option<Permission>>;

    /// 根据多个 ID 批量查找权限，缺失的 ID 不出现在结果中
    async fn find_by_ids(&self, ids: &[PermissionId]) -> AppResult<Vec<Permission>>;

    /// 根据 (object, action, 所属租户) 查找权限
    async fn find_by_object_action(
        &self,
        object: &str,
        action: &str,
        domain_id: Option<DomainId>,
    ) -> AppResult<Option<Permission>>;

    /// 列出所有权限
    async fn list_all(&self) -> AppResult<Vec<Permission>>;
}

/// 用户角色仓储接口
#[async_trait]
pub trait UserRoleRepository: Send + Sync {
    /// 写入用户角色
    async fn insert(&self, user_role: &UserRole) -> AppResult<()>;

    /// 删除用户角色，返回是否存在
    async fn delete(&self, user_id: UserId, domain_id: DomainId, role_id: RoleId)
    -> AppResult<bool>;

    /// 用户是否在租户下持有角色
    async fn exists(&self, user_id: UserId, domain_id: DomainId, role_id: RoleId)
    -> AppResult<bool>;

    /// 列出用户在租户下的角色
    async fn list_by_user_domain(
        &self,
        user_id: UserId,
        domain_id: DomainId,
    ) -> AppResult<Vec<UserRole>>;

    /// 删除用户在租户下的全部角色，返回被删除的角色 ID
    async fn delete_by_user_domain(
        &self,
        user_id: UserId,
        domain_id: DomainId,
    ) -> AppResult<Vec<RoleId>>;

    /// 列出持有某角色的全部用户角色
    async fn list_by_role(&self, role_id: RoleId) -> AppResult<Vec<UserRole>>;

    /// 列出所属角色处于启用状态的用户角色 (用于重建分组元组)
    async fn list_active(&self) -> AppResult<Vec<UserRole>>;
}
