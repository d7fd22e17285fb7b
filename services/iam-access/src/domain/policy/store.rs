//! 策略存储接口

use async_trait::async_trait;
use rbac_common::{DomainId, UserId};
use rbac_errors::AppResult;

use super::rule::RoleAssignment;
use super::subject::Subject;
use crate::domain::role::{Permission, RoleId};

/// 分组元组对账结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// 补齐的缺失元组
    pub added: usize,
    /// 清除的陈旧元组
    pub removed: usize,
}

impl ReconcileReport {
    /// 是否无漂移
    pub fn is_clean(&self) -> bool {
        self.added == 0 && self.removed == 0
    }
}

/// 策略存储
///
/// 保存授权规则 (p) 与角色分组 (g)，并执行鉴权判定。
/// 写操作失败时返回错误，调用方不得假设部分成功。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// 为角色添加权限规则，已存在的规则跳过
    async fn add_role_permissions(
        &self,
        role_id: RoleId,
        domain_id: DomainId,
        permissions: &[Permission],
    ) -> AppResult<()>;

    /// 删除角色的权限规则，不存在的规则跳过
    async fn delete_role_permissions(
        &self,
        role_id: RoleId,
        domain_id: DomainId,
        permissions: &[Permission],
    ) -> AppResult<()>;

    /// 添加分组元组
    async fn add_user_role(
        &self,
        user_id: UserId,
        role_id: RoleId,
        domain_id: DomainId,
    ) -> AppResult<()>;

    /// 删除分组元组
    async fn remove_user_role(
        &self,
        user_id: UserId,
        role_id: RoleId,
        domain_id: DomainId,
    ) -> AppResult<()>;

    /// 鉴权判定；root 直接放行，引擎错误按拒绝处理
    async fn enforce(&self, subject: &Subject, object: &str, action: &str) -> bool;

    /// 用户在租户下的角色
    async fn roles_for_user(&self, user_id: UserId, domain_id: DomainId) -> Vec<RoleId>;

    /// 当前全部分组元组快照
    async fn role_assignments(&self) -> Vec<RoleAssignment>;

    /// 将分组元组收敛为 `desired`
    async fn replace_role_assignments(
        &self,
        desired: Vec<RoleAssignment>,
    ) -> AppResult<ReconcileReport>;
}
