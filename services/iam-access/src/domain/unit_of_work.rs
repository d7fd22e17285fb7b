//! Unit of Work 模式
//!
//! 提供跨多个 Repository 的事务协调能力，确保操作的原子性。

use async_trait::async_trait;
use futures::future::BoxFuture;
use rbac_errors::{AppError, AppResult};
use tracing::warn;

use crate::domain::role::{PermissionRepository, RoleRepository, UserRoleRepository};
use crate::domain::tenant::{DomainRepository, UserDomainRepository};

/// Unit of Work trait
///
/// 协调多个 Repository 在同一事务中的操作。
/// 未提交即被丢弃的 Unit of Work 等同于回滚。
///
/// # 使用示例
///
/// ```ignore
/// let uow = uow_factory.begin().await?;
///
/// uow.user_domains().insert(&membership).await?;
/// uow.user_roles().insert(&user_role).await?;
///
/// uow.commit().await?;
/// ```
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    /// 获取租户 Repository
    fn domains(&self) -> &dyn DomainRepository;

    /// 获取租户成员 Repository
    fn user_domains(&self) -> &dyn UserDomainRepository;

    /// 获取角色 Repository
    fn roles(&self) -> &dyn RoleRepository;

    /// 获取权限 Repository
    fn permissions(&self) -> &dyn PermissionRepository;

    /// 获取用户角色 Repository
    fn user_roles(&self) -> &dyn UserRoleRepository;

    /// 提交事务
    async fn commit(self: Box<Self>) -> AppResult<()>;

    /// 回滚事务
    async fn rollback(self: Box<Self>) -> AppResult<()>;
}

/// Unit of Work 工厂 trait
#[async_trait]
pub trait UnitOfWorkFactory: Send + Sync {
    /// 开始新的事务
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>>;
}

/// 在单个事务中执行 `work`
///
/// 成功则提交，任一步骤失败则回滚并返回原错误。
/// `work` 只能捕获拥有所有权的数据。
pub async fn execute_in_transaction<T, E, F>(
    factory: &dyn UnitOfWorkFactory,
    work: F,
) -> Result<T, E>
where
    T: Send,
    E: From<AppError> + Send,
    F: for<'a> FnOnce(&'a dyn UnitOfWork) -> BoxFuture<'a, Result<T, E>> + Send,
{
    let uow = factory.begin().await?;

    let result = work(uow.as_ref()).await;

    match result {
        Ok(value) => {
            uow.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = uow.rollback().await {
                warn!(error = %rollback_err, "Failed to rollback transaction");
            }
            Err(err)
        }
    }
}
