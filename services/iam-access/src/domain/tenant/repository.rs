//! 租户仓储接口

use async_trait::async_trait;
use rbac_common::{DomainId, UserId};
use rbac_errors::AppResult;

use super::domain::{Domain, NewDomain, UserDomain};

/// 租户仓储接口
#[async_trait]
pub trait DomainRepository: Send + Sync {
    /// 创建租户
    async fn create(&self, domain: &NewDomain) -> AppResult<Domain>;

    /// 根据 ID 查找租户
    async fn find_by_id(&self, id: DomainId) -> AppResult<Option<Domain>>;

    /// 根据代码查找租户
    async fn find_by_code(&self, code: &str) -> AppResult<Option<Domain>>;

    /// 列出所有租户
    async fn list_all(&self) -> AppResult<Vec<Domain>>;
}

/// 租户成员关系仓储接口
#[async_trait]
pub trait UserDomainRepository: Send + Sync {
    /// 写入成员关系
    async fn insert(&self, user_domain: &UserDomain) -> AppResult<()>;

    /// 删除成员关系，返回是否存在
    async fn delete(&self, user_id: UserId, domain_id: DomainId) -> AppResult<bool>;

    /// 成员关系是否存在
    async fn exists(&self, user_id: UserId, domain_id: DomainId) -> AppResult<bool>;

    /// 列出用户所属的租户
    async fn list_by_user(&self, user_id: UserId) -> AppResult<Vec<UserDomain>>;
}
