//! 租户与成员关系

use chrono::{DateTime, Utc};
use rbac_common::{DomainId, UserId};
use rbac_domain_core::{DomainScoped, Entity};
use serde::{Deserialize, Serialize};

/// 租户
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    pub id: DomainId,
    /// 唯一代码
    pub code: String,
    /// 显示名称
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Entity for Domain {
    type Id = DomainId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// 创建租户参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDomain {
    pub code: String,
    pub name: String,
}

/// 用户的租户成员关系，持有该租户任何角色的前提
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDomain {
    pub user_id: UserId,
    pub domain_id: DomainId,
    pub created_at: DateTime<Utc>,
}

impl UserDomain {
    pub fn new(user_id: UserId, domain_id: DomainId) -> Self {
        Self {
            user_id,
            domain_id,
            created_at: Utc::now(),
        }
    }
}

impl DomainScoped for UserDomain {
    fn domain_id(&self) -> DomainId {
        self.domain_id
    }
}
