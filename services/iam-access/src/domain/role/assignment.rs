//! 用户角色分配

use chrono::{DateTime, Utc};
use rbac_common::{DomainId, UserId};
use rbac_domain_core::DomainScoped;
use serde::{Deserialize, Serialize};

use super::role::RoleId;

/// 用户在某租户下持有的角色
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRole {
    pub user_id: UserId,
    pub domain_id: DomainId,
    pub role_id: RoleId,
    pub assigned_at: DateTime<Utc>,
}

impl UserRole {
    pub fn new(user_id: UserId, domain_id: DomainId, role_id: RoleId) -> Self {
        Self {
            user_id,
            domain_id,
            role_id,
            assigned_at: Utc::now(),
        }
    }
}

impl DomainScoped for UserRole {
    fn domain_id(&self) -> DomainId {
        self.domain_id
    }
}
