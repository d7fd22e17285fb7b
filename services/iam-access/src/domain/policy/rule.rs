//! 策略元组
//!
//! p 元组: `[role-key, domain-key, object, action]`
//! g 元组: `[user-key, role-key, domain-key]`

use rbac_common::{DomainId, UserId};

use super::subject::{domain_key, parse_domain_key, parse_role_key, parse_user_key, role_key, user_key};
use crate::domain::role::RoleId;

/// 授权规则，对应一条授予角色的权限
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PolicyRule {
    pub role_id: RoleId,
    pub domain_id: DomainId,
    pub object: String,
    pub action: String,
}

impl PolicyRule {
    pub fn new(
        role_id: RoleId,
        domain_id: DomainId,
        object: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            role_id,
            domain_id,
            object: object.into(),
            action: action.into(),
        }
    }

    pub fn to_tuple(&self) -> Vec<String> {
        vec![
            role_key(self.role_id),
            domain_key(self.domain_id),
            self.object.clone(),
            self.action.clone(),
        ]
    }
}

/// 角色分组，对应一行 user_roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoleAssignment {
    pub user_id: UserId,
    pub role_id: RoleId,
    pub domain_id: DomainId,
}

impl RoleAssignment {
    pub fn new(user_id: UserId, role_id: RoleId, domain_id: DomainId) -> Self {
        Self {
            user_id,
            role_id,
            domain_id,
        }
    }

    pub fn to_tuple(&self) -> Vec<String> {
        vec![
            user_key(self.user_id),
            role_key(self.role_id),
            domain_key(self.domain_id),
        ]
    }

    /// 从存储元组解析；无法解析的元组返回 None
    pub fn from_tuple(tuple: &[String]) -> Option<Self> {
        match tuple {
            [user, role, domain, ..] => Some(Self {
                user_id: parse_user_key(user)?,
                role_id: parse_role_key(role)?,
                domain_id: parse_domain_key(domain)?,
            }),
            _ => None,
        }
    }
}
