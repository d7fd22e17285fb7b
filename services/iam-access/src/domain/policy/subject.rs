//! 策略主体与键

use rbac_common::{DomainId, UserId};

use crate::domain::role::RoleId;

/// 超级管理员主体的固定键
pub const ROOT_SUBJECT: &str = "root";

const USER_PREFIX: &str = "user:";
const ROLE_PREFIX: &str = "role:";
const DOMAIN_PREFIX: &str = "domain:";

/// 鉴权主体
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subject {
    /// 超级管理员，无需任何规则即放行
    Root,
    User(UserId),
    Role(RoleId),
}

impl Subject {
    /// 渲染为策略存储中的键
    pub fn key(&self) -> String {
        match self {
            Self::Root => ROOT_SUBJECT.to_string(),
            Self::User(id) => user_key(*id),
            Self::Role(id) => role_key(*id),
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(self, Self::Root)
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key())
    }
}

impl std::str::FromStr for Subject {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == ROOT_SUBJECT {
            return Ok(Self::Root);
        }
        if let Some(id) = parse_user_key(s) {
            return Ok(Self::User(id));
        }
        if let Some(id) = parse_role_key(s) {
            return Ok(Self::Role(id));
        }
        Err(format!("Invalid subject key: {}", s))
    }
}

pub fn user_key(id: UserId) -> String {
    format!("{}{}", USER_PREFIX, id)
}

pub fn role_key(id: RoleId) -> String {
    format!("{}{}", ROLE_PREFIX, id)
}

pub fn domain_key(id: DomainId) -> String {
    format!("{}{}", DOMAIN_PREFIX, id)
}

pub fn parse_user_key(key: &str) -> Option<UserId> {
    key.strip_prefix(USER_PREFIX)?.parse().ok()
}

pub fn parse_role_key(key: &str) -> Option<RoleId> {
    key.strip_prefix(ROLE_PREFIX)?.parse().ok()
}

pub fn parse_domain_key(key: &str) -> Option<DomainId> {
    key.strip_prefix(DOMAIN_PREFIX)?.parse().ok()
}
