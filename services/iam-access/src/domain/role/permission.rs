//! 权限实体

use rbac_common::DomainId;
use serde::{Deserialize, Serialize};

/// 权限 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PermissionId(pub i64);

impl PermissionId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }
}

impl From<i64> for PermissionId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for PermissionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 权限类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionType {
    Api,
    Menu,
    Button,
}

impl PermissionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Menu => "menu",
            Self::Button => "button",
        }
    }
}

impl std::str::FromStr for PermissionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "api" => Ok(Self::Api),
            "menu" => Ok(Self::Menu),
            "button" => Ok(Self::Button),
            other => Err(format!("Unknown permission type: {}", other)),
        }
    }
}

/// 权限实体
///
/// 权限代表对某个对象执行某个操作的许可，例如 `post:update`。
/// `domain_id` 为 `Some` 时为租户专属权限，只能授予该租户的角色。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    pub name: String,
    pub object: String,
    pub action: String,
    pub permission_type: PermissionType,
    pub domain_id: Option<DomainId>,
}

impl Permission {
    /// 是否为租户专属权限
    pub fn is_domain_specific(&self) -> bool {
        self.domain_id.is_some()
    }

    /// 权限代码
    pub fn code(&self) -> String {
        format!("{}:{}", self.object, self.action)
    }

    /// 能否授予给指定租户的角色
    pub fn grantable_in(&self, domain_id: DomainId) -> bool {
        self.domain_id.is_none_or(|owner| owner == domain_id)
    }
}

impl PartialEq for Permission {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Permission {}

/// 创建权限参数
#[derive(Debug, Clone)]
pub struct NewPermission {
    pub name: String,
    pub object: String,
    pub action: String,
    pub permission_type: PermissionType,
    pub domain_id: Option<DomainId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post_update(domain_id: Option<DomainId>) -> Permission {
        Permission {
            id: PermissionId::new(1),
            name: "Update post".to_string(),
            object: "post".to_string(),
            action: "update".to_string(),
            permission_type: PermissionType::Api,
            domain_id,
        }
    }

    #[test]
    fn test_code() {
        assert_eq!(post_update(None).code(), "post:update");
    }

    #[test]
    fn test_global_permission_grantable_everywhere() {
        let perm = post_update(None);
        assert!(!perm.is_domain_specific());
        assert!(perm.grantable_in(DomainId::new(5)));
        assert!(perm.grantable_in(DomainId::new(6)));
    }

    #[test]
    fn test_domain_specific_permission() {
        let perm = post_update(Some(DomainId::new(5)));
        assert!(perm.is_domain_specific());
        assert!(perm.grantable_in(DomainId::new(5)));
        assert!(!perm.grantable_in(DomainId::new(6)));
    }

    #[test]
    fn test_permission_type_parse() {
        assert_eq!("menu".parse::<PermissionType>(), Ok(PermissionType::Menu));
        assert!("widget".parse::<PermissionType>().is_err());
        assert_eq!(PermissionType::Button.as_str(), "button");
    }
}
