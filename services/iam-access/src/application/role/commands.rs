//! 角色相关命令定义

use rbac_common::DomainId;

use crate::domain::role::{RoleId, validate_role_fields};

/// 创建角色命令
#[derive(Debug, Clone)]
pub struct CreateRoleCommand {
    pub domain_id: DomainId,
    pub name: String,
    pub description: Option<String>,
}

impl CreateRoleCommand {
    /// 验证命令参数
    pub fn validate(&self) -> Result<(), String> {
        validate_role_fields(&self.name, self.description.as_deref())
    }
}

/// 更新角色命令
#[derive(Debug, Clone)]
pub struct UpdateRoleCommand {
    pub role_id: RoleId,
    pub name: String,
    pub description: Option<String>,
}

impl UpdateRoleCommand {
    pub fn validate(&self) -> Result<(), String> {
        validate_role_fields(&self.name, self.description.as_deref())
    }
}

/// 激活/停用角色命令
#[derive(Debug, Clone)]
pub struct SetRoleActiveCommand {
    pub role_id: RoleId,
    pub is_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_create() {
        let cmd = CreateRoleCommand {
            domain_id: DomainId::new(5),
            name: "editor".to_string(),
            description: None,
        };
        assert!(cmd.validate().is_ok());

        let blank = CreateRoleCommand {
            name: " ".to_string(),
            ..cmd
        };
        assert!(blank.validate().is_err());
    }
}
