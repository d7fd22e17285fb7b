//! 角色实体

use rbac_common::{AuditInfo, DomainId, UserId};
use rbac_domain_core::{AggregateRoot, DomainScoped, Entity};
use serde::{Deserialize, Serialize};

/// 角色 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoleId(pub i64);

impl RoleId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }
}

impl From<i64> for RoleId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for RoleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RoleId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// 角色实体
///
/// 每个角色只属于一个租户，`(domain_id, name)` 唯一
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub domain_id: DomainId,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub audit_info: AuditInfo,
}

impl Role {
    /// 由持久化生成的 ID 和创建参数构造角色
    pub fn from_new(id: RoleId, new: NewRole) -> Self {
        Self {
            id,
            domain_id: new.domain_id,
            name: new.name,
            description: new.description,
            is_active: true,
            audit_info: AuditInfo::new(new.created_by),
        }
    }

    /// 激活角色
    pub fn activate(&mut self, by: Option<UserId>) {
        self.is_active = true;
        self.audit_info.update(by);
    }

    /// 停用角色
    pub fn deactivate(&mut self, by: Option<UserId>) {
        self.is_active = false;
        self.audit_info.update(by);
    }

    /// 更新角色信息
    pub fn update(&mut self, name: String, description: Option<String>, by: Option<UserId>) {
        self.name = name;
        self.description = description;
        self.audit_info.update(by);
    }
}

impl Entity for Role {
    type Id = RoleId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl AggregateRoot for Role {
    fn audit_info(&self) -> &AuditInfo {
        &self.audit_info
    }

    fn audit_info_mut(&mut self) -> &mut AuditInfo {
        &mut self.audit_info
    }
}

impl DomainScoped for Role {
    fn domain_id(&self) -> DomainId {
        self.domain_id
    }
}

/// 创建角色参数
#[derive(Debug, Clone)]
pub struct NewRole {
    pub domain_id: DomainId,
    pub name: String,
    pub description: Option<String>,
    pub created_by: Option<UserId>,
}

/// 校验角色名称与描述
pub fn validate_role_fields(name: &str, description: Option<&str>) -> Result<(), String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("Role name cannot be empty".to_string());
    }
    if name.len() > 200 {
        return Err("Role name cannot exceed 200 characters".to_string());
    }
    if let Some(desc) = description
        && desc.len() > 1000
    {
        return Err("Role description cannot exceed 1000 characters".to_string());
    }
    Ok(())
}
