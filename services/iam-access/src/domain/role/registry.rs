//! 权限注册表
//!
//! 所有可授权的 (object, action) 组合在编译期声明。
//! 启动时与 permissions 表对账，鉴权时拒绝未声明的字符串。

use super::permission::{NewPermission, Permission, PermissionType};

/// 可授权对象
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionObject {
    Domain,
    Role,
    Permission,
    User,
    Event,
    Post,
}

impl PermissionObject {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Domain => "domain",
            Self::Role => "role",
            Self::Permission => "permission",
            Self::User => "user",
            Self::Event => "event",
            Self::Post => "post",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "domain" => Some(Self::Domain),
            "role" => Some(Self::Role),
            "permission" => Some(Self::Permission),
            "user" => Some(Self::User),
            "event" => Some(Self::Event),
            "post" => Some(Self::Post),
            _ => None,
        }
    }
}

impl std::fmt::Display for PermissionObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 可授权操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionAction {
    Index,
    Show,
    Create,
    Update,
    Delete,
}

impl PermissionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::Show => "show",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "index" => Some(Self::Index),
            "show" => Some(Self::Show),
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

impl std::fmt::Display for PermissionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const CRUD: &[PermissionAction] = &[
    PermissionAction::Index,
    PermissionAction::Show,
    PermissionAction::Create,
    PermissionAction::Update,
    PermissionAction::Delete,
];

const READ_ONLY: &[PermissionAction] = &[PermissionAction::Index, PermissionAction::Show];

/// 模块定义: 一个对象及其开放的操作
#[derive(Debug)]
pub struct ModuleDefinition {
    pub name: &'static str,
    pub object: PermissionObject,
    pub actions: &'static [PermissionAction],
}

/// 已声明的全部模块
pub static MODULES: &[ModuleDefinition] = &[
    ModuleDefinition {
        name: "Domains",
        object: PermissionObject::Domain,
        actions: CRUD,
    },
    ModuleDefinition {
        name: "Roles",
        object: PermissionObject::Role,
        actions: CRUD,
    },
    ModuleDefinition {
        name: "Permissions",
        object: PermissionObject::Permission,
        actions: READ_ONLY,
    },
    ModuleDefinition {
        name: "Users",
        object: PermissionObject::User,
        actions: CRUD,
    },
    ModuleDefinition {
        name: "Events",
        object: PermissionObject::Event,
        actions: CRUD,
    },
    ModuleDefinition {
        name: "Posts",
        object: PermissionObject::Post,
        actions: CRUD,
    },
];

/// (object, action) 是否已声明
pub fn is_declared(object: PermissionObject, action: PermissionAction) -> bool {
    MODULES
        .iter()
        .any(|m| m.object == object && m.actions.contains(&action))
}

/// 按字符串解析并校验；未声明时返回 None
pub fn lookup(object: &str, action: &str) -> Option<(PermissionObject, PermissionAction)> {
    let object = PermissionObject::parse(object)?;
    let action = PermissionAction::parse(action)?;
    is_declared(object, action).then_some((object, action))
}

/// 注册表声明的全局权限，用于初始化 permissions 表
pub fn declared_permissions() -> Vec<NewPermission> {
    MODULES
        .iter()
        .flat_map(|m| {
            m.actions.iter().map(move |action| NewPermission {
                name: format!("{} {}", m.name, action.as_str()),
                object: m.object.as_str().to_string(),
                action: action.as_str().to_string(),
                permission_type: PermissionType::Api,
                domain_id: None,
            })
        })
        .collect()
}

/// 找出未在注册表中声明的权限行
pub fn undeclared<'a>(permissions: &'a [Permission]) -> Vec<&'a Permission> {
    permissions
        .iter()
        .filter(|p| lookup(&p.object, &p.action).is_none())
        .collect()
}
