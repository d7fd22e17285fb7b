//! 角色与权限领域模型

mod assignment;
mod permission;
pub mod registry;
mod repository;
mod role;

pub use assignment::UserRole;
pub use permission::{NewPermission, Permission, PermissionId, PermissionType};
pub use registry::{ModuleDefinition, PermissionAction, PermissionObject};
pub use repository::{PermissionRepository, RoleRepository, UserRoleRepository};
pub use role::{NewRole, Role, RoleId, validate_role_fields};
