//! IAM Access - 租户隔离的 RBAC 鉴权核心
//!
//! - 策略存储：基于 Casbin 的 (角色, 租户, 资源, 操作) 规则与用户角色分组
//! - 授权服务：角色分配、权限授予、租户成员管理与鉴权判定
//! - 租户上下文：从请求上下文解析调用者所在租户并拦截跨租户操作
//! - 关系库：租户、角色、权限、成员关系的事务化存储

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;

pub use application::{
    Actor, ActorDomainResolver, AuthorizationService, DomainContextResolver, Provisioner,
    ReconcileTask, RequestContext, RoleCommandHandler,
};
pub use config::AccessServiceConfig;
pub use error::{AccessError, AccessResult};
