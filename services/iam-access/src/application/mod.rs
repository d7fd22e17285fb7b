//! 应用层模块

pub mod authorization;
pub mod context;
pub mod provisioning;
pub mod role;

pub use authorization::{AuthorizationService, ReconcileTask};
pub use context::{Actor, ActorDomainResolver, DomainContextResolver, RequestContext};
pub use provisioning::Provisioner;
pub use role::RoleCommandHandler;
