//! 授权应用层模块

mod locks;
mod reconciler;
mod service;

pub use locks::{LockKey, MutationGuard, MutationLocks};
pub use reconciler::ReconcileTask;
pub use service::AuthorizationService;
