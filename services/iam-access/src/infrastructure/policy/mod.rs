//! 策略存储实现

mod casbin_policy_store;
mod model;
mod postgres_adapter;

pub use casbin_policy_store::CasbinPolicyStore;
pub use model::{RBAC_MODEL, rbac_model};
pub use postgres_adapter::PostgresPolicyAdapter;
