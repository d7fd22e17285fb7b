//! 基础设施层

pub mod memory;
pub mod persistence;
pub mod policy;

pub use memory::MemoryUnitOfWorkFactory;
pub use persistence::PostgresUnitOfWorkFactory;
pub use policy::{CasbinPolicyStore, PostgresPolicyAdapter};
