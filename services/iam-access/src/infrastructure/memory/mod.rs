//! 内存存储
//!
//! 与 PostgreSQL 实现语义一致的 Unit of Work，用于测试与本地运行。

mod memory_unit_of_work;

pub use memory_unit_of_work::{MemoryUnitOfWork, MemoryUnitOfWorkFactory};
