//! 持久化层模块

pub mod error_mapper;
pub mod iam_access_unit_of_work;
pub mod tx_repositories;

pub use iam_access_unit_of_work::{PostgresUnitOfWork, PostgresUnitOfWorkFactory};
