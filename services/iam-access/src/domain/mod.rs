//! 领域层

pub mod policy;
pub mod role;
pub mod tenant;
pub mod unit_of_work;
