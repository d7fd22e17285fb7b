//! 租户 (Domain) 领域模型

mod domain;
mod repository;

pub use domain::{Domain, NewDomain, UserDomain};
pub use repository::{DomainRepository, UserDomainRepository};
