//! 策略领域模型

mod rule;
mod store;
mod subject;

pub use rule::{PolicyRule, RoleAssignment};
pub use store::{PolicyStore, ReconcileReport};
pub use subject::{
    ROOT_SUBJECT, Subject, domain_key, parse_domain_key, parse_role_key, parse_user_key, role_key,
    user_key,
};

#[cfg(test)]
pub use store::MockPolicyStore;
