//! 访问控制错误

use rbac_common::{DomainId, UserId};
use rbac_errors::AppError;
use thiserror::Error;
use tracing::error;

use crate::domain::role::RoleId;

/// 访问控制服务错误
#[derive(Debug, Error)]
pub enum AccessError {
    #[error(
        "Domain mismatch: acting domain {acting} cannot {action} {resource} in domain {target}"
    )]
    DomainMismatch {
        acting: DomainId,
        target: DomainId,
        resource: String,
        action: String,
    },

    #[error("User {user_id} is not assigned to domain {domain_id}")]
    DomainNotAssigned { user_id: UserId, domain_id: DomainId },

    #[error("Already assigned: {0}")]
    AlreadyAssigned(String),

    #[error("Not assigned: {0}")]
    NotAssigned(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Policy store diverged from relational state: {0}")]
    Consistency(String),

    #[error("Role {0} is inactive")]
    RoleInactive(RoleId),

    #[error("Role '{name}' already exists in domain {domain_id}")]
    RoleAlreadyExists { domain_id: DomainId, name: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Request has no authenticated actor")]
    Unauthenticated,

    #[error("Request cancelled")]
    Cancelled,

    #[error("Request deadline exceeded")]
    DeadlineExceeded,

    #[error(transparent)]
    Storage(#[from] AppError),
}

impl AccessError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// 关系库已提交而策略存储写入失败
    pub fn consistency(operation: &str, source: AppError) -> Self {
        error!(
            operation,
            error = %source,
            "Policy store write failed after relational commit"
        );
        Self::Consistency(format!("{}: {}", operation, source))
    }

    /// 逐条写策略存储后汇总失败项，无失败时返回 Ok
    pub fn check_policy_writes(operation: &str, failures: Vec<String>) -> AccessResult<()> {
        if failures.is_empty() {
            return Ok(());
        }
        Err(Self::consistency(
            operation,
            AppError::internal(failures.join("; ")),
        ))
    }
}

impl From<AccessError> for AppError {
    fn from(error: AccessError) -> Self {
        match error {
            AccessError::DomainMismatch { .. } => AppError::forbidden(error.to_string()),
            AccessError::AlreadyAssigned(_) | AccessError::RoleAlreadyExists { .. } => {
                AppError::conflict(error.to_string())
            }
            AccessError::NotAssigned(_)
            | AccessError::DomainNotAssigned { .. }
            | AccessError::RoleInactive(_) => {
                AppError::failed_precondition(error.to_string())
            }
            AccessError::NotFound { .. } => AppError::not_found(error.to_string()),
            AccessError::Consistency(_) => AppError::internal(error.to_string()),
            AccessError::Validation(msg) => AppError::Validation(msg),
            AccessError::Unauthenticated => AppError::unauthenticated(error.to_string()),
            AccessError::Cancelled => AppError::cancelled(error.to_string()),
            AccessError::DeadlineExceeded => AppError::timeout(error.to_string()),
            AccessError::Storage(e) => e,
        }
    }
}

/// 访问控制 Result 类型别名
pub type AccessResult<T> = Result<T, AccessError>;
