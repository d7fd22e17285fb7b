//! PostgreSQL Unit of Work 实现

use async_trait::async_trait;
use rbac_errors::{AppError, AppResult};
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::tx_repositories::{
    SharedTx, TxDomainRepository, TxPermissionRepository, TxRoleRepository,
    TxUserDomainRepository, TxUserRoleRepository,
};
use crate::domain::role::{PermissionRepository, RoleRepository, UserRoleRepository};
use crate::domain::tenant::{DomainRepository, UserDomainRepository};
use crate::domain::unit_of_work::{UnitOfWork, UnitOfWorkFactory};

/// Postgres Unit of Work 工厂
pub struct PostgresUnitOfWorkFactory {
    pool: PgPool,
}

impl PostgresUnitOfWorkFactory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UnitOfWorkFactory for PostgresUnitOfWorkFactory {
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::database(format!("Failed to begin transaction: {}", e)))?;

        Ok(Box::new(PostgresUnitOfWork::new(tx)))
    }
}

/// Postgres Unit of Work 实现
///
/// 所有 Repository 共享同一个事务；丢弃时 sqlx 自动回滚未提交的事务。
pub struct PostgresUnitOfWork {
    tx: SharedTx,
    domain_repo: TxDomainRepository,
    user_domain_repo: TxUserDomainRepository,
    role_repo: TxRoleRepository,
    permission_repo: TxPermissionRepository,
    user_role_repo: TxUserRoleRepository,
}

impl PostgresUnitOfWork {
    pub fn new(tx: Transaction<'static, Postgres>) -> Self {
        let tx = Arc::new(Mutex::new(Some(tx)));

        Self {
            tx: tx.clone(),
            domain_repo: TxDomainRepository::new(tx.clone()),
            user_domain_repo: TxUserDomainRepository::new(tx.clone()),
            role_repo: TxRoleRepository::new(tx.clone()),
            permission_repo: TxPermissionRepository::new(tx.clone()),
            user_role_repo: TxUserRoleRepository::new(tx),
        }
    }
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    fn domains(&self) -> &dyn DomainRepository {
        &self.domain_repo
    }

    fn user_domains(&self) -> &dyn UserDomainRepository {
        &self.user_domain_repo
    }

    fn roles(&self) -> &dyn RoleRepository {
        &self.role_repo
    }

    fn permissions(&self) -> &dyn PermissionRepository {
        &self.permission_repo
    }

    fn user_roles(&self) -> &dyn UserRoleRepository {
        &self.user_role_repo
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .take()
            .ok_or_else(|| AppError::internal("Transaction already consumed"))?;

        tx.commit()
            .await
            .map_err(|e| AppError::database(format!("Failed to commit transaction: {}", e)))?;

        Ok(())
    }

    async fn rollback(self: Box<Self>) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .take()
            .ok_or_else(|| AppError::internal("Transaction already consumed"))?;

        tx.rollback()
            .await
            .map_err(|e| AppError::database(format!("Failed to rollback transaction: {}", e)))?;

        Ok(())
    }
}
