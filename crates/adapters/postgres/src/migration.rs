//! PostgreSQL 迁移管理模块
//!
//! 执行由服务通过 `sqlx::migrate!` 嵌入的迁移

use rbac_errors::{AppError, AppResult};
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use tracing::info;

/// 执行所有未应用的迁移
pub async fn run_migrations(pool: &PgPool, migrator: &Migrator) -> AppResult<()> {
    let total = migrator.iter().count();
    info!(migrations = total, "Applying database migrations");

    migrator
        .run(pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to run migrations: {}", e)))?;

    info!("Database migrations applied");
    Ok(())
}
