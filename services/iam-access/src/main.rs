//! IAM Access Service 入口
//!
//! 启动顺序：配置 → 日志 → 数据库与迁移 → 策略存储 → 初始化数据 → 对账

use std::sync::Arc;

use iam_access::application::{
    ActorDomainResolver, AuthorizationService, Provisioner, ReconcileTask,
};
use iam_access::config::AccessServiceConfig;
use iam_access::infrastructure::{
    CasbinPolicyStore, PostgresPolicyAdapter, PostgresUnitOfWorkFactory,
};
use rbac_adapter_postgres::{PostgresConfig, check_connection, create_pool, run_migrations};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let config: AccessServiceConfig = rbac_config::load("config")?;
    rbac_telemetry::init_from_config(&config.telemetry);

    info!(app_env = %rbac_config::app_env(), "Initializing IAM Access Service...");

    let pool = create_pool(&PostgresConfig::from(&config.database))
        .await
        .inspect_err(|e| error!(error = %e, "Failed to connect to database"))?;
    check_connection(&pool).await?;
    run_migrations(&pool, &sqlx::migrate!("./migrations")).await?;

    let policy_store = CasbinPolicyStore::new(PostgresPolicyAdapter::new(pool.clone()))
        .await
        .inspect_err(|e| error!(error = %e, "Failed to load policy store"))?;

    let uow_factory = Arc::new(PostgresUnitOfWorkFactory::new(pool.clone()));

    Provisioner::new(uow_factory.clone())
        .run(&config.seed.domains)
        .await?;

    let service = Arc::new(
        AuthorizationService::new(
            uow_factory,
            Arc::new(policy_store),
            Arc::new(ActorDomainResolver),
        )
        .with_operation_timeout(config.authorization.operation_timeout()),
    );

    service.reconcile().await?;

    let shutdown = CancellationToken::new();
    let reconciler = config
        .authorization
        .reconcile_interval()
        .map(|interval| ReconcileTask::new(service.clone(), interval).start(shutdown.clone()));

    info!("IAM Access Service started");

    shutdown_signal().await;
    shutdown.cancel();
    if let Some(handle) = reconciler
        && let Err(e) = handle.await
    {
        error!(error = %e, "Reconcile task terminated abnormally");
    }

    pool.close().await;
    info!("IAM Access Service stopped");
    Ok(())
}

/// 等待关闭信号
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
