//! 启动初始化
//!
//! 写入配置中的租户和注册表声明的权限，并校验 permissions 表与注册表一致

use std::sync::Arc;

use futures::FutureExt;
use rbac_errors::{AppError, AppResult};
use tracing::{error, info};

use crate::domain::role::registry;
use crate::domain::tenant::NewDomain;
use crate::domain::unit_of_work::{UnitOfWorkFactory, execute_in_transaction};
use crate::error::{AccessError, AccessResult};

pub struct Provisioner {
    uow_factory: Arc<dyn UnitOfWorkFactory>,
}

impl Provisioner {
    pub fn new(uow_factory: Arc<dyn UnitOfWorkFactory>) -> Self {
        Self { uow_factory }
    }

    /// 写入缺失的租户，返回新建数量
    pub async fn seed_domains(&self, domains: &[NewDomain]) -> AppResult<usize> {
        let domains = domains.to_vec();
        let created = execute_in_transaction(self.uow_factory.as_ref(), move |uow| {
            async move {
                let mut created = 0usize;
                for domain in &domains {
                    if uow.domains().find_by_code(&domain.code).await?.is_none() {
                        uow.domains().create(domain).await?;
                        created += 1;
                    }
                }
                Ok::<_, AppError>(created)
            }
            .boxed()
        })
        .await?;

        info!(created, "Domains seeded");
        Ok(created)
    }

    /// 写入注册表声明但尚未存在的全局权限，返回新建数量
    pub async fn seed_permissions(&self) -> AppResult<usize> {
        let declared = registry::declared_permissions();
        let created = execute_in_transaction(self.uow_factory.as_ref(), move |uow| {
            async move {
                let mut created = 0usize;
                for permission in &declared {
                    let existing = uow
                        .permissions()
                        .find_by_object_action(&permission.object, &permission.action, None)
                        .await?;
                    if existing.is_none() {
                        uow.permissions().create(permission).await?;
                        created += 1;
                    }
                }
                Ok::<_, AppError>(created)
            }
            .boxed()
        })
        .await?;

        info!(created, "Registry permissions seeded");
        Ok(created)
    }

    /// permissions 表中每一行都必须在注册表中声明
    pub async fn validate_registry(&self) -> AccessResult<()> {
        let permissions = execute_in_transaction(self.uow_factory.as_ref(), |uow| {
            async move { Ok::<_, AccessError>(uow.permissions().list_all().await?) }.boxed()
        })
        .await?;

        let stray = registry::undeclared(&permissions);
        if stray.is_empty() {
            info!(permissions = permissions.len(), "Permission registry validated");
            return Ok(());
        }

        let codes: Vec<String> = stray.iter().map(|p| p.code()).collect();
        error!(undeclared = ?codes, "Permissions table contains undeclared entries");
        Err(AccessError::Validation(format!(
            "Undeclared permissions: {}",
            codes.join(", ")
        )))
    }

    /// 执行完整初始化
    pub async fn run(&self, domains: &[NewDomain]) -> AccessResult<()> {
        self.seed_domains(domains).await?;
        self.seed_permissions().await?;
        self.validate_registry().await
    }
}
