//! 集成测试公共装配
//!
//! 内存 Unit of Work + 基于 MemoryAdapter 的 Casbin 策略存储

#![allow(dead_code)]

use std::sync::Arc;

use casbin::MemoryAdapter;
use futures::FutureExt;
use iam_access::application::role::CreateRoleCommand;
use iam_access::application::{
    ActorDomainResolver, AuthorizationService, Provisioner, RequestContext, RoleCommandHandler,
};
use iam_access::domain::policy::{PolicyStore, RoleAssignment};
use iam_access::domain::role::{PermissionId, RoleId};
use iam_access::domain::unit_of_work::execute_in_transaction;
use iam_access::infrastructure::{CasbinPolicyStore, MemoryUnitOfWorkFactory};
use rbac_common::{DomainId, UserId};
use rbac_errors::AppError;

pub struct Harness {
    pub factory: MemoryUnitOfWorkFactory,
    pub store: CasbinPolicyStore,
    pub service: Arc<AuthorizationService>,
    pub roles: RoleCommandHandler,
}

pub async fn harness() -> Harness {
    let factory = MemoryUnitOfWorkFactory::new();
    Provisioner::new(Arc::new(factory.clone()))
        .run(&[])
        .await
        .expect("provisioning failed");

    let store = CasbinPolicyStore::new(MemoryAdapter::default())
        .await
        .expect("policy store failed to load");

    let service = Arc::new(AuthorizationService::new(
        Arc::new(factory.clone()),
        Arc::new(store.clone()),
        Arc::new(ActorDomainResolver),
    ));
    let roles = service.role_commands();

    Harness {
        factory,
        store,
        service,
        roles,
    }
}

impl Harness {
    pub async fn domain(&self, code: &str) -> DomainId {
        self.factory
            .seed_domain(code, &code.to_uppercase())
            .await
            .expect("seed domain")
            .id
    }

    pub async fn role(&self, domain_id: DomainId, name: &str) -> RoleId {
        self.roles
            .handle_create(
                &RequestContext::root(),
                CreateRoleCommand {
                    domain_id,
                    name: name.to_string(),
                    description: None,
                },
            )
            .await
            .expect("create role")
            .id
    }

    /// 注册表声明的全局权限
    pub async fn permission(&self, object: &str, action: &str) -> PermissionId {
        let object = object.to_string();
        let action = action.to_string();
        execute_in_transaction(&self.factory, move |uow| {
            async move {
                uow.permissions()
                    .find_by_object_action(&object, &action, None)
                    .await?
                    .map(|p| p.id)
                    .ok_or_else(|| AppError::not_found(format!("{}:{}", object, action)))
            }
            .boxed()
        })
        .await
        .expect("permission seeded")
    }

    pub async fn member(&self, user_id: UserId, domain_id: DomainId) {
        self.service
            .assign_domain(&RequestContext::root(), user_id, domain_id)
            .await
            .expect("assign domain");
    }

    /// 策略存储中的分组元组，已排序
    pub async fn store_assignments(&self) -> Vec<RoleAssignment> {
        let mut assignments = self.store.role_assignments().await;
        assignments.sort();
        assignments
    }
}
