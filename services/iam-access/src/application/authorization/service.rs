//! 授权服务
//!
//! 协调租户上下文、关系库与策略存储：
//! 变更先做租户校验，再写关系库，提交后再写策略存储。
//! 鉴权只读策略存储。

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use rbac_common::{DomainId, UserId};
use rbac_errors::AppError;
use tracing::{info, instrument, warn};

use super::locks::{LockKey, MutationLocks};
use crate::application::context::{DomainContextResolver, RequestContext};
use crate::application::role::RoleCommandHandler;
use crate::domain::policy::{PolicyStore, ReconcileReport, RoleAssignment, Subject};
use crate::domain::role::registry::{self, PermissionAction, PermissionObject};
use crate::domain::role::{Permission, PermissionId, Role, RoleId, UserRole};
use crate::domain::tenant::UserDomain;
use crate::domain::unit_of_work::{UnitOfWorkFactory, execute_in_transaction};
use crate::error::{AccessError, AccessResult};

/// 唯一约束冲突转换为业务错误
fn on_conflict(err: AppError, conflict: impl FnOnce() -> AccessError) -> AccessError {
    match err {
        AppError::Conflict(_) => conflict(),
        other => other.into(),
    }
}

/// 授权服务
pub struct AuthorizationService {
    uow_factory: Arc<dyn UnitOfWorkFactory>,
    policy_store: Arc<dyn PolicyStore>,
    resolver: Arc<dyn DomainContextResolver>,
    locks: Arc<MutationLocks>,
    operation_timeout: Option<Duration>,
}

impl AuthorizationService {
    pub fn new(
        uow_factory: Arc<dyn UnitOfWorkFactory>,
        policy_store: Arc<dyn PolicyStore>,
        resolver: Arc<dyn DomainContextResolver>,
    ) -> Self {
        Self {
            uow_factory,
            policy_store,
            resolver,
            locks: Arc::new(MutationLocks::new()),
            operation_timeout: None,
        }
    }

    /// 请求上下文未设置截止时间时的默认超时
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    /// 与本服务共享存储、变更锁和默认超时的角色命令处理器
    pub fn role_commands(&self) -> RoleCommandHandler {
        let handler = RoleCommandHandler::new(
            self.uow_factory.clone(),
            self.policy_store.clone(),
            self.resolver.clone(),
            self.locks.clone(),
        );
        match self.operation_timeout {
            Some(timeout) => handler.with_operation_timeout(timeout),
            None => handler,
        }
    }

    // ============ 用户角色 ============

    /// 为用户分配角色
    #[instrument(skip(self, ctx), fields(user_id = %user_id, role_id = %role_id))]
    pub async fn assign_role(
        &self,
        ctx: &RequestContext,
        user_id: UserId,
        role_id: RoleId,
    ) -> AccessResult<()> {
        let role = self.load_role(ctx, role_id).await?;
        let domain_id = role.domain_id;
        self.resolver
            .check_domain_context(ctx, domain_id, "user_role", "create")
            .await?;
        if !role.is_active {
            return Err(AccessError::RoleInactive(role_id));
        }

        let _guard = self.locks.lock(LockKey::Domain(domain_id)).await;

        let already = move || {
            AccessError::AlreadyAssigned(format!(
                "user {} already holds role {} in domain {}",
                user_id, role_id, domain_id
            ))
        };
        ctx.run_within(
            self.operation_timeout,
            execute_in_transaction(self.uow_factory.as_ref(), move |uow| {
                async move {
                    // 锁定角色行，与并发的停用互斥
                    let role = uow
                        .roles()
                        .find_by_id_for_update(role_id)
                        .await?
                        .ok_or_else(|| AccessError::not_found("Role", role_id))?;
                    if !role.is_active {
                        return Err(AccessError::RoleInactive(role_id));
                    }
                    if !uow.user_domains().exists(user_id, domain_id).await? {
                        return Err(AccessError::DomainNotAssigned { user_id, domain_id });
                    }
                    if uow.user_roles().exists(user_id, domain_id, role_id).await? {
                        return Err(already());
                    }
                    uow.user_roles()
                        .insert(&UserRole::new(user_id, domain_id, role_id))
                        .await
                        .map_err(|e| on_conflict(e, already))
                }
                .boxed()
            }),
        )
        .await?;

        self.policy_store
            .add_user_role(user_id, role_id, domain_id)
            .await
            .map_err(|e| AccessError::consistency("assign_role", e))?;

        info!(domain_id = %domain_id, "Role assigned to user");
        Ok(())
    }

    /// 移除用户的角色
    #[instrument(skip(self, ctx), fields(user_id = %user_id, role_id = %role_id))]
    pub async fn remove_role(
        &self,
        ctx: &RequestContext,
        user_id: UserId,
        role_id: RoleId,
    ) -> AccessResult<()> {
        let role = self.load_role(ctx, role_id).await?;
        let domain_id = role.domain_id;
        self.resolver
            .check_domain_context(ctx, domain_id, "user_role", "delete")
            .await?;

        let _guard = self.locks.lock(LockKey::Domain(domain_id)).await;

        ctx.run_within(
            self.operation_timeout,
            execute_in_transaction(self.uow_factory.as_ref(), move |uow| {
                async move {
                    if !uow.user_roles().delete(user_id, domain_id, role_id).await? {
                        return Err(AccessError::NotAssigned(format!(
                            "user {} does not hold role {} in domain {}",
                            user_id, role_id, domain_id
                        )));
                    }
                    Ok(())
                }
                .boxed()
            }),
        )
        .await?;

        self.policy_store
            .remove_user_role(user_id, role_id, domain_id)
            .await
            .map_err(|e| AccessError::consistency("remove_role", e))?;

        info!(domain_id = %domain_id, "Role removed from user");
        Ok(())
    }

    /// 用户在租户下持有的角色
    #[instrument(skip(self, ctx))]
    pub async fn user_roles(
        &self,
        ctx: &RequestContext,
        user_id: UserId,
        domain_id: DomainId,
    ) -> AccessResult<Vec<RoleId>> {
        self.resolver
            .check_domain_context(ctx, domain_id, "user_role", "index")
            .await?;
        Ok(self.policy_store.roles_for_user(user_id, domain_id).await)
    }

    // ============ 角色权限 ============

    /// 为角色授予权限，重复授予无副作用
    #[instrument(skip(self, ctx, permission_ids), fields(role_id = %role_id, count = permission_ids.len()))]
    pub async fn add_permissions(
        &self,
        ctx: &RequestContext,
        role_id: RoleId,
        permission_ids: &[PermissionId],
    ) -> AccessResult<()> {
        let role = self.load_role(ctx, role_id).await?;
        self.resolver
            .check_domain_context(ctx, role.domain_id, "permission", "create")
            .await?;

        let permissions = self.load_permissions(ctx, permission_ids).await?;
        if let Some(foreign) = permissions.iter().find(|p| !p.grantable_in(role.domain_id)) {
            let owner = foreign.domain_id.unwrap_or(role.domain_id);
            warn!(
                permission_id = %foreign.id,
                owner_domain = %owner,
                role_domain = %role.domain_id,
                "Domain-specific permission cannot be granted outside its domain"
            );
            return Err(AccessError::DomainMismatch {
                acting: role.domain_id,
                target: owner,
                resource: "permission".to_string(),
                action: "create".to_string(),
            });
        }

        let _guard = self.locks.lock(LockKey::Role(role_id)).await;
        self.policy_store
            .add_role_permissions(role_id, role.domain_id, &permissions)
            .await?;

        info!(domain_id = %role.domain_id, "Permissions granted to role");
        Ok(())
    }

    /// 撤销角色的权限，撤销未授予的权限无副作用
    #[instrument(skip(self, ctx, permission_ids), fields(role_id = %role_id, count = permission_ids.len()))]
    pub async fn delete_permissions(
        &self,
        ctx: &RequestContext,
        role_id: RoleId,
        permission_ids: &[PermissionId],
    ) -> AccessResult<()> {
        let role = self.load_role(ctx, role_id).await?;
        self.resolver
            .check_domain_context(ctx, role.domain_id, "permission", "delete")
            .await?;

        let permissions = self.load_permissions(ctx, permission_ids).await?;

        let _guard = self.locks.lock(LockKey::Role(role_id)).await;
        self.policy_store
            .delete_role_permissions(role_id, role.domain_id, &permissions)
            .await?;

        info!(domain_id = %role.domain_id, "Permissions revoked from role");
        Ok(())
    }

    // ============ 租户成员 ============

    /// 将用户加入租户
    #[instrument(skip(self, ctx), fields(user_id = %user_id, domain_id = %domain_id))]
    pub async fn assign_domain(
        &self,
        ctx: &RequestContext,
        user_id: UserId,
        domain_id: DomainId,
    ) -> AccessResult<()> {
        // 先校验租户上下文，越权调用者无法探测租户是否存在
        self.resolver
            .check_domain_context(ctx, domain_id, "user_domain", "create")
            .await?;

        ctx.run_within(
            self.operation_timeout,
            execute_in_transaction(self.uow_factory.as_ref(), move |uow| {
                async move {
                    match uow.domains().find_by_id(domain_id).await? {
                        Some(_) => Ok(()),
                        None => Err(AccessError::not_found("Domain", domain_id)),
                    }
                }
                .boxed()
            }),
        )
        .await?;

        let _guard = self.locks.lock(LockKey::Domain(domain_id)).await;

        let already = move || {
            AccessError::AlreadyAssigned(format!(
                "user {} is already a member of domain {}",
                user_id, domain_id
            ))
        };
        ctx.run_within(
            self.operation_timeout,
            execute_in_transaction(self.uow_factory.as_ref(), move |uow| {
                async move {
                    if uow.user_domains().exists(user_id, domain_id).await? {
                        return Err(already());
                    }
                    uow.user_domains()
                        .insert(&UserDomain::new(user_id, domain_id))
                        .await
                        .map_err(|e| on_conflict(e, already))
                }
                .boxed()
            }),
        )
        .await?;

        info!("User assigned to domain");
        Ok(())
    }

    /// 将用户移出租户，并级联移除其在该租户下的全部角色
    #[instrument(skip(self, ctx), fields(user_id = %user_id, domain_id = %domain_id))]
    pub async fn remove_domain(
        &self,
        ctx: &RequestContext,
        user_id: UserId,
        domain_id: DomainId,
    ) -> AccessResult<()> {
        self.resolver
            .check_domain_context(ctx, domain_id, "user_domain", "delete")
            .await?;

        let _guard = self.locks.lock(LockKey::Domain(domain_id)).await;

        let removed_roles = ctx
            .run_within(
                self.operation_timeout,
                execute_in_transaction(self.uow_factory.as_ref(), move |uow| {
                    async move {
                        if !uow.user_domains().exists(user_id, domain_id).await? {
                            return Err(AccessError::DomainNotAssigned { user_id, domain_id });
                        }
                        let role_ids = uow
                            .user_roles()
                            .delete_by_user_domain(user_id, domain_id)
                            .await?;
                        uow.user_domains().delete(user_id, domain_id).await?;
                        Ok(role_ids)
                    }
                    .boxed()
                }),
            )
            .await?;

        // 已提交，逐个移除分组元组；失败的留给对账修复
        let mut failures = Vec::new();
        for role_id in &removed_roles {
            if let Err(e) = self
                .policy_store
                .remove_user_role(user_id, *role_id, domain_id)
                .await
            {
                failures.push(format!("role {}: {}", role_id, e));
            }
        }
        AccessError::check_policy_writes("remove_domain", failures)?;

        info!(roles_removed = removed_roles.len(), "User removed from domain");
        Ok(())
    }

    // ============ 鉴权 ============

    /// 鉴权判定，无副作用
    ///
    /// 注册表未声明的 (object, action) 一律拒绝
    pub async fn check(&self, subject: &Subject, object: &str, action: &str) -> bool {
        if subject.is_root() {
            return true;
        }
        if registry::lookup(object, action).is_none() {
            warn!(
                subject = %subject,
                object,
                action,
                "Authorization check for undeclared permission denied"
            );
            return false;
        }
        self.policy_store.enforce(subject, object, action).await
    }

    /// 使用注册表类型的鉴权判定
    pub async fn check_permission(
        &self,
        subject: &Subject,
        object: PermissionObject,
        action: PermissionAction,
    ) -> bool {
        if subject.is_root() {
            return true;
        }
        if !registry::is_declared(object, action) {
            warn!(
                subject = %subject,
                object = %object,
                action = %action,
                "Authorization check for undeclared permission denied"
            );
            return false;
        }
        self.policy_store
            .enforce(subject, object.as_str(), action.as_str())
            .await
    }

    /// 校验调用者能否在 `domain_id` 内操作
    pub async fn check_domain_context(
        &self,
        ctx: &RequestContext,
        domain_id: DomainId,
        resource: &str,
        action: &str,
    ) -> AccessResult<()> {
        self.resolver
            .check_domain_context(ctx, domain_id, resource, action)
            .await
    }

    // ============ 对账 ============

    /// 以启用角色的 user_roles 为准重建分组元组
    #[instrument(skip(self))]
    pub async fn reconcile(&self) -> AccessResult<ReconcileReport> {
        let _gate = self.locks.exclusive().await;

        let desired: BTreeSet<RoleAssignment> =
            execute_in_transaction(self.uow_factory.as_ref(), |uow| {
                async move {
                    let rows = uow.user_roles().list_active().await?;
                    Ok::<_, AccessError>(
                        rows.into_iter()
                            .map(|r| RoleAssignment::new(r.user_id, r.role_id, r.domain_id))
                            .collect::<BTreeSet<_>>(),
                    )
                }
                .boxed()
            })
            .await?;

        let report = self
            .policy_store
            .replace_role_assignments(desired.into_iter().collect())
            .await?;

        if report.is_clean() {
            info!("Role assignments in sync");
        } else {
            warn!(
                added = report.added,
                removed = report.removed,
                "Repaired role assignment drift"
            );
        }
        Ok(report)
    }

    // ============ 内部读取 ============

    async fn load_role(&self, ctx: &RequestContext, role_id: RoleId) -> AccessResult<Role> {
        ctx.run_within(
            self.operation_timeout,
            execute_in_transaction(self.uow_factory.as_ref(), move |uow| {
                async move {
                    uow.roles()
                        .find_by_id(role_id)
                        .await?
                        .ok_or_else(|| AccessError::not_found("Role", role_id))
                }
                .boxed()
            }),
        )
        .await
    }

    async fn load_permissions(
        &self,
        ctx: &RequestContext,
        permission_ids: &[PermissionId],
    ) -> AccessResult<Vec<Permission>> {
        let ids: Vec<PermissionId> = permission_ids
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        ctx.run_within(
            self.operation_timeout,
            execute_in_transaction(self.uow_factory.as_ref(), move |uow| {
                async move {
                    let found = uow.permissions().find_by_ids(&ids).await?;
                    if let Some(missing) = ids.iter().find(|id| !found.iter().any(|p| p.id == **id))
                    {
                        return Err(AccessError::not_found("Permission", missing));
                    }
                    Ok(found)
                }
                .boxed()
            }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::context::ActorDomainResolver;
    use crate::domain::policy::MockPolicyStore;
    use crate::domain::role::NewRole;
    use crate::infrastructure::memory::MemoryUnitOfWorkFactory;

    struct Fixture {
        factory: MemoryUnitOfWorkFactory,
        domain_id: DomainId,
        role_id: RoleId,
    }

    async fn fixture() -> Fixture {
        let factory = MemoryUnitOfWorkFactory::new();
        let domain = factory.seed_domain("acme", "Acme").await.unwrap();

        let uow = factory.begin().await.unwrap();
        let role = uow
            .roles()
            .create(&NewRole {
                domain_id: domain.id,
                name: "editor".into(),
                description: None,
                created_by: None,
            })
            .await
            .unwrap();
        uow.user_domains()
            .insert(&UserDomain::new(UserId::new(10), domain.id))
            .await
            .unwrap();
        uow.commit().await.unwrap();

        Fixture {
            factory,
            domain_id: domain.id,
            role_id: role.id,
        }
    }

    /// 直接写入关系库，不经过策略存储
    async fn seed_assignment(fx: &Fixture, name: &str) -> RoleId {
        let uow = fx.factory.begin().await.unwrap();
        let role = match uow.roles().find_by_name(fx.domain_id, name).await.unwrap() {
            Some(role) => role,
            None => uow
                .roles()
                .create(&NewRole {
                    domain_id: fx.domain_id,
                    name: name.into(),
                    description: None,
                    created_by: None,
                })
                .await
                .unwrap(),
        };
        uow.user_roles()
            .insert(&UserRole::new(UserId::new(10), fx.domain_id, role.id))
            .await
            .unwrap();
        uow.commit().await.unwrap();
        role.id
    }

    fn service(factory: &MemoryUnitOfWorkFactory, store: MockPolicyStore) -> AuthorizationService {
        AuthorizationService::new(
            Arc::new(factory.clone()),
            Arc::new(store),
            Arc::new(ActorDomainResolver),
        )
    }

    #[tokio::test]
    async fn test_policy_failure_after_commit_reports_consistency() {
        let fx = fixture().await;
        let expected = RoleAssignment::new(UserId::new(10), fx.role_id, fx.domain_id);

        let mut store = MockPolicyStore::new();
        store
            .expect_add_user_role()
            .times(1)
            .returning(|_, _, _| Err(AppError::internal("policy backend down")));
        store
            .expect_replace_role_assignments()
            .withf(move |desired| desired == &vec![expected])
            .times(1)
            .returning(|_| Ok(ReconcileReport { added: 1, removed: 0 }));

        let service = service(&fx.factory, store);
        let result = service
            .assign_role(&RequestContext::root(), UserId::new(10), fx.role_id)
            .await;

        assert!(matches!(result, Err(AccessError::Consistency(_))));
        // 关系库已提交
        assert_eq!(fx.factory.user_role_count().await, 1);

        let report = service.reconcile().await.unwrap();
        assert_eq!(report.added, 1);
    }

    #[tokio::test]
    async fn test_remove_role_policy_failure_reports_consistency() {
        let fx = fixture().await;
        let editor = seed_assignment(&fx, "editor").await;

        let mut store = MockPolicyStore::new();
        store
            .expect_remove_user_role()
            .times(1)
            .returning(|_, _, _| Err(AppError::internal("policy backend down")));

        let result = service(&fx.factory, store)
            .remove_role(&RequestContext::root(), UserId::new(10), editor)
            .await;

        assert!(matches!(result, Err(AccessError::Consistency(_))));
        assert_eq!(fx.factory.user_role_count().await, 0);
    }

    #[tokio::test]
    async fn test_remove_domain_keeps_removing_after_policy_failure() {
        let fx = fixture().await;
        let editor = seed_assignment(&fx, "editor").await;
        let viewer = seed_assignment(&fx, "viewer").await;

        let mut store = MockPolicyStore::new();
        store
            .expect_remove_user_role()
            .withf(move |_, role, _| *role == editor)
            .times(1)
            .returning(|_, _, _| Err(AppError::internal("policy backend down")));
        store
            .expect_remove_user_role()
            .withf(move |_, role, _| *role == viewer)
            .times(1)
            .returning(|_, _, _| Ok(()));

        let result = service(&fx.factory, store)
            .remove_domain(&RequestContext::root(), UserId::new(10), fx.domain_id)
            .await;

        match result {
            Err(AccessError::Consistency(msg)) => {
                assert!(msg.contains(&format!("role {}", editor)));
                assert!(!msg.contains(&format!("role {}", viewer)));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        // 关系库级联已提交
        assert_eq!(fx.factory.user_role_count().await, 0);
        let uow = fx.factory.begin().await.unwrap();
        assert!(
            !uow.user_domains()
                .exists(UserId::new(10), fx.domain_id)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_assign_inactive_role_is_rejected() {
        let fx = fixture().await;
        let uow = fx.factory.begin().await.unwrap();
        let mut role = uow.roles().find_by_id(fx.role_id).await.unwrap().unwrap();
        role.deactivate(None);
        uow.roles().update(&role).await.unwrap();
        uow.commit().await.unwrap();

        // 未设置 add_user_role 期望
        let result = service(&fx.factory, MockPolicyStore::new())
            .assign_role(&RequestContext::root(), UserId::new(10), fx.role_id)
            .await;

        assert!(matches!(result, Err(AccessError::RoleInactive(id)) if id == fx.role_id));
        assert_eq!(fx.factory.user_role_count().await, 0);
    }

    #[tokio::test]
    async fn test_assign_role_requires_domain_membership() {
        let fx = fixture().await;
        let service = service(&fx.factory, MockPolicyStore::new());

        let result = service
            .assign_role(&RequestContext::root(), UserId::new(11), fx.role_id)
            .await;

        assert!(matches!(result, Err(AccessError::DomainNotAssigned { .. })));
        assert_eq!(fx.factory.user_role_count().await, 0);
    }

    #[tokio::test]
    async fn test_remove_unheld_role_is_not_assigned() {
        let fx = fixture().await;
        let service = service(&fx.factory, MockPolicyStore::new());

        let result = service
            .remove_role(&RequestContext::root(), UserId::new(10), fx.role_id)
            .await;

        assert!(matches!(result, Err(AccessError::NotAssigned(_))));
    }

    #[tokio::test]
    async fn test_undeclared_permission_is_denied_without_policy_lookup() {
        let fx = fixture().await;
        // 未设置 enforce 期望，调用即失败
        let service = service(&fx.factory, MockPolicyStore::new());
        let user = Subject::User(UserId::new(10));

        assert!(!service.check(&user, "post", "publish").await);
        assert!(!service.check(&user, "invoice", "index").await);
        assert!(
            !service
                .check_permission(&user, PermissionObject::Permission, PermissionAction::Delete)
                .await
        );
    }

    #[tokio::test]
    async fn test_root_check_skips_policy_store() {
        let fx = fixture().await;
        let service = service(&fx.factory, MockPolicyStore::new());

        assert!(service.check(&Subject::Root, "invoice", "index").await);
    }

    #[tokio::test]
    async fn test_declared_permission_delegates_to_store() {
        let fx = fixture().await;
        let mut store = MockPolicyStore::new();
        store
            .expect_enforce()
            .withf(|subject, object, action| {
                *subject == Subject::User(UserId::new(10)) && object == "post" && action == "update"
            })
            .times(1)
            .returning(|_, _, _| true);

        let service = service(&fx.factory, store);
        assert!(
            service
                .check(&Subject::User(UserId::new(10)), "post", "update")
                .await
        );
    }

    #[tokio::test]
    async fn test_tenant_actor_cannot_grant_in_other_domain() {
        let fx = fixture().await;
        let service = service(&fx.factory, MockPolicyStore::new());
        let ctx = RequestContext::tenant(UserId::new(1), DomainId::new(fx.domain_id.0 + 100));

        let result = service
            .add_permissions(&ctx, fx.role_id, &[PermissionId::new(1)])
            .await;

        assert!(matches!(result, Err(AccessError::DomainMismatch { .. })));
    }

    #[tokio::test]
    async fn test_unknown_role_is_not_found() {
        let fx = fixture().await;
        let service = service(&fx.factory, MockPolicyStore::new());

        let result = service
            .assign_role(&RequestContext::root(), UserId::new(10), RoleId::new(999))
            .await;

        assert!(matches!(
            result,
            Err(AccessError::NotFound { entity: "Role", .. })
        ));
    }
}
