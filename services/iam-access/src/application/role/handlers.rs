//! 角色命令处理器
//!
//! 所有写操作在租户校验通过后执行。
//! 停用角色会撤下持有者的分组元组，重新启用时恢复；user_roles 行保持不变。

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use rbac_errors::AppError;
use tracing::{info, instrument};

use super::commands::*;
use crate::application::authorization::{LockKey, MutationLocks};
use crate::application::context::{DomainContextResolver, RequestContext};
use crate::domain::policy::PolicyStore;
use crate::domain::role::{NewRole, Role, RoleId};
use crate::domain::unit_of_work::{UnitOfWorkFactory, execute_in_transaction};
use crate::error::{AccessError, AccessResult};

/// 角色命令处理器
pub struct RoleCommandHandler {
    uow_factory: Arc<dyn UnitOfWorkFactory>,
    policy_store: Arc<dyn PolicyStore>,
    resolver: Arc<dyn DomainContextResolver>,
    locks: Arc<MutationLocks>,
    operation_timeout: Option<Duration>,
}

impl RoleCommandHandler {
    /// `locks` 须与同进程的 `AuthorizationService` 共享
    pub fn new(
        uow_factory: Arc<dyn UnitOfWorkFactory>,
        policy_store: Arc<dyn PolicyStore>,
        resolver: Arc<dyn DomainContextResolver>,
        locks: Arc<MutationLocks>,
    ) -> Self {
        Self {
            uow_factory,
            policy_store,
            resolver,
            locks,
            operation_timeout: None,
        }
    }

    /// 请求上下文未设置截止时间时的默认超时
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    /// 创建角色
    #[instrument(skip(self, ctx), fields(domain_id = %cmd.domain_id, name = %cmd.name))]
    pub async fn handle_create(
        &self,
        ctx: &RequestContext,
        cmd: CreateRoleCommand,
    ) -> AccessResult<Role> {
        cmd.validate().map_err(AccessError::Validation)?;

        let domain_id = cmd.domain_id;
        self.resolver
            .check_domain_context(ctx, domain_id, "role", "create")
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

        let name = cmd.name.trim().to_string();
        let new_role = NewRole {
            domain_id,
            name: name.clone(),
            description: cmd.description,
            created_by: ctx.performed_by(),
        };
        let exists = move || AccessError::RoleAlreadyExists {
            domain_id,
            name: name.clone(),
        };

        let role = ctx
            .run_within(
                self.operation_timeout,
                execute_in_transaction(self.uow_factory.as_ref(), move |uow| {
                    async move {
                        if uow
                            .roles()
                            .find_by_name(domain_id, &new_role.name)
                            .await?
                            .is_some()
                        {
                            return Err(exists());
                        }
                        uow.roles().create(&new_role).await.map_err(|e| match e {
                            AppError::Conflict(_) => exists(),
                            other => other.into(),
                        })
                    }
                    .boxed()
                }),
            )
            .await?;

        info!(role_id = %role.id, "Role created");
        Ok(role)
    }

    /// 更新角色
    #[instrument(skip(self, ctx), fields(role_id = %cmd.role_id))]
    pub async fn handle_update(
        &self,
        ctx: &RequestContext,
        cmd: UpdateRoleCommand,
    ) -> AccessResult<Role> {
        cmd.validate().map_err(AccessError::Validation)?;

        let role = self.load_role(ctx, cmd.role_id).await?;
        let domain_id = role.domain_id;
        self.resolver
            .check_domain_context(ctx, domain_id, "role", "update")
            .await?;

        // 租户锁保护名称唯一性检查，角色锁与其他整行写入互斥
        let _guard = self
            .locks
            .lock_all(&[LockKey::Domain(domain_id), LockKey::Role(role.id)])
            .await;

        let name = cmd.name.trim().to_string();
        let description = cmd.description;
        let performed_by = ctx.performed_by();
        let role_id = cmd.role_id;

        let role = ctx
            .run_within(
                self.operation_timeout,
                execute_in_transaction(self.uow_factory.as_ref(), move |uow| {
                    async move {
                        let mut role = uow
                            .roles()
                            .find_by_id_for_update(role_id)
                            .await?
                            .ok_or_else(|| AccessError::not_found("Role", role_id))?;

                        if let Some(other) = uow.roles().find_by_name(domain_id, &name).await?
                            && other.id != role_id
                        {
                            return Err(AccessError::RoleAlreadyExists { domain_id, name });
                        }

                        role.update(name, description, performed_by);
                        uow.roles().update(&role).await.map_err(|e| match e {
                            AppError::Conflict(_) => AccessError::RoleAlreadyExists {
                                domain_id,
                                name: role.name.clone(),
                            },
                            other => other.into(),
                        })?;
                        Ok(role)
                    }
                    .boxed()
                }),
            )
            .await?;

        info!("Role updated");
        Ok(role)
    }

    /// 激活/停用角色
    ///
    /// 状态变化时同步持有者的分组元组；策略存储写入失败返回
    /// [`AccessError::Consistency`]，由对账修复。
    #[instrument(skip(self, ctx), fields(role_id = %cmd.role_id, is_active = cmd.is_active))]
    pub async fn handle_set_active(
        &self,
        ctx: &RequestContext,
        cmd: SetRoleActiveCommand,
    ) -> AccessResult<Role> {
        let role = self.load_role(ctx, cmd.role_id).await?;
        let domain_id = role.domain_id;
        self.resolver
            .check_domain_context(ctx, domain_id, "role", "update")
            .await?;

        // 与同租户的角色分配互斥
        let _guard = self
            .locks
            .lock_all(&[LockKey::Domain(domain_id), LockKey::Role(role.id)])
            .await;

        let performed_by = ctx.performed_by();
        let role_id = cmd.role_id;
        let is_active = cmd.is_active;

        let (role, holders) = ctx
            .run_within(
                self.operation_timeout,
                execute_in_transaction(self.uow_factory.as_ref(), move |uow| {
                    async move {
                        let mut role = uow
                            .roles()
                            .find_by_id_for_update(role_id)
                            .await?
                            .ok_or_else(|| AccessError::not_found("Role", role_id))?;

                        let changed = role.is_active != is_active;
                        if is_active {
                            role.activate(performed_by);
                        } else {
                            role.deactivate(performed_by);
                        }
                        uow.roles().update(&role).await?;

                        let holders = if changed {
                            uow.user_roles().list_by_role(role_id).await?
                        } else {
                            Vec::new()
                        };
                        Ok((role, holders))
                    }
                    .boxed()
                }),
            )
            .await?;

        let mut failures = Vec::new();
        for holder in &holders {
            let result = if role.is_active {
                self.policy_store
                    .add_user_role(holder.user_id, role_id, holder.domain_id)
                    .await
            } else {
                self.policy_store
                    .remove_user_role(holder.user_id, role_id, holder.domain_id)
                    .await
            };
            if let Err(e) = result {
                failures.push(format!("user {}: {}", holder.user_id, e));
            }
        }
        AccessError::check_policy_writes("set_role_active", failures)?;

        info!(holders = holders.len(), "Role activation changed");
        Ok(role)
    }

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
}
