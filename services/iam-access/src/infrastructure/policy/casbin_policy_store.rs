//! 基于 Casbin 的策略存储
//!
//! Enforcer 位于 `RwLock` 之后：鉴权持读锁并发执行，变更持写锁。
//! 底层 Adapter 决定规则持久化位置 (PostgreSQL、内存等)。

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use casbin::{Adapter, CoreApi, Enforcer, MgmtApi};
use rbac_common::{DomainId, UserId};
use rbac_errors::{AppError, AppResult};
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument};

use super::model::rbac_model;
use crate::domain::policy::{
    PolicyRule, PolicyStore, ReconcileReport, RoleAssignment, Subject, domain_key, user_key,
};
use crate::domain::role::{Permission, RoleId};

fn map_casbin_error(action: &str, e: casbin::Error) -> AppError {
    AppError::internal(format!("Policy store failed to {}: {}", action, e))
}

#[derive(Clone)]
pub struct CasbinPolicyStore {
    enforcer: Arc<RwLock<Enforcer>>,
}

impl CasbinPolicyStore {
    /// 使用给定 Adapter 构建并加载全部规则
    #[instrument(skip(adapter))]
    pub async fn new<A>(adapter: A) -> AppResult<Self>
    where
        A: Adapter + 'static,
    {
        let model = rbac_model().await?;

        let mut enforcer = Enforcer::new(model, adapter)
            .await
            .map_err(|e| map_casbin_error("create enforcer", e))?;

        enforcer
            .load_policy()
            .await
            .map_err(|e| map_casbin_error("load policies", e))?;

        info!(
            rules = enforcer.get_policy().len(),
            groupings = enforcer.get_grouping_policy().len(),
            "Policy store loaded"
        );

        Ok(Self {
            enforcer: Arc::new(RwLock::new(enforcer)),
        })
    }
}

#[async_trait]
impl PolicyStore for CasbinPolicyStore {
    #[instrument(skip(self, permissions), fields(count = permissions.len()))]
    async fn add_role_permissions(
        &self,
        role_id: RoleId,
        domain_id: DomainId,
        permissions: &[Permission],
    ) -> AppResult<()> {
        let mut enforcer = self.enforcer.write().await;
        for permission in permissions {
            let rule = PolicyRule::new(role_id, domain_id, &permission.object, &permission.action);
            let added = enforcer
                .add_policy(rule.to_tuple())
                .await
                .map_err(|e| map_casbin_error("add policy", e))?;
            if !added {
                debug!(object = %rule.object, action = %rule.action, "Policy already present");
            }
        }
        Ok(())
    }

    #[instrument(skip(self, permissions), fields(count = permissions.len()))]
    async fn delete_role_permissions(
        &self,
        role_id: RoleId,
        domain_id: DomainId,
        permissions: &[Permission],
    ) -> AppResult<()> {
        let mut enforcer = self.enforcer.write().await;
        for permission in permissions {
            let rule = PolicyRule::new(role_id, domain_id, &permission.object, &permission.action);
            enforcer
                .remove_policy(rule.to_tuple())
                .await
                .map_err(|e| map_casbin_error("remove policy", e))?;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn add_user_role(
        &self,
        user_id: UserId,
        role_id: RoleId,
        domain_id: DomainId,
    ) -> AppResult<()> {
        let tuple = RoleAssignment::new(user_id, role_id, domain_id).to_tuple();
        let mut enforcer = self.enforcer.write().await;
        enforcer
            .add_grouping_policy(tuple)
            .await
            .map_err(|e| map_casbin_error("add grouping policy", e))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_user_role(
        &self,
        user_id: UserId,
        role_id: RoleId,
        domain_id: DomainId,
    ) -> AppResult<()> {
        let tuple = RoleAssignment::new(user_id, role_id, domain_id).to_tuple();
        let mut enforcer = self.enforcer.write().await;
        enforcer
            .remove_grouping_policy(tuple)
            .await
            .map_err(|e| map_casbin_error("remove grouping policy", e))?;
        Ok(())
    }

    async fn enforce(&self, subject: &Subject, object: &str, action: &str) -> bool {
        if subject.is_root() {
            return true;
        }
        let key = subject.key();
        let enforcer = self.enforcer.read().await;
        match enforcer.enforce((key.as_str(), object, action)) {
            Ok(allowed) => allowed,
            Err(e) => {
                error!(subject = %key, object, action, error = %e, "Enforcement error, denying");
                false
            }
        }
    }

    async fn roles_for_user(&self, user_id: UserId, domain_id: DomainId) -> Vec<RoleId> {
        let user = user_key(user_id);
        let domain = domain_key(domain_id);
        let enforcer = self.enforcer.read().await;
        enforcer
            .get_filtered_grouping_policy(0, vec![user])
            .iter()
            .filter(|tuple| tuple.get(2) == Some(&domain))
            .filter_map(|tuple| RoleAssignment::from_tuple(tuple))
            .map(|a| a.role_id)
            .collect()
    }

    async fn role_assignments(&self) -> Vec<RoleAssignment> {
        let enforcer = self.enforcer.read().await;
        enforcer
            .get_grouping_policy()
            .iter()
            .filter_map(|tuple| RoleAssignment::from_tuple(tuple))
            .collect()
    }

    #[instrument(skip(self, desired), fields(desired = desired.len()))]
    async fn replace_role_assignments(
        &self,
        desired: Vec<RoleAssignment>,
    ) -> AppResult<ReconcileReport> {
        let desired: HashSet<RoleAssignment> = desired.into_iter().collect();
        let mut enforcer = self.enforcer.write().await;

        let current = enforcer.get_grouping_policy();
        let mut present = HashSet::with_capacity(current.len());
        let mut report = ReconcileReport::default();

        for tuple in current {
            match RoleAssignment::from_tuple(&tuple) {
                Some(assignment) if desired.contains(&assignment) => {
                    present.insert(assignment);
                }
                parsed => {
                    debug!(tuple = ?tuple, parsed = parsed.is_some(), "Removing stale grouping");
                    enforcer
                        .remove_grouping_policy(tuple)
                        .await
                        .map_err(|e| map_casbin_error("remove grouping policy", e))?;
                    report.removed += 1;
                }
            }
        }

        for assignment in desired.difference(&present) {
            enforcer
                .add_grouping_policy(assignment.to_tuple())
                .await
                .map_err(|e| map_casbin_error("add grouping policy", e))?;
            report.added += 1;
        }

        Ok(report)
    }
}
