//! 内存 Unit of Work 实现
//!
//! `begin` 独占已提交状态并复制出工作副本，`commit` 写回，丢弃即回滚。
//! 事务之间因此完全串行。唯一约束与外键按数据库表结构校验。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rbac_common::{DomainId, UserId};
use rbac_domain_core::DomainScoped;
use rbac_errors::{AppError, AppResult};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::role::{
    NewPermission, NewRole, Permission, PermissionId, PermissionRepository, Role, RoleId,
    RoleRepository, UserRole, UserRoleRepository,
};
use crate::domain::tenant::{
    Domain, DomainRepository, NewDomain, UserDomain, UserDomainRepository,
};
use crate::domain::unit_of_work::{UnitOfWork, UnitOfWorkFactory};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    next_id: i64,
    domains: BTreeMap<i64, Domain>,
    user_domains: BTreeMap<(i64, i64), UserDomain>,
    roles: BTreeMap<i64, Role>,
    permissions: BTreeMap<i64, Permission>,
    user_roles: BTreeMap<(i64, i64, i64), UserRole>,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn domain_exists(&self, domain_id: DomainId) -> bool {
        self.domains.contains_key(&domain_id.0)
    }

    fn insert_domain(&mut self, new: &NewDomain) -> AppResult<Domain> {
        if self.domains.values().any(|d| d.code == new.code) {
            return Err(AppError::conflict(
                "Duplicate entry violates unique constraint domains_code_key",
            ));
        }
        let domain = Domain {
            id: DomainId::new(self.next_id()),
            code: new.code.clone(),
            name: new.name.clone(),
            created_at: Utc::now(),
        };
        self.domains.insert(domain.id.0, domain.clone());
        Ok(domain)
    }

    fn insert_permission(&mut self, new: &NewPermission) -> AppResult<Permission> {
        if let Some(domain_id) = new.domain_id
            && !self.domain_exists(domain_id)
        {
            return Err(AppError::validation("Foreign key constraint violation"));
        }
        let duplicate = self.permissions.values().any(|p| {
            p.object == new.object && p.action == new.action && p.domain_id == new.domain_id
        });
        if duplicate {
            return Err(AppError::conflict(
                "Duplicate entry violates unique constraint permissions_object_action_domain_key",
            ));
        }
        let permission = Permission {
            id: PermissionId::new(self.next_id()),
            name: new.name.clone(),
            object: new.object.clone(),
            action: new.action.clone(),
            permission_type: new.permission_type,
            domain_id: new.domain_id,
        };
        self.permissions.insert(permission.id.0, permission.clone());
        Ok(permission)
    }
}

/// 内存 Unit of Work 工厂
///
/// 克隆后共享同一份已提交状态。
#[derive(Clone, Default)]
pub struct MemoryUnitOfWorkFactory {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryUnitOfWorkFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 直接写入租户，不经过事务
    pub async fn seed_domain(&self, code: &str, name: &str) -> AppResult<Domain> {
        let mut state = self.state.lock().await;
        state.insert_domain(&NewDomain {
            code: code.to_string(),
            name: name.to_string(),
        })
    }

    /// 直接写入权限，不经过事务
    pub async fn seed_permission(&self, permission: NewPermission) -> AppResult<Permission> {
        let mut state = self.state.lock().await;
        state.insert_permission(&permission)
    }

    /// 已提交的用户角色数量
    pub async fn user_role_count(&self) -> usize {
        self.state.lock().await.user_roles.len()
    }

    /// 已提交的角色数量
    pub async fn role_count(&self) -> usize {
        self.state.lock().await.roles.len()
    }
}

#[async_trait]
impl UnitOfWorkFactory for MemoryUnitOfWorkFactory {
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>> {
        let committed = self.state.clone().lock_owned().await;
        Ok(Box::new(MemoryUnitOfWork::new(committed)))
    }
}

/// 内存 Unit of Work
pub struct MemoryUnitOfWork {
    committed: OwnedMutexGuard<MemoryState>,
    working: Arc<Mutex<MemoryState>>,
}

impl MemoryUnitOfWork {
    fn new(committed: OwnedMutexGuard<MemoryState>) -> Self {
        let working = Arc::new(Mutex::new(committed.clone()));
        Self { committed, working }
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    fn domains(&self) -> &dyn DomainRepository {
        self
    }

    fn user_domains(&self) -> &dyn UserDomainRepository {
        self
    }

    fn roles(&self) -> &dyn RoleRepository {
        self
    }

    fn permissions(&self) -> &dyn PermissionRepository {
        self
    }

    fn user_roles(&self) -> &dyn UserRoleRepository {
        self
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let MemoryUnitOfWork {
            mut committed,
            working,
        } = *self;
        *committed = working.lock().await.clone();
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> AppResult<()> {
        Ok(())
    }
}

#[async_trait]
impl DomainRepository for MemoryUnitOfWork {
    async fn create(&self, domain: &NewDomain) -> AppResult<Domain> {
        self.working.lock().await.insert_domain(domain)
    }

    async fn find_by_id(&self, id: DomainId) -> AppResult<Option<Domain>> {
        Ok(self.working.lock().await.domains.get(&id.0).cloned())
    }

    async fn find_by_code(&self, code: &str) -> AppResult<Option<Domain>> {
        let state = self.working.lock().await;
        Ok(state.domains.values().find(|d| d.code == code).cloned())
    }

    async fn list_all(&self) -> AppResult<Vec<Domain>> {
        Ok(self.working.lock().await.domains.values().cloned().collect())
    }
}

#[async_trait]
impl UserDomainRepository for MemoryUnitOfWork {
    async fn insert(&self, user_domain: &UserDomain) -> AppResult<()> {
        let mut state = self.working.lock().await;
        if !state.domain_exists(user_domain.domain_id) {
            return Err(AppError::validation("Foreign key constraint violation"));
        }
        let key = (user_domain.user_id.0, user_domain.domain_id.0);
        if state.user_domains.contains_key(&key) {
            return Err(AppError::conflict(
                "Duplicate entry violates unique constraint user_domains_pkey",
            ));
        }
        state.user_domains.insert(key, user_domain.clone());
        Ok(())
    }

    async fn delete(&self, user_id: UserId, domain_id: DomainId) -> AppResult<bool> {
        let mut state = self.working.lock().await;
        let removed = state
            .user_domains
            .remove(&(user_id.0, domain_id.0))
            .is_some();
        // ON DELETE CASCADE
        state
            .user_roles
            .retain(|_, ur| !(ur.user_id == user_id && ur.domain_id == domain_id));
        Ok(removed)
    }

    async fn exists(&self, user_id: UserId, domain_id: DomainId) -> AppResult<bool> {
        let state = self.working.lock().await;
        Ok(state.user_domains.contains_key(&(user_id.0, domain_id.0)))
    }

    async fn list_by_user(&self, user_id: UserId) -> AppResult<Vec<UserDomain>> {
        let state = self.working.lock().await;
        Ok(state
            .user_domains
            .values()
            .filter(|ud| ud.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RoleRepository for MemoryUnitOfWork {
    async fn create(&self, role: &NewRole) -> AppResult<Role> {
        let mut state = self.working.lock().await;
        if !state.domain_exists(role.domain_id) {
            return Err(AppError::validation("Foreign key constraint violation"));
        }
        let duplicate = state
            .roles
            .values()
            .any(|r| r.domain_id == role.domain_id && r.name == role.name);
        if duplicate {
            return Err(AppError::conflict(
                "Duplicate entry violates unique constraint roles_domain_name_key",
            ));
        }
        let id = RoleId::new(state.next_id());
        let created = Role::from_new(id, role.clone());
        state.roles.insert(id.0, created.clone());
        Ok(created)
    }

    async fn update(&self, role: &Role) -> AppResult<()> {
        let mut state = self.working.lock().await;
        let duplicate = state
            .roles
            .values()
            .any(|r| r.id != role.id && r.domain_id == role.domain_id && r.name == role.name);
        if duplicate {
            return Err(AppError::conflict(
                "Duplicate entry violates unique constraint roles_domain_name_key",
            ));
        }
        match state.roles.get_mut(&role.id.0) {
            Some(existing) => {
                *existing = role.clone();
                Ok(())
            }
            None => Err(AppError::not_found(format!("Role {} not found", role.id))),
        }
    }

    async fn find_by_id(&self, id: RoleId) -> AppResult<Option<Role>> {
        Ok(self.working.lock().await.roles.get(&id.0).cloned())
    }

    async fn find_by_id_for_update(&self, id: RoleId) -> AppResult<Option<Role>> {
        // 事务已独占全部状态
        RoleRepository::find_by_id(self, id).await
    }

    async fn find_by_name(&self, domain_id: DomainId, name: &str) -> AppResult<Option<Role>> {
        let state = self.working.lock().await;
        Ok(state
            .roles
            .values()
            .find(|r| r.domain_id == domain_id && r.name == name)
            .cloned())
    }

    async fn list_by_domain(&self, domain_id: DomainId) -> AppResult<Vec<Role>> {
        let state = self.working.lock().await;
        let mut roles: Vec<Role> = state
            .roles
            .values()
            .filter(|r| r.domain_id == domain_id)
            .cloned()
            .collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }
}

#[async_trait]
impl PermissionRepository for MemoryUnitOfWork {
    async fn create(&self, permission: &NewPermission) -> AppResult<Permission> {
        self.working.lock().await.insert_permission(permission)
    }

    async fn find_by_id(&self, id: PermissionId) -> AppResult<Option<Permission>> {
        Ok(self.working.lock().await.permissions.get(&id.0).cloned())
    }

    async fn find_by_ids(&self, ids: &[PermissionId]) -> AppResult<Vec<Permission>> {
        let state = self.working.lock().await;
        let mut found: Vec<Permission> = ids
            .iter()
            .filter_map(|id| state.permissions.get(&id.0).cloned())
            .collect();
        found.sort_by_key(|p| p.id);
        found.dedup_by_key(|p| p.id);
        Ok(found)
    }

    async fn find_by_object_action(
        &self,
        object: &str,
        action: &str,
        domain_id: Option<DomainId>,
    ) -> AppResult<Option<Permission>> {
        let state = self.working.lock().await;
        Ok(state
            .permissions
            .values()
            .find(|p| p.object == object && p.action == action && p.domain_id == domain_id)
            .cloned())
    }

    async fn list_all(&self) -> AppResult<Vec<Permission>> {
        Ok(self.working.lock().await.permissions.values().cloned().collect())
    }
}

#[async_trait]
impl UserRoleRepository for MemoryUnitOfWork {
    async fn insert(&self, user_role: &UserRole) -> AppResult<()> {
        let mut state = self.working.lock().await;
        let role_in_domain = state
            .roles
            .get(&user_role.role_id.0)
            .is_some_and(|r| r.belongs_to(user_role.domain_id));
        let member = state
            .user_domains
            .contains_key(&(user_role.user_id.0, user_role.domain_id.0));
        if !role_in_domain || !member {
            return Err(AppError::validation("Foreign key constraint violation"));
        }
        let key = (
            user_role.user_id.0,
            user_role.domain_id.0,
            user_role.role_id.0,
        );
        if state.user_roles.contains_key(&key) {
            return Err(AppError::conflict(
                "Duplicate entry violates unique constraint user_roles_pkey",
            ));
        }
        state.user_roles.insert(key, user_role.clone());
        Ok(())
    }

    async fn delete(
        &self,
        user_id: UserId,
        domain_id: DomainId,
        role_id: RoleId,
    ) -> AppResult<bool> {
        let mut state = self.working.lock().await;
        Ok(state
            .user_roles
            .remove(&(user_id.0, domain_id.0, role_id.0))
            .is_some())
    }

    async fn exists(
        &self,
        user_id: UserId,
        domain_id: DomainId,
        role_id: RoleId,
    ) -> AppResult<bool> {
        let state = self.working.lock().await;
        Ok(state
            .user_roles
            .contains_key(&(user_id.0, domain_id.0, role_id.0)))
    }

    async fn list_by_user_domain(
        &self,
        user_id: UserId,
        domain_id: DomainId,
    ) -> AppResult<Vec<UserRole>> {
        let state = self.working.lock().await;
        Ok(state
            .user_roles
            .values()
            .filter(|ur| ur.user_id == user_id && ur.domain_id == domain_id)
            .cloned()
            .collect())
    }

    async fn delete_by_user_domain(
        &self,
        user_id: UserId,
        domain_id: DomainId,
    ) -> AppResult<Vec<RoleId>> {
        let mut state = self.working.lock().await;
        let mut removed = Vec::new();
        state.user_roles.retain(|_, ur| {
            if ur.user_id == user_id && ur.domain_id == domain_id {
                removed.push(ur.role_id);
                false
            } else {
                true
            }
        });
        Ok(removed)
    }

    async fn list_by_role(&self, role_id: RoleId) -> AppResult<Vec<UserRole>> {
        let state = self.working.lock().await;
        Ok(state
            .user_roles
            .values()
            .filter(|ur| ur.role_id == role_id)
            .cloned()
            .collect())
    }

    async fn list_active(&self) -> AppResult<Vec<UserRole>> {
        let state = self.working.lock().await;
        Ok(state
            .user_roles
            .values()
            .filter(|ur| state.roles.get(&ur.role_id.0).is_some_and(|r| r.is_active))
            .cloned()
            .collect())
    }
}
