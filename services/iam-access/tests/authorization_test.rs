//! 授权服务集成测试
//!
//! 覆盖：
//! - 授权后鉴权通过，撤销后拒绝
//! - root 绕过规则
//! - 授予/撤销幂等
//! - 租户隔离与跨租户拦截
//! - 移出租户级联移除角色
//! - 分组元组漂移对账
//! - 停用角色不再授予权限
//! - 取消与超时
//! - 并发分配

mod common;

use std::time::Duration;

use common::harness;
use iam_access::application::RequestContext;
use iam_access::application::role::SetRoleActiveCommand;
use iam_access::domain::policy::{ReconcileReport, RoleAssignment, Subject};
use iam_access::domain::role::registry::{PermissionAction, PermissionObject};
use iam_access::domain::unit_of_work::UnitOfWorkFactory;
use iam_access::error::AccessError;
use rbac_common::{DomainId, UserId};
use tokio_util::sync::CancellationToken;

const USER: UserId = UserId(10);

// ============================================================================
// 授权与鉴权
// ============================================================================

#[tokio::test]
async fn test_grant_then_check() {
    let h = harness().await;
    let domain = h.domain("acme").await;
    let editor = h.role(domain, "editor").await;
    let post_update = h.permission("post", "update").await;
    let root = RequestContext::root();

    h.member(USER, domain).await;
    h.service
        .add_permissions(&root, editor, &[post_update])
        .await
        .unwrap();
    h.service.assign_role(&root, USER, editor).await.unwrap();

    let user = Subject::User(USER);
    assert!(h.service.check(&user, "post", "update").await);
    assert!(!h.service.check(&user, "post", "delete").await);
    assert!(
        h.service
            .check_permission(&user, PermissionObject::Post, PermissionAction::Update)
            .await
    );
    assert!(h.service.check(&Subject::Role(editor), "post", "update").await);
    assert_eq!(
        h.service.user_roles(&root, USER, domain).await.unwrap(),
        vec![editor]
    );

    h.service.remove_role(&root, USER, editor).await.unwrap();
    assert!(!h.service.check(&user, "post", "update").await);
    assert!(h.service.user_roles(&root, USER, domain).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_root_bypasses_every_rule() {
    let h = harness().await;

    assert!(h.service.check(&Subject::Root, "post", "update").await);
    assert!(h.service.check(&Subject::Root, "undeclared", "anything").await);
}

#[tokio::test]
async fn test_add_and_delete_permissions_are_idempotent() {
    let h = harness().await;
    let domain = h.domain("acme").await;
    let editor = h.role(domain, "editor").await;
    let post_update = h.permission("post", "update").await;
    let root = RequestContext::root();
    let role = Subject::Role(editor);

    h.service
        .add_permissions(&root, editor, &[post_update, post_update])
        .await
        .unwrap();
    h.service
        .add_permissions(&root, editor, &[post_update])
        .await
        .unwrap();
    assert!(h.service.check(&role, "post", "update").await);

    h.service
        .delete_permissions(&root, editor, &[post_update])
        .await
        .unwrap();
    h.service
        .delete_permissions(&root, editor, &[post_update])
        .await
        .unwrap();
    assert!(!h.service.check(&role, "post", "update").await);
}

#[tokio::test]
async fn test_unknown_permission_is_not_found() {
    let h = harness().await;
    let domain = h.domain("acme").await;
    let editor = h.role(domain, "editor").await;

    let result = h
        .service
        .add_permissions(
            &RequestContext::root(),
            editor,
            &[iam_access::domain::role::PermissionId::new(9_999)],
        )
        .await;

    assert!(matches!(
        result,
        Err(AccessError::NotFound {
            entity: "Permission",
            ..
        })
    ));
}

#[tokio::test]
async fn test_assign_role_twice_is_already_assigned() {
    let h = harness().await;
    let domain = h.domain("acme").await;
    let editor = h.role(domain, "editor").await;
    let root = RequestContext::root();

    h.member(USER, domain).await;
    h.service.assign_role(&root, USER, editor).await.unwrap();

    let result = h.service.assign_role(&root, USER, editor).await;
    assert!(matches!(result, Err(AccessError::AlreadyAssigned(_))));
    assert_eq!(h.factory.user_role_count().await, 1);
}

// ============================================================================
// 租户隔离
// ============================================================================

#[tokio::test]
async fn test_role_in_one_domain_does_not_grant_another() {
    let h = harness().await;
    let acme = h.domain("acme").await;
    let globex = h.domain("globex").await;
    let acme_editor = h.role(acme, "editor").await;
    let globex_viewer = h.role(globex, "viewer").await;
    let post_update = h.permission("post", "update").await;
    let root = RequestContext::root();

    h.member(USER, acme).await;
    h.member(USER, globex).await;
    h.service
        .add_permissions(&root, acme_editor, &[post_update])
        .await
        .unwrap();
    h.service
        .assign_role(&root, USER, globex_viewer)
        .await
        .unwrap();

    assert!(!h.service.check(&Subject::User(USER), "post", "update").await);
    assert!(h.service.user_roles(&root, USER, acme).await.unwrap().is_empty());
    assert_eq!(
        h.service.user_roles(&root, USER, globex).await.unwrap(),
        vec![globex_viewer]
    );
}

#[tokio::test]
async fn test_tenant_actor_is_confined_to_its_domain() {
    let h = harness().await;
    let acme = h.domain("acme").await;
    let globex = h.domain("globex").await;
    let globex_editor = h.role(globex, "editor").await;
    h.member(USER, globex).await;

    let acme_admin = RequestContext::tenant(UserId::new(1), acme);

    let result = h.service.assign_role(&acme_admin, USER, globex_editor).await;
    assert!(matches!(
        result,
        Err(AccessError::DomainMismatch { acting, target, .. }) if acting == acme && target == globex
    ));
    assert_eq!(h.factory.user_role_count().await, 0);

    let result = h.service.user_roles(&acme_admin, USER, globex).await;
    assert!(matches!(result, Err(AccessError::DomainMismatch { .. })));

    let result = h.service.assign_domain(&acme_admin, USER, globex).await;
    assert!(matches!(result, Err(AccessError::DomainMismatch { .. })));

    // 不存在的租户同样按越权拒绝，不暴露租户是否存在
    let result = h
        .service
        .assign_domain(&acme_admin, USER, DomainId::new(9_999))
        .await;
    assert!(matches!(
        result,
        Err(AccessError::DomainMismatch { target, .. }) if target == DomainId::new(9_999)
    ));

    // 本租户内的操作不受影响
    let globex_admin = RequestContext::tenant(UserId::new(2), globex);
    h.service
        .assign_role(&globex_admin, USER, globex_editor)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_anonymous_caller_is_unauthenticated() {
    let h = harness().await;
    let domain = h.domain("acme").await;

    let result = h
        .service
        .assign_domain(&RequestContext::anonymous(), USER, domain)
        .await;
    assert!(matches!(result, Err(AccessError::Unauthenticated)));
}

#[tokio::test]
async fn test_global_admin_acts_in_any_domain() {
    let h = harness().await;
    let acme = h.domain("acme").await;
    let editor = h.role(acme, "editor").await;
    let admin = RequestContext::global(UserId::new(1));

    h.service.assign_domain(&admin, USER, acme).await.unwrap();
    h.service.assign_role(&admin, USER, editor).await.unwrap();
    h.service.check_domain_context(&admin, acme, "role", "update").await.unwrap();
}

// ============================================================================
// 租户成员
// ============================================================================

#[tokio::test]
async fn test_assign_domain_rules() {
    let h = harness().await;
    let domain = h.domain("acme").await;
    let root = RequestContext::root();

    h.service.assign_domain(&root, USER, domain).await.unwrap();

    let again = h.service.assign_domain(&root, USER, domain).await;
    assert!(matches!(again, Err(AccessError::AlreadyAssigned(_))));

    let missing = h
        .service
        .assign_domain(&root, USER, DomainId::new(9_999))
        .await;
    assert!(matches!(
        missing,
        Err(AccessError::NotFound {
            entity: "Domain",
            ..
        })
    ));
}

#[tokio::test]
async fn test_remove_domain_cascades_roles() {
    let h = harness().await;
    let domain = h.domain("acme").await;
    let editor = h.role(domain, "editor").await;
    let viewer = h.role(domain, "viewer").await;
    let post_update = h.permission("post", "update").await;
    let root = RequestContext::root();

    h.member(USER, domain).await;
    h.service
        .add_permissions(&root, editor, &[post_update])
        .await
        .unwrap();
    h.service.assign_role(&root, USER, editor).await.unwrap();
    h.service.assign_role(&root, USER, viewer).await.unwrap();
    assert!(h.service.check(&Subject::User(USER), "post", "update").await);

    h.service.remove_domain(&root, USER, domain).await.unwrap();

    assert!(!h.service.check(&Subject::User(USER), "post", "update").await);
    assert!(h.service.user_roles(&root, USER, domain).await.unwrap().is_empty());
    assert_eq!(h.factory.user_role_count().await, 0);
    assert!(h.store_assignments().await.is_empty());

    let again = h.service.remove_domain(&root, USER, domain).await;
    assert!(matches!(again, Err(AccessError::DomainNotAssigned { .. })));

    // 重新加入后不会恢复旧角色
    h.member(USER, domain).await;
    assert!(h.service.user_roles(&root, USER, domain).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_assign_role_requires_membership() {
    let h = harness().await;
    let domain = h.domain("acme").await;
    let editor = h.role(domain, "editor").await;

    let result = h
        .service
        .assign_role(&RequestContext::root(), USER, editor)
        .await;
    assert!(matches!(
        result,
        Err(AccessError::DomainNotAssigned { user_id, domain_id }) if user_id == USER && domain_id == domain
    ));
    assert!(h.store_assignments().await.is_empty());
}

#[tokio::test]
async fn test_inactive_role_grants_nothing() {
    let h = harness().await;
    let domain = h.domain("acme").await;
    let editor = h.role(domain, "editor").await;
    let post_update = h.permission("post", "update").await;
    let root = RequestContext::root();
    let user = Subject::User(USER);

    h.member(USER, domain).await;
    h.member(UserId::new(11), domain).await;
    h.service
        .add_permissions(&root, editor, &[post_update])
        .await
        .unwrap();
    h.service.assign_role(&root, USER, editor).await.unwrap();
    assert!(h.service.check(&user, "post", "update").await);

    h.roles
        .handle_set_active(
            &root,
            SetRoleActiveCommand {
                role_id: editor,
                is_active: false,
            },
        )
        .await
        .unwrap();

    assert!(!h.service.check(&user, "post", "update").await);
    assert!(h.store_assignments().await.is_empty());
    // 分配记录保留，对账不会恢复停用角色的分组
    assert_eq!(h.factory.user_role_count().await, 1);
    assert!(h.service.reconcile().await.unwrap().is_clean());

    let result = h.service.assign_role(&root, UserId::new(11), editor).await;
    assert!(matches!(result, Err(AccessError::RoleInactive(id)) if id == editor));
    assert!(
        !h.service
            .check(&Subject::User(UserId::new(11)), "post", "update")
            .await
    );

    h.roles
        .handle_set_active(
            &root,
            SetRoleActiveCommand {
                role_id: editor,
                is_active: true,
            },
        )
        .await
        .unwrap();

    assert!(h.service.check(&user, "post", "update").await);
    assert_eq!(
        h.store_assignments().await,
        vec![RoleAssignment::new(USER, editor, domain)]
    );
    h.service
        .assign_role(&root, UserId::new(11), editor)
        .await
        .unwrap();
}

// ============================================================================
// 对账
// ============================================================================

#[tokio::test]
async fn test_reconcile_repairs_drift() {
    use iam_access::domain::policy::PolicyStore;

    let h = harness().await;
    let domain = h.domain("acme").await;
    let editor = h.role(domain, "editor").await;
    let root = RequestContext::root();

    h.member(USER, domain).await;
    h.service.assign_role(&root, USER, editor).await.unwrap();

    // 模拟策略存储与关系库不一致
    h.store.remove_user_role(USER, editor, domain).await.unwrap();
    h.store
        .add_user_role(UserId::new(99), editor, domain)
        .await
        .unwrap();

    let report = h.service.reconcile().await.unwrap();
    assert_eq!(
        report,
        ReconcileReport {
            added: 1,
            removed: 1
        }
    );
    assert_eq!(
        h.store_assignments().await,
        vec![RoleAssignment::new(USER, editor, domain)]
    );

    assert!(h.service.reconcile().await.unwrap().is_clean());
}

// ============================================================================
// 取消与超时
// ============================================================================

#[tokio::test]
async fn test_cancelled_request_writes_nothing() {
    let h = harness().await;
    let domain = h.domain("acme").await;

    let token = CancellationToken::new();
    token.cancel();
    let ctx = RequestContext::root().with_cancellation(token);

    let result = h.service.assign_domain(&ctx, USER, domain).await;
    assert!(matches!(result, Err(AccessError::Cancelled)));

    // 未加入租户
    let result = h
        .service
        .remove_domain(&RequestContext::root(), USER, domain)
        .await;
    assert!(matches!(result, Err(AccessError::DomainNotAssigned { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_exceeded_while_storage_is_busy() {
    let h = harness().await;
    let domain = h.domain("acme").await;

    // 占用存储，使请求等待
    let busy = h.factory.begin().await.unwrap();

    let ctx = RequestContext::root().with_timeout(Duration::from_millis(50));
    let result = h.service.assign_domain(&ctx, USER, domain).await;
    assert!(matches!(result, Err(AccessError::DeadlineExceeded)));

    drop(busy);
    h.service
        .assign_domain(&RequestContext::root(), USER, domain)
        .await
        .unwrap();
}

// ============================================================================
// 并发
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_assign_has_single_winner() {
    let h = harness().await;
    let domain = h.domain("acme").await;
    let editor = h.role(domain, "editor").await;
    h.member(USER, domain).await;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = h.service.clone();
            tokio::spawn(async move {
                service
                    .assign_role(&RequestContext::root(), USER, editor)
                    .await
            })
        })
        .collect();

    let mut succeeded = 0;
    let mut already = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => succeeded += 1,
            Err(AccessError::AlreadyAssigned(_)) => already += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(succeeded, 1);
    assert_eq!(already, 7);
    assert_eq!(h.factory.user_role_count().await, 1);
    assert_eq!(
        h.store_assignments().await,
        vec![RoleAssignment::new(USER, editor, domain)]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reconcile_during_mutations_keeps_store_in_sync() {
    let h = harness().await;
    let domain = h.domain("acme").await;
    let editor = h.role(domain, "editor").await;

    let mut handles = Vec::new();
    for user in 100..120 {
        h.member(UserId::new(user), domain).await;
        let service = h.service.clone();
        handles.push(tokio::spawn(async move {
            service
                .assign_role(&RequestContext::root(), UserId::new(user), editor)
                .await
        }));
    }
    for _ in 0..3 {
        let service = h.service.clone();
        tokio::spawn(async move { service.reconcile().await })
            .await
            .unwrap()
            .unwrap();
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(h.factory.user_role_count().await, 20);
    assert_eq!(h.store_assignments().await.len(), 20);
    assert!(h.service.reconcile().await.unwrap().is_clean());
}
