//! 租户上下文解析

use async_trait::async_trait;
use rbac_common::DomainId;
use tracing::warn;

use super::request_context::{Actor, RequestContext};
use crate::error::{AccessError, AccessResult};

/// 从请求上下文解析调用者的操作租户
#[async_trait]
pub trait DomainContextResolver: Send + Sync {
    /// root 与全局管理员返回 None，否则返回调用者所在租户
    async fn resolve(&self, ctx: &RequestContext) -> AccessResult<Option<DomainId>>;

    /// 校验调用者能否在 `target` 租户内对 `resource` 执行 `action`
    async fn check_domain_context(
        &self,
        ctx: &RequestContext,
        target: DomainId,
        resource: &str,
        action: &str,
    ) -> AccessResult<()> {
        match self.resolve(ctx).await? {
            None => Ok(()),
            Some(acting) if acting == target => Ok(()),
            Some(acting) => {
                warn!(
                    acting_domain = %acting,
                    target_domain = %target,
                    resource,
                    action,
                    "Cross-domain operation rejected"
                );
                Err(AccessError::DomainMismatch {
                    acting,
                    target,
                    resource: resource.to_string(),
                    action: action.to_string(),
                })
            }
        }
    }
}

/// 按调用者身份解析租户
#[derive(Debug, Clone, Copy, Default)]
pub struct ActorDomainResolver;

#[async_trait]
impl DomainContextResolver for ActorDomainResolver {
    async fn resolve(&self, ctx: &RequestContext) -> AccessResult<Option<DomainId>> {
        match ctx.actor() {
            None => Err(AccessError::Unauthenticated),
            Some(Actor::Root) | Some(Actor::Global { .. }) => Ok(None),
            Some(Actor::Tenant { domain_id, .. }) => Ok(Some(*domain_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rbac_common::UserId;

    #[tokio::test]
    async fn test_resolve() {
        let resolver = ActorDomainResolver;

        assert_eq!(resolver.resolve(&RequestContext::root()).await.ok(), Some(None));
        assert_eq!(
            resolver
                .resolve(&RequestContext::global(UserId::new(1)))
                .await
                .ok(),
            Some(None)
        );
        assert_eq!(
            resolver
                .resolve(&RequestContext::tenant(UserId::new(1), DomainId::new(5)))
                .await
                .ok(),
            Some(Some(DomainId::new(5)))
        );
        assert!(matches!(
            resolver.resolve(&RequestContext::anonymous()).await,
            Err(AccessError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn test_check_domain_context() {
        let resolver = ActorDomainResolver;
        let ctx = RequestContext::tenant(UserId::new(1), DomainId::new(5));

        assert!(
            resolver
                .check_domain_context(&ctx, DomainId::new(5), "role", "update")
                .await
                .is_ok()
        );

        let err = resolver
            .check_domain_context(&ctx, DomainId::new(6), "role", "update")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AccessError::DomainMismatch { acting, target, .. }
                if acting == DomainId::new(5) && target == DomainId::new(6)
        ));

        // 全局调用者不受租户限制
        assert!(
            resolver
                .check_domain_context(&RequestContext::root(), DomainId::new(6), "role", "update")
                .await
                .is_ok()
        );
    }
}
