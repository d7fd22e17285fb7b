//! 请求上下文
//!
//! 携带调用者身份、取消令牌和截止时间

use std::future::Future;
use std::time::Duration;

use rbac_common::{DomainId, UserId};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{AccessError, AccessResult};

/// 已认证的调用者
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    /// 超级管理员
    Root,
    /// 不受租户限制的全局管理员
    Global { user_id: UserId },
    /// 在某个租户内操作的用户
    Tenant { user_id: UserId, domain_id: DomainId },
}

impl Actor {
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Self::Root => None,
            Self::Global { user_id } | Self::Tenant { user_id, .. } => Some(*user_id),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    actor: Option<Actor>,
    cancellation: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// 未认证的上下文
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn root() -> Self {
        Self::anonymous().with_actor(Actor::Root)
    }

    pub fn global(user_id: UserId) -> Self {
        Self::anonymous().with_actor(Actor::Global { user_id })
    }

    pub fn tenant(user_id: UserId, domain_id: DomainId) -> Self {
        Self::anonymous().with_actor(Actor::Tenant { user_id, domain_id })
    }

    pub fn with_actor(mut self, actor: Actor) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn actor(&self) -> Option<&Actor> {
        self.actor.as_ref()
    }

    /// 审计字段使用的操作人
    pub fn performed_by(&self) -> Option<UserId> {
        self.actor.and_then(|a| a.user_id())
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// 在取消令牌和截止时间约束下执行 `fut`
    pub async fn run<T, F>(&self, fut: F) -> AccessResult<T>
    where
        F: Future<Output = AccessResult<T>>,
    {
        self.run_within(None, fut).await
    }

    /// 同 [`run`](Self::run)；上下文未设置截止时间时使用 `default_timeout`
    pub async fn run_within<T, F>(&self, default_timeout: Option<Duration>, fut: F) -> AccessResult<T>
    where
        F: Future<Output = AccessResult<T>>,
    {
        if self.cancellation.is_cancelled() {
            return Err(AccessError::Cancelled);
        }

        let deadline = self
            .deadline
            .or_else(|| default_timeout.map(|t| Instant::now() + t));

        match deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = self.cancellation.cancelled() => Err(AccessError::Cancelled),
                    result = tokio::time::timeout_at(deadline, fut) => match result {
                        Ok(result) => result,
                        Err(_) => Err(AccessError::DeadlineExceeded),
                    },
                }
            }
            None => {
                tokio::select! {
                    biased;
                    _ = self.cancellation.cancelled() => Err(AccessError::Cancelled),
                    result = fut => result,
                }
            }
        }
    }
}
