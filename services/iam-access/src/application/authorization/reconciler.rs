//! 周期对账任务
//!
//! 定期以 user_roles 为准重建策略存储中的分组元组。

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::service::AuthorizationService;

pub struct ReconcileTask {
    service: Arc<AuthorizationService>,
    interval: Duration,
}

impl ReconcileTask {
    pub fn new(service: Arc<AuthorizationService>, interval: Duration) -> Self {
        Self { service, interval }
    }

    pub fn start(self, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_secs = self.interval.as_secs(), "Reconcile task started");
            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // 首个 tick 立即触发，启动时已对账过一次
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.service.reconcile().await {
                            error!(error = %e, "Failed to reconcile role assignments");
                        }
                    }
                    _ = shutdown.cancelled() => {
                        info!("Reconcile task received shutdown signal");
                        break;
                    }
                }
            }
            info!("Reconcile task stopped");
        })
    }
}
