//! 服务配置

use std::time::Duration;

use rbac_config::{DatabaseConfig, TelemetryConfig};
use serde::Deserialize;

use crate::domain::tenant::NewDomain;

/// IAM Access 服务配置
#[derive(Debug, Clone, Deserialize)]
pub struct AccessServiceConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub authorization: AuthorizationConfig,
    #[serde(default)]
    pub seed: SeedConfig,
}

/// 鉴权配置
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizationConfig {
    /// 分组元组对账周期 (秒)，0 表示只在启动时对账
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,
    /// 单次变更操作的超时 (毫秒)
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,
}

fn default_reconcile_interval_secs() -> u64 {
    300
}

fn default_operation_timeout_ms() -> u64 {
    5_000
}

impl Default for AuthorizationConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_secs: default_reconcile_interval_secs(),
            operation_timeout_ms: default_operation_timeout_ms(),
        }
    }
}

impl AuthorizationConfig {
    pub fn reconcile_interval(&self) -> Option<Duration> {
        (self.reconcile_interval_secs > 0).then(|| Duration::from_secs(self.reconcile_interval_secs))
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

/// 初始化数据
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedConfig {
    #[serde(default)]
    pub domains: Vec<NewDomain>,
}
