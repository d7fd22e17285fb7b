//! telemetry - 可观测性库

use rbac_config::{LogFormat, TelemetryConfig};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// 初始化 tracing
pub fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// 初始化 JSON 格式的 tracing（生产环境）
pub fn init_tracing_json(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
        .init();
}

/// 按配置选择输出格式
pub fn init_from_config(config: &TelemetryConfig) {
    match config.format {
        LogFormat::Pretty => init_tracing(&config.log_level),
        LogFormat::Json => init_tracing_json(&config.log_level),
    }
    tracing::debug!(level = %config.log_level, format = ?config.format, "Tracing initialized");
}
