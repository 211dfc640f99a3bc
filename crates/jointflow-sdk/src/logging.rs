//! 日志初始化

use crate::error::SdkError;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;

/// 安装全局 `tracing` 订阅者
///
/// 过滤规则取自 `RUST_LOG`，再叠加 `default_directive`（例如 `"jointflow=info"`）。
/// 通过 `log` crate 发出的记录也会被转发。整个进程只能调用一次。
///
/// # 错误
/// - `SdkError::Logging`: 指令无法解析，或已安装过全局订阅者
pub fn init_logging(default_directive: &str) -> Result<(), SdkError> {
    let directive: Directive = default_directive
        .parse()
        .map_err(|e| SdkError::Logging(format!("invalid directive '{}': {}", default_directive, e)))?;

    tracing_log::LogTracer::init().map_err(|e| SdkError::Logging(e.to_string()))?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive))
        .finish();
    tracing::subscriber::set_global_default(subscriber).map_err(|e| SdkError::Logging(e.to_string()))
}
