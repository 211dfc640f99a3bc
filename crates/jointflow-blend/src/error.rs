//! 融合层错误类型定义

use jointflow_protocol::ProtocolError;
use thiserror::Error;

/// 融合层错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BlendError {
    /// 装配错误（缺少组合策略、缺少输出、帧长为 0 等）
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// 协议错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 输出端写入失败
    #[error("Output write failed: {0}")]
    Output(String),

    /// 调度线程启动失败
    #[error("Failed to spawn scheduler thread: {0}")]
    Spawn(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blend_error_display() {
        let err = BlendError::InvalidArgument("frame length must be positive".to_string());
        assert_eq!(format!("{}", err), "Invalid argument: frame length must be positive");

        let err: BlendError = ProtocolError::OutOfRange(1.5).into();
        assert!(format!("{}", err).contains("1.5"));
    }
}
