//! 驱动层错误类型定义

use crate::transport::TransportError;
use jointflow_protocol::{ActuatorId, ProtocolError};
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 协议错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 传输层错误
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// 装配错误（缺少依赖、非法 ID、非法阈值等）
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// 舵机未注册
    #[error("Unknown actuator: {0}")]
    UnknownActuator(ActuatorId),

    /// 通道已关闭（对端线程退出）
    #[error("Channel closed")]
    ChannelClosed,

    /// 后台线程启动失败
    #[error("Failed to spawn thread: {0}")]
    Spawn(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_error_display() {
        let err = DriverError::InvalidArgument("broadcast id".to_string());
        assert_eq!(format!("{}", err), "Invalid argument: broadcast id");

        let err = DriverError::UnknownActuator(ActuatorId::new(4).unwrap());
        assert_eq!(format!("{}", err), "Unknown actuator: #4");

        let err = DriverError::ChannelClosed;
        assert_eq!(format!("{}", err), "Channel closed");
    }

    #[test]
    fn test_from_protocol_error() {
        let err: DriverError = ProtocolError::OutOfRange(2.0).into();
        match err {
            DriverError::Protocol(ProtocolError::OutOfRange(v)) => assert_eq!(v, 2.0),
            _ => panic!("Expected Protocol variant"),
        }
    }

    #[test]
    fn test_from_transport_error() {
        let err: DriverError = TransportError::Timeout.into();
        assert!(matches!(err, DriverError::Transport(TransportError::Timeout)));
        assert!(format!("{}", err).contains("timeout"));
    }
}
