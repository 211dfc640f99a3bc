//! SDK 错误类型

use crate::config::ConfigError;
use jointflow_blend::BlendError;
use jointflow_driver::DriverError;
use jointflow_protocol::ProtocolError;
use thiserror::Error;

/// SDK 顶层错误
#[derive(Error, Debug)]
pub enum SdkError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Blend error: {0}")]
    Blend(#[from] BlendError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Logging initialization failed: {0}")]
    Logging(String),
}
