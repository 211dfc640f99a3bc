//! # Jointflow Protocol
//!
//! 舵机总线协议词汇定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `ids`: 舵机 ID 定义
//! - `units`: 归一化位置与位置量程映射
//! - `feedback`: 反馈采样解析（含符号-幅值位域解码）
//! - `instruction`: 指令集、寄存器地址与逻辑命令
//! - `baud`: 波特率枚举
//! - `status`: 状态包错误字节位域
//! - `time`: 墙钟毫秒时间
//!
//! ## 字节序
//!
//! 舵机总线的多字节字段使用小端字节序（低字节在前）。
//! 帧头、长度与校验和由传输层负责，本 crate 只定义逻辑内容。

pub mod baud;
pub mod feedback;
pub mod ids;
pub mod instruction;
pub mod status;
pub mod time;
pub mod units;

// 重新导出常用类型
pub use baud::*;
pub use feedback::*;
pub use ids::*;
pub use instruction::*;
pub use status::*;
pub use time::{Pacer, now_millis};
pub use units::*;

use thiserror::Error;

/// 协议解析错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Invalid data length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Invalid actuator id: {id}")]
    InvalidActuatorId { id: u8 },

    #[error("Invalid value for field {field}: {value}")]
    InvalidValue { field: String, value: u32 },

    #[error("Normalized value out of range [0, 1]: {0}")]
    OutOfRange(f64),

    #[error("Unsupported baud rate: {0} bps")]
    UnsupportedBaudRate(u32),

    #[error("Invalid position range: min={min}, max={max}, default={default}")]
    InvalidPositionRange { min: u16, max: u16, default: u16 },

    #[error("Inconsistent sync write entry for actuator {id}: expected {expected} bytes, got {actual}")]
    InconsistentSyncWrite { id: u8, expected: usize, actual: usize },
}

/// 小端字节序转 u16
pub fn bytes_to_u16_le(bytes: [u8; 2]) -> u16 {
    u16::from_le_bytes(bytes)
}

/// u16 转小端字节序
pub fn u16_to_bytes_le(value: u16) -> [u8; 2] {
    value.to_le_bytes()
}
