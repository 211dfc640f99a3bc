//! 反馈采样解析
//!
//! 舵机的一次状态读取（`ReadData` 从 `PresentPosition` 起读 8 字节）返回：
//!
//! | 偏移 | 长度 | 字段 | 编码 |
//! |------|------|------|------|
//! | 0 | 2 | 当前位置 | 无符号，小端 |
//! | 2 | 2 | 当前速度 | 符号-幅值（Bit 10 为方向） |
//! | 4 | 2 | 当前负载 | 符号-幅值（Bit 10 为方向） |
//! | 6 | 1 | 当前电压 | 无符号 |
//! | 7 | 1 | 当前温度 | 无符号 |
//!
//! 只有速度和负载使用符号-幅值编码，位置/电压/温度保持原样。

use crate::{ActuatorId, ProtocolError, bytes_to_u16_le};
use bilge::prelude::*;

/// 符号-幅值字段位域（16 bit）
///
/// 协议定义：
/// - Bit 0-9: 幅值（`value & 0x3FF`）
/// - Bit 10: 方向，1 表示负（`0x400`）
/// - Bit 11-15: 保留
///
/// bilge 默认使用 LSB first 位序，与协议位号一致。
#[bitsize(16)]
#[derive(FromBits, DebugBits, Clone, Copy, PartialEq)]
pub struct SignMagnitude {
    pub magnitude: u10, // Bit 0-9: 幅值
    pub negative: bool, // Bit 10: 方向位
    pub reserved: u5,   // Bit 11-15: 保留
}

/// 方向位掩码
pub const SIGN_BIT: u16 = 0x400;
/// 幅值掩码
pub const MAGNITUDE_MASK: u16 = 0x3FF;

/// 解码符号-幅值字段
///
/// 方向位置位时返回 `-(raw & 0x3FF)`；否则原样返回 `raw`（包括高位保留位）。
///
/// # 示例
///
/// ```
/// use jointflow_protocol::decode_sign_magnitude;
///
/// assert_eq!(decode_sign_magnitude(0x4AA), -170);
/// assert_eq!(decode_sign_magnitude(0x0AA), 170);
/// assert_eq!(decode_sign_magnitude(0x3FF), 1023);
/// assert_eq!(decode_sign_magnitude(0x400), 0);
/// ```
pub fn decode_sign_magnitude(raw: u16) -> i32 {
    let field = SignMagnitude::from(raw);
    if field.negative() {
        -i32::from(field.magnitude().value())
    } else {
        i32::from(raw)
    }
}

/// 原始反馈采样（未解码）
///
/// 由传输层在一次状态读取后构造，字段均为协议原始值。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawFeedback {
    pub id: ActuatorId,
    pub position: u16,
    pub speed: u16,
    pub load: u16,
    pub voltage: u8,
    pub temperature: u8,
    /// 采样时间（UTC 毫秒）
    pub timestamp_ms: u64,
}

impl RawFeedback {
    /// 状态读取块长度（字节）
    pub const BLOCK_LEN: usize = 8;

    /// 从状态读取返回的数据块解析
    ///
    /// # 错误
    /// - `ProtocolError::InvalidLength`: 数据块长度不足 8 字节
    pub fn from_present_block(
        id: ActuatorId,
        data: &[u8],
        timestamp_ms: u64,
    ) -> Result<Self, ProtocolError> {
        if data.len() < Self::BLOCK_LEN {
            return Err(ProtocolError::InvalidLength {
                expected: Self::BLOCK_LEN,
                actual: data.len(),
            });
        }

        Ok(Self {
            id,
            position: bytes_to_u16_le([data[0], data[1]]),
            speed: bytes_to_u16_le([data[2], data[3]]),
            load: bytes_to_u16_le([data[4], data[5]]),
            voltage: data[6],
            temperature: data[7],
            timestamp_ms,
        })
    }

    /// 解码为带符号的反馈采样
    pub fn decode(&self) -> FeedbackSample {
        FeedbackSample {
            id: self.id,
            position: i32::from(self.position),
            speed: decode_sign_magnitude(self.speed),
            load: decode_sign_magnitude(self.load),
            voltage: i32::from(self.voltage),
            temperature: i32::from(self.temperature),
            timestamp_ms: self.timestamp_ms,
        }
    }
}

/// 已解码的反馈采样（协议原始单位，速度/负载带符号）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedbackSample {
    pub id: ActuatorId,
    pub position: i32,
    pub speed: i32,
    pub load: i32,
    pub voltage: i32,
    pub temperature: i32,
    pub timestamp_ms: u64,
}

impl FeedbackSample {
    /// 是否为有效读数
    ///
    /// 温度或电压为 0 表示读取失败（总线返回了空数据）。
    pub fn is_valid_read(&self) -> bool {
        self.temperature != 0 && self.voltage != 0
    }
}

impl From<RawFeedback> for FeedbackSample {
    fn from(raw: RawFeedback) -> Self {
        raw.decode()
    }
}
