//! 舵机 ID 定义

use crate::ProtocolError;
use std::fmt;

/// 舵机总线 ID
///
/// 总线上每个舵机都有一个单字节 ID：
/// - `0..=253`: 单播地址
/// - `254` (`0xFE`): 广播地址，仅用于 SyncWrite 等批量指令，不能注册为舵机
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ActuatorId(u8);

impl ActuatorId {
    /// 广播地址
    pub const BROADCAST: ActuatorId = ActuatorId(0xFE);

    /// 最大单播地址
    pub const MAX_UNICAST: u8 = 0xFD;

    /// 创建单播 ID
    ///
    /// # 错误
    /// - `ProtocolError::InvalidActuatorId`: ID 为广播地址或超出单播范围
    pub fn new(id: u8) -> Result<Self, ProtocolError> {
        if id > Self::MAX_UNICAST {
            return Err(ProtocolError::InvalidActuatorId { id });
        }
        Ok(Self(id))
    }

    /// 原始字节值
    pub fn value(self) -> u8 {
        self.0
    }

    /// 是否为广播地址
    pub fn is_broadcast(self) -> bool {
        self == Self::BROADCAST
    }
}

impl TryFrom<u8> for ActuatorId {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ActuatorId> for u8 {
    fn from(id: ActuatorId) -> Self {
        id.0
    }
}

impl fmt::Display for ActuatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
