//! 指令集与逻辑命令
//!
//! 每条指令对应一个操作码字节；帧头、长度与校验和由传输层负责。
//! [`ServoCommand`] 只描述"发给谁、做什么、带什么参数"。

use crate::{ActuatorId, ProtocolError};
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// 指令操作码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Instruction {
    /// 探测舵机是否在线
    Ping = 0x01,
    /// 读取寄存器
    ReadData = 0x02,
    /// 写寄存器（立即生效）
    WriteData = 0x03,
    /// 写寄存器（挂起，等待 Action）
    RegWrite = 0x04,
    /// 提交所有挂起的 RegWrite
    Action = 0x05,
    /// 恢复出厂设置
    Reset = 0x06,
    /// 广播批量写（一次写多个舵机的同一段寄存器）
    SyncWrite = 0x83,
}

impl Instruction {
    /// 从操作码解析
    ///
    /// # 错误
    /// - `ProtocolError::InvalidValue`: 未知操作码
    pub fn from_opcode(byte: u8) -> Result<Self, ProtocolError> {
        Self::try_from(byte).map_err(|e| ProtocolError::InvalidValue {
            field: "Instruction".to_string(),
            value: u32::from(e.number),
        })
    }

    /// 操作码字节
    pub fn opcode(self) -> u8 {
        self.into()
    }
}

/// 控制表寄存器地址（常用子集）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Register {
    BaudRate = 0x04,
    ReturnDelayTime = 0x05,
    TorqueEnable = 0x18,
    GoalPosition = 0x1E,
    MovingSpeed = 0x20,
    PresentPosition = 0x24,
    PresentSpeed = 0x26,
    PresentLoad = 0x28,
    PresentVoltage = 0x2A,
    PresentTemperature = 0x2B,
}

impl Register {
    /// 寄存器地址
    pub fn address(self) -> u8 {
        self.into()
    }
}

/// SyncWrite 中单个舵机的数据段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncWriteEntry {
    pub id: ActuatorId,
    pub data: Vec<u8>,
}

/// 逻辑命令
///
/// 传输层接收此类型并负责组帧（帧头、长度、校验和）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServoCommand {
    Ping {
        id: ActuatorId,
    },
    ReadData {
        id: ActuatorId,
        start: Register,
        length: u8,
    },
    WriteData {
        id: ActuatorId,
        start: Register,
        data: Vec<u8>,
    },
    RegWrite {
        id: ActuatorId,
        start: Register,
        data: Vec<u8>,
    },
    Action {
        id: ActuatorId,
    },
    Reset {
        id: ActuatorId,
    },
    SyncWrite {
        start: Register,
        entry_len: u8,
        entries: Vec<SyncWriteEntry>,
    },
}

impl ServoCommand {
    /// 构建 SyncWrite 命令
    ///
    /// 所有数据段长度必须一致。
    ///
    /// # 错误
    /// - `ProtocolError::InconsistentSyncWrite`: 数据段长度不一致
    /// - `ProtocolError::InvalidLength`: 数据段为空或超过 255 字节
    pub fn sync_write(start: Register, entries: Vec<SyncWriteEntry>) -> Result<Self, ProtocolError> {
        let entry_len = entries.first().map(|e| e.data.len()).unwrap_or(0);
        if entry_len == 0 || entry_len > usize::from(u8::MAX) {
            return Err(ProtocolError::InvalidLength {
                expected: 1,
                actual: entry_len,
            });
        }
        if let Some(bad) = entries.iter().find(|e| e.data.len() != entry_len) {
            return Err(ProtocolError::InconsistentSyncWrite {
                id: bad.id.value(),
                expected: entry_len,
                actual: bad.data.len(),
            });
        }

        Ok(ServoCommand::SyncWrite {
            start,
            entry_len: entry_len as u8,
            entries,
        })
    }

    /// 打开/关闭扭矩输出
    pub fn torque_enable(id: ActuatorId, enabled: bool) -> Self {
        ServoCommand::WriteData {
            id,
            start: Register::TorqueEnable,
            data: vec![u8::from(enabled)],
        }
    }

    /// 读取状态块（位置、速度、负载、电压、温度）
    pub fn read_feedback(id: ActuatorId) -> Self {
        ServoCommand::ReadData {
            id,
            start: Register::PresentPosition,
            length: crate::RawFeedback::BLOCK_LEN as u8,
        }
    }

    /// 指令操作码
    pub fn instruction(&self) -> Instruction {
        match self {
            ServoCommand::Ping { .. } => Instruction::Ping,
            ServoCommand::ReadData { .. } => Instruction::ReadData,
            ServoCommand::WriteData { .. } => Instruction::WriteData,
            ServoCommand::RegWrite { .. } => Instruction::RegWrite,
            ServoCommand::Action { .. } => Instruction::Action,
            ServoCommand::Reset { .. } => Instruction::Reset,
            ServoCommand::SyncWrite { .. } => Instruction::SyncWrite,
        }
    }

    /// 目标地址（SyncWrite 为广播地址）
    pub fn target(&self) -> ActuatorId {
        match self {
            ServoCommand::Ping { id }
            | ServoCommand::ReadData { id, .. }
            | ServoCommand::WriteData { id, .. }
            | ServoCommand::RegWrite { id, .. }
            | ServoCommand::Action { id }
            | ServoCommand::Reset { id } => *id,
            ServoCommand::SyncWrite { .. } => ActuatorId::BROADCAST,
        }
    }

    /// 是否期望状态包返回
    ///
    /// 广播指令不返回状态包。
    pub fn expects_status(&self) -> bool {
        !self.target().is_broadcast()
    }

    /// 参数字节（不含帧头、ID、长度、操作码和校验和）
    pub fn params(&self) -> Vec<u8> {
        match self {
            ServoCommand::Ping { .. } | ServoCommand::Action { .. } | ServoCommand::Reset { .. } => {
                Vec::new()
            },
            ServoCommand::ReadData { start, length, .. } => vec![start.address(), *length],
            ServoCommand::WriteData { start, data, .. } | ServoCommand::RegWrite { start, data, .. } => {
                let mut params = Vec::with_capacity(data.len() + 1);
                params.push(start.address());
                params.extend_from_slice(data);
                params
            },
            ServoCommand::SyncWrite {
                start,
                entry_len,
                entries,
            } => {
                let mut params = Vec::with_capacity(2 + entries.len() * (usize::from(*entry_len) + 1));
                params.push(start.address());
                params.push(*entry_len);
                for entry in entries {
                    params.push(entry.id.value());
                    params.extend_from_slice(&entry.data);
                }
                params
            },
        }
    }
}
