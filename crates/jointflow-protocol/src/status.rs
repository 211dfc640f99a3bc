//! 状态包错误字节
//!
//! 舵机在每个状态包中返回一个错误字节，每一位代表一种故障。

use bilge::prelude::*;

/// 错误字节位域（8 bit，LSB first）
#[bitsize(8)]
#[derive(FromBits, DebugBits, Clone, Copy, Default, PartialEq)]
pub struct ErrorStatus {
    pub input_voltage: bool, // Bit 0: 输入电压超限
    pub angle_limit: bool,   // Bit 1: 目标位置超出角度限制
    pub overheating: bool,   // Bit 2: 过热
    pub range: bool,         // Bit 3: 指令参数超出范围
    pub checksum: bool,      // Bit 4: 校验和错误
    pub overload: bool,      // Bit 5: 过载
    pub instruction: bool,   // Bit 6: 未知指令
    pub reserved: u1,        // Bit 7: 保留
}

/// 单项故障
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServoFault {
    InputVoltage,
    AngleLimit,
    Overheating,
    Range,
    Checksum,
    Overload,
    Instruction,
}

impl ErrorStatus {
    /// 从状态包错误字节构造
    pub fn from_byte(byte: u8) -> Self {
        Self::from(byte)
    }

    /// 是否无故障
    pub fn is_ok(&self) -> bool {
        self.faults().is_empty()
    }

    /// 列出所有置位的故障
    pub fn faults(&self) -> Vec<ServoFault> {
        let mut faults = Vec::new();
        if self.input_voltage() {
            faults.push(ServoFault::InputVoltage);
        }
        if self.angle_limit() {
            faults.push(ServoFault::AngleLimit);
        }
        if self.overheating() {
            faults.push(ServoFault::Overheating);
        }
        if self.range() {
            faults.push(ServoFault::Range);
        }
        if self.checksum() {
            faults.push(ServoFault::Checksum);
        }
        if self.overload() {
            faults.push(ServoFault::Overload);
        }
        if self.instruction() {
            faults.push(ServoFault::Instruction);
        }
        faults
    }
}
