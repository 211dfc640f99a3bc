//! 波特率
//!
//! 总线只支持一组固定波特率，写入 `BaudRate` 寄存器的是对应的分频字节。

use crate::ProtocolError;
use std::fmt;

/// 支持的波特率
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BaudRate {
    #[default]
    Bps1000000,
    Bps500000,
    Bps400000,
    Bps250000,
    Bps200000,
    Bps115200,
    Bps57600,
    Bps19200,
    Bps9600,
}

impl BaudRate {
    /// 所有支持的波特率（从高到低）
    pub const ALL: [BaudRate; 9] = [
        BaudRate::Bps1000000,
        BaudRate::Bps500000,
        BaudRate::Bps400000,
        BaudRate::Bps250000,
        BaudRate::Bps200000,
        BaudRate::Bps115200,
        BaudRate::Bps57600,
        BaudRate::Bps19200,
        BaudRate::Bps9600,
    ];

    /// 每秒比特数
    pub fn bps(self) -> u32 {
        match self {
            BaudRate::Bps1000000 => 1_000_000,
            BaudRate::Bps500000 => 500_000,
            BaudRate::Bps400000 => 400_000,
            BaudRate::Bps250000 => 250_000,
            BaudRate::Bps200000 => 200_000,
            BaudRate::Bps115200 => 115_200,
            BaudRate::Bps57600 => 57_600,
            BaudRate::Bps19200 => 19_200,
            BaudRate::Bps9600 => 9_600,
        }
    }

    /// 写入 `BaudRate` 寄存器的字节
    pub fn register_byte(self) -> u8 {
        match self {
            BaudRate::Bps1000000 => 0x01,
            BaudRate::Bps500000 => 0x03,
            BaudRate::Bps400000 => 0x04,
            BaudRate::Bps250000 => 0x07,
            BaudRate::Bps200000 => 0x09,
            BaudRate::Bps115200 => 0x10,
            BaudRate::Bps57600 => 0x22,
            BaudRate::Bps19200 => 0x67,
            BaudRate::Bps9600 => 0xCF,
        }
    }
}

impl TryFrom<u32> for BaudRate {
    type Error = ProtocolError;

    fn try_from(bps: u32) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|rate| rate.bps() == bps)
            .ok_or(ProtocolError::UnsupportedBaudRate(bps))
    }
}

impl fmt::Display for BaudRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bps", self.bps())
    }
}
